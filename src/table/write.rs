// src/table/write.rs
use arrow::{
    array::{Array, ArrayRef, Float64Array, Int32Array, StringArray, UInt32Array},
    csv::{ReaderBuilder, WriterBuilder},
    datatypes::{DataType, Field, Schema},
    error::ArrowError,
    record_batch::RecordBatch,
};
use chrono::NaiveDate;
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::Arc,
};
use tracing::{debug, instrument};

use super::{ResultRow, ResultTable, DISPLAY_DATE_FORMAT, RETURN_COLUMNS};
use crate::error::Result;
use crate::report::tmp_sibling;

/// Date, Option, 10yr … FYTD
pub fn csv_schema() -> Schema {
    let mut fields = vec![
        Field::new("Date", DataType::Utf8, false),
        Field::new("Option", DataType::Utf8, false),
    ];
    fields.extend(
        RETURN_COLUMNS
            .iter()
            .map(|c| Field::new(*c, DataType::Float64, false)),
    );
    Schema::new(fields)
}

/// [`csv_schema`] plus the derived Year and Month.
pub fn snapshot_schema() -> Schema {
    let mut fields: Vec<Field> = csv_schema()
        .fields()
        .iter()
        .map(|f| (**f).clone())
        .collect();
    fields.push(Field::new("Year", DataType::Int32, false));
    fields.push(Field::new("Month", DataType::UInt32, false));
    Schema::new(fields)
}

pub fn to_record_batch(table: &ResultTable, with_derived: bool) -> Result<RecordBatch> {
    let rows = table.rows();
    let mut cols: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(ResultRow::display_date))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.option.as_str()))),
    ];
    for i in 0..RETURN_COLUMNS.len() {
        cols.push(Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| r.returns[i]),
        )));
    }

    let schema = if with_derived {
        cols.push(Arc::new(Int32Array::from_iter_values(rows.iter().map(ResultRow::year))));
        cols.push(Arc::new(UInt32Array::from_iter_values(rows.iter().map(ResultRow::month))));
        snapshot_schema()
    } else {
        csv_schema()
    };

    Ok(RecordBatch::try_new(Arc::new(schema), cols)?)
}

/// Write the table as CSV with a header row, via a temp file + rename.
#[instrument(level = "debug", skip(table), fields(rows = table.len()))]
pub fn write_csv(table: &ResultTable, path: &Path) -> Result<()> {
    let batch = to_record_batch(table, false)?;
    let tmp = tmp_sibling(path);
    {
        let file = File::create(&tmp)?;
        let mut writer = WriterBuilder::new()
            .with_header(true)
            .build(BufWriter::new(file));
        writer.write(&batch)?;
        writer.into_inner().flush()?;
    }
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "csv written");
    Ok(())
}

/// Read back a table written by [`write_csv`].
pub fn read_csv(path: &Path) -> Result<ResultTable> {
    let file = File::open(path)?;
    let reader = ReaderBuilder::new(Arc::new(csv_schema()))
        .with_header(true)
        .build(file)?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let dates = string_column(&batch, 0)?;
        let options = string_column(&batch, 1)?;
        let values: Vec<&Float64Array> = (0..RETURN_COLUMNS.len())
            .map(|i| float_column(&batch, i + 2))
            .collect::<Result<_>>()?;

        for row in 0..batch.num_rows() {
            let date = NaiveDate::parse_from_str(dates.value(row), DISPLAY_DATE_FORMAT)
                .map_err(|e| {
                    ArrowError::ParseError(format!("bad date {:?}: {}", dates.value(row), e))
                })?;
            let mut returns = [0f64; 8];
            for (slot, col) in returns.iter_mut().zip(&values) {
                *slot = col.value(row);
            }
            rows.push(ResultRow {
                date,
                option: options.value(row).to_string(),
                returns,
            });
        }
    }
    Ok(ResultTable::from_rows(rows))
}

/// Columnar copy of the table (with Year/Month), Snappy compressed.
#[instrument(level = "debug", skip(table), fields(rows = table.len()))]
pub fn write_parquet(table: &ResultTable, path: &Path) -> Result<()> {
    let batch = to_record_batch(table, true)?;
    let tmp = tmp_sibling(path);
    let file = File::create(&tmp)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "parquet written");
    Ok(())
}

fn string_column(batch: &RecordBatch, idx: usize) -> Result<&StringArray> {
    Ok(batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| ArrowError::SchemaError(format!("column {} is not Utf8", idx)))?)
}

fn float_column(batch: &RecordBatch, idx: usize) -> Result<&Float64Array> {
    let col = batch.column(idx);
    if col.null_count() > 0 {
        return Err(ArrowError::InvalidArgumentError(format!("column {} has empty values", idx)).into());
    }
    Ok(col
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| ArrowError::SchemaError(format!("column {} is not Float64", idx)))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs;
    use tempfile::tempdir;

    fn sample() -> ResultTable {
        ResultTable::from_rows(vec![
            ResultRow {
                date: NaiveDate::from_ymd_opt(2019, 2, 28).unwrap(),
                option: "Core Strategy".into(),
                returns: [8.9, 9.6, 7.9, 8.5, 3.1, -1.0, -0.6, 0.2],
            },
            ResultRow {
                date: NaiveDate::from_ymd_opt(2019, 1, 31).unwrap(),
                option: "Balanced".into(),
                returns: [5.2, 4.1, 3.9, 3.3, 2.8, 1.1, 0.5, 0.9],
            },
        ])
    }

    #[test]
    fn csv_has_fixed_header_and_display_dates() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("Output.csv");
        write_csv(&sample(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Date,Option,10yr,7yr,5yr,3yr,1yr,6m,3m,FYTD"
        );
        assert!(lines.next().unwrap().starts_with("31-01-2019,Balanced,5.2,"));
        assert!(lines.next().unwrap().starts_with("28-02-2019,Core Strategy,8.9,"));
        assert!(!tmp.path().join(".Output.csv.tmp").exists());
    }

    #[test]
    fn csv_reads_back_identically() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("Output.csv");
        let table = sample();
        write_csv(&table, &path).unwrap();
        assert_eq!(read_csv(&path).unwrap(), table);
    }

    #[test]
    fn empty_table_still_has_header() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("Output.csv");
        write_csv(&ResultTable::default(), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Date,Option,10yr"));
        assert!(read_csv(&path).unwrap().is_empty());
    }

    #[test]
    fn parquet_snapshot_carries_year_and_month() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("Output.parquet");
        write_parquet(&sample(), &path).unwrap();

        let file = File::open(&path).unwrap();
        let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 12);
        let months = batch
            .column(11)
            .as_any()
            .downcast_ref::<UInt32Array>()
            .unwrap();
        assert_eq!(months.values().to_vec(), vec![1, 2]);
    }
}
