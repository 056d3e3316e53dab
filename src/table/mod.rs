// src/table/mod.rs
//! Consolidate extracted rows into the typed, sorted result table.

pub mod write;

use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeSet, HashSet};
use tracing::{info, instrument, warn};

use crate::error::{PipelineError, Result};
use crate::extract::ExtractedRow;
use crate::fetch::urls::parse_document_stem;
use crate::report::{DuplicateRow, RejectedRow};

/// Period-return columns, in file order.
pub const RETURN_COLUMNS: [&str; 8] = ["10yr", "7yr", "5yr", "3yr", "1yr", "6m", "3m", "FYTD"];

/// Display form of the Date column.
pub const DISPLAY_DATE_FORMAT: &str = "%d-%m-%Y";

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub date: NaiveDate,
    pub option: String,
    /// Percent values in [`RETURN_COLUMNS`] order.
    pub returns: [f64; 8],
}

impl ResultRow {
    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn display_date(&self) -> String {
        self.date.format(DISPLAY_DATE_FORMAT).to_string()
    }

    /// Value of a return column by header name.
    pub fn value(&self, column: &str) -> Option<f64> {
        RETURN_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|i| self.returns[i])
    }
}

/// Rows sorted ascending by date, one per (date, option).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: Vec<ResultRow>,
}

impl ResultTable {
    /// Sorts `rows` by (date, option). Callers are responsible for uniqueness.
    pub fn from_rows(mut rows: Vec<ResultRow>) -> Self {
        sort_rows(&mut rows);
        Self { rows }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct options, alphabetical.
    pub fn options(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self.rows.iter().map(|r| r.option.as_str()).collect();
        set.into_iter().collect()
    }

    /// Distinct years, ascending.
    pub fn years(&self) -> Vec<i32> {
        let set: BTreeSet<i32> = self.rows.iter().map(ResultRow::year).collect();
        set.into_iter().collect()
    }

    /// Rows of one option in one year, in date order.
    pub fn filter<'a>(&'a self, option: &'a str, year: i32) -> impl Iterator<Item = &'a ResultRow> {
        self.rows
            .iter()
            .filter(move |r| r.option == option && r.year() == year)
    }
}

fn sort_rows(rows: &mut [ResultRow]) {
    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.option.cmp(&b.option)));
}

/// Output of [`build`]: the table plus everything dropped on the way.
#[derive(Debug, Default)]
pub struct TableBuild {
    pub table: ResultTable,
    pub rejected: Vec<RejectedRow>,
    pub duplicates: Vec<DuplicateRow>,
}

/// Strip a trailing percent sign and surrounding whitespace, then parse.
pub fn parse_percent(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let s = s.strip_suffix('%').unwrap_or(s).trim();
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Validate, type, de-duplicate and sort extracted rows.
///
/// - a row with the wrong number of return fields fails the whole build;
/// - a row with an unparseable date or value is rejected and recorded;
/// - for a repeated (date, option) the first row in input order is kept and
///   later ones are recorded as duplicates.
#[instrument(level = "info", skip_all, fields(input = rows.len()))]
pub fn build(rows: Vec<ExtractedRow>) -> Result<TableBuild> {
    if let Some(bad) = rows.iter().find(|r| r.returns.len() != RETURN_COLUMNS.len()) {
        return Err(PipelineError::Schema {
            document: bad.document_date.clone(),
            option: bad.option.clone(),
            expected: RETURN_COLUMNS.len(),
            found: bad.returns.len(),
        });
    }

    let mut out = TableBuild::default();
    let mut seen: HashSet<(NaiveDate, String)> = HashSet::new();
    let mut typed = Vec::with_capacity(rows.len());

    for row in rows {
        let parsed = match type_row(&row) {
            Ok(parsed) => parsed,
            Err((column, value)) => {
                warn!(document = %row.document_date, option = %row.option, column, value = %value, "rejecting row");
                out.rejected.push(RejectedRow {
                    document: row.document_date,
                    option: row.option,
                    column: column.to_string(),
                    value,
                });
                continue;
            }
        };

        if !seen.insert((parsed.date, parsed.option.clone())) {
            warn!(document = %row.document_date, option = %row.option, "duplicate row discarded");
            out.duplicates.push(DuplicateRow {
                document: row.document_date,
                option: row.option,
            });
            continue;
        }
        typed.push(parsed);
    }

    out.table = ResultTable::from_rows(typed);
    info!(
        rows = out.table.len(),
        rejected = out.rejected.len(),
        duplicates = out.duplicates.len(),
        "table built"
    );
    Ok(out)
}

/// Err carries the offending column and its raw value.
fn type_row(row: &ExtractedRow) -> std::result::Result<ResultRow, (&'static str, String)> {
    let date = parse_document_stem(&row.document_date)
        .ok_or_else(|| ("Date", row.document_date.clone()))?;
    let mut returns = [0f64; 8];
    for (i, raw) in row.returns.iter().enumerate() {
        returns[i] = parse_percent(raw).ok_or_else(|| (RETURN_COLUMNS[i], raw.clone()))?;
    }
    Ok(ResultRow {
        date,
        option: row.option.clone(),
        returns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(doc: &str, option: &str, values: &[&str]) -> ExtractedRow {
        ExtractedRow {
            document_date: doc.to_string(),
            option: option.to_string(),
            returns: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    const BALANCED: [&str; 8] = ["5.2%", "4.1%", "3.9%", "3.3%", "2.8%", "1.1%", "0.5%", "0.9%"];

    #[test]
    fn balanced_values_become_floats() {
        let built = build(vec![raw("2019_Jan_31", "Balanced", &BALANCED)]).unwrap();
        let rows = built.table.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].option, "Balanced");
        assert_eq!(rows[0].returns, [5.2, 4.1, 3.9, 3.3, 2.8, 1.1, 0.5, 0.9]);
        assert_eq!(rows[0].display_date(), "31-01-2019");
        assert_eq!((rows[0].year(), rows[0].month()), (2019, 1));
        assert_eq!(rows[0].value("3m"), Some(0.5));
    }

    #[test]
    fn output_is_sorted_whatever_the_input_order() {
        let input = vec![
            raw("2020_Mar_31", "Cash", &BALANCED),
            raw("2019_Dec_31", "Cash", &BALANCED),
            raw("2020_Jan_31", "Balanced", &BALANCED),
            raw("2019_Dec_31", "Balanced", &BALANCED),
        ];
        let table = build(input).unwrap().table;
        let keys: Vec<_> = table
            .rows()
            .iter()
            .map(|r| (r.display_date(), r.option.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("31-12-2019".to_string(), "Balanced".to_string()),
                ("31-12-2019".to_string(), "Cash".to_string()),
                ("31-01-2020".to_string(), "Balanced".to_string()),
                ("31-03-2020".to_string(), "Cash".to_string()),
            ]
        );
        let resorted = ResultTable::from_rows(table.rows().to_vec());
        assert_eq!(resorted, table);
    }

    #[test]
    fn wrong_field_count_fails_the_build() {
        let err = build(vec![
            raw("2019_Jan_31", "Balanced", &BALANCED),
            raw("2019_Jan_31", "Cash", &["1.0%", "2.0%"]),
        ])
        .unwrap_err();
        match err {
            PipelineError::Schema {
                option,
                expected,
                found,
                ..
            } => {
                assert_eq!(option, "Cash");
                assert_eq!(expected, 8);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn unparseable_value_rejects_the_row() {
        let mut young = BALANCED;
        young[0] = "N/A";
        let built = build(vec![
            raw("2019_Jan_31", "Balanced", &BALANCED),
            raw("2019_Jan_31", "Indexed", &young),
        ])
        .unwrap();
        assert_eq!(built.table.len(), 1);
        assert_eq!(
            built.rejected,
            vec![RejectedRow {
                document: "2019_Jan_31".into(),
                option: "Indexed".into(),
                column: "10yr".into(),
                value: "N/A".into(),
            }]
        );
    }

    #[test]
    fn undecodable_date_rejects_the_row() {
        let built = build(vec![raw("Output", "Balanced", &BALANCED)]).unwrap();
        assert!(built.table.is_empty());
        assert_eq!(built.rejected[0].column, "Date");
    }

    #[test]
    fn later_duplicate_is_discarded() {
        let mut other = BALANCED;
        other[0] = "7.0%";
        let built = build(vec![
            raw("2019_Jan_31", "Balanced", &BALANCED),
            raw("2019_Jan_31", "Balanced", &other),
        ])
        .unwrap();
        assert_eq!(built.table.len(), 1);
        assert_eq!(built.table.rows()[0].returns[0], 5.2);
        assert_eq!(built.duplicates.len(), 1);
        assert_eq!(built.duplicates[0].option, "Balanced");
    }

    #[test]
    fn percent_stripping() {
        assert_eq!(parse_percent(" -1.25 % "), Some(-1.25));
        assert_eq!(parse_percent("3"), Some(3.0));
        assert_eq!(parse_percent("%"), None);
        assert_eq!(parse_percent("NaN"), None);
    }

    #[test]
    fn filter_by_option_and_year() {
        let table = build(vec![
            raw("2019_Nov_30", "Balanced", &BALANCED),
            raw("2019_Dec_31", "Balanced", &BALANCED),
            raw("2020_Jan_31", "Balanced", &BALANCED),
            raw("2019_Dec_31", "Cash", &BALANCED),
        ])
        .unwrap()
        .table;
        assert_eq!(table.options(), vec!["Balanced", "Cash"]);
        assert_eq!(table.years(), vec![2019, 2020]);
        let months: Vec<u32> = table.filter("Balanced", 2019).map(ResultRow::month).collect();
        assert_eq!(months, vec![11, 12]);
        assert_eq!(table.filter("Cash", 2020).count(), 0);
    }
}
