// src/report.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::Result;

/// A monthly report that could not be fetched or stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub url: String,
    pub date: NaiveDate,
    pub reason: String,
}

/// A row dropped because one of its values would not parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub document: String,
    pub option: String,
    pub column: String,
    pub value: String,
}

/// A later row for a (date, option) pair that was already in the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateRow {
    pub document: String,
    pub option: String,
}

/// Summary of one run: what was fetched, what was dropped and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Monthly reports requested (0 when the workspace was reused).
    pub total: usize,
    pub fetched: usize,
    pub fetch_failures: Vec<FetchFailure>,
    /// Workspace documents scanned.
    pub documents: usize,
    pub extracted: usize,
    pub rejected_rows: Vec<RejectedRow>,
    pub duplicate_rows: Vec<DuplicateRow>,
    /// Rows in the final table.
    pub rows: usize,
}

impl RunReport {
    pub fn failure_count(&self) -> usize {
        self.fetch_failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.fetch_failures.is_empty()
            && self.rejected_rows.is_empty()
            && self.duplicate_rows.is_empty()
    }

    /// Write as pretty JSON via a temp file + rename.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let tmp = tmp_sibling(path);
        let mut file = fs::File::create(&tmp)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.write_all(b"\n")?;
        drop(file);
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}

/// `dir/.name.tmp` next to `path`.
pub(crate) fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn report_survives_json_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("run_report.json");
        let report = RunReport {
            total: 5,
            fetched: 4,
            fetch_failures: vec![FetchFailure {
                url: "https://example.com/?date=31Mar2019".into(),
                date: NaiveDate::from_ymd_opt(2019, 3, 31).unwrap(),
                reason: "HTTP status 500".into(),
            }],
            documents: 4,
            extracted: 8,
            rejected_rows: vec![RejectedRow {
                document: "2019_Jan_31".into(),
                option: "Cash".into(),
                column: "10yr".into(),
                value: "N/A".into(),
            }],
            duplicate_rows: vec![],
            rows: 7,
        };

        report.write_json(&path).unwrap();
        assert!(!tmp.path().join(".run_report.json.tmp").exists());
        let back = RunReport::read_json(&path).unwrap();
        assert_eq!(back, report);
        assert_eq!(back.failure_count(), 1);
        assert!(!back.is_clean());
    }
}
