// src/extract/mod.rs
//! Pull fund rows out of fetched monthly reports.
//!
//! Reports are loosely structured CSV: headings, notes and blank lines mixed
//! with one performance row per fund. Anything that does not look like a
//! fund row is skipped.

pub mod pattern;

use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, trace};

use crate::error::{PipelineError, Result};
use crate::fetch::urls::parse_document_stem;
pub use pattern::{clean_field, split_fields, FundPattern};

/// One fund row as found in a document, values still raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRow {
    /// Filename stem of the source document, e.g. `2019_Jan_31`.
    pub document_date: String,
    pub option: String,
    /// 10yr, 7yr, 5yr, 3yr, 1yr, 6m, 3m, FYTD
    pub returns: Vec<String>,
}

/// Compile one pattern per fund.
pub fn compile_patterns(funds: &[String]) -> Result<Vec<FundPattern>> {
    funds
        .iter()
        .map(|f| {
            FundPattern::new(f)
                .map_err(|e| PipelineError::config(format!("bad fund name {:?}: {}", f, e)))
        })
        .collect()
}

/// Extract at most one row per fund from `text`.
///
/// Funds are tried in the given order; for each, the first matching line
/// wins and later lines are ignored.
pub fn extract(document_date: &str, text: &str, patterns: &[FundPattern]) -> Vec<ExtractedRow> {
    let lines: Vec<&str> = text.lines().collect();
    let mut rows = Vec::new();
    for pat in patterns {
        let Some(line) = lines.iter().find(|l| pat.matches(l)) else {
            trace!(document = document_date, fund = pat.name(), "no row");
            continue;
        };
        let mut fields = split_fields(line);
        fields.remove(0);
        rows.push(ExtractedRow {
            document_date: document_date.to_string(),
            option: pat.name().to_string(),
            returns: fields,
        });
    }
    rows
}

/// Workspace documents whose filename encodes a date, oldest first.
pub fn list_documents(workspace: &Path) -> Result<Vec<(chrono::NaiveDate, PathBuf)>> {
    let pattern = format!("{}/*.csv", glob::Pattern::escape(&workspace.to_string_lossy()));
    let mut docs = Vec::new();
    for entry in glob(&pattern)? {
        let Ok(path) = entry else { continue };
        let date = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(parse_document_stem);
        match date {
            Some(date) => docs.push((date, path)),
            None => debug!(path = %path.display(), "not a monthly report; skipping"),
        }
    }
    docs.sort();
    Ok(docs)
}

/// Extract every document in `workspace`. Returns the document count and
/// all rows.
#[instrument(level = "info", skip_all, fields(workspace = %workspace.display()))]
pub fn extract_workspace(
    workspace: &Path,
    patterns: &[FundPattern],
) -> Result<(usize, Vec<ExtractedRow>)> {
    let docs = list_documents(workspace)?;
    let mut rows = Vec::new();
    for (_, path) in &docs {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = fs::read(path)?;
        let raw = String::from_utf8_lossy(&bytes);
        let text = raw.strip_prefix('\u{FEFF}').unwrap_or(&raw);
        let found = extract(&stem, text, patterns);
        debug!(document = %stem, rows = found.len(), "extracted");
        rows.extend(found);
    }
    Ok((docs.len(), rows))
}
