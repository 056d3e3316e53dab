// src/fetch/urls.rs
use chrono::{Datelike, Months, NaiveDate};

/// Endpoint serving one month of investment-performance figures as CSV.
pub const DEFAULT_URL_TEMPLATE: &str = "https://rest.com.au/client/Templates/Rest/InvestmentSection/csvexport/csvexport.aspx?action=investmentperformance&type=rest&date={date}";

/// Placeholder in a URL template that is replaced by the `ddMonYYYY` token.
pub const DATE_PLACEHOLDER: &str = "{date}";

/// On-disk filename layout of a fetched document, e.g. `2019_Jan_31`.
const DOCUMENT_STEM_FORMAT: &str = "%Y_%b_%d";

/// One monthly report to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub url: String,
    /// Last calendar day of the month the report covers.
    pub date: NaiveDate,
}

impl ResourceRef {
    /// Filename the fetched body is stored under.
    pub fn file_name(&self) -> String {
        document_file_name(self.date)
    }
}

/// Build the ordered list of monthly refs starting at `start`'s month.
///
/// Month `i` is `start` advanced by `i` calendar months and snapped to the
/// end of that month. `months == 0` yields nothing; rejecting it is up to
/// the caller.
pub fn generate(template: &str, start: NaiveDate, months: u32) -> Vec<ResourceRef> {
    (0..months)
        .map_while(|i| month_end_after(start, i))
        .map(|date| ResourceRef {
            url: resource_url(template, date),
            date,
        })
        .collect()
}

/// Last day of the month `offset` months after `start`'s month.
pub fn month_end_after(start: NaiveDate, offset: u32) -> Option<NaiveDate> {
    let total = start.year() as i64 * 12 + start.month0() as i64 + offset as i64;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = total.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

/// `ddMonYYYY`, e.g. `18May2022`.
pub fn date_token(date: NaiveDate) -> String {
    date.format("%d%b%Y").to_string()
}

/// Substitute the date token into `template`; templates without a
/// placeholder get the token appended.
pub fn resource_url(template: &str, date: NaiveDate) -> String {
    let token = date_token(date);
    if template.contains(DATE_PLACEHOLDER) {
        template.replace(DATE_PLACEHOLDER, &token)
    } else {
        format!("{}{}", template, token)
    }
}

pub fn document_stem(date: NaiveDate) -> String {
    date.format(DOCUMENT_STEM_FORMAT).to_string()
}

/// `YYYY_Mon_DD.csv`
pub fn document_file_name(date: NaiveDate) -> String {
    format!("{}.csv", document_stem(date))
}

/// Inverse of [`document_stem`].
pub fn parse_document_stem(stem: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(stem.trim(), DOCUMENT_STEM_FORMAT).ok()
}
