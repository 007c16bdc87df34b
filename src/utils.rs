use crate::error::{PipelineAnalyticsError, Result};
use chrono::{Datelike, NaiveDate};

/// Label used when neither a date nor an explicit quarter field is usable.
pub const QUARTER_NOT_AVAILABLE: &str = "Quarter N/A";

const YEAR_FIRST_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
const DAY_FIRST_FORMATS: [&str; 2] = ["%d-%m-%Y", "%d/%m/%Y"];

/// Parses a deal date. ISO `YYYY-MM-DD` (optionally followed by a time part)
/// is tried first, then the day-first `DD-MM-YYYY` shape.
/// Calendar components are used as written; no timezone shifting happens.
pub fn parse_deal_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // "2024-03-15T10:00:00Z" and "2024-03-15 10:00:00" carry the date in the first 10 bytes
    let date_part = trimmed.get(..10).unwrap_or(trimmed);

    let candidates = [trimmed, date_part];
    for format in YEAR_FIRST_FORMATS.iter().chain(DAY_FIRST_FORMATS.iter()) {
        for candidate in candidates {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                return Some(date);
            }
        }
    }

    None
}

pub fn validate_fiscal_year_end_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(PipelineAnalyticsError::InvalidFiscalYearEndMonth(month));
    }
    Ok(())
}

/// Returns the 0-based index of the month within the fiscal year.
///
/// # Examples
/// - If FY ends in Dec (12): Jan=0, Feb=1, ..., Dec=11
/// - If FY ends in June (6): July=0, Aug=1, ..., June=11
pub fn get_fiscal_month_index(calendar_month: u32, fiscal_year_end_month: u32) -> usize {
    let fy_start_month = if fiscal_year_end_month == 12 {
        1
    } else {
        fiscal_year_end_month + 1
    };

    if calendar_month >= fy_start_month {
        (calendar_month - fy_start_month) as usize
    } else {
        (calendar_month + 12 - fy_start_month) as usize
    }
}

/// Calendar year in which the fiscal year containing `date` ends.
pub fn get_fiscal_year_for_date(date: NaiveDate, fiscal_year_end_month: u32) -> i32 {
    if date.month() <= fiscal_year_end_month {
        date.year()
    } else {
        date.year() + 1
    }
}

/// Fiscal (year, quarter) pair for a date, quarter in 1..=4.
pub fn fiscal_quarter_for_date(date: NaiveDate, fiscal_year_end_month: u32) -> (i32, u32) {
    let month_index = get_fiscal_month_index(date.month(), fiscal_year_end_month);
    let quarter = (month_index / 3) as u32 + 1;
    (get_fiscal_year_for_date(date, fiscal_year_end_month), quarter)
}

pub fn format_quarter_label(fiscal_year: i32, quarter: u32) -> String {
    format!("FY{:02}-Q{}", fiscal_year.rem_euclid(100), quarter)
}

/// `"FY{yy}-Q{n}"` for a calendar fiscal year, or an empty string when the
/// date cannot be read.
pub fn fiscal_quarter_label(raw_date: &str) -> String {
    fiscal_quarter_label_with_year_end(raw_date, 12)
}

/// Like [`fiscal_quarter_label`], with the fiscal year ending in
/// `fiscal_year_end_month` instead of December.
pub fn fiscal_quarter_label_with_year_end(raw_date: &str, fiscal_year_end_month: u32) -> String {
    match parse_deal_date(raw_date) {
        Some(date) => {
            let (year, quarter) = fiscal_quarter_for_date(date, fiscal_year_end_month);
            format_quarter_label(year, quarter)
        }
        None => String::new(),
    }
}

/// Picks the quarter label for a deal: derived from the date first, then the
/// explicit quarter field, then [`QUARTER_NOT_AVAILABLE`].
pub fn resolve_quarter_label(
    raw_date: &str,
    explicit_quarter: Option<&str>,
    fiscal_year_end_month: u32,
) -> String {
    let derived = fiscal_quarter_label_with_year_end(raw_date, fiscal_year_end_month);
    if !derived.is_empty() {
        return derived;
    }

    explicit_quarter
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| QUARTER_NOT_AVAILABLE.to_string())
}
