use crate::error::{ReconcileError, Result};
use crate::sheet::CellValue;
use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::Decimal;
use std::str::FromStr;

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

pub fn validate_fiscal_year_end_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(ReconcileError::InvalidConfig {
            item: "fiscal_year_end_month".to_string(),
            details: format!("{} is not a month between 1 and 12", month),
        });
    }
    Ok(())
}

/// Last day of fiscal year `year` (the year in which the fiscal year ends).
pub fn fiscal_year_end_date(year: i32, fiscal_year_end_month: u32) -> Option<NaiveDate> {
    last_day_of_month(year, fiscal_year_end_month)
}

/// First day of fiscal year `year`.
pub fn fiscal_year_start_date(year: i32, fiscal_year_end_month: u32) -> Option<NaiveDate> {
    let previous_end = fiscal_year_end_date(year - 1, fiscal_year_end_month)?;
    previous_end.checked_add_days(Days::new(1))
}

pub fn fiscal_year_of(date: NaiveDate, fiscal_year_end_month: u32) -> i32 {
    if date.month() <= fiscal_year_end_month {
        date.year()
    } else {
        date.year() + 1
    }
}

/// Maps full-width ASCII variants and the ideographic space to half-width.
pub fn to_half_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{FFE5}' => '¥',
            _ => c,
        })
        .collect()
}

/// Lenient amount parsing for statement cells.
///
/// Empty cells, blank text and dash placeholders are zero. Accounting-style
/// parentheses mean negative. Returns `None` when the text is not a number.
pub fn parse_amount(value: &CellValue) -> Option<Decimal> {
    match value {
        CellValue::Empty => Some(Decimal::ZERO),
        CellValue::Number(n) => Some(*n),
        CellValue::Text(text) => parse_amount_text(text),
    }
}

fn parse_amount_text(text: &str) -> Option<Decimal> {
    let cleaned: String = to_half_width(text)
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, ',' | '¥' | '$'))
        .collect();

    if cleaned.is_empty() || matches!(cleaned.as_str(), "-" | "--" | "—" | "——") {
        return Some(Decimal::ZERO);
    }

    let (negative, digits) = match cleaned.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, cleaned.as_str()),
    };

    let parsed = Decimal::from_str(digits)
        .or_else(|_| Decimal::from_scientific(digits))
        .ok()?;

    Some(if negative { -parsed } else { parsed })
}
