use crate::assembler::StatementTable;
use crate::error::{ReconcileError, Result};
use crate::schema::KeySubjects;
use crate::utils::{fiscal_year_end_date, fiscal_year_start_date, last_day_of_month};
use chrono::NaiveDate;
use log::warn;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Flat indicators for report writers.
///
/// Keys: `start_year`, `end_year`, `opening_`/`closing_` plus `_change` for
/// `assets`, `liabilities` and `net_assets`, `total_income`, `total_expense`
/// and `net_surplus`. A key whose source subject is absent is left out.
pub fn summarize(table: &StatementTable, keys: &KeySubjects) -> BTreeMap<String, Decimal> {
    let mut summary = BTreeMap::new();

    let years = table.years();
    if let (Some(first), Some(last)) = (years.first(), years.last()) {
        summary.insert("start_year".to_string(), Decimal::from(*first));
        summary.insert("end_year".to_string(), Decimal::from(*last));
    }

    for (key, subject) in [
        ("assets", &keys.assets),
        ("liabilities", &keys.liabilities),
        ("net_assets", &keys.net_assets),
    ] {
        let opening = table.opening_balance(subject);
        let closing = table.closing_balance(subject);

        if let Some(opening) = opening {
            summary.insert(format!("opening_{}", key), opening);
        }
        if let Some(closing) = closing {
            summary.insert(format!("closing_{}", key), closing);
        }
        match (opening, closing) {
            (Some(opening), Some(closing)) => {
                summary.insert(format!("{}_change", key), closing - opening);
            }
            _ => warn!(
                "Summary: '{}' missing from the first or last year's balance sheet",
                subject
            ),
        }
    }

    let income = table.period_total(&keys.income_total);
    let expense = table.period_total(&keys.expense_total);
    if let Some(income) = income {
        summary.insert("total_income".to_string(), income);
    } else {
        warn!("Summary: '{}' not found on any activity statement", keys.income_total);
    }
    if let Some(expense) = expense {
        summary.insert("total_expense".to_string(), expense);
    } else {
        warn!("Summary: '{}' not found on any activity statement", keys.expense_total);
    }
    if let (Some(income), Some(expense)) = (income, expense) {
        summary.insert("net_surplus".to_string(), income - expense);
    }

    summary
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDirection {
    Increase,
    Decrease,
    Unchanged,
}

impl fmt::Display for ChangeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeDirection::Increase => write!(f, "increase"),
            ChangeDirection::Decrease => write!(f, "decrease"),
            ChangeDirection::Unchanged => write!(f, "unchanged"),
        }
    }
}

pub fn change_direction(delta: Decimal) -> ChangeDirection {
    if delta > Decimal::ZERO {
        ChangeDirection::Increase
    } else if delta < Decimal::ZERO {
        ChangeDirection::Decrease
    } else {
        ChangeDirection::Unchanged
    }
}

/// The calendar span an audit covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl AuditPeriod {
    /// Spans fiscal years `first..=last`.
    pub fn from_fiscal_years(first: i32, last: i32, fiscal_year_end_month: u32) -> Option<Self> {
        Some(Self {
            start_date: fiscal_year_start_date(first, fiscal_year_end_month)?,
            end_date: fiscal_year_end_date(last, fiscal_year_end_month)?,
        })
    }

    /// Covers every year present in the table.
    pub fn of_table(table: &StatementTable, fiscal_year_end_month: u32) -> Option<Self> {
        let years = table.years();
        Self::from_fiscal_years(*years.first()?, *years.last()?, fiscal_year_end_month)
    }
}

fn audit_period_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})年(\d{1,2})月[-至](\d{4})年(\d{1,2})月$").expect("static regex")
    })
}

/// Parses `2021年3月-2025年5月` (or `...至...`) into first-day / last-day dates.
pub fn parse_audit_period(text: &str) -> Result<AuditPeriod> {
    let invalid = |details: &str| ReconcileError::InvalidConfig {
        item: format!("audit period '{}'", text),
        details: details.to_string(),
    };

    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let caps = audit_period_pattern()
        .captures(&compact)
        .ok_or_else(|| invalid("expected the form YYYY年M月-YYYY年M月"))?;

    let number = |i: usize| caps[i].parse::<u32>().map_err(|_| invalid("not a number"));
    let (start_year, start_month) = (number(1)? as i32, number(2)?);
    let (end_year, end_month) = (number(3)? as i32, number(4)?);

    let start_date = NaiveDate::from_ymd_opt(start_year, start_month, 1)
        .ok_or_else(|| invalid("start month out of range"))?;
    let end_date =
        last_day_of_month(end_year, end_month).ok_or_else(|| invalid("end month out of range"))?;

    if end_date < start_date {
        return Err(invalid("period ends before it starts"));
    }

    Ok(AuditPeriod {
        start_date,
        end_date,
    })
}
