use crate::schema::{KeySubjects, StatementType, SubjectKind};
use crate::{ExtractedRecord, RecordOrigin};
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The long-form table of every record of a run, in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementTable {
    pub records: Vec<ExtractedRecord>,
}

impl StatementTable {
    pub fn new(records: Vec<ExtractedRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fiscal years present, ascending.
    pub fn years(&self) -> Vec<i32> {
        self.records
            .iter()
            .map(|r| r.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn years_of(&self, statement: StatementType) -> Vec<i32> {
        self.records
            .iter()
            .filter(|r| r.statement == statement)
            .map(|r| r.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn records_for(
        &self,
        year: i32,
        statement: StatementType,
    ) -> impl Iterator<Item = &ExtractedRecord> {
        self.records
            .iter()
            .filter(move |r| r.year == year && r.statement == statement)
    }

    /// First subtotal-kind record of `subject` for the year and statement.
    pub fn find_subtotal(
        &self,
        year: i32,
        statement: StatementType,
        subject: &str,
    ) -> Option<&ExtractedRecord> {
        self.records_for(year, statement)
            .find(|r| r.kind == SubjectKind::Subtotal && r.subject == subject)
    }

    /// Period-start amount of a balance subtotal in the first fiscal year of
    /// the table. `None` when that year's balance sheet does not report it.
    pub fn opening_balance(&self, subject: &str) -> Option<Decimal> {
        let first = *self.years().first()?;
        self.find_subtotal(first, StatementType::Balance, subject)
            .map(|r| r.period_start)
    }

    /// Period-end amount of a balance subtotal in the last fiscal year of the
    /// table. `None` when that year's balance sheet does not report it.
    pub fn closing_balance(&self, subject: &str) -> Option<Decimal> {
        let last = *self.years().last()?;
        self.find_subtotal(last, StatementType::Balance, subject)
            .map(|r| r.period_end)
    }

    /// Sum of an activity subtotal's period-end amounts across all years.
    /// `None` when no year reports it.
    pub fn period_total(&self, subject: &str) -> Option<Decimal> {
        let amounts: Vec<Decimal> = self
            .years_of(StatementType::Activity)
            .into_iter()
            .filter_map(|year| self.find_subtotal(year, StatementType::Activity, subject))
            .map(|r| r.period_end)
            .collect();

        if amounts.is_empty() {
            None
        } else {
            Some(amounts.into_iter().sum())
        }
    }

    /// Wide view: subject -> year -> period-end amount. Repeated subjects in
    /// the same year are summed.
    pub fn pivot_closing(&self) -> BTreeMap<String, BTreeMap<i32, Decimal>> {
        let mut pivot: BTreeMap<String, BTreeMap<i32, Decimal>> = BTreeMap::new();
        for record in &self.records {
            *pivot
                .entry(record.subject.clone())
                .or_default()
                .entry(record.year)
                .or_default() += record.period_end;
        }
        pivot
    }
}

/// Concatenates per-sheet records and appends the derived activity lines.
///
/// For every year with activity records, a surplus line (income total minus
/// expense total, only when at least one of them is reported) and a net-asset change line (closing minus opening net
/// assets from that year's balance sheet, zero when unavailable) are added
/// unless the sheet already reported them. Extracted values are never replaced.
pub fn assemble(records_by_sheet: Vec<Vec<ExtractedRecord>>, keys: &KeySubjects) -> StatementTable {
    let mut table = StatementTable::new(records_by_sheet.into_iter().flatten().collect());
    let extracted = table.len();

    let mut derived = Vec::new();
    for year in table.years_of(StatementType::Activity) {
        if let Some(record) = derive_surplus(&table, year, keys) {
            derived.push(record);
        }
        if let Some(record) = derive_net_asset_change(&table, year, keys) {
            derived.push(record);
        }
    }

    table.records.extend(derived);
    info!(
        "Assembled {} records ({} extracted, {} derived) across {} years",
        table.len(),
        extracted,
        table.len() - extracted,
        table.years().len()
    );

    table
}

fn has_subject(table: &StatementTable, year: i32, subject: &str) -> bool {
    table
        .records_for(year, StatementType::Activity)
        .any(|r| r.subject == subject)
}

fn activity_sheet_of(table: &StatementTable, year: i32) -> String {
    table
        .records_for(year, StatementType::Activity)
        .map(|r| r.source_sheet.clone())
        .next()
        .unwrap_or_default()
}

/// Start and end amounts of the year's activity subtotal, or `None` when the
/// year does not report it.
fn activity_total(table: &StatementTable, year: i32, subject: &str) -> Option<(Decimal, Decimal)> {
    table
        .find_subtotal(year, StatementType::Activity, subject)
        .map(|r| (r.period_start, r.period_end))
}

fn derived_record(
    table: &StatementTable,
    year: i32,
    subject: &str,
    period_start: Decimal,
    period_end: Decimal,
) -> ExtractedRecord {
    ExtractedRecord {
        source_sheet: activity_sheet_of(table, year),
        statement: StatementType::Activity,
        year,
        subject: subject.to_string(),
        kind: SubjectKind::Subtotal,
        group: subject.to_string(),
        block: "derived".to_string(),
        period_start,
        period_end,
        origin: RecordOrigin::Derived,
    }
}

fn derive_surplus(table: &StatementTable, year: i32, keys: &KeySubjects) -> Option<ExtractedRecord> {
    if has_subject(table, year, &keys.surplus) {
        debug!("{}: '{}' reported, not derived", year, keys.surplus);
        return None;
    }

    let income = activity_total(table, year, &keys.income_total);
    let expense = activity_total(table, year, &keys.expense_total);
    if income.is_none() && expense.is_none() {
        debug!(
            "{}: neither '{}' nor '{}' reported, '{}' not derived",
            year, keys.income_total, keys.expense_total, keys.surplus
        );
        return None;
    }

    let (income_start, income_end) = income.unwrap_or_default();
    let (expense_start, expense_end) = expense.unwrap_or_default();

    debug!(
        "{}: deriving '{}' = {} - {}",
        year, keys.surplus, income_end, expense_end
    );
    Some(derived_record(
        table,
        year,
        &keys.surplus,
        income_start - expense_start,
        income_end - expense_end,
    ))
}

fn derive_net_asset_change(
    table: &StatementTable,
    year: i32,
    keys: &KeySubjects,
) -> Option<ExtractedRecord> {
    if has_subject(table, year, &keys.net_asset_change) {
        debug!("{}: '{}' reported, not derived", year, keys.net_asset_change);
        return None;
    }

    let change = table
        .find_subtotal(year, StatementType::Balance, &keys.net_assets)
        .map(|r| r.period_end - r.period_start)
        .unwrap_or_else(|| {
            debug!(
                "{}: no '{}' on the balance sheet, net-asset change set to 0",
                year, keys.net_assets
            );
            Decimal::ZERO
        });

    Some(derived_record(
        table,
        year,
        &keys.net_asset_change,
        Decimal::ZERO,
        change,
    ))
}
