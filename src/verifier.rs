//! Cross-footing and the fixed accounting identities.
//!
//! The verifier never fails: missing data produces an [`Verdict::Indeterminate`]
//! finding and a tolerance violation produces [`Verdict::Fail`]. Callers decide
//! what to do with either.

use crate::assembler::StatementTable;
use crate::schema::{KeySubjects, StatementType, SubjectKind, SubtotalDefinition};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    Indeterminate,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail => write!(f, "fail"),
            Verdict::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityCheck {
    /// assets = liabilities + net assets, per year.
    BalanceEquation,
    /// closing - opening net assets = total income - total expense, whole period.
    NetAssetChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Scope {
    Subtotal(String),
    Identity(IdentityCheck),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Subtotal(name) => write!(f, "subtotal '{}'", name),
            Scope::Identity(IdentityCheck::BalanceEquation) => {
                write!(f, "assets = liabilities + net assets")
            }
            Scope::Identity(IdentityCheck::NetAssetChange) => {
                write!(f, "net asset change = income - expense")
            }
        }
    }
}

/// One reconciliation result. `year` is `None` for whole-period checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub year: Option<i32>,
    pub scope: Scope,
    pub computed: Option<Decimal>,
    pub reported: Option<Decimal>,
    pub difference: Option<Decimal>,
    pub verdict: Verdict,
    pub note: String,
}

impl Finding {
    fn compared(
        year: Option<i32>,
        scope: Scope,
        computed: Decimal,
        reported: Decimal,
        tolerance: Decimal,
    ) -> Self {
        let difference = computed - reported;
        let verdict = if difference.abs() > tolerance {
            Verdict::Fail
        } else {
            Verdict::Pass
        };

        Self {
            year,
            scope,
            computed: Some(computed),
            reported: Some(reported),
            difference: Some(difference),
            verdict,
            note: String::new(),
        }
    }

    fn indeterminate(
        year: Option<i32>,
        scope: Scope,
        computed: Option<Decimal>,
        reported: Option<Decimal>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            year,
            scope,
            computed,
            reported,
            difference: None,
            verdict: Verdict::Indeterminate,
            note: note.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(year) => write!(f, "{} {}: {}", year, self.scope, self.verdict)?,
            None => write!(f, "whole period {}: {}", self.scope, self.verdict)?,
        }

        if let (Some(computed), Some(reported), Some(difference)) =
            (self.computed, self.reported, self.difference)
        {
            write!(
                f,
                " (computed {}, reported {}, difference {})",
                computed, reported, difference
            )?;
        }

        if !self.note.is_empty() {
            write!(f, " - {}", self.note)?;
        }
        Ok(())
    }
}

/// Runs every configured subtotal check followed by the two fixed identities.
pub fn verify(
    table: &StatementTable,
    subtotals: &[SubtotalDefinition],
    keys: &KeySubjects,
    tolerance: Decimal,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    for definition in subtotals {
        findings.extend(check_subtotal(table, definition, tolerance));
    }
    findings.extend(check_balance_equation(table, keys, tolerance));
    findings.push(check_net_asset_change(table, keys, tolerance));

    let failed = findings.iter().filter(|f| f.verdict == Verdict::Fail).count();
    let undecided = findings
        .iter()
        .filter(|f| f.verdict == Verdict::Indeterminate)
        .count();
    info!(
        "Verification produced {} findings ({} failed, {} indeterminate)",
        findings.len(),
        failed,
        undecided
    );

    findings
}

/// Statement types a subtotal is checked on: the configured one, otherwise
/// every type on which the subtotal or its group tag appears.
fn statements_of(table: &StatementTable, definition: &SubtotalDefinition) -> Vec<StatementType> {
    if let Some(statement) = definition.statement {
        return vec![statement];
    }

    [StatementType::Balance, StatementType::Activity]
        .into_iter()
        .filter(|statement| {
            table.records.iter().any(|r| {
                r.statement == *statement
                    && (r.subject == definition.name || r.group == definition.name)
            })
        })
        .collect()
}

pub fn check_subtotal(
    table: &StatementTable,
    definition: &SubtotalDefinition,
    tolerance: Decimal,
) -> Vec<Finding> {
    let scope = Scope::Subtotal(definition.name.clone());
    let statements = statements_of(table, definition);

    if statements.is_empty() {
        warn!("Subtotal '{}' appears on no statement", definition.name);
        return vec![Finding::indeterminate(
            None,
            scope,
            None,
            None,
            "subtotal and members not found on any statement",
        )];
    }

    let mut findings = Vec::new();
    for statement in statements {
        for year in table.years_of(statement) {
            let members: Vec<Decimal> = table
                .records_for(year, statement)
                .filter(|r| r.kind == SubjectKind::Ordinary)
                .filter(|r| r.group == definition.name || definition.members.contains(&r.subject))
                .map(|r| r.period_end)
                .collect();
            let reported = table
                .find_subtotal(year, statement, &definition.name)
                .map(|r| r.period_end);

            let finding = match (members.is_empty(), reported) {
                (_, None) => {
                    warn!(
                        "{} {}: reported value of '{}' not found",
                        year, statement, definition.name
                    );
                    let computed = (!members.is_empty()).then(|| members.iter().copied().sum());
                    Finding::indeterminate(
                        Some(year),
                        scope.clone(),
                        computed,
                        None,
                        format!("reported value not found on the {} statement", statement),
                    )
                }
                (true, Some(reported)) => Finding::indeterminate(
                    Some(year),
                    scope.clone(),
                    None,
                    Some(reported),
                    "no member records to recompute from",
                ),
                (false, Some(reported)) => {
                    let computed: Decimal = members.iter().copied().sum();
                    debug!(
                        "{} {}: '{}' computed {} from {} members, reported {}",
                        year,
                        statement,
                        definition.name,
                        computed,
                        members.len(),
                        reported
                    );
                    Finding::compared(Some(year), scope.clone(), computed, reported, tolerance)
                }
            };
            findings.push(finding);
        }
    }

    findings
}

pub fn check_balance_equation(
    table: &StatementTable,
    keys: &KeySubjects,
    tolerance: Decimal,
) -> Vec<Finding> {
    let scope = Scope::Identity(IdentityCheck::BalanceEquation);
    let closing = |year: i32, subject: &str| {
        table
            .find_subtotal(year, StatementType::Balance, subject)
            .map(|r| r.period_end)
    };

    table
        .years_of(StatementType::Balance)
        .into_iter()
        .map(|year| {
            let assets = closing(year, &keys.assets);
            let liabilities = closing(year, &keys.liabilities);
            let net_assets = closing(year, &keys.net_assets);

            match (assets, liabilities, net_assets) {
                (Some(assets), Some(liabilities), Some(net_assets)) => Finding::compared(
                    Some(year),
                    scope.clone(),
                    assets,
                    liabilities + net_assets,
                    tolerance,
                ),
                _ => {
                    let missing: Vec<&str> = [
                        (assets, keys.assets.as_str()),
                        (liabilities, keys.liabilities.as_str()),
                        (net_assets, keys.net_assets.as_str()),
                    ]
                    .into_iter()
                    .filter(|(value, _)| value.is_none())
                    .map(|(_, name)| name)
                    .collect();
                    Finding::indeterminate(
                        Some(year),
                        scope.clone(),
                        assets,
                        None,
                        format!("missing {}", missing.join(", ")),
                    )
                }
            }
        })
        .collect()
}

pub fn check_net_asset_change(
    table: &StatementTable,
    keys: &KeySubjects,
    tolerance: Decimal,
) -> Finding {
    let scope = Scope::Identity(IdentityCheck::NetAssetChange);

    let balance_years = table.years_of(StatementType::Balance);
    let activity_years = table.years_of(StatementType::Activity);
    if balance_years != activity_years {
        let list = |years: &[i32]| {
            years
                .iter()
                .map(|y| y.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        return Finding::indeterminate(
            None,
            scope,
            None,
            None,
            format!(
                "balance sheets cover [{}] but activity statements cover [{}]",
                list(&balance_years),
                list(&activity_years)
            ),
        );
    }

    let change = match (
        table.opening_balance(&keys.net_assets),
        table.closing_balance(&keys.net_assets),
    ) {
        (Some(opening), Some(closing)) => Some(closing - opening),
        _ => None,
    };

    // A partial sum over the years that happen to report would be a false result.
    let incomplete: Vec<String> = activity_years
        .into_iter()
        .filter(|year| {
            [&keys.income_total, &keys.expense_total]
                .iter()
                .any(|subject| table.find_subtotal(*year, StatementType::Activity, subject).is_none())
        })
        .map(|year| year.to_string())
        .collect();

    let surplus = match (
        table.period_total(&keys.income_total),
        table.period_total(&keys.expense_total),
    ) {
        (Some(income), Some(expense)) if incomplete.is_empty() => Some(income - expense),
        _ => None,
    };

    match (change, surplus) {
        (Some(change), Some(surplus)) => {
            Finding::compared(None, scope, change, surplus, tolerance)
        }
        (None, _) => Finding::indeterminate(
            None,
            scope,
            None,
            surplus,
            format!("opening or closing '{}' not found", keys.net_assets),
        ),
        (Some(change), None) if incomplete.is_empty() => Finding::indeterminate(
            None,
            scope,
            Some(change),
            None,
            format!(
                "'{}' or '{}' not found",
                keys.income_total, keys.expense_total
            ),
        ),
        (Some(change), None) => Finding::indeterminate(
            None,
            scope,
            Some(change),
            None,
            format!(
                "'{}' or '{}' missing for {}",
                keys.income_total,
                keys.expense_total,
                incomplete.join(", ")
            ),
        ),
    }
}
