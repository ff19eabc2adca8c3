use crate::alias::AliasMap;
use crate::assembler::{assemble, StatementTable};
use crate::config::BlockSpec;
use crate::error::Result;
use crate::extractor::extract;
use crate::schema::{MappingConfig, StatementType};
use crate::sheet::{fiscal_year_from_name, Workbook};
use crate::summary::summarize;
use crate::verifier::{verify, Finding, Verdict};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// A sheet that took no part in extraction, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSheet {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationOutput {
    pub table: StatementTable,
    pub findings: Vec<Finding>,
    pub summary: BTreeMap<String, Decimal>,
    pub skipped_sheets: Vec<SkippedSheet>,
}

impl ReconciliationOutput {
    pub fn failures(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.verdict == Verdict::Fail)
    }

    pub fn indeterminate(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.verdict == Verdict::Indeterminate)
    }

    /// True only when every finding passed.
    pub fn is_reconciled(&self) -> bool {
        self.findings.iter().all(Finding::is_pass)
    }
}

/// Holds the validated configuration, the alias map and the compiled blocks
/// for any number of runs.
pub struct ReconciliationEngine {
    config: MappingConfig,
    aliases: AliasMap,
    blocks: Vec<BlockSpec>,
}

impl ReconciliationEngine {
    pub fn new(config: &MappingConfig) -> Result<Self> {
        config.validate()?;
        let blocks = config.compile_blocks()?;
        let aliases = AliasMap::build(&config.aliases);

        debug!(
            "Engine ready: {} alias spellings, {} blocks, {} subtotal checks",
            aliases.len(),
            blocks.len(),
            config.subtotals.len()
        );

        Ok(Self {
            config: config.clone(),
            aliases,
            blocks,
        })
    }

    pub fn aliases(&self) -> &AliasMap {
        &self.aliases
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    fn blocks_for(&self, statement: StatementType) -> impl Iterator<Item = &BlockSpec> {
        self.blocks
            .iter()
            .filter(move |block| block.statement() == statement)
    }

    pub fn run(&self, workbook: &Workbook) -> ReconciliationOutput {
        info!("Reconciling workbook with {} sheets", workbook.sheets.len());

        let mut records_by_sheet = Vec::new();
        let mut skipped_sheets = Vec::new();

        for sheet in &workbook.sheets {
            let Some(statement) = self.config.sheet_patterns.classify(&sheet.name) else {
                warn!("Sheet '{}' is neither a balance sheet nor an activity statement; skipped", sheet.name);
                skipped_sheets.push(SkippedSheet {
                    name: sheet.name.clone(),
                    reason: "statement type not recognised from the sheet name".to_string(),
                });
                continue;
            };

            if fiscal_year_from_name(&sheet.name).is_none() {
                warn!("Sheet '{}' has no fiscal year in its name; skipped", sheet.name);
                skipped_sheets.push(SkippedSheet {
                    name: sheet.name.clone(),
                    reason: "no 4-digit fiscal year in the sheet name".to_string(),
                });
                continue;
            }

            let records: Vec<_> = self
                .blocks_for(statement)
                .flat_map(|block| extract(sheet, block, &self.aliases))
                .collect();

            info!(
                "Sheet '{}' ({}): {} records",
                sheet.name,
                statement,
                records.len()
            );
            records_by_sheet.push(records);
        }

        let keys = &self.config.key_subjects;
        let table = assemble(records_by_sheet, keys);
        let findings = verify(&table, &self.config.subtotals, keys, self.config.tolerance);
        let summary = summarize(&table, keys);

        ReconciliationOutput {
            table,
            findings,
            summary,
            skipped_sheets,
        }
    }
}
