//! # Statement Reconciler
//!
//! A library for extracting multi-year financial statements from
//! semi-structured spreadsheets and checking that their arithmetic holds.
//!
//! ## Core Concepts
//!
//! - **Alias Map**: every spelling of an accounting subject resolves to one canonical name
//! - **Blocks**: configuration describing where subjects live on a sheet, either as a
//!   contiguous row range or as explicit per-item coordinates
//! - **Statement Table**: the long-form list of records extracted from every sheet, plus
//!   derived surplus and net-asset change lines where the sheets omit them
//! - **Findings**: cross-footing of subtotals and the fixed identities
//!   (assets = liabilities + net assets; income - expense = net-asset change),
//!   each with a pass, fail or indeterminate verdict
//!
//! ## Example
//!
//! ```rust,ignore
//! use statement_reconciler::*;
//!
//! let config = MappingConfig::from_path("mapping.json")?;
//! let workbook = load_workbook("statements.xlsx")?;
//!
//! let output = process_workbook(&config, &workbook)?;
//! for finding in output.failures() {
//!     println!("{}", finding);
//! }
//! ```

pub mod alias;
pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod probe;
pub mod schema;
pub mod sheet;
pub mod summary;
pub mod utils;
pub mod verifier;
pub mod workbook;

pub use alias::{normalize_subject_name, AliasCollision, AliasMap, ResolvedSubject};
pub use assembler::{assemble, StatementTable};
pub use config::BlockSpec;
pub use engine::{ReconciliationEngine, ReconciliationOutput, SkippedSheet};
pub use error::{ReconcileError, Result};
pub use extractor::extract;
pub use probe::{probe_layout, LayoutDecision};
pub use schema::*;
pub use sheet::{fiscal_year_from_name, CellRef, CellValue, MergedRegion, Sheet, Workbook};
pub use summary::{change_direction, parse_audit_period, summarize, AuditPeriod, ChangeDirection};
pub use utils::*;
pub use verifier::{verify, Finding, IdentityCheck, Scope, Verdict};
pub use workbook::load_workbook;

use log::info;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Read from a statement sheet
    Extracted,
    /// Computed because the sheet did not report it (surplus, net-asset change)
    Derived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub source_sheet: String,
    pub statement: StatementType,
    /// Fiscal year parsed from the sheet name
    pub year: i32,
    /// Canonical subject name
    pub subject: String,
    pub kind: SubjectKind,
    /// Subtotal (or block) this record rolls up into
    pub group: String,
    pub block: String,
    pub period_start: Decimal,
    pub period_end: Decimal,
    pub origin: RecordOrigin,
}

pub struct StatementReconciler;

impl StatementReconciler {
    pub fn process(config: &MappingConfig, workbook: &Workbook) -> Result<ReconciliationOutput> {
        let engine = ReconciliationEngine::new(config)?;
        Ok(engine.run(workbook))
    }

    /// Loads the mapping (a JSON file, or a workbook of configuration tables)
    /// and the statement workbook, then reconciles.
    pub fn process_files(
        config_path: impl AsRef<Path>,
        workbook_path: impl AsRef<Path>,
    ) -> Result<ReconciliationOutput> {
        let config_path = config_path.as_ref();
        info!("Loading mapping configuration from {}", config_path.display());

        let is_json = config_path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            MappingConfig::from_path(config_path)?
        } else {
            MappingConfig::from_workbook(&load_workbook(config_path)?)?
        };

        let workbook = load_workbook(workbook_path)?;
        Self::process(&config, &workbook)
    }
}

pub fn process_workbook(config: &MappingConfig, workbook: &Workbook) -> Result<ReconciliationOutput> {
    StatementReconciler::process(config, workbook)
}

pub fn process_files(
    config_path: impl AsRef<Path>,
    workbook_path: impl AsRef<Path>,
) -> Result<ReconciliationOutput> {
    StatementReconciler::process_files(config_path, workbook_path)
}
