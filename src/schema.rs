use crate::error::Result;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    #[schemars(description = "A line item that rolls up into some subtotal (e.g. 'Cash', 'Donation income').")]
    Ordinary,

    #[schemars(description = "An aggregate line (e.g. 'Total assets', 'Total income').")]
    Subtotal,
}

impl Default for SubjectKind {
    fn default() -> Self {
        Self::Ordinary
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    #[schemars(description = "Balance sheet: point-in-time balances (assets, liabilities, net assets).")]
    Balance,

    #[schemars(description = "Activity / income statement: period amounts (income, expense, surplus).")]
    Activity,
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Balance => write!(f, "balance"),
            Self::Activity => write!(f, "activity"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AliasEntry {
    #[schemars(description = "The standard subject name every alias resolves to.")]
    pub canonical: String,

    #[serde(default)]
    #[schemars(description = "Whether the canonical subject is an ordinary line or a subtotal. Defaults to ordinary.")]
    pub kind: SubjectKind,

    #[serde(default)]
    #[schemars(description = "Equivalent spellings found in source sheets. The canonical name is always included implicitly.")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RangeBlock {
    #[schemars(description = "Name of the block; used as the group tag when `group` is absent.")]
    pub name: String,

    #[serde(default = "default_balance")]
    #[schemars(description = "Statement type this block belongs to. Defaults to balance.")]
    pub statement: StatementType,

    #[schemars(description = "First cell of the subject-label column, e.g. 'A5'. Its column holds the labels.")]
    pub start_cell: String,

    #[schemars(description = "Last cell of the subject-label column, e.g. 'A20'. Must be in the same column as start_cell.")]
    pub end_cell: String,

    #[schemars(description = "Column letters holding the period-start amount, e.g. 'C'.")]
    pub start_column: String,

    #[schemars(description = "Column letters holding the period-end amount, e.g. 'D'.")]
    pub end_column: String,

    #[serde(default)]
    #[schemars(description = "Rows whose label contains any of these substrings are skipped.")]
    pub skip_keywords: Vec<String>,

    #[serde(default)]
    #[schemars(description = "Group tag applied to every record extracted from this block.")]
    pub group: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PointItem {
    #[schemars(description = "Subject name expected on this row; resolved through the alias table.")]
    pub subject: String,

    #[schemars(description = "Cell holding the period-start amount, e.g. 'C8'.")]
    pub start_cell: String,

    #[schemars(description = "Cell holding the period-end amount, e.g. 'D8'. Its row is the subject row.")]
    pub end_cell: String,

    #[serde(default)]
    #[schemars(description = "Group tag for this item (e.g. the subtotal it rolls up into). Falls back to the block's group, then the block name.")]
    pub group: Option<String>,

    #[serde(default)]
    #[schemars(description = "When true, the row offset decided by the block's layout probe applies to this item.")]
    pub shift_with_probe: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LayoutProbe {
    #[schemars(description = "Cell whose text is inspected, e.g. 'A6'.")]
    pub label_cell: String,

    #[schemars(description = "Substring that signals the shifted layout when found in label_cell.")]
    pub marker: String,

    #[serde(default)]
    #[schemars(description = "Optional cell that must also hold a non-zero amount for the shift to apply.")]
    pub value_cell: Option<String>,

    #[serde(default = "default_probe_offset")]
    #[schemars(description = "Rows to shift when the probe matches. Defaults to 1.")]
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PointBlock {
    #[schemars(description = "Name of the block; used as the group tag of last resort.")]
    pub name: String,

    #[serde(default = "default_activity")]
    #[schemars(description = "Statement type this block belongs to. Defaults to activity.")]
    pub statement: StatementType,

    #[serde(default)]
    #[schemars(description = "Column letters holding subject labels. When set, each item's row must carry a label resolving to the item's subject, otherwise the item is skipped.")]
    pub label_column: Option<String>,

    #[serde(default)]
    #[schemars(description = "Default group tag for items without their own.")]
    pub group: Option<String>,

    #[serde(default)]
    #[schemars(description = "Optional probe deciding whether shift_with_probe items sit lower than configured.")]
    pub probe: Option<LayoutProbe>,

    #[schemars(description = "The subjects to read, each with explicit cell coordinates.")]
    pub items: Vec<PointItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BlockDescriptor {
    #[schemars(description = "Contiguous row band: every labelled row between start_cell and end_cell is a record.")]
    Range(RangeBlock),

    #[schemars(description = "Explicit list of subjects with their own coordinates, for non-contiguous layouts.")]
    Point(PointBlock),
}

impl BlockDescriptor {
    pub fn name(&self) -> &str {
        match self {
            Self::Range(block) => &block.name,
            Self::Point(block) => &block.name,
        }
    }

    pub fn statement(&self) -> StatementType {
        match self {
            Self::Range(block) => block.statement,
            Self::Point(block) => block.statement,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubtotalDefinition {
    #[schemars(description = "Canonical subtotal subject; ordinary records tagged with this group roll up into it.")]
    pub name: String,

    #[serde(default)]
    #[schemars(description = "Restricts the check to one statement type. When absent, the subtotal is checked wherever it is reported.")]
    pub statement: Option<StatementType>,

    #[serde(default)]
    #[schemars(description = "Additional ordinary subjects that roll up into this subtotal regardless of their group tag.")]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KeySubjects {
    #[schemars(description = "Canonical subtotal for total assets.")]
    pub assets: String,
    #[schemars(description = "Canonical subtotal for total liabilities.")]
    pub liabilities: String,
    #[schemars(description = "Canonical subtotal for total net assets.")]
    pub net_assets: String,
    #[schemars(description = "Canonical subtotal for total income.")]
    pub income_total: String,
    #[schemars(description = "Canonical subtotal for total expense.")]
    pub expense_total: String,
    #[schemars(description = "Canonical subject for the surplus (income minus expense).")]
    pub surplus: String,
    #[schemars(description = "Canonical subject for the change in net assets.")]
    pub net_asset_change: String,
}

impl Default for KeySubjects {
    fn default() -> Self {
        Self {
            assets: "资产总计".to_string(),
            liabilities: "负债合计".to_string(),
            net_assets: "净资产合计".to_string(),
            income_total: "收入合计".to_string(),
            expense_total: "费用合计".to_string(),
            surplus: "收支结余".to_string(),
            net_asset_change: "净资产变动额".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SheetPatterns {
    #[schemars(description = "Case-insensitive substrings identifying balance sheets by sheet name.")]
    pub balance: Vec<String>,
    #[schemars(description = "Case-insensitive substrings identifying activity statements by sheet name.")]
    pub activity: Vec<String>,
}

impl Default for SheetPatterns {
    fn default() -> Self {
        Self {
            balance: vec!["资产负债".to_string(), "zcfz".to_string()],
            activity: vec!["业务活动".to_string(), "yewu".to_string()],
        }
    }
}

impl SheetPatterns {
    pub fn classify(&self, sheet_name: &str) -> Option<StatementType> {
        let lowered = sheet_name.to_lowercase();
        let hit = |patterns: &[String]| {
            patterns
                .iter()
                .any(|p| !p.is_empty() && lowered.contains(&p.to_lowercase()))
        };

        if hit(&self.balance) {
            Some(StatementType::Balance)
        } else if hit(&self.activity) {
            Some(StatementType::Activity)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MappingConfig {
    #[schemars(description = "Standard subjects with their kind and equivalent spellings.")]
    pub aliases: Vec<AliasEntry>,

    #[schemars(description = "Where subjects live on each statement type.")]
    pub blocks: Vec<BlockDescriptor>,

    #[serde(default)]
    #[schemars(description = "Subtotals to cross-foot against their ordinary members.")]
    pub subtotals: Vec<SubtotalDefinition>,

    #[serde(default)]
    #[schemars(description = "Names of the subjects used by the fixed identities, derivations and summary.")]
    pub key_subjects: KeySubjects,

    #[serde(default)]
    #[schemars(description = "Sheet-name patterns used to tell balance sheets from activity statements.")]
    pub sheet_patterns: SheetPatterns,

    #[serde(default = "default_tolerance")]
    #[schemars(description = "Absolute tolerance for amount comparisons. Defaults to 0.01.")]
    pub tolerance: Decimal,

    #[serde(default = "default_fiscal_year_end_month")]
    #[schemars(description = "Month in which the fiscal year ends (1-12). Defaults to 12.")]
    pub fiscal_year_end_month: u32,
}

impl MappingConfig {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(MappingConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

fn default_balance() -> StatementType {
    StatementType::Balance
}

fn default_activity() -> StatementType {
    StatementType::Activity
}

fn default_probe_offset() -> u32 {
    1
}

pub fn default_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

fn default_fiscal_year_end_month() -> u32 {
    12
}
