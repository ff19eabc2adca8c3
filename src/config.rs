//! Validation and compilation of the mapping configuration.
//!
//! [`MappingConfig`] is the serialized form. Before a run it is checked once
//! and its blocks compiled into [`BlockSpec`]s holding parsed coordinates, so
//! extraction itself never deals with malformed references. The mapping can
//! also be read from a workbook of configuration tables ([`MappingConfig::from_workbook`]).

use crate::error::{ReconcileError, Result};
use crate::schema::*;
use crate::sheet::{column_index, CellRef, CellValue, Sheet, Workbook};
use crate::utils::{parse_amount, validate_fiscal_year_end_month};
use log::{debug, info};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

pub const ALIAS_SHEET: &str = "科目等价映射";
pub const RANGE_BLOCK_SHEET: &str = "资产负债表区块";
pub const POINT_ITEM_SHEET: &str = "业务活动表逐行";
pub const PROBE_SHEET: &str = "版式探针";
pub const SUBTOTAL_SHEET: &str = "合计核对";

/// Row count of an xlsx worksheet; a probe may not shift items further.
pub const MAX_SHEET_ROWS: u32 = 1_048_576;

#[derive(Debug, Clone, PartialEq)]
pub struct RangeSpec {
    pub name: String,
    pub statement: StatementType,
    pub label_col: u32,
    pub start_row: u32,
    pub end_row: u32,
    pub start_col: u32,
    pub end_col: u32,
    pub skip_keywords: Vec<String>,
    pub group: String,
}

impl RangeSpec {
    /// A block spanning one row is a total line by definition.
    pub fn is_single_row(&self) -> bool {
        self.start_row == self.end_row
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSpec {
    pub label_cell: CellRef,
    pub marker: String,
    pub value_cell: Option<CellRef>,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointSpecItem {
    pub subject: String,
    pub start_cell: CellRef,
    pub end_cell: CellRef,
    pub group: String,
    pub shift_with_probe: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointSpec {
    pub name: String,
    pub statement: StatementType,
    pub label_col: Option<u32>,
    pub probe: Option<ProbeSpec>,
    pub items: Vec<PointSpecItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockSpec {
    Range(RangeSpec),
    Point(PointSpec),
}

impl BlockSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Range(spec) => &spec.name,
            Self::Point(spec) => &spec.name,
        }
    }

    pub fn statement(&self) -> StatementType {
        match self {
            Self::Range(spec) => spec.statement,
            Self::Point(spec) => spec.statement,
        }
    }

    pub fn compile(descriptor: &BlockDescriptor) -> Result<Self> {
        match descriptor {
            BlockDescriptor::Range(block) => compile_range(block).map(Self::Range),
            BlockDescriptor::Point(block) => compile_point(block).map(Self::Point),
        }
    }
}

fn invalid(item: &str, details: impl Into<String>) -> ReconcileError {
    ReconcileError::InvalidConfig {
        item: item.to_string(),
        details: details.into(),
    }
}

fn cell_in(item: &str, reference: &str) -> Result<CellRef> {
    CellRef::parse(reference)
        .map_err(|_| invalid(item, format!("'{}' is not a valid cell reference", reference)))
}

fn column_in(item: &str, letters: &str) -> Result<u32> {
    column_index(letters)
        .map_err(|_| invalid(item, format!("'{}' is not a valid column", letters)))
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn compile_range(block: &RangeBlock) -> Result<RangeSpec> {
    let item = block.name.as_str();
    if item.trim().is_empty() {
        return Err(invalid("range block", "block name is empty"));
    }

    let start = cell_in(item, &block.start_cell)?;
    let end = cell_in(item, &block.end_cell)?;
    if start.col != end.col {
        return Err(invalid(
            item,
            format!(
                "anchors {} and {} must share the label column",
                block.start_cell, block.end_cell
            ),
        ));
    }
    if end.row < start.row {
        return Err(invalid(
            item,
            format!("end row {} precedes start row {}", end.row, start.row),
        ));
    }

    Ok(RangeSpec {
        name: block.name.trim().to_string(),
        statement: block.statement,
        label_col: start.col,
        start_row: start.row,
        end_row: end.row,
        start_col: column_in(item, &block.start_column)?,
        end_col: column_in(item, &block.end_column)?,
        skip_keywords: block
            .skip_keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        group: non_empty(&block.group).unwrap_or_else(|| block.name.trim().to_string()),
    })
}

fn compile_point(block: &PointBlock) -> Result<PointSpec> {
    let item = block.name.as_str();
    if item.trim().is_empty() {
        return Err(invalid("point block", "block name is empty"));
    }

    let label_col = match non_empty(&block.label_column) {
        Some(letters) => Some(column_in(item, &letters)?),
        None => None,
    };

    let probe = match &block.probe {
        Some(probe) => {
            if probe.marker.trim().is_empty() {
                return Err(invalid(item, "layout probe marker is empty"));
            }
            if probe.offset >= MAX_SHEET_ROWS {
                return Err(invalid(
                    item,
                    format!("layout probe offset {} exceeds the sheet height", probe.offset),
                ));
            }
            Some(ProbeSpec {
                label_cell: cell_in(item, &probe.label_cell)?,
                marker: probe.marker.trim().to_string(),
                value_cell: match non_empty(&probe.value_cell) {
                    Some(cell) => Some(cell_in(item, &cell)?),
                    None => None,
                },
                offset: probe.offset,
            })
        }
        None => None,
    };

    let block_group = non_empty(&block.group).unwrap_or_else(|| block.name.trim().to_string());
    let items = block
        .items
        .iter()
        .map(|point| {
            if point.subject.trim().is_empty() {
                return Err(invalid(item, "point item with empty subject"));
            }
            Ok(PointSpecItem {
                subject: point.subject.trim().to_string(),
                start_cell: cell_in(&point.subject, &point.start_cell)?,
                end_cell: cell_in(&point.subject, &point.end_cell)?,
                group: non_empty(&point.group).unwrap_or_else(|| block_group.clone()),
                shift_with_probe: point.shift_with_probe,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PointSpec {
        name: block.name.trim().to_string(),
        statement: block.statement,
        label_col,
        probe,
        items,
    })
}

impl MappingConfig {
    /// Checks the whole configuration once. Any error here is fatal for the run.
    pub fn validate(&self) -> Result<()> {
        validate_fiscal_year_end_month(self.fiscal_year_end_month)?;

        if self.tolerance < Decimal::ZERO {
            return Err(invalid(
                "tolerance",
                format!("{} must not be negative", self.tolerance),
            ));
        }

        for entry in &self.aliases {
            if entry.canonical.trim().is_empty() {
                return Err(invalid("aliases", "alias entry with empty canonical name"));
            }
        }

        for subtotal in &self.subtotals {
            if subtotal.name.trim().is_empty() {
                return Err(invalid("subtotals", "subtotal declaration with empty name"));
            }
        }

        self.compile_blocks().map(|_| ())
    }

    pub fn compile_blocks(&self) -> Result<Vec<BlockSpec>> {
        self.blocks.iter().map(BlockSpec::compile).collect()
    }

    /// Reads the mapping from a workbook of configuration tables.
    ///
    /// The alias sheet is required; block, probe and subtotal sheets are
    /// optional but, when present, must carry their required columns. Without
    /// a subtotal sheet every subtotal-kind alias entry is declared for
    /// cross-footing.
    pub fn from_workbook(workbook: &Workbook) -> Result<Self> {
        let alias_sheet = workbook
            .sheet(ALIAS_SHEET)
            .ok_or_else(|| ReconcileError::MissingConfigSheet(ALIAS_SHEET.to_string()))?;
        let aliases = read_alias_table(alias_sheet)?;

        let mut blocks = Vec::new();
        if let Some(sheet) = workbook.sheet(RANGE_BLOCK_SHEET) {
            blocks.extend(read_range_blocks(sheet)?);
        } else {
            debug!("No '{}' sheet; no range blocks configured", RANGE_BLOCK_SHEET);
        }

        if let Some(sheet) = workbook.sheet(POINT_ITEM_SHEET) {
            let probe = match workbook.sheet(PROBE_SHEET) {
                Some(probe_sheet) => read_probe(probe_sheet)?,
                None => None,
            };
            blocks.push(read_point_block(sheet, probe)?);
        } else {
            debug!("No '{}' sheet; no point blocks configured", POINT_ITEM_SHEET);
        }

        let subtotals = match workbook.sheet(SUBTOTAL_SHEET) {
            Some(sheet) => read_subtotals(sheet)?,
            None => aliases
                .iter()
                .filter(|entry| entry.kind == SubjectKind::Subtotal)
                .map(|entry| SubtotalDefinition {
                    name: entry.canonical.clone(),
                    statement: None,
                    members: Vec::new(),
                })
                .collect(),
        };

        let config = MappingConfig {
            aliases,
            blocks,
            subtotals,
            key_subjects: KeySubjects::default(),
            sheet_patterns: SheetPatterns::default(),
            tolerance: default_tolerance(),
            fiscal_year_end_month: 12,
        };
        config.validate()?;

        info!(
            "Loaded mapping from workbook: {} alias entries, {} blocks, {} subtotal declarations",
            config.aliases.len(),
            config.blocks.len(),
            config.subtotals.len()
        );

        Ok(config)
    }
}

/// A configuration sheet read as a header row plus data rows.
struct ConfigTable<'a> {
    sheet: &'a Sheet,
    headers: BTreeMap<u32, String>,
    header_row: u32,
}

impl<'a> ConfigTable<'a> {
    fn new(sheet: &'a Sheet) -> Self {
        let rows = sheet.rows();
        let (header_row, headers) = rows
            .iter()
            .next()
            .map(|(row, cells)| {
                let headers = cells
                    .iter()
                    .filter_map(|(col, value)| {
                        value.as_text().map(|text| (*col, text.trim().to_string()))
                    })
                    .collect();
                (*row, headers)
            })
            .unwrap_or((0, BTreeMap::new()));

        Self {
            sheet,
            headers,
            header_row,
        }
    }

    fn column(&self, name: &str) -> Option<u32> {
        self.headers
            .iter()
            .find(|(_, header)| header.as_str() == name)
            .map(|(col, _)| *col)
    }

    fn required(&self, name: &str) -> Result<u32> {
        self.column(name)
            .ok_or_else(|| ReconcileError::MissingConfigColumn {
                sheet: self.sheet.name.clone(),
                column: name.to_string(),
            })
    }

    fn columns_containing(&self, fragment: &str) -> Vec<u32> {
        self.headers
            .iter()
            .filter(|(_, header)| header.contains(fragment))
            .map(|(col, _)| *col)
            .collect()
    }

    fn data_rows(&self) -> std::ops::RangeInclusive<u32> {
        (self.header_row + 1)..=self.sheet.max_row()
    }

    fn text(&self, row: u32, col: Option<u32>) -> Option<String> {
        col.and_then(|c| self.sheet.text_at(CellRef::new(row, c)))
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split([',', '，', '、'])
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

fn is_yes(text: Option<String>) -> bool {
    matches!(
        text.as_deref().map(str::to_lowercase).as_deref(),
        Some("是" | "y" | "yes" | "true" | "1")
    )
}

fn parse_kind(sheet: &str, text: Option<String>) -> Result<SubjectKind> {
    match text.as_deref() {
        None | Some("普通") | Some("ordinary") => Ok(SubjectKind::Ordinary),
        Some("合计") | Some("subtotal") => Ok(SubjectKind::Subtotal),
        Some(other) => Err(invalid(sheet, format!("unknown subject kind '{}'", other))),
    }
}

fn parse_statement(sheet: &str, text: Option<String>) -> Result<Option<StatementType>> {
    match text.as_deref() {
        None => Ok(None),
        Some("资产负债表") | Some("balance") => Ok(Some(StatementType::Balance)),
        Some("业务活动表") | Some("activity") => Ok(Some(StatementType::Activity)),
        Some(other) => Err(invalid(sheet, format!("unknown statement type '{}'", other))),
    }
}

fn read_alias_table(sheet: &Sheet) -> Result<Vec<AliasEntry>> {
    let table = ConfigTable::new(sheet);
    let canonical_col = table.required("标准科目名")?;
    let kind_col = table.column("科目类型");
    let alias_cols = table.columns_containing("等价科目名");

    let mut entries = Vec::new();
    for row in table.data_rows() {
        let Some(canonical) = table.text(row, Some(canonical_col)) else {
            continue;
        };
        let kind = parse_kind(&sheet.name, table.text(row, kind_col))?;
        let aliases = alias_cols
            .iter()
            .filter_map(|col| table.text(row, Some(*col)))
            .flat_map(|cell| split_list(&cell))
            .collect();

        entries.push(AliasEntry {
            canonical,
            kind,
            aliases,
        });
    }
    Ok(entries)
}

fn read_range_blocks(sheet: &Sheet) -> Result<Vec<BlockDescriptor>> {
    let table = ConfigTable::new(sheet);
    let name_col = table.required("区块名称")?;
    let start_cell_col = table.required("起始单元格")?;
    let end_cell_col = table.required("终止单元格")?;
    let start_column_col = table.required("期初列")?;
    let end_column_col = table.required("期末列")?;
    let skip_col = table.column("跳过行");
    let group_col = table.column("附注组名");

    let mut blocks = Vec::new();
    for row in table.data_rows() {
        let Some(name) = table.text(row, Some(name_col)) else {
            continue;
        };
        let field = |col: u32, label: &str| {
            table
                .text(row, Some(col))
                .ok_or_else(|| invalid(&name, format!("'{}' is empty", label)))
        };

        blocks.push(BlockDescriptor::Range(RangeBlock {
            name: name.clone(),
            statement: StatementType::Balance,
            start_cell: field(start_cell_col, "起始单元格")?,
            end_cell: field(end_cell_col, "终止单元格")?,
            start_column: field(start_column_col, "期初列")?,
            end_column: field(end_column_col, "期末列")?,
            skip_keywords: table
                .text(row, skip_col)
                .map(|text| split_list(&text))
                .unwrap_or_default(),
            group: table.text(row, group_col),
        }));
    }
    Ok(blocks)
}

fn read_point_block(sheet: &Sheet, probe: Option<LayoutProbe>) -> Result<BlockDescriptor> {
    let table = ConfigTable::new(sheet);
    let subject_col = table.required("字段名")?;
    let start_col = table.required("源期初坐标")?;
    let end_col = table.required("源期末坐标")?;
    let group_col = table.column("附注组名");
    let shift_col = table.column("随探针偏移");
    // Optional; without it item coordinates are read without a label check.
    let label_col = table.column("标签列");

    let label_column = table
        .data_rows()
        .find_map(|row| table.text(row, label_col));

    let mut items = Vec::new();
    for row in table.data_rows() {
        let Some(subject) = table.text(row, Some(subject_col)) else {
            continue;
        };
        let (Some(start_cell), Some(end_cell)) =
            (table.text(row, Some(start_col)), table.text(row, Some(end_col)))
        else {
            return Err(invalid(&subject, "source coordinates are empty"));
        };

        items.push(PointItem {
            subject,
            start_cell,
            end_cell,
            group: table.text(row, group_col),
            shift_with_probe: is_yes(table.text(row, shift_col)),
        });
    }

    Ok(BlockDescriptor::Point(PointBlock {
        name: sheet.name.clone(),
        statement: StatementType::Activity,
        label_column,
        group: None,
        probe,
        items,
    }))
}

fn read_probe(sheet: &Sheet) -> Result<Option<LayoutProbe>> {
    let table = ConfigTable::new(sheet);
    let label_col = table.required("标签单元格")?;
    let marker_col = table.required("标记文本")?;
    let value_col = table.column("数值单元格");
    let offset_col = table.column("偏移行数");

    let Some(row) = table
        .data_rows()
        .find(|row| table.text(*row, Some(label_col)).is_some())
    else {
        return Ok(None);
    };

    let offset = match offset_col.map(|col| sheet.get(CellRef::new(row, col))) {
        None | Some(CellValue::Empty) => 1,
        Some(value) => parse_amount(value)
            .and_then(|v| v.trunc().to_u32())
            .ok_or_else(|| invalid(PROBE_SHEET, "'偏移行数' must be a small whole number"))?,
    };

    Ok(Some(LayoutProbe {
        label_cell: table.text(row, Some(label_col)).unwrap_or_default(),
        marker: table
            .text(row, Some(marker_col))
            .ok_or_else(|| invalid(PROBE_SHEET, "'标记文本' is empty"))?,
        value_cell: table.text(row, value_col),
        offset,
    }))
}

fn read_subtotals(sheet: &Sheet) -> Result<Vec<SubtotalDefinition>> {
    let table = ConfigTable::new(sheet);
    let name_col = table.required("合计科目")?;
    let statement_col = table.column("报表类型");
    let members_col = table.column("成员科目");

    let mut subtotals = Vec::new();
    for row in table.data_rows() {
        let Some(name) = table.text(row, Some(name_col)) else {
            continue;
        };
        subtotals.push(SubtotalDefinition {
            name,
            statement: parse_statement(&sheet.name, table.text(row, statement_col))?,
            members: table
                .text(row, members_col)
                .map(|text| split_list(&text))
                .unwrap_or_default(),
        });
    }
    Ok(subtotals)
}
