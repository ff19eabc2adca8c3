use crate::error::{ReconcileError, Result};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// A single cell as read from a statement sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(Decimal),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Number(n) => Some(n.to_string()),
        }
    }
}

/// 1-based row/column coordinate, as written in A1 notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parses references such as `C12` or `$AB$7`.
    pub fn parse(reference: &str) -> Result<Self> {
        let cleaned: String = reference
            .trim()
            .chars()
            .filter(|c| *c != '$')
            .collect::<String>()
            .to_ascii_uppercase();

        let split = cleaned
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| ReconcileError::InvalidCellReference(reference.to_string()))?;
        let (letters, digits) = cleaned.split_at(split);

        let col = column_index(letters)?;
        let row: u32 = digits
            .parse()
            .map_err(|_| ReconcileError::InvalidCellReference(reference.to_string()))?;
        if row == 0 {
            return Err(ReconcileError::InvalidCellReference(reference.to_string()));
        }

        Ok(Self { row, col })
    }

    /// `None` when the shifted row does not fit in a `u32`.
    pub fn offset_rows(self, rows: u32) -> Option<Self> {
        Some(Self {
            row: self.row.checked_add(rows)?,
            col: self.col,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row)
    }
}

/// Converts column letters to a 1-based index (`A` = 1, `AB` = 28).
pub fn column_index(letters: &str) -> Result<u32> {
    let letters = letters.trim();
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ReconcileError::InvalidCellReference(letters.to_string()));
    }

    let mut index: u32 = 0;
    for c in letters.chars() {
        let digit = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        index = index
            .checked_mul(26)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| ReconcileError::InvalidCellReference(letters.to_string()))?;
    }
    Ok(index)
}

pub fn column_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Inclusive rectangle of merged cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRegion {
    pub top_left: CellRef,
    pub bottom_right: CellRef,
}

impl MergedRegion {
    pub fn contains(&self, cell: CellRef) -> bool {
        (self.top_left.row..=self.bottom_right.row).contains(&cell.row)
            && (self.top_left.col..=self.bottom_right.col).contains(&cell.col)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    cells: BTreeMap<CellRef, CellValue>,
    merged: Vec<MergedRegion>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
            merged: Vec::new(),
        }
    }

    pub fn set(&mut self, cell: CellRef, value: CellValue) {
        if value == CellValue::Empty {
            self.cells.remove(&cell);
        } else {
            self.cells.insert(cell, value);
        }
    }

    pub fn set_text(&mut self, reference: &str, text: &str) -> Result<()> {
        let cell = CellRef::parse(reference)?;
        self.set(cell, CellValue::Text(text.to_string()));
        Ok(())
    }

    pub fn set_number(&mut self, reference: &str, value: Decimal) -> Result<()> {
        let cell = CellRef::parse(reference)?;
        self.set(cell, CellValue::Number(value));
        Ok(())
    }

    pub fn add_merged_region(&mut self, region: MergedRegion) {
        self.merged.push(region);
    }

    pub fn merged_regions(&self) -> &[MergedRegion] {
        &self.merged
    }

    pub fn get(&self, cell: CellRef) -> &CellValue {
        self.cells.get(&cell).unwrap_or(&CellValue::Empty)
    }

    /// Cell content rendered as text, `None` for empty cells.
    pub fn text_at(&self, cell: CellRef) -> Option<String> {
        self.get(cell).as_text()
    }

    pub fn max_row(&self) -> u32 {
        self.cells.keys().map(|c| c.row).max().unwrap_or(0)
    }

    /// Where a write aimed at `cell` must land. Inside a merged region only the
    /// top-left cell holds content, so writes are redirected there.
    pub fn write_target(&self, cell: CellRef) -> CellRef {
        self.merged
            .iter()
            .find(|region| region.contains(cell))
            .map(|region| region.top_left)
            .unwrap_or(cell)
    }

    pub fn write_value(&mut self, cell: CellRef, value: CellValue) -> CellRef {
        let target = self.write_target(cell);
        self.set(target, value);
        target
    }

    /// Non-empty rows of the sheet as `(row, column -> value)`, in row order.
    pub fn rows(&self) -> BTreeMap<u32, BTreeMap<u32, &CellValue>> {
        let mut rows: BTreeMap<u32, BTreeMap<u32, &CellValue>> = BTreeMap::new();
        for (cell, value) in &self.cells {
            rows.entry(cell.row).or_default().insert(cell.col, value);
        }
        rows
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d{4}").expect("static regex"))
}

/// The first 4-digit run of a sheet identifier, e.g. `2021资产负债表` -> 2021.
pub fn fiscal_year_from_name(name: &str) -> Option<i32> {
    year_pattern()
        .find(name)
        .and_then(|m| m.as_str().parse().ok())
}
