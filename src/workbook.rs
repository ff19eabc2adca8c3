//! Spreadsheet loading through calamine.

use crate::error::{ReconcileError, Result};
use crate::sheet::{CellRef, CellValue, MergedRegion, Sheet, Workbook};
use calamine::{open_workbook_auto, Data, Reader, Sheets};
use log::{debug, info, warn};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

/// Reads every worksheet of an xlsx/xls/xlsb/ods file into memory.
///
/// Strings and numbers are kept as such, booleans and dates become text.
/// Merged regions are only available for xlsx files.
pub fn load_workbook(path: impl AsRef<Path>) -> Result<Workbook> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        ReconcileError::Workbook(format!("Failed to open '{}': {}", path.display(), e))
    })?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(sheet_names.len());

    for sheet_name in &sheet_names {
        let range = workbook.worksheet_range(sheet_name).map_err(|e| {
            ReconcileError::Workbook(format!("Failed to read sheet '{}': {}", sheet_name, e))
        })?;

        let mut sheet = Sheet::new(sheet_name.clone());
        let (start_row, start_col) = range.start().unwrap_or((0, 0));

        for (row_idx, row) in range.rows().enumerate() {
            for (col_idx, data) in row.iter().enumerate() {
                let value = convert(data);
                if value == CellValue::Empty {
                    continue;
                }
                let cell = CellRef::new(
                    start_row + row_idx as u32 + 1,
                    start_col + col_idx as u32 + 1,
                );
                sheet.set(cell, value);
            }
        }

        if let Sheets::Xlsx(xlsx) = &mut workbook {
            match xlsx.worksheet_merge_cells(sheet_name) {
                Some(Ok(regions)) => {
                    for dims in regions {
                        sheet.add_merged_region(MergedRegion {
                            top_left: CellRef::new(dims.start.0 + 1, dims.start.1 + 1),
                            bottom_right: CellRef::new(dims.end.0 + 1, dims.end.1 + 1),
                        });
                    }
                }
                Some(Err(e)) => warn!("Sheet '{}': merged regions unreadable: {}", sheet_name, e),
                None => {}
            }
        }

        debug!(
            "Loaded sheet '{}' ({} rows, {} merged regions)",
            sheet_name,
            sheet.max_row(),
            sheet.merged_regions().len()
        );
        sheets.push(sheet);
    }

    info!("Loaded {} sheets from {}", sheets.len(), path.display());
    Ok(Workbook::new(sheets))
}

fn convert(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.trim().is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(n) => float_to_decimal(*n)
            .map(CellValue::Number)
            .unwrap_or_else(|| CellValue::Text(n.to_string())),
        Data::Int(n) => CellValue::Number(Decimal::from(*n)),
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::Error(e) => CellValue::Text(format!("#{:?}", e)),
        Data::DateTime(dt) => CellValue::Text(dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// Goes through the shortest decimal rendering first so 0.1 stays 0.1.
fn float_to_decimal(n: f64) -> Option<Decimal> {
    Decimal::from_str(&n.to_string())
        .ok()
        .or_else(|| Decimal::from_f64(n))
}
