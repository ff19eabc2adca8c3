use crate::alias::AliasMap;
use crate::config::{BlockSpec, PointSpec, RangeSpec};
use crate::probe::probe_layout;
use crate::schema::SubjectKind;
use crate::sheet::{fiscal_year_from_name, CellRef, CellValue, Sheet};
use crate::utils::parse_amount;
use crate::{ExtractedRecord, RecordOrigin};
use log::{debug, warn};
use rust_decimal::Decimal;

/// Extracts the records of one block from one sheet.
///
/// Never fails: a sheet without a fiscal year yields nothing, rows that do not
/// qualify are skipped, unreadable amounts become zero and point items whose
/// row no longer carries the expected label are dropped individually.
pub fn extract(sheet: &Sheet, block: &BlockSpec, aliases: &AliasMap) -> Vec<ExtractedRecord> {
    let Some(year) = fiscal_year_from_name(&sheet.name) else {
        warn!(
            "Sheet '{}' has no fiscal year in its name; block '{}' not extracted",
            sheet.name,
            block.name()
        );
        return Vec::new();
    };

    let records = match block {
        BlockSpec::Range(spec) => extract_range(sheet, year, spec, aliases),
        BlockSpec::Point(spec) => extract_point(sheet, year, spec, aliases),
    };

    debug!(
        "Sheet '{}', block '{}': {} records",
        sheet.name,
        block.name(),
        records.len()
    );
    records
}

fn extract_range(
    sheet: &Sheet,
    year: i32,
    spec: &RangeSpec,
    aliases: &AliasMap,
) -> Vec<ExtractedRecord> {
    let mut records = Vec::new();

    for row in spec.start_row..=spec.end_row {
        let label = match sheet.get(CellRef::new(row, spec.label_col)) {
            CellValue::Text(text) if !text.trim().is_empty() => text.trim(),
            _ => continue,
        };

        if spec.skip_keywords.iter().any(|k| label.contains(k.as_str())) {
            debug!("Sheet '{}' row {}: '{}' skipped by keyword", sheet.name, row, label);
            continue;
        }

        let resolved = aliases.resolve(label);
        let kind = if spec.is_single_row() {
            SubjectKind::Subtotal
        } else {
            resolved.kind
        };

        records.push(ExtractedRecord {
            source_sheet: sheet.name.clone(),
            statement: spec.statement,
            year,
            subject: resolved.canonical,
            kind,
            group: spec.group.clone(),
            block: spec.name.clone(),
            period_start: read_amount(sheet, CellRef::new(row, spec.start_col)),
            period_end: read_amount(sheet, CellRef::new(row, spec.end_col)),
            origin: RecordOrigin::Extracted,
        });
    }

    records
}

fn extract_point(
    sheet: &Sheet,
    year: i32,
    spec: &PointSpec,
    aliases: &AliasMap,
) -> Vec<ExtractedRecord> {
    let offset = spec
        .probe
        .as_ref()
        .map(|probe| probe_layout(sheet, probe).offset)
        .unwrap_or(0);

    let mut records = Vec::new();

    for item in &spec.items {
        let shift = if item.shift_with_probe { offset } else { 0 };
        let (Some(start_cell), Some(end_cell)) = (
            item.start_cell.offset_rows(shift),
            item.end_cell.offset_rows(shift),
        ) else {
            warn!(
                "Sheet '{}': '{}' shifted {} rows is off the sheet; item skipped",
                sheet.name, item.subject, shift
            );
            continue;
        };
        let expected = aliases.resolve(&item.subject);

        if let Some(label_col) = spec.label_col {
            let label_cell = CellRef::new(end_cell.row, label_col);
            let found = sheet
                .text_at(label_cell)
                .map(|label| aliases.resolve(&label).canonical);

            if found.as_deref() != Some(expected.canonical.as_str()) {
                warn!(
                    "Sheet '{}': expected '{}' at {}, found {:?}; item skipped",
                    sheet.name, item.subject, label_cell, found
                );
                continue;
            }
        }

        records.push(ExtractedRecord {
            source_sheet: sheet.name.clone(),
            statement: spec.statement,
            year,
            subject: expected.canonical,
            kind: expected.kind,
            group: item.group.clone(),
            block: spec.name.clone(),
            period_start: read_amount(sheet, start_cell),
            period_end: read_amount(sheet, end_cell),
            origin: RecordOrigin::Extracted,
        });
    }

    records
}

fn read_amount(sheet: &Sheet, cell: CellRef) -> Decimal {
    let value = sheet.get(cell);
    parse_amount(value).unwrap_or_else(|| {
        debug!(
            "Sheet '{}' {}: {:?} is not numeric, using 0",
            sheet.name, cell, value
        );
        Decimal::ZERO
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PointSpecItem, ProbeSpec};
    use crate::schema::{AliasEntry, StatementType};
    use rust_decimal_macros::dec;

    fn aliases() -> AliasMap {
        AliasMap::build(&[
            AliasEntry {
                canonical: "资产总计".to_string(),
                kind: SubjectKind::Subtotal,
                aliases: vec!["资产合计".to_string()],
            },
            AliasEntry {
                canonical: "货币资金".to_string(),
                kind: SubjectKind::Ordinary,
                aliases: vec!["现金".to_string()],
            },
            AliasEntry {
                canonical: "收入合计".to_string(),
                kind: SubjectKind::Subtotal,
                aliases: vec![],
            },
        ])
    }

    fn range(start_row: u32, end_row: u32) -> BlockSpec {
        BlockSpec::Range(RangeSpec {
            name: "流动资产".to_string(),
            statement: StatementType::Balance,
            label_col: 1,
            start_row,
            end_row,
            start_col: 3,
            end_col: 4,
            skip_keywords: vec!["其中".to_string()],
            group: "资产总计".to_string(),
        })
    }

    fn balance_sheet() -> Sheet {
        let mut sheet = Sheet::new("2022资产负债表");
        sheet.set_text("A5", "（一）现金").unwrap();
        sheet.set_number("C5", dec!(100)).unwrap();
        sheet.set_number("D5", dec!(150)).unwrap();
        sheet.set_text("A6", "   ").unwrap();
        sheet.set_text("A7", "其中：零用金").unwrap();
        sheet.set_number("D7", dec!(5)).unwrap();
        sheet.set_text("A8", "应收款项").unwrap();
        sheet.set_text("C8", "1,200.00").unwrap();
        sheet.set_text("D8", "n/a").unwrap();
        sheet.set_text("A9", "资产合计").unwrap();
        sheet.set_number("C9", dec!(1300)).unwrap();
        sheet.set_number("D9", dec!(150)).unwrap();
        sheet
    }

    #[test]
    fn test_range_extraction() {
        let records = extract(&balance_sheet(), &range(5, 9), &aliases());
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].subject, "货币资金");
        assert_eq!(records[0].kind, SubjectKind::Ordinary);
        assert_eq!(records[0].year, 2022);
        assert_eq!(records[0].group, "资产总计");
        assert_eq!(records[0].period_end, dec!(150));

        assert_eq!(records[1].subject, "应收款项");
        assert_eq!(records[1].period_start, dec!(1200));
        assert_eq!(records[1].period_end, dec!(0));

        assert_eq!(records[2].subject, "资产总计");
        assert_eq!(records[2].kind, SubjectKind::Subtotal);
        assert!(records.iter().all(|r| r.origin == RecordOrigin::Extracted));
    }

    #[test]
    fn test_single_row_block_is_always_subtotal() {
        let records = extract(&balance_sheet(), &range(5, 5), &aliases());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject, "货币资金");
        assert_eq!(records[0].kind, SubjectKind::Subtotal);
    }

    #[test]
    fn test_sheet_without_year_yields_nothing() {
        let mut sheet = balance_sheet();
        sheet.name = "资产负债表".to_string();
        assert!(extract(&sheet, &range(5, 9), &aliases()).is_empty());
    }

    fn activity_sheet(extra_row: bool) -> Sheet {
        let mut sheet = Sheet::new("2023业务活动表");
        let base = if extra_row {
            sheet.set_text("A6", "商品销售收入").unwrap();
            sheet.set_number("D6", dec!(40)).unwrap();
            7
        } else {
            6
        };
        sheet.set_text(&format!("A{}", base), "捐赠收入").unwrap();
        sheet.set_number(&format!("D{}", base), dec!(600)).unwrap();
        sheet.set_text("A12", "收入合计").unwrap();
        sheet.set_number("C12", dec!(900)).unwrap();
        sheet.set_number("D12", dec!(1000)).unwrap();
        sheet
    }

    fn point_spec() -> BlockSpec {
        BlockSpec::Point(PointSpec {
            name: "收支".to_string(),
            statement: StatementType::Activity,
            label_col: Some(1),
            probe: Some(ProbeSpec {
                label_cell: CellRef::parse("A6").unwrap(),
                marker: "商品销售收入".to_string(),
                value_cell: Some(CellRef::parse("D6").unwrap()),
                offset: 1,
            }),
            items: vec![
                PointSpecItem {
                    subject: "捐赠收入".to_string(),
                    start_cell: CellRef::parse("C6").unwrap(),
                    end_cell: CellRef::parse("D6").unwrap(),
                    group: "收入合计".to_string(),
                    shift_with_probe: true,
                },
                PointSpecItem {
                    subject: "收入合计".to_string(),
                    start_cell: CellRef::parse("C12").unwrap(),
                    end_cell: CellRef::parse("D12").unwrap(),
                    group: "收入合计".to_string(),
                    shift_with_probe: false,
                },
                PointSpecItem {
                    subject: "费用合计".to_string(),
                    start_cell: CellRef::parse("C20").unwrap(),
                    end_cell: CellRef::parse("D20").unwrap(),
                    group: "费用合计".to_string(),
                    shift_with_probe: false,
                },
            ],
        })
    }

    #[test]
    fn test_point_extraction_skips_drifted_items() {
        let records = extract(&activity_sheet(false), &point_spec(), &aliases());
        let subjects: Vec<&str> = records.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(subjects, vec!["捐赠收入", "收入合计"]);

        assert_eq!(records[0].period_end, dec!(600));
        assert_eq!(records[0].kind, SubjectKind::Ordinary);
        assert_eq!(records[1].kind, SubjectKind::Subtotal);
        assert_eq!(records[1].period_start, dec!(900));
    }

    #[test]
    fn test_point_extraction_follows_layout_probe() {
        let records = extract(&activity_sheet(true), &point_spec(), &aliases());
        let donation = records.iter().find(|r| r.subject == "捐赠收入").unwrap();
        assert_eq!(donation.period_end, dec!(600));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_oversized_shift_skips_only_the_shifted_item() {
        let mut spec = point_spec();
        if let BlockSpec::Point(point) = &mut spec {
            if let Some(probe) = point.probe.as_mut() {
                probe.offset = u32::MAX;
            }
        }

        let records = extract(&activity_sheet(true), &spec, &aliases());
        let subjects: Vec<&str> = records.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(subjects, vec!["收入合计"]);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let sheet = balance_sheet();
        let first = extract(&sheet, &range(5, 9), &aliases());
        let second = extract(&sheet, &range(5, 9), &aliases());
        assert_eq!(first, second);
    }
}
