use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use statement_reconciler::*;

const MAPPING: &str = r#"{
    "aliases": [
        {"canonical": "资产总计", "kind": "subtotal", "aliases": ["资产合计"]},
        {"canonical": "负债合计", "kind": "subtotal", "aliases": ["负债总计"]},
        {"canonical": "净资产合计", "kind": "subtotal", "aliases": []},
        {"canonical": "收入合计", "kind": "subtotal", "aliases": ["收入总计", "一、收入合计"]},
        {"canonical": "费用合计", "kind": "subtotal", "aliases": []},
        {"canonical": "货币资金", "kind": "ordinary", "aliases": ["现金", "现金及银行存款"]},
        {"canonical": "应收款项", "kind": "ordinary", "aliases": []}
    ],
    "blocks": [
        {"mode": "range", "name": "资产", "start_cell": "A4", "end_cell": "A7",
         "start_column": "C", "end_column": "D", "skip_keywords": ["其中"], "group": "资产总计"},
        {"mode": "range", "name": "负债", "start_cell": "A9", "end_cell": "A10",
         "start_column": "C", "end_column": "D", "group": "负债合计"},
        {"mode": "range", "name": "净资产", "start_cell": "A12", "end_cell": "A12",
         "start_column": "C", "end_column": "D"},
        {"mode": "point", "name": "收支", "label_column": "A",
         "probe": {"label_cell": "A5", "marker": "商品销售收入", "value_cell": "D5"},
         "items": [
            {"subject": "商品销售收入", "start_cell": "C5", "end_cell": "D5", "group": "收入合计"},
            {"subject": "捐赠收入", "start_cell": "C5", "end_cell": "D5", "group": "收入合计", "shift_with_probe": true},
            {"subject": "政府补助收入", "start_cell": "C6", "end_cell": "D6", "group": "收入合计", "shift_with_probe": true},
            {"subject": "收入合计", "start_cell": "C8", "end_cell": "D8"},
            {"subject": "业务活动成本", "start_cell": "C10", "end_cell": "D10", "group": "费用合计"},
            {"subject": "管理费用", "start_cell": "C11", "end_cell": "D11", "group": "费用合计"},
            {"subject": "费用合计", "start_cell": "C13", "end_cell": "D13"}
         ]}
    ],
    "subtotals": [
        {"name": "资产总计", "statement": "balance"},
        {"name": "负债合计", "statement": "balance"},
        {"name": "收入合计", "statement": "activity"},
        {"name": "费用合计", "statement": "activity"}
    ]
}"#;

fn mapping() -> MappingConfig {
    MappingConfig::from_json_str(MAPPING).unwrap()
}

fn row(sheet: &mut Sheet, row: u32, label: &str, start: Option<Decimal>, end: Decimal) {
    sheet.set_text(&format!("A{}", row), label).unwrap();
    if let Some(start) = start {
        sheet.set_number(&format!("C{}", row), start).unwrap();
    }
    sheet.set_number(&format!("D{}", row), end).unwrap();
}

struct BalanceFigures {
    cash: (Decimal, Decimal),
    receivables: (Decimal, Decimal),
    payables: (Decimal, Decimal),
    net_assets: (Decimal, Decimal),
}

fn balance_sheet(year: i32, cash_label: &str, total_label: &str, f: &BalanceFigures) -> Sheet {
    let mut sheet = Sheet::new(format!("{}年资产负债表", year));
    sheet.set_text("A1", "资产负债表").unwrap();
    sheet.add_merged_region(MergedRegion {
        top_left: CellRef::new(1, 1),
        bottom_right: CellRef::new(1, 4),
    });
    row(&mut sheet, 4, cash_label, Some(f.cash.0), f.cash.1);
    row(&mut sheet, 5, "（二）应收款项", Some(f.receivables.0), f.receivables.1);
    row(&mut sheet, 6, "其中：关联方", None, dec!(10));
    row(
        &mut sheet,
        7,
        total_label,
        Some(f.cash.0 + f.receivables.0),
        f.cash.1 + f.receivables.1,
    );
    row(&mut sheet, 9, "应付款项", Some(f.payables.0), f.payables.1);
    row(&mut sheet, 10, "负债合计", Some(f.payables.0), f.payables.1);
    row(&mut sheet, 12, "净资产合计", Some(f.net_assets.0), f.net_assets.1);
    sheet
}

fn activity_2022() -> Sheet {
    let mut sheet = Sheet::new("2022年业务活动表");
    row(&mut sheet, 5, "捐赠收入", None, dec!(300));
    row(&mut sheet, 6, "政府补助收入", None, dec!(200));
    row(&mut sheet, 8, "一、收入合计", None, dec!(500));
    row(&mut sheet, 10, "业务活动成本", None, dec!(350));
    row(&mut sheet, 11, "管理费用", None, dec!(50));
    row(&mut sheet, 13, "费用合计", None, dec!(400));
    sheet
}

/// 2023 carries an extra goods-sales line that pushes the income rows down.
fn activity_2023() -> Sheet {
    let mut sheet = Sheet::new("2023年业务活动表");
    row(&mut sheet, 5, "商品销售收入", None, dec!(40));
    row(&mut sheet, 6, "捐赠收入", None, dec!(300));
    row(&mut sheet, 7, "政府补助收入", None, dec!(220));
    row(&mut sheet, 8, "收入总计", None, dec!(560));
    row(&mut sheet, 10, "业务活动成本", None, dec!(420));
    row(&mut sheet, 11, "管理费用", None, dec!(80));
    row(&mut sheet, 13, "费用合计", None, dec!(500));
    sheet
}

fn statements() -> Workbook {
    Workbook::new(vec![
        Sheet::new("封面"),
        balance_sheet(
            2022,
            "（一）货币资金",
            "资产合计",
            &BalanceFigures {
                cash: (dec!(100), dec!(200)),
                receivables: (dec!(50), dec!(80)),
                payables: (dec!(30), dec!(60)),
                net_assets: (dec!(120), dec!(220)),
            },
        ),
        activity_2022(),
        balance_sheet(
            2023,
            "现金",
            "资产总计",
            &BalanceFigures {
                cash: (dec!(200), dec!(250)),
                receivables: (dec!(80), dec!(100)),
                payables: (dec!(60), dec!(70)),
                net_assets: (dec!(220), dec!(280)),
            },
        ),
        activity_2023(),
    ])
}

#[test]
fn test_two_year_workbook_reconciles() {
    let output = process_workbook(&mapping(), &statements()).unwrap();

    assert_eq!(output.skipped_sheets.len(), 1);
    assert_eq!(output.skipped_sheets[0].name, "封面");
    assert_eq!(output.table.years(), vec![2022, 2023]);

    for finding in &output.findings {
        assert_eq!(finding.verdict, Verdict::Pass, "{}", finding);
    }
    // 4 subtotals x 2 years, 2 balance equations, 1 whole-period identity
    assert_eq!(output.findings.len(), 11);
    assert!(output.is_reconciled());

    let cash: Vec<_> = output
        .table
        .records
        .iter()
        .filter(|r| r.subject == "货币资金")
        .collect();
    assert_eq!(cash.len(), 2);
    assert!(output.table.records.iter().all(|r| !r.subject.contains("关联方")));

    let net_assets = output
        .table
        .find_subtotal(2022, StatementType::Balance, "净资产合计")
        .unwrap();
    assert_eq!(net_assets.kind, SubjectKind::Subtotal);
    assert_eq!(net_assets.group, "净资产");
}

#[test]
fn test_layout_probe_and_drift_across_years() {
    let output = process_workbook(&mapping(), &statements()).unwrap();

    let income_2022: Vec<_> = output
        .table
        .records_for(2022, StatementType::Activity)
        .filter(|r| r.group == "收入合计" && r.kind == SubjectKind::Ordinary)
        .map(|r| (r.subject.as_str(), r.period_end))
        .collect();
    assert_eq!(income_2022, vec![("捐赠收入", dec!(300)), ("政府补助收入", dec!(200))]);

    let income_2023: Vec<_> = output
        .table
        .records_for(2023, StatementType::Activity)
        .filter(|r| r.group == "收入合计" && r.kind == SubjectKind::Ordinary)
        .map(|r| (r.subject.as_str(), r.period_end))
        .collect();
    assert_eq!(
        income_2023,
        vec![
            ("商品销售收入", dec!(40)),
            ("捐赠收入", dec!(300)),
            ("政府补助收入", dec!(220)),
        ]
    );
}

#[test]
fn test_derived_lines_and_summary() {
    let output = process_workbook(&mapping(), &statements()).unwrap();
    let keys = KeySubjects::default();

    let derived: Vec<_> = output
        .table
        .records
        .iter()
        .filter(|r| r.origin == RecordOrigin::Derived)
        .map(|r| (r.year, r.subject.as_str(), r.period_end))
        .collect();
    assert_eq!(
        derived,
        vec![
            (2022, keys.surplus.as_str(), dec!(100)),
            (2022, keys.net_asset_change.as_str(), dec!(100)),
            (2023, keys.surplus.as_str(), dec!(60)),
            (2023, keys.net_asset_change.as_str(), dec!(60)),
        ]
    );

    let summary = &output.summary;
    assert_eq!(summary["start_year"], dec!(2022));
    assert_eq!(summary["end_year"], dec!(2023));
    assert_eq!(summary["opening_assets"], dec!(150));
    assert_eq!(summary["closing_assets"], dec!(350));
    assert_eq!(summary["assets_change"], dec!(200));
    assert_eq!(summary["liabilities_change"], dec!(40));
    assert_eq!(summary["net_assets_change"], dec!(160));
    assert_eq!(summary["total_income"], dec!(1060));
    assert_eq!(summary["total_expense"], dec!(900));
    assert_eq!(summary["net_surplus"], dec!(160));
    assert_eq!(
        change_direction(summary["assets_change"]),
        ChangeDirection::Increase
    );

    let period = AuditPeriod::of_table(&output.table, 12).unwrap();
    assert_eq!(period, parse_audit_period("2022年1月-2023年12月").unwrap());
}

#[test]
fn test_missing_subtotal_row_is_indeterminate() {
    let mut workbook = statements();
    let activity = workbook
        .sheets
        .iter_mut()
        .find(|s| s.name == "2023年业务活动表")
        .unwrap();
    activity.set(CellRef::parse("A8").unwrap(), CellValue::Empty);
    activity.set(CellRef::parse("D8").unwrap(), CellValue::Empty);

    let output = process_workbook(&mapping(), &workbook).unwrap();

    let income_2023 = output
        .findings
        .iter()
        .find(|f| f.year == Some(2023) && f.scope == Scope::Subtotal("收入合计".to_string()))
        .unwrap();
    assert_eq!(income_2023.verdict, Verdict::Indeterminate);
    assert_eq!(income_2023.computed, Some(dec!(560)));

    let period = output
        .findings
        .iter()
        .find(|f| f.scope == Scope::Identity(IdentityCheck::NetAssetChange))
        .unwrap();
    assert_eq!(period.verdict, Verdict::Indeterminate);
    assert!(period.note.contains("2023"));

    assert_eq!(output.failures().count(), 0);
    assert!(!output.is_reconciled());
}

#[test]
fn test_first_year_without_net_assets_is_indeterminate() {
    let mut workbook = statements();
    let balance = workbook
        .sheets
        .iter_mut()
        .find(|s| s.name == "2022年资产负债表")
        .unwrap();
    balance.set(CellRef::parse("A12").unwrap(), CellValue::Empty);

    let output = process_workbook(&mapping(), &workbook).unwrap();

    let period = output
        .findings
        .iter()
        .find(|f| f.scope == Scope::Identity(IdentityCheck::NetAssetChange))
        .unwrap();
    assert_eq!(period.verdict, Verdict::Indeterminate);
    assert_eq!(period.reported, Some(dec!(160)));

    let summary = &output.summary;
    assert_eq!(summary["start_year"], dec!(2022));
    assert!(!summary.contains_key("opening_net_assets"));
    assert!(!summary.contains_key("net_assets_change"));
    assert_eq!(summary["closing_net_assets"], dec!(280));
    assert_eq!(output.failures().count(), 0);
}

#[test]
fn test_misstated_total_fails_with_difference() {
    let mut workbook = statements();
    let balance = workbook
        .sheets
        .iter_mut()
        .find(|s| s.name == "2023年资产负债表")
        .unwrap();
    balance.set_number("D7", dec!(400)).unwrap();

    let output = process_workbook(&mapping(), &workbook).unwrap();
    let failures: Vec<_> = output.failures().collect();
    assert_eq!(failures.len(), 2);

    let subtotal = failures
        .iter()
        .find(|f| f.scope == Scope::Subtotal("资产总计".to_string()))
        .unwrap();
    assert_eq!(subtotal.difference, Some(dec!(-50)));

    let equation = failures
        .iter()
        .find(|f| f.scope == Scope::Identity(IdentityCheck::BalanceEquation))
        .unwrap();
    assert_eq!(equation.year, Some(2023));
    assert_eq!(equation.difference, Some(dec!(50)));
}

#[test]
fn test_runs_are_idempotent() -> anyhow::Result<()> {
    let config = mapping();
    let workbook = statements();

    let first = process_workbook(&config, &workbook)?;
    let second = process_workbook(&config, &workbook)?;

    assert_eq!(
        serde_json::to_string(&first.table)?,
        serde_json::to_string(&second.table)?
    );
    assert_eq!(first.findings, second.findings);
    Ok(())
}

#[test]
fn test_merged_title_write_back() {
    let mut workbook = statements();
    let sheet = &mut workbook.sheets[1];

    let target = sheet.write_value(
        CellRef::parse("C1").unwrap(),
        CellValue::Text("资产负债表（已核对）".to_string()),
    );
    assert_eq!(target, CellRef::new(1, 1));
    assert_eq!(
        sheet.text_at(CellRef::new(1, 1)).as_deref(),
        Some("资产负债表（已核对）")
    );
    assert_eq!(sheet.get(CellRef::new(1, 3)), &CellValue::Empty);
}

#[test]
fn test_schema_generation() -> anyhow::Result<()> {
    let schema = MappingConfig::schema_as_json()?;
    assert!(schema.contains("shift_with_probe"));
    assert!(schema.contains("skip_keywords"));
    Ok(())
}

mod xlsx {
    use super::*;
    use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};
    use std::path::Path;

    fn write_config(path: &Path) -> anyhow::Result<()> {
        let mut book = XlsxWorkbook::new();

        let aliases = book.add_worksheet().set_name("科目等价映射")?;
        for (col, header) in ["标准科目名", "科目类型", "等价科目名1", "等价科目名2"]
            .iter()
            .enumerate()
        {
            aliases.write_string(0, col as u16, *header)?;
        }
        let rows: [[&str; 4]; 5] = [
            ["资产总计", "合计", "资产合计", ""],
            ["负债合计", "合计", "", ""],
            ["净资产合计", "合计", "", ""],
            ["货币资金", "普通", "现金，现金及银行存款", ""],
            ["应收款项", "普通", "", "其他应收款"],
        ];
        for (r, cells) in rows.iter().enumerate() {
            for (c, text) in cells.iter().enumerate() {
                if !text.is_empty() {
                    aliases.write_string(r as u32 + 1, c as u16, *text)?;
                }
            }
        }

        let blocks = book.add_worksheet().set_name("资产负债表区块")?;
        for (col, header) in ["区块名称", "起始单元格", "终止单元格", "期初列", "期末列", "跳过行", "附注组名"]
            .iter()
            .enumerate()
        {
            blocks.write_string(0, col as u16, *header)?;
        }
        let rows: [[&str; 7]; 3] = [
            ["资产", "A4", "A7", "C", "D", "其中", "资产总计"],
            ["负债", "A9", "A10", "C", "D", "", "负债合计"],
            ["净资产", "A12", "A12", "C", "D", "", ""],
        ];
        for (r, cells) in rows.iter().enumerate() {
            for (c, text) in cells.iter().enumerate() {
                if !text.is_empty() {
                    blocks.write_string(r as u32 + 1, c as u16, *text)?;
                }
            }
        }

        book.save(path)?;
        Ok(())
    }

    fn write_statements(path: &Path) -> anyhow::Result<()> {
        let mut book = XlsxWorkbook::new();
        let sheet = book.add_worksheet().set_name("2023年资产负债表")?;

        sheet.merge_range(0, 0, 0, 3, "资产负债表", &Format::new())?;
        let rows: [(u32, &str, f64, f64); 7] = [
            (3, "现金及银行存款", 200.0, 250.5),
            (4, "其他应收款", 80.0, 100.0),
            (5, "其中：关联方", 0.0, 10.0),
            (6, "资产合计", 280.0, 350.5),
            (8, "应付款项", 60.0, 70.0),
            (9, "负债合计", 60.0, 70.0),
            (11, "净资产合计", 220.0, 280.5),
        ];
        for (r, label, start, end) in rows {
            sheet.write_string(r, 0, label)?;
            sheet.write_number(r, 2, start)?;
            sheet.write_number(r, 3, end)?;
        }

        book.save(path)?;
        Ok(())
    }

    #[test]
    fn test_xlsx_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("mapping.xlsx");
        let statements_path = dir.path().join("statements.xlsx");
        write_config(&config_path)?;
        write_statements(&statements_path)?;

        let loaded = load_workbook(&statements_path)?;
        let sheet = loaded.sheet("2023年资产负债表").unwrap();
        assert_eq!(sheet.merged_regions().len(), 1);
        assert_eq!(sheet.write_target(CellRef::new(1, 4)), CellRef::new(1, 1));
        assert_eq!(sheet.get(CellRef::new(4, 4)), &CellValue::Number(dec!(250.5)));

        let output = process_files(&config_path, &statements_path)?;
        assert_eq!(output.table.years(), vec![2023]);
        assert!(output
            .table
            .records
            .iter()
            .any(|r| r.subject == "应收款项" && r.period_end == dec!(100)));

        // without a subtotal sheet every subtotal-kind alias is checked
        let checked: Vec<_> = output
            .findings
            .iter()
            .filter(|f| matches!(f.scope, Scope::Subtotal(_)))
            .map(|f| (f.scope.to_string(), f.verdict))
            .collect();
        assert_eq!(
            checked,
            vec![
                ("subtotal '资产总计'".to_string(), Verdict::Pass),
                ("subtotal '负债合计'".to_string(), Verdict::Pass),
                ("subtotal '净资产合计'".to_string(), Verdict::Indeterminate),
            ]
        );

        let equation = output
            .findings
            .iter()
            .find(|f| f.scope == Scope::Identity(IdentityCheck::BalanceEquation))
            .unwrap();
        assert_eq!(equation.verdict, Verdict::Pass);
        Ok(())
    }

    #[test]
    fn test_missing_config_sheet_is_fatal() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let statements_path = dir.path().join("statements.xlsx");
        write_statements(&statements_path)?;

        let result = process_files(&statements_path, &statements_path);
        assert!(matches!(result, Err(ReconcileError::MissingConfigSheet(_))));
        Ok(())
    }
}
