use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use statement_reconciler::{
    change_direction, process_files, process_workbook, MappingConfig, ReconciliationOutput, Sheet,
    Verdict, Workbook,
};
use std::error::Error;

const MAPPING: &str = r#"{
    "aliases": [
        {"canonical": "资产总计", "kind": "subtotal", "aliases": ["资产合计"]},
        {"canonical": "负债合计", "kind": "subtotal"},
        {"canonical": "净资产合计", "kind": "subtotal"},
        {"canonical": "收入合计", "kind": "subtotal"},
        {"canonical": "费用合计", "kind": "subtotal"},
        {"canonical": "货币资金", "aliases": ["现金"]}
    ],
    "blocks": [
        {"mode": "range", "name": "资产", "start_cell": "A3", "end_cell": "A5",
         "start_column": "C", "end_column": "D", "group": "资产总计"},
        {"mode": "range", "name": "负债", "start_cell": "A6", "end_cell": "A6",
         "start_column": "C", "end_column": "D"},
        {"mode": "range", "name": "净资产", "start_cell": "A7", "end_cell": "A7",
         "start_column": "C", "end_column": "D"},
        {"mode": "point", "name": "收支", "label_column": "A", "items": [
            {"subject": "捐赠收入", "start_cell": "C3", "end_cell": "D3", "group": "收入合计"},
            {"subject": "收入合计", "start_cell": "C4", "end_cell": "D4"},
            {"subject": "费用合计", "start_cell": "C5", "end_cell": "D5"}
        ]}
    ],
    "subtotals": [{"name": "资产总计", "statement": "balance"}]
}"#;

fn fill(sheet: &mut Sheet, rows: &[(u32, &str, Decimal, Decimal)]) -> Result<(), Box<dyn Error>> {
    for (row, label, start, end) in rows {
        sheet.set_text(&format!("A{}", row), label)?;
        sheet.set_number(&format!("C{}", row), *start)?;
        sheet.set_number(&format!("D{}", row), *end)?;
    }
    Ok(())
}

fn fixture() -> Result<Workbook, Box<dyn Error>> {
    let mut balance_2022 = Sheet::new("2022资产负债表");
    fill(
        &mut balance_2022,
        &[
            (3, "货币资金", dec!(800), dec!(900)),
            (4, "应收款项", dec!(200), dec!(250)),
            (5, "资产合计", dec!(1000), dec!(1150)),
            (6, "负债合计", dec!(400), dec!(420)),
            (7, "净资产合计", dec!(600), dec!(730)),
        ],
    )?;

    let mut activity_2022 = Sheet::new("2022业务活动表");
    fill(
        &mut activity_2022,
        &[
            (3, "捐赠收入", dec!(0), dec!(500)),
            (4, "收入合计", dec!(0), dec!(500)),
            (5, "费用合计", dec!(0), dec!(370)),
        ],
    )?;

    // 2023 assets are misstated by 50 on purpose.
    let mut balance_2023 = Sheet::new("2023资产负债表");
    fill(
        &mut balance_2023,
        &[
            (3, "现金", dec!(900), dec!(950)),
            (4, "应收款项", dec!(250), dec!(300)),
            (5, "资产合计", dec!(1150), dec!(1300)),
            (6, "负债合计", dec!(420), dec!(450)),
            (7, "净资产合计", dec!(730), dec!(800)),
        ],
    )?;

    let mut activity_2023 = Sheet::new("2023业务活动表");
    fill(
        &mut activity_2023,
        &[
            (3, "捐赠收入", dec!(0), dec!(300)),
            (4, "收入合计", dec!(0), dec!(300)),
            (5, "费用合计", dec!(0), dec!(230)),
        ],
    )?;

    Ok(Workbook::new(vec![
        balance_2022,
        activity_2022,
        balance_2023,
        activity_2023,
    ]))
}

fn report(output: &ReconciliationOutput) {
    println!("📋 Extracted {} records", output.table.len());
    for (subject, by_year) in output.table.pivot_closing() {
        let cells: Vec<String> = by_year
            .iter()
            .map(|(year, amount)| format!("{}: {:>10.2}", year, amount))
            .collect();
        println!("  {:<12} {}", subject, cells.join("  "));
    }

    if !output.skipped_sheets.is_empty() {
        println!("\n⏭️  Skipped sheets:");
        for skipped in &output.skipped_sheets {
            println!("  {} ({})", skipped.name, skipped.reason);
        }
    }

    println!("\n🔍 Findings:");
    for finding in &output.findings {
        let glyph = match finding.verdict {
            Verdict::Pass => "✅",
            Verdict::Fail => "❌",
            Verdict::Indeterminate => "❔",
        };
        println!("  {} {}", glyph, finding);
    }

    println!("\n📊 Summary:");
    for (key, value) in &output.summary {
        println!("  {:<20} {:>12}", key, value);
    }
    if let Some(change) = output.summary.get("net_assets_change") {
        println!("  net assets: {}", change_direction(*change));
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let output = match args.as_slice() {
        [config_path, workbook_path] => {
            println!("📂 Reconciling {} with {}\n", workbook_path, config_path);
            process_files(config_path, workbook_path)?
        }
        _ => {
            println!("🧪 No files given; reconciling the built-in fixture\n");
            let config = MappingConfig::from_json_str(MAPPING)?;
            process_workbook(&config, &fixture()?)?
        }
    };

    report(&output);

    if output.is_reconciled() {
        println!("\n✅ All checks passed");
    } else {
        println!(
            "\n⚠️  {} failed, {} indeterminate",
            output.failures().count(),
            output.indeterminate().count()
        );
    }

    Ok(())
}
