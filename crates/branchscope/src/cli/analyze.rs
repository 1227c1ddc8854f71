//! Analysis commands - ownership report and per-feature isolation test

use crate::cli::error::HelpfulError;
use crate::cli::output::{count_cell, format_count, print_json, print_table_colored};
use crate::cli::{parse_branch_id, runtime, GlobalOpts};
use branchscope::{
    AnalysisReport, BranchDebugInfo, Caution, Engine, IsolationTestResult, StaticBranchContext,
};
use comfy_table::Color;
use std::sync::Arc;

#[derive(Debug)]
pub struct AnalyzeArgs {
    pub branch: String,
    pub json: bool,
}

#[derive(Debug)]
pub struct IsolationTestArgs {
    pub branch: String,
    pub extended: bool,
    pub json: bool,
}

pub fn run(args: AnalyzeArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let branch = parse_branch_id(&args.branch)?;
    let rt = runtime()?;
    rt.block_on(async move {
        let engine = global.open_engine(Some(branch)).await?;
        let report = engine
            .run_full_analysis()
            .await
            .map_err(HelpfulError::from_engine)?;

        if args.json {
            print_json(&report)
        } else {
            print_analysis(&report);
            Ok(())
        }
    })
}

fn print_analysis(report: &AnalysisReport) {
    let rows = report
        .reports
        .iter()
        .map(|r| {
            vec![
                (r.table.clone(), None),
                (format_count(r.total_records), None),
                (format_count(r.current_branch_records), Some(Color::Green)),
                count_cell(r.other_branch_records, Color::Red),
                count_cell(r.unassigned_records, Color::Yellow),
            ]
        })
        .collect();
    print_table_colored(
        &["TABLE", "TOTAL", "THIS BRANCH", "OTHER BRANCHES", "UNASSIGNED"],
        rows,
    );

    for failure in &report.scan_errors {
        println!("SCAN FAILED: {} ({})", failure.table, failure.cause);
    }

    println!();
    if report.has_violation {
        println!(
            "VIOLATION: {} rows belong to other branches",
            format_count(report.total_other())
        );
        println!(
            "  TRY: Preview a fix: branchscope cleanup --branch {}",
            report.branch_id
        );
    } else {
        println!("No rows from other branches.");
    }
    if report.has_unassigned {
        println!(
            "NOTE: {} rows have no branch; cleanup never touches them",
            format_count(report.total_unassigned())
        );
    }
}

pub fn run_isolation_test(args: IsolationTestArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let branch = parse_branch_id(&args.branch)?;
    let rt = runtime()?;
    rt.block_on(async move {
        let mut config = global.load_config()?;
        if args.extended {
            config.extended_features = true;
        }
        let context = Arc::new(StaticBranchContext::default());
        let engine = Engine::open(config, context)
            .await
            .map_err(HelpfulError::from_engine)?;
        let info = engine
            .run_full_isolation_test(&branch)
            .await
            .map_err(HelpfulError::from_engine)?;

        if args.json {
            print_json(&info)
        } else {
            print_debug_info(&info);
            Ok(())
        }
    })
}

fn status(result: &IsolationTestResult) -> (String, Option<Color>) {
    match (result.passed, result.caution) {
        (false, _) => ("FAIL".to_string(), Some(Color::Red)),
        (true, Some(Caution::ForeignRecordsVisible)) => ("WARN shared".to_string(), Some(Color::Yellow)),
        (true, Some(Caution::NoLocalRecords)) => ("WARN empty".to_string(), Some(Color::Yellow)),
        (true, None) => ("PASS".to_string(), Some(Color::Green)),
    }
}

fn print_debug_info(info: &BranchDebugInfo) {
    println!(
        "Branch {} ({}), mode: {}",
        info.branch_name, info.branch_id, info.isolation_mode
    );

    let rows = info
        .test_results
        .iter()
        .map(|r| {
            vec![
                (r.feature.to_string(), None),
                status(r),
                (r.expected.as_str().to_string(), None),
                (
                    r.actual.map(|a| a.as_str()).unwrap_or("-").to_string(),
                    None,
                ),
                (format_count(r.data_count.current_branch), None),
                count_cell(r.data_count.other_branches, Color::Yellow),
                (r.details.clone(), None),
            ]
        })
        .collect();
    print_table_colored(
        &["FEATURE", "STATUS", "EXPECTED", "ACTUAL", "LOCAL", "FOREIGN", "DETAILS"],
        rows,
    );

    let s = info.summary;
    println!(
        "{} tests: {} passed, {} failed, {} warnings",
        s.total_tests, s.passed, s.failed, s.warnings
    );
}
