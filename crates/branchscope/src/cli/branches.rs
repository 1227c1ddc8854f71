//! Branch commands - list branches and create/update one

use crate::cli::error::HelpfulError;
use crate::cli::output::{print_json, print_table};
use crate::cli::{parse_branch_id, runtime, GlobalOpts};
use branchscope::FeatureKey;
use branchscope_db::{Branch, IsolationMode};
use branchscope_ids::BranchId;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct BranchesArgs {
    pub all: bool,
    pub json: bool,
}

#[derive(Debug)]
pub struct BranchSetArgs {
    pub id: String,
    pub name: Option<String>,
    pub code: Option<String>,
    pub mode: Option<String>,
    pub inactive: bool,
    /// Features to mark shared (hybrid mode)
    pub share: Vec<String>,
    /// Features to mark isolated (hybrid mode)
    pub isolate: Vec<String>,
    pub json: bool,
}

pub fn run(args: BranchesArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let rt = runtime()?;
    rt.block_on(list_async(args, global))
}

async fn list_async(args: BranchesArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let engine = global.open_engine(None).await?;
    let branches = engine
        .list_branches(args.all)
        .await
        .map_err(HelpfulError::from_engine)?;

    if args.json {
        return print_json(&branches);
    }

    if branches.is_empty() {
        println!("No branches. Create one with: branchscope branch-set <ID> --name <NAME>");
        return Ok(());
    }

    let mut rows = Vec::with_capacity(branches.len());
    for branch in &branches {
        let flags = engine
            .db()
            .feature_sharing(&branch.id)
            .await
            .map_err(|e| HelpfulError::from_engine(e.into()))?;
        rows.push(vec![
            branch.id.to_string(),
            branch.name.clone(),
            branch.code.clone().unwrap_or_default(),
            branch.isolation_mode.to_string(),
            if branch.is_active { "yes" } else { "no" }.to_string(),
            shared_features(&flags),
        ]);
    }
    print_table(
        &["ID", "NAME", "CODE", "MODE", "ACTIVE", "SHARED FEATURES"],
        rows,
    );
    Ok(())
}

fn shared_features(flags: &BTreeMap<String, bool>) -> String {
    let shared: Vec<&str> = flags
        .iter()
        .filter(|(_, shared)| **shared)
        .map(|(key, _)| key.as_str())
        .collect();
    if shared.is_empty() {
        "-".to_string()
    } else {
        shared.join(", ")
    }
}

pub fn run_set(args: BranchSetArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let id = parse_branch_id(&args.id)?;
    let mode = args
        .mode
        .as_deref()
        .map(|m| IsolationMode::parse(m).ok_or_else(|| HelpfulError::invalid_mode(m)))
        .transpose()?;
    let mut flags = Vec::new();
    for (names, shared) in [(&args.share, true), (&args.isolate, false)] {
        for name in names {
            let feature: FeatureKey = name.parse().map_err(HelpfulError::from_engine)?;
            flags.push((feature, shared));
        }
    }

    let rt = runtime()?;
    rt.block_on(set_async(args, id, mode, flags, global))
}

async fn set_async(
    args: BranchSetArgs,
    id: BranchId,
    mode: Option<IsolationMode>,
    flags: Vec<(FeatureKey, bool)>,
    global: &GlobalOpts,
) -> anyhow::Result<()> {
    let engine = global.open_engine(None).await?;
    let existing = engine
        .db()
        .get_branch(&id)
        .await
        .map_err(|e| HelpfulError::from_engine(e.into()))?;

    let branch = match existing {
        Some(current) => Branch {
            name: args.name.unwrap_or(current.name),
            code: args.code.or(current.code),
            isolation_mode: mode.unwrap_or(current.isolation_mode),
            is_active: !args.inactive,
            id: current.id,
        },
        None => Branch {
            name: args.name.ok_or_else(|| {
                HelpfulError::new(format!("Branch {} does not exist yet", id))
                    .with_suggestion(format!("TRY: branchscope branch-set {} --name <NAME>", id))
            })?,
            code: args.code,
            isolation_mode: mode.unwrap_or(IsolationMode::Isolated),
            is_active: !args.inactive,
            id: id.clone(),
        },
    };

    engine
        .upsert_branch(&branch)
        .await
        .map_err(HelpfulError::from_engine)?;
    for (feature, shared) in &flags {
        engine
            .set_feature_sharing(&branch.id, *feature, *shared)
            .await
            .map_err(HelpfulError::from_engine)?;
    }

    if args.json {
        return print_json(&branch);
    }
    println!(
        "Saved branch {} ({}, {})",
        branch.id, branch.name, branch.isolation_mode
    );
    if !flags.is_empty() && branch.isolation_mode != IsolationMode::Hybrid {
        println!(
            "Note: feature flags only apply in hybrid mode; {} mode fixes every feature",
            branch.isolation_mode
        );
    }
    Ok(())
}
