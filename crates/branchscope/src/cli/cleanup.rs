//! Cleanup command - preview or apply reassign/delete of foreign rows

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_count, print_json, print_table_colored};
use crate::cli::{parse_branch_id, runtime, GlobalOpts};
use branchscope::{CleanupAction, CleanupOptions, CleanupSummary};
use comfy_table::Color;

#[derive(Debug)]
pub struct CleanupArgs {
    pub branch: String,
    pub action: String,
    /// Run for real instead of previewing
    pub apply: bool,
    /// Operator confirmation for a live run
    pub yes: bool,
    pub tables: Vec<String>,
    pub json: bool,
}

impl CleanupArgs {
    fn options(&self) -> anyhow::Result<CleanupOptions> {
        let action = CleanupAction::parse(&self.action)
            .ok_or_else(|| HelpfulError::invalid_action(&self.action))?;
        let mut options = if self.apply {
            CleanupOptions {
                dry_run: false,
                confirmation_required: !self.yes,
                ..CleanupOptions::preview(action)
            }
        } else {
            CleanupOptions::preview(action)
        };
        if !self.tables.is_empty() {
            options = options.only(self.tables.clone());
        }
        Ok(options)
    }
}

pub fn run(args: CleanupArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let branch = parse_branch_id(&args.branch)?;
    let options = args.options()?;
    let rt = runtime()?;
    rt.block_on(async move {
        let engine = global.open_engine(Some(branch)).await?;
        let summary = engine
            .cleanup_branch_data(&options)
            .await
            .map_err(HelpfulError::from_engine)?;

        if args.json {
            print_json(&summary)
        } else {
            print_summary(&summary, &options);
            Ok(())
        }
    })
}

fn print_summary(summary: &CleanupSummary, options: &CleanupOptions) {
    let verb = match (options.action, options.dry_run) {
        (CleanupAction::Reassign, true) => "WOULD REASSIGN",
        (CleanupAction::Delete, true) => "WOULD DELETE",
        (CleanupAction::Reassign, false) => "REASSIGNED",
        (CleanupAction::Delete, false) => "DELETED",
    };
    let alarm = match options.action {
        CleanupAction::Reassign => Color::Yellow,
        CleanupAction::Delete => Color::Red,
    };

    let rows = summary
        .per_table
        .iter()
        .map(|outcome| {
            let color = (outcome.affected > 0).then_some(alarm);
            vec![
                (outcome.table.clone(), None),
                (format_count(outcome.affected), color),
            ]
        })
        .collect();
    print_table_colored(&["TABLE", verb], rows);

    for failure in &summary.errors {
        println!("FAILED: {} ({})", failure.table, failure.cause);
    }

    println!();
    println!(
        "{} rows {} for branch {}",
        format_count(summary.total_affected()),
        verb.to_lowercase(),
        summary.branch_id
    );
    if options.dry_run && summary.total_affected() > 0 {
        println!(
            "  TRY: Apply it: branchscope cleanup --branch {} --action {} --apply --yes",
            summary.branch_id, options.action
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(action: &str, apply: bool, yes: bool) -> CleanupArgs {
        CleanupArgs {
            branch: "main".to_string(),
            action: action.to_string(),
            apply,
            yes,
            tables: Vec::new(),
            json: false,
        }
    }

    #[test]
    fn test_preview_is_default() {
        let options = args("reassign", false, true).options().unwrap();
        assert!(options.dry_run);
        assert_eq!(options.action, CleanupAction::Reassign);
    }

    #[test]
    fn test_apply_without_yes_stays_gated() {
        let options = args("delete", true, false).options().unwrap();
        assert!(!options.dry_run);
        assert!(options.confirmation_required);

        let options = args("delete", true, true).options().unwrap();
        assert!(!options.confirmation_required);
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(args("purge", false, false).options().is_err());
    }

    #[test]
    fn test_table_subset_passed_through() {
        let mut a = args("reassign", false, false);
        a.tables = vec!["orders".to_string()];
        assert_eq!(a.options().unwrap().tables, Some(vec!["orders".to_string()]));
    }
}
