//! Share commands - copy products between branches, list what is missing

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_count, print_json, print_table};
use crate::cli::{parse_branch_id, parse_product_id, runtime, GlobalOpts};
use branchscope::{Engine, ShareOptions, ShareResult};
use branchscope_db::ProductSummary;
use branchscope_ids::BranchId;

#[derive(Debug)]
pub struct ShareArgs {
    pub from: String,
    pub to: String,
    pub products: Vec<String>,
    /// Share every source product the target lacks
    pub all_missing: bool,
    /// Copy variants even when the target product already has them
    pub allow_duplicate_variants: bool,
    pub json: bool,
}

#[derive(Debug)]
pub struct MissingArgs {
    pub from: String,
    pub to: String,
    pub json: bool,
}

pub fn run(args: ShareArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let source = parse_branch_id(&args.from)?;
    let target = parse_branch_id(&args.to)?;
    let mut product_ids = args
        .products
        .iter()
        .map(|p| parse_product_id(p))
        .collect::<anyhow::Result<Vec<_>>>()?;

    if product_ids.is_empty() && !args.all_missing {
        return Err(HelpfulError::new("No products selected")
            .with_suggestions([
                "TRY: Name products: branchscope share --from A --to B <PRODUCT_ID>...".to_string(),
                "TRY: Share everything the target lacks: --all-missing".to_string(),
            ])
            .into());
    }

    let options = ShareOptions {
        skip_existing_variants: !args.allow_duplicate_variants,
    };

    let rt = runtime()?;
    rt.block_on(async move {
        let engine = global.open_engine(None).await?;

        if args.all_missing {
            let missing = engine
                .missing_in_target(&source, &target)
                .await
                .map_err(HelpfulError::from_engine)?;
            product_ids.extend(missing.into_iter().map(|p| p.id));
            if product_ids.is_empty() {
                if args.json {
                    let result = ShareResult {
                        success: true,
                        source_branch_name: branch_name(&engine, &source).await?,
                        target_branch_name: branch_name(&engine, &target).await?,
                        ..Default::default()
                    };
                    return print_json(&result);
                }
                println!("Nothing to share: {} already has every product", target);
                return Ok(());
            }
        }

        let result = engine
            .share_products_with(&source, &target, &product_ids, options)
            .await
            .map_err(HelpfulError::from_engine)?;

        // An aborted share is reported once, through the error path
        if let Some(error) = result.error {
            if !args.json {
                println!("Share aborted: {}", error);
            }
            return Err(HelpfulError::new("Share aborted").with_context(error).into());
        }

        if args.json {
            print_json(&result)
        } else {
            print_result(&result);
            Ok(())
        }
    })
}

async fn branch_name(engine: &Engine, id: &BranchId) -> anyhow::Result<String> {
    let branch = engine
        .db()
        .get_branch(id)
        .await
        .map_err(|e| HelpfulError::from_engine(e.into()))?;
    Ok(branch.map(|b| b.name).unwrap_or_else(|| id.to_string()))
}

fn print_result(result: &ShareResult) {
    for line in result_lines(result) {
        println!("{}", line);
    }
}

fn result_lines(result: &ShareResult) -> Vec<String> {
    let mut lines = vec![format!(
        "Shared {} products and {} variants from {} to {}",
        format_count(result.products_shared),
        format_count(result.variants_shared),
        result.source_branch_name,
        result.target_branch_name
    )];
    if result.skipped_existing > 0 {
        lines.push(format!(
            "Skipped {} products already present in the target",
            format_count(result.skipped_existing)
        ));
    }
    for failure in &result.failures {
        lines.push(format!("FAILED: {} ({})", failure.product_id, failure.cause));
    }
    if !result.success {
        lines.push("  TRY: Re-run the share; products already copied are reused".to_string());
    }
    lines
}

pub fn run_missing(args: MissingArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let source = parse_branch_id(&args.from)?;
    let target = parse_branch_id(&args.to)?;
    let rt = runtime()?;
    rt.block_on(async move {
        let engine = global.open_engine(None).await?;
        let missing = engine
            .missing_in_target(&source, &target)
            .await
            .map_err(HelpfulError::from_engine)?;

        if args.json {
            return print_json(&missing);
        }
        if missing.is_empty() {
            println!("{} has every active product of {}", target, source);
            return Ok(());
        }
        print_products(&missing);
        println!();
        println!(
            "{} products missing. TRY: branchscope share --from {} --to {} --all-missing",
            missing.len(),
            source,
            target
        );
        Ok(())
    })
}

fn print_products(products: &[ProductSummary]) {
    let rows = products
        .iter()
        .map(|p| {
            vec![
                p.id.to_string(),
                p.sku.clone(),
                p.name.clone(),
                p.stock_quantity.to_string(),
                format!("{:.2}", p.selling_price),
                format_count(p.variant_count),
            ]
        })
        .collect();
    print_table(&["ID", "SKU", "NAME", "STOCK", "PRICE", "VARIANTS"], rows);
}
