//! Init command - create the database and a default config file

use crate::cli::error::HelpfulError;
use crate::cli::output::print_json;
use crate::cli::{runtime, GlobalOpts};
use branchscope::{EngineConfig, TableRegistry};
use branchscope_db::BranchDb;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug)]
pub struct InitArgs {
    pub force: bool,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    config_path: PathBuf,
    config_written: bool,
    database_path: PathBuf,
    tables: usize,
}

pub fn run(args: InitArgs, global: &GlobalOpts) -> anyhow::Result<()> {
    let config_path = match &global.config {
        Some(path) => path.clone(),
        None => EngineConfig::default_path().map_err(HelpfulError::from_engine)?,
    };

    let write_config = args.force || !config_path.exists();
    let mut config = if write_config {
        EngineConfig::default()
    } else {
        EngineConfig::load_from(&config_path).map_err(HelpfulError::from_engine)?
    };
    if let Some(db) = &global.db {
        config.database_path = Some(db.clone());
    }
    let database_path = config.database_path().map_err(HelpfulError::from_engine)?;

    if write_config {
        config.database_path = Some(database_path.clone());
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, toml::to_string_pretty(&config)?).map_err(|e| {
            HelpfulError::new(format!("Cannot write {}", config_path.display()))
                .with_context(e.to_string())
                .with_suggestion("TRY: Check directory permissions or pass --config <PATH>")
        })?;
    }

    let rt = runtime()?;
    let tables = rt.block_on(async {
        let db = BranchDb::open(&database_path).await.map_err(|e| {
            HelpfulError::new("Failed to create database")
                .with_context(format!("{}: {}", database_path.display(), e))
                .with_suggestion("TRY: Pass a writable location with --db <PATH>")
        })?;
        let registry = config.registry().map_err(HelpfulError::from_engine)?;
        registry
            .verify_scope(&db)
            .await
            .map_err(HelpfulError::from_engine)?;
        db.close().await;
        Ok::<usize, HelpfulError>(registry.len())
    })?;

    let output = InitOutput {
        config_path,
        config_written: write_config,
        database_path,
        tables,
    };

    if args.json {
        return print_json(&output);
    }

    if output.config_written {
        println!("Wrote config:   {}", output.config_path.display());
    } else {
        println!("Kept config:    {}", output.config_path.display());
    }
    println!("Database ready: {}", output.database_path.display());
    println!(
        "Scoped tables:  {} ({} built in)",
        output.tables,
        TableRegistry::default_tables().len()
    );
    Ok(())
}
