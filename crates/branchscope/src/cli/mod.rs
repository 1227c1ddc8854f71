//! CLI module for Branchscope
//!
//! Each command parses its arguments, builds a Tokio runtime, opens the
//! engine and prints either a table or JSON.

pub mod error;
pub mod output;

pub mod analyze;
pub mod branches;
pub mod cleanup;
pub mod init;
pub mod share;

use crate::cli::error::HelpfulError;
use branchscope::{Engine, EngineConfig, StaticBranchContext};
use branchscope_ids::{BranchId, ProductId};
use std::path::PathBuf;
use std::sync::Arc;

/// Options shared by every command
#[derive(Debug, Clone, Default)]
pub struct GlobalOpts {
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

impl GlobalOpts {
    /// Config file contents with command-line overrides applied
    pub fn load_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load_from(path),
            None => EngineConfig::load(),
        }
        .map_err(HelpfulError::from_engine)?;

        if let Some(db) = &self.db {
            config.database_path = Some(db.clone());
        }
        if self.verbose {
            config.debug_mode = true;
        }
        Ok(config)
    }

    /// Open the engine with `branch` as the active branch
    pub async fn open_engine(&self, branch: Option<BranchId>) -> anyhow::Result<Engine> {
        let config = self.load_config()?;
        let context = Arc::new(StaticBranchContext::new(branch));
        let engine = Engine::open(config, context)
            .await
            .map_err(HelpfulError::from_engine)?;
        Ok(engine)
    }
}

/// Runtime for one command invocation
pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

pub fn parse_branch_id(value: &str) -> anyhow::Result<BranchId> {
    BranchId::parse(value).map_err(|e| HelpfulError::invalid_id("branch ID", value, e).into())
}

pub fn parse_product_id(value: &str) -> anyhow::Result<ProductId> {
    ProductId::parse(value).map_err(|e| HelpfulError::invalid_id("product ID", value, e).into())
}
