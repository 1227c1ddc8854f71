//! Branchscope command-line launcher
//!
//! Audits branch-scoped tables for rows owned by the wrong branch, repairs
//! them, and copies catalog products between branches.

use branchscope_logging::{init_logging, LogConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::GlobalOpts;

#[derive(Parser, Debug)]
#[command(
    name = "branchscope",
    version,
    about = "Audit and repair branch isolation in a multi-branch retail database"
)]
struct Cli {
    /// SQLite database to operate on (overrides the config file)
    #[arg(long, global = true, env = "BRANCHSCOPE_DB")]
    db: Option<PathBuf>,

    /// Config file (default: ~/.branchscope/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database and write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List branches and their shared features
    Branches {
        /// Include inactive branches
        #[arg(short, long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create or update a branch
    BranchSet {
        /// Branch ID
        id: String,

        /// Display name (required for a new branch)
        #[arg(long)]
        name: Option<String>,

        /// Short branch code
        #[arg(long)]
        code: Option<String>,

        /// Isolation mode: shared, isolated or hybrid
        #[arg(long)]
        mode: Option<String>,

        /// Mark the branch inactive
        #[arg(long)]
        inactive: bool,

        /// Feature to share across branches in hybrid mode (repeatable)
        #[arg(long = "share", value_name = "FEATURE")]
        share: Vec<String>,

        /// Feature to keep branch-local in hybrid mode (repeatable)
        #[arg(long = "isolate", value_name = "FEATURE")]
        isolate: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Count rows per table by owning branch
    Analyze {
        /// Branch to audit
        #[arg(short, long)]
        branch: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check each feature's visibility against the branch settings
    IsolationTest {
        /// Branch to test
        #[arg(short, long)]
        branch: String,

        /// Also test gift cards and employees
        #[arg(long)]
        extended: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reassign or delete rows other branches own (preview by default)
    Cleanup {
        /// Branch whose tables are cleaned
        #[arg(short, long)]
        branch: String,

        /// What to do with foreign rows: reassign or delete
        #[arg(long, default_value = "reassign")]
        action: String,

        /// Change data instead of previewing
        #[arg(long)]
        apply: bool,

        /// Confirm a live run
        #[arg(short, long)]
        yes: bool,

        /// Restrict to these tables (repeatable)
        #[arg(short, long = "table", value_name = "TABLE")]
        tables: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Copy products and their parent variants to another branch
    Share {
        /// Source branch
        #[arg(long)]
        from: String,

        /// Target branch
        #[arg(long)]
        to: String,

        /// Product IDs to copy
        products: Vec<String>,

        /// Copy every active source product the target lacks
        #[arg(long)]
        all_missing: bool,

        /// Copy variants even if the target product already has them
        #[arg(long)]
        allow_duplicate_variants: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List active source products the target branch lacks
    Missing {
        /// Source branch
        #[arg(long)]
        from: String,

        /// Target branch
        #[arg(long)]
        to: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Init { json, .. }
        | Commands::Branches { json, .. }
        | Commands::BranchSet { json, .. }
        | Commands::Analyze { json, .. }
        | Commands::IsolationTest { json, .. }
        | Commands::Cleanup { json, .. }
        | Commands::Share { json, .. }
        | Commands::Missing { json, .. } => *json,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = command_wants_json(&cli.command);

    if let Err(err) = init_logging(LogConfig {
        app_name: "branchscope",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(1)
        }
    }
}

fn run_command(cli: Cli) -> anyhow::Result<()> {
    let global = GlobalOpts {
        db: cli.db,
        config: cli.config,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Init { force, json } => cli::init::run(cli::init::InitArgs { force, json }, &global),
        Commands::Branches { all, json } => {
            cli::branches::run(cli::branches::BranchesArgs { all, json }, &global)
        }
        Commands::BranchSet {
            id,
            name,
            code,
            mode,
            inactive,
            share,
            isolate,
            json,
        } => cli::branches::run_set(
            cli::branches::BranchSetArgs {
                id,
                name,
                code,
                mode,
                inactive,
                share,
                isolate,
                json,
            },
            &global,
        ),
        Commands::Analyze { branch, json } => {
            cli::analyze::run(cli::analyze::AnalyzeArgs { branch, json }, &global)
        }
        Commands::IsolationTest {
            branch,
            extended,
            json,
        } => cli::analyze::run_isolation_test(
            cli::analyze::IsolationTestArgs {
                branch,
                extended,
                json,
            },
            &global,
        ),
        Commands::Cleanup {
            branch,
            action,
            apply,
            yes,
            tables,
            json,
        } => cli::cleanup::run(
            cli::cleanup::CleanupArgs {
                branch,
                action,
                apply,
                yes,
                tables,
                json,
            },
            &global,
        ),
        Commands::Share {
            from,
            to,
            products,
            all_missing,
            allow_duplicate_variants,
            json,
        } => cli::share::run(
            cli::share::ShareArgs {
                from,
                to,
                products,
                all_missing,
                allow_duplicate_variants,
                json,
            },
            &global,
        ),
        Commands::Missing { from, to, json } => {
            cli::share::run_missing(cli::share::MissingArgs { from, to, json }, &global)
        }
    }
}
