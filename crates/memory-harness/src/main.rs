//! # Memory Harness CLI (`mem`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mem init` | Create memory directories and index schemas |
//! | `mem index` | Rebuild the keyword index, update the vector index |
//! | `mem search <query>` | Hybrid search over both indexes |
//! | `mem status` | Index and directory overview |
//! | `mem load` | Print the budgeted session-start context |
//! | `mem remember <text>` | Append a note to the right memory file |
//!
//! ## Examples
//!
//! ```bash
//! mem init
//! mem index
//! mem search "why postgres" --limit 5
//! DATABASE_URL=postgresql://localhost/memory mem search auth --mode vector
//! mem load --budget 1500
//! mem remember "We decided to keep FTS5 as the fallback"
//! ```

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use memory_harness::backends::Backends;
use memory_harness::config::{self, Config};
use memory_harness::embedding::EmbedPurpose;
use memory_harness::remember::{remember, MemoryRoots};
use memory_harness::scanner::Scanner;
use memory_harness::search::SearchMode;
use memory_harness::{context, indexer, init, logging, search, status};

/// Memory Harness: hybrid search and budgeted context over markdown memory
/// files.
#[derive(Parser)]
#[command(
    name = "mem",
    about = "Memory Harness: hybrid search and budgeted context over markdown memory files",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `~/.claude/memory/mem.toml`. A missing file means
    /// built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override `[memory] global_root`.
    #[arg(long, global = true)]
    global_root: Option<PathBuf>,

    /// Override `[memory] project_root`.
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace). `MEM_LOG`
    /// takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the memory directories and index schemas.
    ///
    /// Idempotent.
    Init,

    /// Rebuild the keyword index and bring the vector index up to date.
    ///
    /// Unchanged files are skipped on the vector side; files removed from
    /// disk are dropped from it.
    Index {
        /// Print the counts as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search memory files.
    ///
    /// The keyword index is rebuilt from disk first.
    Search {
        /// Query words.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Maximum number of results (default from `[retrieval] limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Which backends to use.
        #[arg(long, value_enum, default_value_t = SearchMode::Hybrid)]
        mode: SearchMode,

        /// Print results as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Show index counts, vector reachability and memory directories.
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Print the session-start memory bundle.
    Load {
        /// Token budget (default from `[context] budget`).
        #[arg(long)]
        budget: Option<usize>,

        /// Print `{"text", "tokens"}` instead of the bundle.
        #[arg(long)]
        json: bool,
    },

    /// Append a note to the memory file it belongs in.
    ///
    /// Text containing credentials is refused.
    Remember {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(config::default_config_path);
        let mut config = config::load_config(&path)?;

        if let Some(root) = &self.global_root {
            config.memory.global_root = root.clone();
        }
        if let Some(root) = &self.project_root {
            config.memory.project_root = root.clone();
        }
        config.resolve_paths()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let config = cli.load_config()?;

    match cli.command {
        Commands::Init => {
            init::run_init(&config).await?;
        }
        Commands::Index { json } => {
            let scanner = Scanner::with_globs(config.roots(), &config.memory.include_globs)?;
            let backends = Backends::open(&config, EmbedPurpose::Indexing).await?;
            let result = indexer::run_index(&config, &backends, &scanner, json).await;
            backends.close().await;
            result?;
        }
        Commands::Search {
            query,
            limit,
            mode,
            json,
        } => {
            let query = query.join(" ");
            let scanner = Scanner::with_globs(config.roots(), &config.memory.include_globs)?;
            let backends = Backends::open(&config, EmbedPurpose::Query).await?;
            let result =
                search::run_search(&config, &backends, &scanner, &query, limit, mode, json).await;
            backends.close().await;
            result?;
        }
        Commands::Status { json } => {
            let scanner = Scanner::with_globs(config.roots(), &config.memory.include_globs)?;
            let backends = Backends::open(&config, EmbedPurpose::Query).await?;
            let result = status::run_status(&config, &backends, &scanner, json).await;
            backends.close().await;
            result?;
        }
        Commands::Load { budget, json } => {
            context::run_load(&config, budget, json)?;
        }
        Commands::Remember { text } => {
            let roots = MemoryRoots {
                global: config.memory.global_root.clone(),
                project: config.memory.project_root.clone(),
            };
            let receipt = remember(&text.join(" "), &roots, chrono::Utc::now())?;
            println!(
                "Remembered in [{}] {} ({})",
                receipt.tier,
                receipt.path.display(),
                receipt.section
            );
            println!("  {}", receipt.entry);
        }
    }

    Ok(())
}
