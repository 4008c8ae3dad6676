//! # ts-lens CLI (`tsl`)
//!
//! The `tsl` binary searches a Typesense-compatible server from the
//! terminal, either one query at a time or through an interactive session.
//!
//! ## Usage
//!
//! ```bash
//! tsl --config ./config/tsl.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tsl health` | Check the connection |
//! | `tsl indexes` | List indexes with alias names and document counts |
//! | `tsl aliases` | List aliases, flagging broken ones |
//! | `tsl resolve <name>` | Show how a name resolves |
//! | `tsl search <index>` | Run one search and print the page |
//! | `tsl browse <index>` | Interactive session over stdin |
//! | `tsl completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # List every document of an alias, newest first
//! tsl search books --sort year:desc
//!
//! # Text query with structured filters
//! tsl search books -q river --range year=1990..2000 --prefix author=Mar
//!
//! # Raw filter, second page, JSON output
//! tsl search books --filter 'year:>2000' --page 2 --json
//!
//! # Use a non-default connection with debug logging
//! tsl -v --connection staging indexes
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ts_lens::client::TypesenseClient;
use ts_lens::search::SearchArgs;
use ts_lens::{browse, catalog, config, search};

/// ts-lens: search Typesense-compatible servers from the terminal.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tsl.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "tsl", version, about = "ts-lens: search Typesense-compatible servers")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tsl.toml")]
    config: PathBuf,

    /// Connection to use. Defaults to `default_connection`, or the only one.
    #[arg(long, global = true)]
    connection: Option<String>,

    /// Log more (`-v` debug, `-vv` trace). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server is reachable and healthy.
    Health,

    /// List indexes.
    ///
    /// Indexes with an alias are shown under the alias name.
    Indexes,

    /// List aliases and the index each points at.
    Aliases,

    /// Show how a name resolves through the alias list.
    Resolve {
        /// Index or alias name.
        name: String,
    },

    /// Run a single search and print one page of hits.
    Search(SearchArgs),

    /// Browse an index interactively.
    ///
    /// Reads commands from stdin (`help` lists them). Text and raw filter
    /// edits are debounced; only the newest answer is ever shown.
    Browse {
        /// Index or alias to open.
        index: String,
    },

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "tsl", &mut std::io::stdout());
        return Ok(());
    }

    init_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let client = TypesenseClient::from_config(&cfg, cli.connection.as_deref())?;

    match cli.command {
        Commands::Health => {
            catalog::run_health(&client, &client.node()).await?;
        }
        Commands::Indexes => {
            catalog::run_indexes(&client).await?;
        }
        Commands::Aliases => {
            catalog::run_aliases(&client).await?;
        }
        Commands::Resolve { name } => {
            catalog::run_resolve(&client, &name).await?;
        }
        Commands::Search(args) => {
            search::run_search(&client, &cfg.settings, &args).await?;
        }
        Commands::Browse { index } => {
            browse::run_browse(Arc::new(client), cfg.settings.clone(), &index).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
