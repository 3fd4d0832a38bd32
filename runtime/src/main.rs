// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use snipe_runtime::cli;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "snipe",
    about = "Snipe — marketplace listing alerts and guarded auto-purchase",
    version,
    after_help = "Run 'snipe <command> --help' for details on each command.\nTunables are read from SNIPE_* environment variables."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single scan cycle over the active filters
    Scan {
        /// JSON file holding an array of filters
        #[arg(long)]
        filters: PathBuf,
        /// Alert journal (defaults to ~/.snipe/alerts.jsonl)
        #[arg(long)]
        alerts: Option<PathBuf>,
    },
    /// Scan repeatedly until interrupted
    Watch {
        /// JSON file holding an array of filters
        #[arg(long)]
        filters: PathBuf,
        /// Alert journal (defaults to ~/.snipe/alerts.jsonl)
        #[arg(long)]
        alerts: Option<PathBuf>,
        /// Seconds between cycle starts
        #[arg(long, default_value = "60")]
        interval: u64,
    },
    /// Run the purchase decision gate for one listing
    Attempt {
        /// Upstream item id
        item_id: String,
        /// Refuse the purchase above this price
        #[arg(long)]
        max_price: f64,
        /// Checkout credential token
        #[arg(long)]
        token: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(json: bool, verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("snipe_runtime={level}")));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Global flags go through the environment so output helpers can check them
    if cli.json {
        std::env::set_var("SNIPE_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("SNIPE_QUIET", "1");
    }
    init_tracing(cli.json, cli.verbose);

    let result = match cli.command {
        Commands::Scan { filters, alerts } => cli::scan_cmd::run(&filters, alerts.as_deref()).await,
        Commands::Watch {
            filters,
            alerts,
            interval,
        } => cli::watch_cmd::run(&filters, alerts.as_deref(), interval).await,
        Commands::Attempt {
            item_id,
            max_price,
            token,
        } => cli::attempt_cmd::run(&item_id, max_price, &token).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "snipe", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
