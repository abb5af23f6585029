mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rootcause",
    about = "Trace an issue's diagnostic context back to its root cause",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .rootcause/ or .git/)
    #[arg(long, global = true, env = "ROOTCAUSE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch an issue's context, trace it upstream, and report the root cause
    Analyze {
        /// Issue id (e.g. 12345678, CHECKOUT-4F2) or issue URL
        issue: String,

        /// Analyze a saved context file instead of invoking the fetcher
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Override the fetch timeout in seconds (0 waits indefinitely)
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Parse a saved context file and print the normalized record
    Parse {
        /// Context file as printed by the issue CLI
        file: PathBuf,
    },

    /// Inspect and initialize configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Analyze {
            issue,
            input,
            timeout,
        } => cmd::analyze::run(&root, &issue, input.as_deref(), timeout, cli.json),
        Commands::Parse { file } => cmd::parse::run(&file, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
