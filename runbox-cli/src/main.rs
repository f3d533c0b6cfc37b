mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use runbox_sandbox::DEFAULT_TIMEOUT_SECS;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "runbox")]
#[command(about = "Local code-execution sandbox driven by a remote agent backend")]
#[command(version)]
pub struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to a backend over WebSocket and serve execution requests
    Connect {
        /// Backend WebSocket URL
        url: String,

        /// Override the execution queue path
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
    /// Execute a code file (or stdin) locally, streaming output
    Exec {
        /// Working directory for the execution
        #[arg(short, long, default_value = "~/runbox_workdir")]
        work_dir: String,

        /// Code file to run; reads stdin when omitted
        file: Option<PathBuf>,

        /// Language of the code (python, bash)
        #[arg(short, long, default_value = "python")]
        language: String,

        /// Timeout in seconds
        #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_SECS)]
        timeout: u64,
    },
    /// Install packages into a working directory's virtual environment
    Install {
        /// Working directory whose venv receives the packages
        #[arg(short, long, default_value = "~/runbox_workdir")]
        work_dir: String,

        /// Package specs (name, name[extra], name==version)
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Show execution queue statistics
    Status {
        /// Override the execution queue path
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Dump every record instead of the counters
        #[arg(long)]
        full: bool,
    },
    /// Prune stale workspace files and old execution records
    Cleanup {
        /// Working directory to prune
        #[arg(short, long, default_value = "~/runbox_workdir")]
        work_dir: String,

        /// Age threshold in days
        #[arg(long, default_value_t = 7)]
        max_age_days: u64,

        /// Override the execution queue path
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Connect { url, ledger } => commands::connect(url, ledger).await,
        Commands::Exec {
            work_dir,
            file,
            language,
            timeout,
        } => commands::exec(work_dir, file, language, timeout).await,
        Commands::Install { work_dir, packages } => commands::install(work_dir, packages).await,
        Commands::Status { ledger, full } => commands::status(ledger, full).await,
        Commands::Cleanup {
            work_dir,
            max_age_days,
            ledger,
        } => commands::cleanup(work_dir, max_age_days, ledger).await,
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
