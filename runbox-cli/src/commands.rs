//! Subcommand implementations

use anyhow::{Context, Result};
use runbox_channel::{ws_connect, ChannelHandler};
use runbox_sandbox::{
    validate_request, CodeBlock, CodeExecutor, ExecutionLedger, OutputChunk, PythonEnv,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Serve a backend connection, reconnecting until interrupted.
pub async fn connect(url: String, ledger_path: Option<PathBuf>) -> Result<()> {
    let path = ledger_path.unwrap_or_else(ExecutionLedger::default_path);
    let ledger = Arc::new(ExecutionLedger::open(&path).await?);
    info!(queue = %path.display(), "execution queue loaded");

    let handler = ChannelHandler::new(ledger);
    loop {
        match ws_connect(&url).await {
            Ok((sender, receiver)) => {
                info!(url, "connected");
                if let Err(err) = handler.run(sender, receiver).await {
                    warn!(%err, "connection lost");
                }
            }
            Err(err) => {
                warn!(%err, url, "connect failed");
            }
        }
        info!(delay = ?RECONNECT_DELAY, "reconnecting");
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Run one code file (or stdin) locally, mirroring its exit code.
pub async fn exec(
    work_dir: String,
    file: Option<PathBuf>,
    language: String,
    timeout: u64,
) -> Result<()> {
    let code = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let blocks = vec![CodeBlock::new(code, language)];
    validate_request(&work_dir, &blocks)?;

    let (live_tx, mut live_rx) = mpsc::channel::<OutputChunk>(128);
    let printer = tokio::spawn(async move {
        while let Some(chunk) = live_rx.recv().await {
            match chunk {
                OutputChunk::Stdout(line) => print!("{line}"),
                OutputChunk::Stderr(line) => eprint!("{line}"),
            }
        }
    });

    let executor = CodeExecutor::new(&work_dir);
    let result = executor
        .execute_code_blocks(&blocks, Duration::from_secs(timeout), Some(live_tx))
        .await?;
    let _ = printer.await;

    if !result.files_created.is_empty() {
        eprintln!("\nFiles created:");
        for file in &result.files_created {
            eprintln!("  {} ({} bytes, {})", file.path, file.size, file.mime);
        }
    }

    if !result.success() {
        std::process::exit(result.exit_code);
    }
    Ok(())
}

/// Install packages into the working directory's venv.
pub async fn install(work_dir: String, packages: Vec<String>) -> Result<()> {
    let env = PythonEnv::new(&work_dir);
    env.ensure_ready().await?;
    let report = env.install_packages(&packages).await?;

    print!("{}", report.output);
    if report.success {
        println!("Installed: {}", packages.join(", "));
        Ok(())
    } else {
        println!("Failed: {}", report.failed.join(", "));
        std::process::exit(1);
    }
}

/// Print execution queue statistics (or the full records) as JSON.
pub async fn status(ledger_path: Option<PathBuf>, full: bool) -> Result<()> {
    let path = ledger_path.unwrap_or_else(ExecutionLedger::default_path);
    let ledger = ExecutionLedger::open(&path).await?;
    if full {
        println!("{}", serde_json::to_string_pretty(&ledger.export().await)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&ledger.stats().await)?);
    }
    Ok(())
}

/// Prune stale workspace files and aged-out execution records.
pub async fn cleanup(
    work_dir: String,
    max_age_days: u64,
    ledger_path: Option<PathBuf>,
) -> Result<()> {
    let executor = CodeExecutor::new(&work_dir);
    let files = executor.cleanup(max_age_days).await;

    let path = ledger_path.unwrap_or_else(ExecutionLedger::default_path);
    let ledger = ExecutionLedger::open(&path).await?;
    let records = ledger.cleanup(max_age_days as i64).await;
    ledger.flush().await?;

    println!("Removed {files} stale files and {records} old execution records");
    Ok(())
}
