//! Channel message dispatch
//!
//! One handler serves one connection at a time. Executions are spawned off
//! the dispatch loop so status pings, file writes and package installs are
//! serviced while code is running; a dropped connection never kills an
//! in-flight execution - it finishes into the ledger and the result is
//! redelivered on the next connect.

use crate::transport::{ChannelReceiver, ChannelSender};
use anyhow::Result;
use runbox_common::{ChannelMessage, ExecutionId, PendingExecution};
use runbox_sandbox::{validate_request, CodeExecutor, ExecutionLedger, PythonEnv, WorkspaceFiles};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct ChannelHandler {
    ledger: Arc<ExecutionLedger>,
}

impl ChannelHandler {
    pub fn new(ledger: Arc<ExecutionLedger>) -> Self {
        Self { ledger }
    }

    /// Serve one connection until the peer closes it.
    ///
    /// Outbound traffic is funneled through an mpsc so spawned execution
    /// tasks and the dispatch loop share one writer.
    pub async fn run<S, R>(&self, mut sender: S, mut receiver: R) -> Result<()>
    where
        S: ChannelSender,
        R: ChannelReceiver,
    {
        let (out_tx, mut out_rx) = mpsc::channel::<ChannelMessage>(64);

        // Only the writer observes a real wire write, so it alone retires
        // ledger records: a message that is queued but never makes it onto
        // the wire leaves its record behind for redelivery.
        let ledger = self.ledger.clone();
        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let delivered = terminal_execution_id(&msg);
                if let Err(err) = sender.send(msg).await {
                    warn!(%err, "outbound send failed; undelivered results stay queued");
                    break;
                }
                if let Some(id) = delivered {
                    ledger.remove(id).await;
                }
            }
        });

        // Results recorded while disconnected go out first
        self.redeliver_completed(&out_tx).await;

        while let Some(msg) = receiver.recv().await? {
            self.dispatch(msg, &out_tx).await;
        }

        info!("channel closed by peer");
        // In-flight executions keep running and report into the ledger.
        // Records are removed only on a confirmed wire write, so anything
        // still queued when the writer stops is redelivered next connect.
        writer.abort();
        self.ledger.flush().await?;
        Ok(())
    }

    async fn redeliver_completed(&self, out_tx: &mpsc::Sender<ChannelMessage>) {
        for record in self.ledger.completed_unsent().await {
            let execution_id = record.execution_id;
            let Some(result) = record.result else {
                continue;
            };
            info!(%execution_id, "redelivering result recorded while disconnected");
            let files = result.files_created.clone();
            if out_tx
                .send(ChannelMessage::ExecutionResult {
                    execution_id,
                    result,
                })
                .await
                .is_ok()
            {
                let _ = out_tx
                    .send(ChannelMessage::FilesCreated {
                        execution_id,
                        files,
                    })
                    .await;
            }
        }
    }

    async fn dispatch(&self, msg: ChannelMessage, out_tx: &mpsc::Sender<ChannelMessage>) {
        match msg {
            ChannelMessage::ExecuteCode {
                execution_id,
                task_id,
                work_dir,
                code_blocks,
                timeout,
            } => {
                // Ack before any work starts
                let _ = out_tx
                    .send(ChannelMessage::ExecutionAck { execution_id })
                    .await;

                if let Err(err) = validate_request(&work_dir, &code_blocks) {
                    let _ = out_tx
                        .send(ChannelMessage::ExecutionError {
                            execution_id,
                            error: err.to_string(),
                        })
                        .await;
                    return;
                }

                let executor = CodeExecutor::new(&work_dir);
                self.ledger
                    .add_pending(PendingExecution::new(
                        execution_id,
                        task_id,
                        executor.work_dir(),
                        code_blocks.clone(),
                        timeout,
                    ))
                    .await;

                let ledger = self.ledger.clone();
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    execute_and_report(execution_id, executor, code_blocks, timeout, ledger, out_tx)
                        .await;
                });
            }

            ChannelMessage::WriteFile {
                work_dir,
                path,
                content,
            } => {
                let env = PythonEnv::new(&work_dir);
                let files = WorkspaceFiles::new(env.work_dir());
                if let Err(err) = files.write_file(&path, &content).await {
                    warn!(%err, path, "write_file request failed");
                }
            }

            ChannelMessage::InstallPackages { work_dir, packages } => {
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    let env = PythonEnv::new(&work_dir);
                    let reply = match env.install_packages(&packages).await {
                        Ok(report) => ChannelMessage::InstallComplete {
                            packages,
                            success: report.success,
                            failed: report.failed,
                        },
                        Err(err) => {
                            warn!(%err, "package install rejected");
                            ChannelMessage::InstallComplete {
                                packages: packages.clone(),
                                success: false,
                                failed: packages,
                            }
                        }
                    };
                    let _ = out_tx.send(reply).await;
                });
            }

            ChannelMessage::Ping => {
                let _ = out_tx.send(ChannelMessage::Pong).await;
            }

            other => {
                warn!(?other, "unexpected inbound message");
            }
        }
    }
}

/// Runs one execution to completion and reports exactly one of
/// `execution_result` or `execution_error` for its id.
async fn execute_and_report(
    execution_id: ExecutionId,
    executor: CodeExecutor,
    code_blocks: Vec<runbox_common::CodeBlock>,
    timeout: u64,
    ledger: Arc<ExecutionLedger>,
    out_tx: mpsc::Sender<ChannelMessage>,
) {
    ledger.mark_running(execution_id).await;

    match executor
        .execute_code_blocks(&code_blocks, Duration::from_secs(timeout), None)
        .await
    {
        Ok(result) => {
            ledger.mark_completed(execution_id, result.clone()).await;
            let files = result.files_created.clone();
            // Queue acceptance is not delivery; the writer retires the
            // record once the result actually reaches the wire
            if out_tx
                .send(ChannelMessage::ExecutionResult {
                    execution_id,
                    result,
                })
                .await
                .is_ok()
            {
                let _ = out_tx
                    .send(ChannelMessage::FilesCreated {
                        execution_id,
                        files,
                    })
                    .await;
            }
        }
        Err(err) => {
            warn!(%execution_id, %err, "execution failed before running blocks");
            ledger.mark_failed(execution_id, err.to_string()).await;
            let _ = out_tx
                .send(ChannelMessage::ExecutionError {
                    execution_id,
                    error: err.to_string(),
                })
                .await;
        }
    }
}

/// The execution id a message terminally answers, if any; a confirmed wire
/// write of one of these retires its ledger record.
fn terminal_execution_id(msg: &ChannelMessage) -> Option<ExecutionId> {
    match msg {
        ChannelMessage::ExecutionResult { execution_id, .. }
        | ChannelMessage::ExecutionError { execution_id, .. } => Some(*execution_id),
        _ => None,
    }
}
