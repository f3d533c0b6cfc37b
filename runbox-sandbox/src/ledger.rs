//! Pending-execution ledger
//!
//! Durable record of execution lifecycle, independent of any live
//! connection: a single JSON document per user profile, reloaded at
//! startup, with mutations debounced (~100 ms) before hitting disk. The
//! ledger is an explicitly constructed, injected instance, never a process
//! global.

use chrono::{DateTime, Utc};
use runbox_common::{
    ExecutionId, ExecutionResult, ExecutionStatus, PendingExecution, Result, SandboxError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, warn};

const QUEUE_VERSION: u32 = 1;
const FLUSH_DEBOUNCE: Duration = Duration::from_millis(100);

/// The persisted document: a version tag and the id-keyed records
#[derive(Debug, Serialize, Deserialize)]
struct ExecutionQueue {
    version: u32,
    executions: HashMap<ExecutionId, PendingExecution>,
    last_updated: DateTime<Utc>,
}

impl ExecutionQueue {
    fn empty() -> Self {
        Self {
            version: QUEUE_VERSION,
            executions: HashMap::new(),
            last_updated: Utc::now(),
        }
    }
}

/// Queue statistics for status displays
#[derive(Debug, Default, Clone, Serialize)]
pub struct LedgerStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Persistent, single-writer store of `PendingExecution` records
pub struct ExecutionLedger {
    path: PathBuf,
    queue: Arc<RwLock<ExecutionQueue>>,
    flush_tx: mpsc::UnboundedSender<()>,
}

impl ExecutionLedger {
    /// Open (or create) the ledger at `path`, loading existing records.
    /// A corrupt or version-mismatched document is discarded and replaced
    /// with an empty queue rather than failing startup.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let queue = Arc::new(RwLock::new(load_queue(&path).await));
        let (flush_tx, mut flush_rx) = mpsc::unbounded_channel::<()>();

        let task_queue = queue.clone();
        let task_path = path.clone();
        tokio::spawn(async move {
            while flush_rx.recv().await.is_some() {
                tokio::time::sleep(FLUSH_DEBOUNCE).await;
                // Coalesce every signal that arrived during the window
                while flush_rx.try_recv().is_ok() {}
                if let Err(err) = write_queue(&task_path, &task_queue).await {
                    error!(path = %task_path.display(), %err, "failed to persist execution queue");
                }
            }
        });

        Ok(Self {
            path,
            queue,
            flush_tx,
        })
    }

    /// Default per-user location: `~/.runbox/execution_queue.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".runbox")
            .join("execution_queue.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mark_dirty(&self) {
        let _ = self.flush_tx.send(());
    }

    /// Force an immediate write, bypassing the debounce window. Used for
    /// shutdown-critical transitions.
    pub async fn flush(&self) -> Result<()> {
        write_queue(&self.path, &self.queue).await
    }

    /// Record a newly accepted execution as `pending`.
    pub async fn add_pending(&self, record: PendingExecution) {
        self.queue
            .write()
            .await
            .executions
            .insert(record.execution_id, record);
        self.mark_dirty();
    }

    /// Transition to `running`. Returns false for an unknown id.
    pub async fn mark_running(&self, id: ExecutionId) -> bool {
        let mut queue = self.queue.write().await;
        match queue.executions.get_mut(&id) {
            Some(record) => {
                record.status = ExecutionStatus::Running;
                drop(queue);
                self.mark_dirty();
                true
            }
            None => false,
        }
    }

    /// Terminal transition to `completed` with the result.
    pub async fn mark_completed(&self, id: ExecutionId, result: ExecutionResult) -> bool {
        let mut queue = self.queue.write().await;
        match queue.executions.get_mut(&id) {
            Some(record) => {
                record.status = ExecutionStatus::Completed;
                record.completed_at = Some(Utc::now());
                record.result = Some(result);
                drop(queue);
                self.mark_dirty();
                true
            }
            None => false,
        }
    }

    /// Terminal transition to `failed` with the error message.
    pub async fn mark_failed(&self, id: ExecutionId, error: impl Into<String>) -> bool {
        let mut queue = self.queue.write().await;
        match queue.executions.get_mut(&id) {
            Some(record) => {
                record.status = ExecutionStatus::Failed;
                record.completed_at = Some(Utc::now());
                record.error = Some(error.into());
                drop(queue);
                self.mark_dirty();
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, id: ExecutionId) -> Option<PendingExecution> {
        self.queue.read().await.executions.get(&id).cloned()
    }

    pub async fn by_status(&self, status: ExecutionStatus) -> Vec<PendingExecution> {
        self.queue
            .read()
            .await
            .executions
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect()
    }

    pub async fn by_task(&self, task_id: &str) -> Vec<PendingExecution> {
        self.queue
            .read()
            .await
            .executions
            .values()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Completed executions whose results still need delivery to the
    /// backend (recovery path after a disconnect).
    pub async fn completed_unsent(&self) -> Vec<PendingExecution> {
        self.queue
            .read()
            .await
            .executions
            .values()
            .filter(|e| e.status == ExecutionStatus::Completed && e.result.is_some())
            .cloned()
            .collect()
    }

    /// Executions that were in flight when the process last stopped.
    pub async fn running(&self) -> Vec<PendingExecution> {
        self.by_status(ExecutionStatus::Running).await
    }

    /// Remove a record once its result has been delivered.
    pub async fn remove(&self, id: ExecutionId) -> bool {
        let removed = self.queue.write().await.executions.remove(&id).is_some();
        if removed {
            self.mark_dirty();
        }
        removed
    }

    pub async fn remove_by_task(&self, task_id: &str) -> usize {
        let mut queue = self.queue.write().await;
        let before = queue.executions.len();
        queue.executions.retain(|_, e| e.task_id != task_id);
        let removed = before - queue.executions.len();
        drop(queue);
        if removed > 0 {
            self.mark_dirty();
        }
        removed
    }

    /// Drop terminal records older than `max_age_days`.
    pub async fn cleanup(&self, max_age_days: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::days(max_age_days);
        let mut queue = self.queue.write().await;
        let before = queue.executions.len();
        queue.executions.retain(|_, e| {
            !(e.is_terminal() && e.completed_at.is_some_and(|at| at < cutoff))
        });
        let removed = before - queue.executions.len();
        drop(queue);
        if removed > 0 {
            self.mark_dirty();
        }
        removed
    }

    /// Every record in the queue, oldest first. For status dumps and
    /// debugging.
    pub async fn export(&self) -> Vec<PendingExecution> {
        let mut all: Vec<_> = self
            .queue
            .read()
            .await
            .executions
            .values()
            .cloned()
            .collect();
        all.sort_by_key(|e| e.started_at);
        all
    }

    pub async fn stats(&self) -> LedgerStats {
        let queue = self.queue.read().await;
        let mut stats = LedgerStats {
            total: queue.executions.len(),
            ..Default::default()
        };
        for record in queue.executions.values() {
            match record.status {
                ExecutionStatus::Pending => stats.pending += 1,
                ExecutionStatus::Running => stats.running += 1,
                ExecutionStatus::Completed => stats.completed += 1,
                ExecutionStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

async fn load_queue(path: &Path) -> ExecutionQueue {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<ExecutionQueue>(&bytes) {
            Ok(queue) if queue.version == QUEUE_VERSION => queue,
            Ok(queue) => {
                warn!(
                    version = queue.version,
                    "execution queue version mismatch; starting empty"
                );
                ExecutionQueue::empty()
            }
            Err(err) => {
                warn!(%err, "corrupt execution queue; starting empty");
                ExecutionQueue::empty()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => ExecutionQueue::empty(),
        Err(err) => {
            warn!(%err, "failed to read execution queue; starting empty");
            ExecutionQueue::empty()
        }
    }
}

async fn write_queue(path: &Path, queue: &RwLock<ExecutionQueue>) -> Result<()> {
    let json = {
        let mut queue = queue.write().await;
        queue.last_updated = Utc::now();
        serde_json::to_vec_pretty(&*queue)
            .map_err(|e| SandboxError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?
    };
    fs::write(path, json).await?;
    Ok(())
}
