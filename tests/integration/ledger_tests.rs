//! Ledger persistence across process boundaries (simulated by reopening)

use runbox_common::{CodeBlock, ExecutionId, ExecutionResult, ExecutionStatus, PendingExecution};
use runbox_sandbox::ExecutionLedger;
use std::time::Duration;

fn record(task: &str) -> PendingExecution {
    PendingExecution::new(
        ExecutionId::new(),
        task,
        "/tmp/work",
        vec![CodeBlock::new("print(1)", "python")],
        600,
    )
}

fn result(output: &str) -> ExecutionResult {
    ExecutionResult {
        exit_code: 0,
        output: output.into(),
        code_file: "/tmp/work/codebase/x.py".into(),
        files_created: vec![],
    }
}

#[tokio::test]
async fn debounced_mutations_survive_reopen_without_explicit_flush() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("queue.json");

    let rec = record("persist");
    let id = rec.execution_id;
    {
        let ledger = ExecutionLedger::open(&path).await.unwrap();
        ledger.add_pending(rec).await;
        ledger.mark_running(id).await;
        // Past the debounce window so the background writer lands
        tokio::time::sleep(Duration::from_millis(400)).await;
    }

    let reopened = ExecutionLedger::open(&path).await.unwrap();
    let loaded = reopened.get(id).await.unwrap();
    assert_eq!(loaded.status, ExecutionStatus::Running);
    assert_eq!(loaded.task_id, "persist");
}

#[tokio::test]
async fn completed_results_queue_for_redelivery_across_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("queue.json");

    let rec = record("offline");
    let id = rec.execution_id;
    {
        let ledger = ExecutionLedger::open(&path).await.unwrap();
        ledger.add_pending(rec).await;
        ledger.mark_completed(id, result("2\n")).await;
        ledger.flush().await.unwrap();
    }

    let reopened = ExecutionLedger::open(&path).await.unwrap();
    let unsent = reopened.completed_unsent().await;
    assert_eq!(unsent.len(), 1);
    assert_eq!(unsent[0].execution_id, id);
    assert_eq!(unsent[0].result.as_ref().unwrap().output, "2\n");

    reopened.remove(id).await;
    assert!(reopened.completed_unsent().await.is_empty());
}

#[tokio::test]
async fn cleanup_drops_only_old_terminal_records() {
    let tmp = tempfile::tempdir().unwrap();
    let ledger = ExecutionLedger::open(tmp.path().join("queue.json"))
        .await
        .unwrap();

    let done = record("done");
    let done_id = done.execution_id;
    let live = record("live");
    let live_id = live.execution_id;
    ledger.add_pending(done).await;
    ledger.add_pending(live).await;
    ledger.mark_completed(done_id, result("x")).await;
    ledger.mark_running(live_id).await;

    // Age zero: every terminal record is past the cutoff
    let removed = ledger.cleanup(0).await;
    assert_eq!(removed, 1);
    assert!(ledger.get(done_id).await.is_none());
    assert_eq!(
        ledger.get(live_id).await.unwrap().status,
        ExecutionStatus::Running
    );
}

#[tokio::test]
async fn stats_reflect_every_status_bucket() {
    let tmp = tempfile::tempdir().unwrap();
    let ledger = ExecutionLedger::open(tmp.path().join("queue.json"))
        .await
        .unwrap();

    let a = record("t");
    let b = record("t");
    let c = record("t");
    let b_id = b.execution_id;
    let c_id = c.execution_id;
    ledger.add_pending(a).await;
    ledger.add_pending(b).await;
    ledger.add_pending(c).await;
    ledger.mark_completed(b_id, result("ok")).await;
    ledger.mark_failed(c_id, "boom").await;

    let stats = ledger.stats().await;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.running, 0);
}
