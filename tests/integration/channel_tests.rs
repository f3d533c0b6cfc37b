//! Channel handler integration tests over in-process transport halves

use runbox_common::{ChannelMessage, CodeBlock, ExecutionId};
use runbox_sandbox::ExecutionLedger;
use runbox_channel::ChannelHandler;
use runbox_tests::helpers::work_dir;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

struct Conn {
    tx: mpsc::Sender<ChannelMessage>,
    rx: mpsc::Receiver<ChannelMessage>,
    ledger: Arc<ExecutionLedger>,
    _ledger_dir: TempDir,
}

async fn connect() -> Conn {
    let ledger_dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(
        ExecutionLedger::open(ledger_dir.path().join("queue.json"))
            .await
            .unwrap(),
    );

    let (tx, handler_rx) = mpsc::channel::<ChannelMessage>(16);
    let (handler_tx, rx) = mpsc::channel::<ChannelMessage>(16);
    let handler_ledger = ledger.clone();
    tokio::spawn(async move {
        let handler = ChannelHandler::new(handler_ledger);
        let _ = handler.run(handler_tx, handler_rx).await;
    });

    Conn {
        tx,
        rx,
        ledger,
        _ledger_dir: ledger_dir,
    }
}

fn execute(
    execution_id: ExecutionId,
    work_dir: &str,
    blocks: Vec<CodeBlock>,
) -> ChannelMessage {
    ChannelMessage::ExecuteCode {
        execution_id,
        task_id: "task".into(),
        work_dir: work_dir.into(),
        code_blocks: blocks,
        timeout: 30,
    }
}

#[tokio::test]
async fn full_execution_round_trip() {
    let (_tmp, dir) = work_dir();
    let mut conn = connect().await;

    let id = ExecutionId::new();
    conn.tx
        .send(execute(
            id,
            &dir,
            vec![CodeBlock::new("echo 2 > data/out.txt\necho done", "bash")],
        ))
        .await
        .unwrap();

    assert!(matches!(
        conn.rx.recv().await.unwrap(),
        ChannelMessage::ExecutionAck { execution_id } if execution_id == id
    ));
    match conn.rx.recv().await.unwrap() {
        ChannelMessage::ExecutionResult {
            execution_id,
            result,
        } => {
            assert_eq!(execution_id, id);
            assert_eq!(result.exit_code, 0);
            assert!(result.output.contains("done"));
        }
        other => panic!("expected result, got {other:?}"),
    }
    match conn.rx.recv().await.unwrap() {
        ChannelMessage::FilesCreated { files, .. } => {
            assert!(files.iter().any(|f| f.path == "data/out.txt"));
        }
        other => panic!("expected files_created, got {other:?}"),
    }

    // Delivered result is purged from the queue
    assert!(conn.ledger.get(id).await.is_none());
}

#[tokio::test]
async fn ping_is_answered_while_an_execution_is_running() {
    let (_tmp, dir) = work_dir();
    let mut conn = connect().await;

    let id = ExecutionId::new();
    conn.tx
        .send(execute(id, &dir, vec![CodeBlock::new("sleep 2", "bash")]))
        .await
        .unwrap();
    assert!(matches!(
        conn.rx.recv().await.unwrap(),
        ChannelMessage::ExecutionAck { .. }
    ));

    conn.tx.send(ChannelMessage::Ping).await.unwrap();
    // The pong must not wait for the sleeping execution
    let pong = tokio::time::timeout(Duration::from_millis(500), conn.rx.recv())
        .await
        .expect("pong within 500ms")
        .unwrap();
    assert!(matches!(pong, ChannelMessage::Pong));

    match conn.rx.recv().await.unwrap() {
        ChannelMessage::ExecutionResult { result, .. } => assert_eq!(result.exit_code, 0),
        other => panic!("expected result, got {other:?}"),
    }
}

#[tokio::test]
async fn script_failure_is_a_result_not_an_error() {
    let (_tmp, dir) = work_dir();
    let mut conn = connect().await;

    let id = ExecutionId::new();
    conn.tx
        .send(execute(id, &dir, vec![CodeBlock::new("exit 5", "bash")]))
        .await
        .unwrap();

    assert!(matches!(
        conn.rx.recv().await.unwrap(),
        ChannelMessage::ExecutionAck { .. }
    ));
    match conn.rx.recv().await.unwrap() {
        ChannelMessage::ExecutionResult { result, .. } => assert_eq!(result.exit_code, 5),
        other => panic!("expected result, got {other:?}"),
    }
}

#[tokio::test]
async fn write_file_traversal_never_escapes_the_work_dir() {
    let (tmp, dir) = work_dir();
    let mut conn = connect().await;

    conn.tx
        .send(ChannelMessage::WriteFile {
            work_dir: dir.clone(),
            path: "../escape.txt".into(),
            content: "nope".into(),
        })
        .await
        .unwrap();
    conn.tx.send(ChannelMessage::Ping).await.unwrap();
    assert!(matches!(
        conn.rx.recv().await.unwrap(),
        ChannelMessage::Pong
    ));

    assert!(!tmp.path().parent().unwrap().join("escape.txt").exists());
    assert!(!tmp.path().join("escape.txt").exists());
}

#[tokio::test]
async fn wire_shape_matches_the_backend_contract() {
    let id = ExecutionId::new();
    let msg = execute(id, "/work", vec![CodeBlock::new("print(1+1)", "python")]);
    let value: serde_json::Value = serde_json::to_value(&msg).unwrap();

    assert_eq!(value["type"], "execute_code");
    assert_eq!(value["task_id"], "task");
    assert_eq!(value["work_dir"], "/work");
    assert_eq!(value["timeout"], 30);
    assert_eq!(value["code_blocks"][0]["language"], "python");

    let ack = serde_json::to_value(ChannelMessage::ExecutionAck { execution_id: id }).unwrap();
    assert_eq!(ack["type"], "execution_ack");
}
