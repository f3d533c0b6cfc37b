//! End-to-end tests that need a real python3 on PATH (and network for pip)
//!
//! Run with `cargo test -- --ignored` on a machine with Python installed.

use runbox_common::CodeBlock;
use runbox_sandbox::{CodeExecutor, PythonEnv};
use std::time::Duration;

#[tokio::test]
#[ignore]
async fn creates_venv_and_runs_python() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_str().unwrap().to_string();
    let executor = CodeExecutor::new(&dir);

    let blocks = vec![CodeBlock::new("print(1+1)", "python")];
    let result = executor
        .execute_code_blocks(&blocks, Duration::from_secs(600), None)
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.output, "2\n");
    assert!(tmp.path().join(".venv").is_dir());
    assert!(result.code_file.extension().is_some_and(|e| e == "py"));
}

#[tokio::test]
#[ignore]
async fn installs_a_package_into_the_venv() {
    let tmp = tempfile::tempdir().unwrap();
    let env = PythonEnv::new(tmp.path().to_str().unwrap());
    env.ensure_ready().await.unwrap();

    let report = env.install_packages(&["six".into()]).await.unwrap();
    assert!(report.success, "{}", report.output);
    assert!(report.failed.is_empty());
}
