//! Orchestrator integration tests
//!
//! Bash-only so they run without a Python toolchain; the venv marker is
//! pre-seeded by the helper so no environment creation is attempted.

use runbox_common::CodeBlock;
use runbox_sandbox::CodeExecutor;
use runbox_tests::helpers::work_dir;
use std::path::Path;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::test]
async fn runs_blocks_in_order_and_stops_at_first_failure() {
    let (tmp, dir) = work_dir();
    let executor = CodeExecutor::new(&dir);

    let blocks = vec![
        CodeBlock::new("echo first > data/a.txt\necho ran-a", "bash"),
        CodeBlock::new("echo boom >&2\nexit 7", "bash"),
        CodeBlock::new("echo never > data/c.txt", "bash"),
    ];
    let result = executor
        .execute_code_blocks(&blocks, TIMEOUT, None)
        .await
        .unwrap();

    assert_eq!(result.exit_code, 7);
    assert!(result.output.contains("ran-a"));
    assert!(result.output.contains("boom"));
    assert!(tmp.path().join("data/a.txt").exists());
    assert!(!tmp.path().join("data/c.txt").exists());
    assert!(result.files_created.iter().any(|f| f.path == "data/a.txt"));
    assert!(!result.files_created.iter().any(|f| f.path == "data/c.txt"));
}

#[tokio::test]
async fn timeout_maps_to_exit_124_and_skips_later_blocks() {
    let (tmp, dir) = work_dir();
    let executor = CodeExecutor::new(&dir);

    let blocks = vec![
        CodeBlock::new("sleep 30", "bash"),
        CodeBlock::new("echo after > data/after.txt", "bash"),
    ];
    let result = executor
        .execute_code_blocks(&blocks, Duration::from_secs(1), None)
        .await
        .unwrap();

    assert_eq!(result.exit_code, 124);
    assert!(result
        .output
        .contains("Execution timed out after 1 seconds"));
    assert!(!tmp.path().join("data/after.txt").exists());
}

#[tokio::test]
async fn unsupported_language_fails_without_running_anything() {
    let (_tmp, dir) = work_dir();
    let executor = CodeExecutor::new(&dir);

    let blocks = vec![CodeBlock::new("puts 1", "ruby")];
    let result = executor
        .execute_code_blocks(&blocks, TIMEOUT, None)
        .await
        .unwrap();

    assert_eq!(result.exit_code, 1);
    assert!(result.output.contains("Unsupported language: ruby"));
}

#[tokio::test]
async fn filename_directive_names_the_code_file() {
    let (tmp, dir) = work_dir();
    let executor = CodeExecutor::new(&dir);

    let blocks = vec![CodeBlock::new("# make_report.sh\necho report", "bash")];
    let result = executor
        .execute_code_blocks(&blocks, TIMEOUT, None)
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(
        result.code_file,
        tmp.path().join("codebase").join("make_report.sh")
    );
    assert!(result.code_file.exists());
}

#[tokio::test]
async fn fallback_name_carries_timestamp_and_hash() {
    let (_tmp, dir) = work_dir();
    let executor = CodeExecutor::new(&dir);

    let blocks = vec![CodeBlock::new("echo anonymous", "bash")];
    let result = executor
        .execute_code_blocks(&blocks, TIMEOUT, None)
        .await
        .unwrap();

    let name = result
        .code_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap();
    assert!(name.starts_with("code_"), "{name}");
    assert!(name.ends_with(".sh"), "{name}");
}

#[tokio::test]
async fn binary_artifacts_get_checksums_and_text_does_not() {
    let (_tmp, dir) = work_dir();
    let executor = CodeExecutor::new(&dir);

    let blocks = vec![CodeBlock::new(
        "printf 'fake-image-bytes' > data/plot.png\necho col > data/table.csv",
        "bash",
    )];
    let result = executor
        .execute_code_blocks(&blocks, TIMEOUT, None)
        .await
        .unwrap();
    assert_eq!(result.exit_code, 0);

    let png = result
        .files_created
        .iter()
        .find(|f| f.path == "data/plot.png")
        .expect("png reported");
    assert_eq!(png.mime, "image/png");
    assert!(png.checksum.is_some());

    let csv = result
        .files_created
        .iter()
        .find(|f| f.path == "data/table.csv")
        .expect("csv reported");
    assert!(csv.checksum.is_none());
}

#[tokio::test]
async fn venv_contents_never_appear_in_created_files() {
    let (_tmp, dir) = work_dir();
    let executor = CodeExecutor::new(&dir);

    let blocks = vec![CodeBlock::new(
        "mkdir -p .venv/lib\ntouch .venv/lib/site.py\necho ok",
        "bash",
    )];
    let result = executor
        .execute_code_blocks(&blocks, TIMEOUT, None)
        .await
        .unwrap();
    assert_eq!(result.exit_code, 0);
    assert!(!result
        .files_created
        .iter()
        .any(|f| Path::new(&f.path).starts_with(".venv")));
}

#[tokio::test]
async fn cleanup_prunes_stale_files_but_not_the_venv() {
    let (tmp, dir) = work_dir();
    std::fs::write(tmp.path().join(".venv/pyvenv.cfg"), "home = /usr").unwrap();
    std::fs::create_dir_all(tmp.path().join("data")).unwrap();
    std::fs::write(tmp.path().join("data/old.txt"), "x").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let executor = CodeExecutor::new(&dir);
    let deleted = executor.cleanup(0).await;

    assert_eq!(deleted, 1);
    assert!(!tmp.path().join("data/old.txt").exists());
    assert!(tmp.path().join(".venv/pyvenv.cfg").exists());
}

#[tokio::test]
async fn cleanup_keeps_files_younger_than_the_threshold() {
    let (tmp, dir) = work_dir();
    std::fs::create_dir_all(tmp.path().join("data")).unwrap();
    std::fs::write(tmp.path().join("data/fresh.txt"), "x").unwrap();

    let executor = CodeExecutor::new(&dir);
    assert_eq!(executor.cleanup(7).await, 0);
    assert!(tmp.path().join("data/fresh.txt").exists());
}

#[tokio::test]
async fn child_sees_venv_environment() {
    let (_tmp, dir) = work_dir();
    let executor = CodeExecutor::new(&dir);

    let blocks = vec![CodeBlock::new("echo \"$VIRTUAL_ENV\"\necho \"$MPLBACKEND\"", "bash")];
    let result = executor
        .execute_code_blocks(&blocks, TIMEOUT, None)
        .await
        .unwrap();

    assert!(result.output.contains(".venv"));
    assert!(result.output.contains("Agg"));
}
