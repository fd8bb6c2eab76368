//! Sandbox and CLI tests against the real `tracelab-server` binary.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use serde_json::Value;

use tracelab_server::sandbox::{Runner, SandboxCommand, SandboxRunner};

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tracelab-server"))
}

fn runner(timeout: Duration) -> SandboxRunner {
    SandboxRunner::new(
        SandboxCommand {
            program: binary(),
            args: vec!["exec".to_string()],
        },
        timeout,
    )
}

fn script(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".tl").tempfile().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn infinite_loop_is_killed_at_the_deadline() {
    let bound = Duration::from_millis(500);
    let started = Instant::now();
    let record = runner(bound).run("while True:\n    pass\n", "").await;

    assert!(record.timed_out);
    assert_eq!(record.exit_code, None);
    assert_eq!(record.error, None);
    assert!(started.elapsed() < bound + Duration::from_secs(2));
}

#[tokio::test]
async fn output_before_a_timeout_is_kept() {
    let record = runner(Duration::from_millis(500))
        .run("print('started')\nwhile True:\n    pass\n", "")
        .await;
    assert!(record.timed_out);
    assert_eq!(record.stdout, "started\n");
}

#[tokio::test]
async fn syntax_errors_exit_nonzero() {
    let record = runner(Duration::from_secs(5)).run("def (:\n", "").await;
    assert!(!record.timed_out);
    assert_eq!(record.exit_code, Some(1));
    assert!(record.stderr.starts_with("syntax error at line"));
}

#[test]
fn exec_reads_stdin_lines() {
    let file = script("a = int(input())\nb = int(input())\nprint(a * b)\n");
    let mut child = Command::new(binary())
        .arg("exec")
        .arg(file.path())
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(b"6\n7\n").unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "42\n");
}

#[test]
fn trace_prints_envelopes_as_json_lines() {
    let file = script("dp = [0, 1, 1, 2]\n");
    let output = Command::new(binary())
        .arg("trace")
        .arg(file.path())
        .env_remove("TRACELAB_LLM_PROVIDER")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stages: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| {
            let envelope: Value = serde_json::from_str(line).unwrap();
            envelope["stage"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(stages.first().map(String::as_str), Some("classification"));
    assert_eq!(stages.iter().filter(|s| *s == "dp_step").count(), 5);
    assert!(stages.contains(&"dp_table".to_string()));
    assert_eq!(stages.last().map(String::as_str), Some("done"));
}
