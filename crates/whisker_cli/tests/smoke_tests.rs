//! CLI smoke tests: drive the compiled binary.

use std::io::Write;
use std::process::{Command, Stdio};

fn cli_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_whisker"))
}

#[test]
fn test_help_flag() {
    let output = cli_bin().arg("--help").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Expected usage info in --help output");
    assert!(stdout.contains("--character"));
}

#[test]
fn test_version_flag() {
    let output = cli_bin().arg("--version").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0.1.0"), "Expected version in --version output");
}

#[test]
fn test_repl_session_with_mock_provider() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("smoke.db");

    let mut child = cli_bin()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("--db")
        .arg(&db)
        .arg("--provider")
        .arg("mock")
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"pet\nfeed tuna\nchat\nstatus\nbalance\nbark\nquit\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Mochi is here"));
    assert!(stdout.contains("Mochi: Mochi leans into your hand"));
    assert!(stdout.contains("devours the food"));
    // An empty chat never reaches the backend
    assert!(stdout.contains("NOT_CHECKED"));
    assert!(stdout.contains("hunger 65/100"));
    // 100 - pet 1 - feed 5 - chat 2
    assert!(stdout.contains("92 credits"));
    assert!(stdout.contains("unknown command 'bark'"));
    assert!(stdout.contains("Bye!"));
}

#[test]
fn test_state_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = dir.path().join("restart.db");

    let run = |input: &'static [u8]| {
        let mut child = cli_bin()
            .arg("--config")
            .arg(dir.path().join("missing.toml"))
            .arg("--db")
            .arg(&db)
            .arg("--provider")
            .arg("mock")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to run");
        child.stdin.take().unwrap().write_all(input).unwrap();
        let output = child.wait_with_output().unwrap();
        assert!(output.status.success());
        String::from_utf8_lossy(&output.stdout).to_string()
    };

    run(b"feed\nquit\n");
    let second = run(b"status\nbalance\n");
    assert!(second.contains("hunger 65/100"));
    assert!(second.contains("95 credits"));
}
