//! End-to-end runs of the `solverdummy` binary.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const BIN: &str = env!("CARGO_BIN_EXE_solverdummy");

fn free_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

fn write_config(dir: &Path, address: &str) -> PathBuf {
    let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/solverdummy.toml");
    let text = std::fs::read_to_string(shipped)
        .unwrap()
        .replace("127.0.0.1:47700", address);
    let path = dir.join("coupling.toml");
    std::fs::write(&path, text).unwrap();
    path
}

fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(BIN)
        .arg(config)
        .args(args)
        .env("WEFT_LOG", "warn")
        .output()
        .unwrap()
}

fn field_line<'a>(stdout: &'a str, name: &str) -> &'a str {
    stdout
        .lines()
        .find(|l| l.starts_with(&format!("{name}:")))
        .unwrap_or_else(|| panic!("no {name} line in {stdout:?}"))
}

#[test]
fn unknown_participant_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &free_address());
    let out = run(&config, &["SolverThree", "MeshOne"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("SolverThree"), "stderr: {stderr}");
}

#[test]
fn mesh_mismatch_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &free_address());
    let out = run(&config, &["SolverOne", "MeshTwo"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("MeshTwo"), "stderr: {stderr}");
}

#[test]
fn missing_config_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&dir.path().join("absent.toml"), &["SolverOne", "MeshOne"]);
    assert!(!out.status.success());
}

#[test]
fn two_processes_couple_over_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &free_address());

    let second = Command::new(BIN)
        .arg(&config)
        .args(["SolverTwo", "MeshTwo", "--exponent", "2", "--initial-value", "0.5"])
        .env("WEFT_LOG", "warn")
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    let first = run(&config, &["SolverOne", "MeshOne", "--initial-value", "-0.1"]);
    let second = second.wait_with_output().unwrap();

    assert!(
        first.status.success(),
        "SolverOne: {}",
        String::from_utf8_lossy(&first.stderr)
    );
    assert!(
        second.status.success(),
        "SolverTwo: {}",
        String::from_utf8_lossy(&second.stderr)
    );
    let one = String::from_utf8_lossy(&first.stdout);
    let two = String::from_utf8_lossy(&second.stdout);
    assert_eq!(field_line(&one, "Velocities"), field_line(&two, "Velocities"));
    assert_eq!(field_line(&one, "Forces"), field_line(&two, "Forces"));
}
