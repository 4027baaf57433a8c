use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};

const BIN: &str = env!("CARGO_BIN_EXE_profile-run");

#[test]
fn test_filename_with_path_elements_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(BIN)
        .args(["--filename", "a/b", "--duration", "1", "--output-dir"])
        .arg(dir.path())
        .output()
        .expect("Failed to run profile-run");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("filename must not contain path elements"), "stderr: {stderr}");
    assert!(!dir.path().join("a").exists());
}

#[test]
fn test_unwritable_output_dir_is_fatal() {
    let base = tempfile::tempdir().unwrap();
    let blocker = base.path().join("plain-file");
    std::fs::write(&blocker, b"x").unwrap();

    let output = Command::new(BIN)
        .args(["--duration", "1", "--output-dir"])
        .arg(blocker.join("sub"))
        .output()
        .expect("Failed to run profile-run");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not create initial output directory"), "stderr: {stderr}");
}

#[test]
fn test_timed_run_writes_profile() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(BIN)
        .args(["--mode", "block", "--duration", "1", "--quiet", "--output-dir"])
        .arg(dir.path())
        .output()
        .expect("Failed to run profile-run");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("ready "));
    let text = std::fs::read_to_string(dir.path().join("block.pprof")).unwrap();
    assert!(text.contains("main.rs"), "block profile: {text}");
}

#[test]
fn test_quiet_suppresses_session_messages() {
    let run = |quiet: bool| {
        let dir = tempfile::tempdir().unwrap();
        let mut command = Command::new(BIN);
        command
            .env_remove("RUST_LOG")
            .args(["--mode", "goroutine", "--duration", "1", "--no-shutdown-hook", "--output-dir"])
            .arg(dir.path());
        if quiet {
            command.arg("--quiet");
        }
        let output = command.output().expect("Failed to run profile-run");
        assert!(output.status.success(), "status: {:?}", output.status);
        let path = dir.path().join("goroutine.pprof");
        (String::from_utf8_lossy(&output.stderr).into_owned(), path.display().to_string())
    };

    let (stderr, path) = run(false);
    assert!(
        stderr.contains(&format!("profile: goroutine profiling enabled, {path}")),
        "stderr: {stderr}"
    );
    assert!(
        stderr.contains(&format!("profile: goroutine profiling disabled, {path}")),
        "stderr: {stderr}"
    );

    let (stderr, _) = run(true);
    assert!(!stderr.contains("profiling enabled"), "stderr: {stderr}");
    assert!(!stderr.contains("profiling disabled"), "stderr: {stderr}");
}

#[test]
fn test_usage_errors_exit_with_usage_code() {
    let output = Command::new(BIN)
        .args(["--mode", "nonsense"])
        .output()
        .expect("Failed to run profile-run");
    assert_eq!(output.status.code(), Some(2));
    assert!(!String::from_utf8_lossy(&output.stderr).is_empty());

    let help = Command::new(BIN).arg("--help").output().expect("Failed to run profile-run");
    assert_eq!(help.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&help.stdout).contains("--mode"));
}

#[test]
#[cfg(unix)]
fn test_interrupt_stops_session_and_exits_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = Command::new(BIN)
        .args(["--mode", "goroutine", "--duration", "0", "--output-dir"])
        .arg(dir.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn profile-run");

    // The hook is armed before "ready" is printed
    let stdout = child.stdout.take().unwrap();
    let mut line = String::new();
    BufReader::new(stdout).read_line(&mut line).unwrap();
    assert!(line.starts_with("ready "), "unexpected output: {line:?}");

    let pid = libc::pid_t::try_from(child.id()).unwrap();
    #[allow(unsafe_code)]
    // SAFETY: sending a signal to our own child process
    let rc = unsafe { libc::kill(pid, libc::SIGINT) };
    assert_eq!(rc, 0);

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "status: {:?}", output.status);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("caught interrupt"), "stderr: {stderr}");

    let text = std::fs::read_to_string(dir.path().join("goroutine.pprof")).unwrap();
    #[cfg(target_os = "linux")]
    assert!(text.contains("worker-0") || text.starts_with("thread profile: total "));
    #[cfg(not(target_os = "linux"))]
    let _ = text;
}
