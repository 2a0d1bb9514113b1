//! Test helpers for behavioral specifications.
//!
//! Spawns real `dpld`/`dpl` binaries and drives them as a black box:
//! commands, stdout/stderr, exit codes, and the daemon's actual HTTP port.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::io::Read;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output};
use std::time::{Duration, Instant};

use assert_cmd::Command as AssertCommand;

pub const SPEC_POLL_INTERVAL_MS: u64 = 10;
pub const SPEC_WAIT_MAX_MS: u64 = 2000;

/// Returns the path to a binary, checking llvm-cov target directory first so
/// this works under both plain `cargo test` and coverage runs.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

pub fn dpld_binary() -> PathBuf {
    binary_path("dpld")
}

pub fn dpl_binary() -> PathBuf {
    binary_path("dpl")
}

/// Create a CLI builder for `dpl` commands.
pub fn cli() -> CliBuilder {
    CliBuilder::new()
}

pub struct CliBuilder {
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl CliBuilder {
    fn new() -> Self {
        Self {
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn env(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.envs.push((key.to_string(), value.as_ref().to_string()));
        self
    }

    pub fn daemon_url(self, url: &str) -> Self {
        self.args(&["--daemon-url", url])
    }

    fn command(self) -> AssertCommand {
        let mut cmd = AssertCommand::new(dpl_binary());
        cmd.args(&self.args);
        for (key, value) in self.envs {
            cmd.env(key, value);
        }
        cmd
    }

    pub fn passes(self) -> RunAssert {
        let assert = self.command().assert().success();
        RunAssert { output: assert.get_output().clone() }
    }

    pub fn fails(self) -> RunAssert {
        let assert = self.command().assert().failure();
        RunAssert { output: assert.get_output().clone() }
    }
}

pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(stdout.contains(expected), "stdout does not contain '{expected}'\nstdout: {stdout}");
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(stderr.contains(expected), "stderr does not contain '{expected}'\nstderr: {stderr}");
        self
    }
}

/// A running `dpld` instance bound to an ephemeral port, killed on drop.
pub struct DaemonHandle {
    child: Child,
    pub url: String,
    _state_dir: tempfile::TempDir,
}

impl DaemonHandle {
    pub fn state_dir_path(&self) -> PathBuf {
        self._state_dir.path().to_path_buf()
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Spawn `dpld` against a fresh temp state directory and block until its
    /// `/health` endpoint answers (or panic after [`SPEC_WAIT_MAX_MS`]).
    pub fn start() -> Self {
        let state_dir = tempfile::tempdir().expect("tempdir");
        let port = pick_free_port();
        let url = format!("http://127.0.0.1:{port}");

        let child = Command::new(dpld_binary())
            .args(["--bind", "127.0.0.1", "--port", &port.to_string()])
            .env("DPL_STATE_DIR", state_dir.path())
            .spawn()
            .expect("dpld should spawn");

        let handle = Self {
            child,
            url,
            _state_dir: state_dir,
        };
        handle.wait_healthy();
        handle
    }

    /// Kill the daemon and wait for the child process to be reaped.
    pub fn stop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    fn wait_healthy(&self) {
        let deadline = Instant::now() + Duration::from_millis(SPEC_WAIT_MAX_MS);
        let addr = self.url.trim_start_matches("http://");
        while Instant::now() < deadline {
            if let Ok(mut stream) = TcpStream::connect(addr) {
                use std::io::Write;
                let _ = stream.write_all(b"GET /health HTTP/1.0\r\n\r\n");
                let mut buf = [0u8; 64];
                if stream.read(&mut buf).is_ok() {
                    return;
                }
            }
            std::thread::sleep(Duration::from_millis(SPEC_POLL_INTERVAL_MS));
        }
        panic!("dpld did not become healthy within {SPEC_WAIT_MAX_MS}ms");
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Checks liveness via `/proc`, avoiding a dependency on `libc` just for this.
pub fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

fn pick_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local_addr")
        .port()
}

pub fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(SPEC_POLL_INTERVAL_MS));
    }
    false
}
