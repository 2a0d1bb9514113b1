use serial_test::serial;

use crate::prelude::*;

#[test]
#[serial]
fn dpld_becomes_healthy_and_serves_status_on_its_bound_port() {
    let daemon = DaemonHandle::start();

    cli()
        .daemon_url(&daemon.url)
        .args(&["status"])
        .passes();
}

#[test]
#[serial]
fn second_dpld_against_the_same_state_dir_refuses_to_start() {
    let daemon = DaemonHandle::start();
    let state_dir = daemon.state_dir_path();

    let second_port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let output = std::process::Command::new(dpld_binary())
        .args(["--bind", "127.0.0.1", "--port", &second_port.to_string()])
        .env("DPL_STATE_DIR", &state_dir)
        .output()
        .expect("dpld should run");

    assert!(!output.status.success(), "second dpld instance should refuse to start");
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("already running"),
        "expected an 'already running' message, got: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
#[serial]
fn dpld_stops_cleanly_when_killed() {
    let mut daemon = DaemonHandle::start();
    let pid = daemon.pid();
    daemon.stop();

    assert!(wait_for(SPEC_WAIT_MAX_MS, || !process_alive(pid)), "dpld did not exit after being killed");
}
