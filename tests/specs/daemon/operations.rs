use serial_test::serial;

use crate::prelude::*;

#[test]
#[serial]
fn create_join_and_complete_round_trip() {
    let daemon = DaemonHandle::start();

    let create = cli()
        .daemon_url(&daemon.url)
        .args(&["create", "alice", "--description", "ship the release"])
        .passes();
    assert!(create.stdout().contains("is_initiator: true"));

    let operation_id = operation_id_from(&create.stdout());
    let session_id = session_id_from(&create.stdout());

    cli()
        .daemon_url(&daemon.url)
        .args(&["join", &operation_id, "bob"])
        .passes()
        .stdout_has("is_initiator: false");

    cli()
        .daemon_url(&daemon.url)
        .args(&["log", &operation_id, "bob joined"])
        .passes()
        .stdout_has("ok");

    cli()
        .daemon_url(&daemon.url)
        .args(&["state", &operation_id])
        .passes()
        .stdout_has("participant_count: 2");

    cli()
        .daemon_url(&daemon.url)
        .args(&["complete", &operation_id, &session_id])
        .passes()
        .stdout_has("ok");

    cli()
        .daemon_url(&daemon.url)
        .args(&["state", &operation_id])
        .passes()
        .stdout_has("status: completed");
}

#[test]
#[serial]
fn heartbeat_reports_a_fresh_operation_as_not_stale() {
    let daemon = DaemonHandle::start();

    let create = cli()
        .daemon_url(&daemon.url)
        .args(&["create", "alice", "--description", "watch the heartbeat"])
        .passes();
    let operation_id = operation_id_from(&create.stdout());

    cli()
        .daemon_url(&daemon.url)
        .args(&["heartbeat", &operation_id])
        .passes()
        .stdout_has("stale_participants: []");
}

#[test]
#[serial]
fn call_start_and_end_removes_the_frame() {
    let daemon = DaemonHandle::start();

    let create = cli()
        .daemon_url(&daemon.url)
        .args(&["create", "alice", "--description", "run a subtask"])
        .passes();
    let operation_id = operation_id_from(&create.stdout());
    let session_id = session_id_from(&create.stdout());

    let call_start = cli()
        .daemon_url(&daemon.url)
        .args(&["call-start", &operation_id, &session_id, "--description", "subtask"])
        .passes();
    let call_id = call_id_from(&call_start.stdout());

    cli()
        .daemon_url(&daemon.url)
        .args(&["state", &operation_id])
        .passes()
        .stdout_has("frame_count: 1");

    cli()
        .daemon_url(&daemon.url)
        .args(&["call-end", &operation_id, &call_id])
        .passes()
        .stdout_has("ok");

    cli()
        .daemon_url(&daemon.url)
        .args(&["state", &operation_id])
        .passes()
        .stdout_has("frame_count: 0");
}

#[test]
#[serial]
fn abort_flag_round_trips_through_state() {
    let daemon = DaemonHandle::start();

    let create = cli()
        .daemon_url(&daemon.url)
        .args(&["create", "alice", "--description", "cooperative abort"])
        .passes();
    let operation_id = operation_id_from(&create.stdout());

    cli()
        .daemon_url(&daemon.url)
        .args(&["abort", &operation_id])
        .passes();

    cli()
        .daemon_url(&daemon.url)
        .args(&["state", &operation_id])
        .passes()
        .stdout_has("aborted: true");

    cli()
        .daemon_url(&daemon.url)
        .args(&["abort", &operation_id, "--clear"])
        .passes();

    cli()
        .daemon_url(&daemon.url)
        .args(&["state", &operation_id])
        .passes()
        .stdout_has("aborted: false");
}

fn operation_id_from(stdout: &str) -> String {
    field_from(stdout, "operation_id")
}

fn session_id_from(stdout: &str) -> String {
    field_from(stdout, "session_id")
}

fn call_id_from(stdout: &str) -> String {
    field_from(stdout, "call_id")
}

fn field_from(stdout: &str, key: &str) -> String {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix(&format!("{key}: ")))
        .unwrap_or_else(|| panic!("no '{key}:' line in:\n{stdout}"))
        .trim()
        .to_string()
}
