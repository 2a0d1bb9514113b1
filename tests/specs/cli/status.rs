use serial_test::serial;

use crate::prelude::*;

#[test]
#[serial]
fn status_reports_version_and_uptime_against_a_running_daemon() {
    let daemon = DaemonHandle::start();

    cli()
        .daemon_url(&daemon.url)
        .args(&["status"])
        .passes()
        .stdout_has("version:")
        .stdout_has("uptime_ms:")
        .stdout_has("operations: 0");
}

#[test]
#[serial]
fn status_can_be_rendered_as_json() {
    let daemon = DaemonHandle::start();

    cli()
        .daemon_url(&daemon.url)
        .args(&["--format", "json", "status"])
        .passes()
        .stdout_has("\"operation_count\"");
}

#[test]
fn status_fails_cleanly_when_no_daemon_is_listening() {
    cli()
        .daemon_url("http://127.0.0.1:1")
        .args(&["status"])
        .fails();
}
