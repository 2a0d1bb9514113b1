// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dpld`: the standalone process exposing the ledger's operation protocol
//! over HTTP for participants that cannot link `dpl-engine` directly.

mod config;
mod error;
mod lock;
mod logging;
mod routes;
mod state;

use std::net::IpAddr;
use std::sync::Arc;

use clap::Parser;
use dpl_engine::Ledger;
use tracing::{error, info};

use crate::config::{rotate_log_if_needed, write_startup_error, write_startup_marker, Config};
use crate::error::DaemonError;
use crate::lock::{read_running_pid, ProcessLock};
use crate::state::AppState;

const LOG_ROTATE_MAX_BYTES: u64 = 10 * 1024 * 1024;
const LOG_ROTATE_BACKUPS: u32 = 3;

#[derive(Debug, Parser)]
#[command(name = "dpld", about = "Distributed process ledger daemon")]
struct Args {
    /// Address to bind the HTTP veneer to.
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port to bind the HTTP veneer to.
    #[arg(long, default_value_t = 8947)]
    port: u16,

    /// Override the state directory (equivalent to setting DPL_STATE_DIR).
    #[arg(long)]
    state_dir: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Some(dir) = &args.state_dir {
        std::env::set_var("DPL_STATE_DIR", dir);
    }

    if let Err(e) = run(args).await {
        eprintln!("dpld: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), DaemonError> {
    let config = Config::load(args.bind, args.port)?;

    rotate_log_if_needed(&config.log_path, LOG_ROTATE_MAX_BYTES, LOG_ROTATE_BACKUPS);
    write_startup_marker(&config.log_path, "dpld starting up");

    let _lock = match ProcessLock::acquire(&config.lock_path) {
        Ok(lock) => lock,
        Err(DaemonError::LockFailed(source)) => {
            let pid = read_running_pid(&config.lock_path);
            let message = match pid {
                Some(pid) => format!("dpld is already running (pid {pid})"),
                None => "dpld is already running".to_string(),
            };
            write_startup_error(&config.log_path, &message);
            return Err(DaemonError::LockFailed(source));
        }
        Err(e) => {
            write_startup_error(&config.log_path, &format!("failed to acquire process lock: {e}"));
            return Err(e);
        }
    };

    // Held for the process's lifetime: dropping it stops the non-blocking
    // writer's flush thread and the last few log lines can be lost.
    let _log_guard = logging::setup_logging(&config.log_path)?;

    info!(bind = %config.bind_addr, port = config.port, state_dir = %config.state_dir.display(), "dpld starting");

    let ledger = Arc::new(Ledger::new(&config.operations_dir));
    let started_at_ms = {
        use dpl_core::Clock;
        dpl_core::SystemClock.epoch_ms()
    };
    let app_state = Arc::new(AppState::new(ledger, started_at_ms));

    let routes = routes::build_routes(app_state);
    let addr = std::net::SocketAddr::new(config.bind_addr, config.port);

    info!(%addr, "dpld listening");
    let server = warp::serve(routes).try_bind_ephemeral(addr);
    let (bound_addr, server_future) = match server {
        Ok((addr, fut)) => (addr, fut),
        Err(e) => {
            let err = DaemonError::BindFailed(addr, std::io::Error::other(e.to_string()));
            error!(error = %err, "failed to bind");
            return Err(err);
        }
    };
    info!(addr = %bound_addr, "dpld bound");
    server_future.await;
    Ok(())
}
