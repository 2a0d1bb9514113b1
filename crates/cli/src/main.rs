// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dpl`: a thin command-line client for talking to a running `dpld` over
//! its HTTP veneer. Each subcommand is a direct call into [`dpl_wire::RetryClient`]
//! — this binary carries no ledger logic of its own, only argument parsing
//! and text/JSON rendering.

mod exit_error;
mod output;

use clap::{Parser, Subcommand};
use dpl_wire::types::*;
use dpl_wire::RetryClient;

use exit_error::ExitError;
use output::OutputFormat;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_GIT_HASH"), ")");

#[derive(Debug, Parser)]
#[command(name = "dpl", about = "Distributed process ledger client", version = VERSION)]
struct Cli {
    /// Base URL of a running dpld instance.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8947")]
    daemon_url: String,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show daemon uptime and operation count.
    Status,
    /// Start a new operation as its initiator.
    Create {
        participant_id: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Join an existing operation as a non-initiator participant.
    Join {
        operation_id: String,
        participant_id: String,
    },
    /// Force an out-of-band heartbeat tick.
    Heartbeat { operation_id: String },
    /// Set the operation's cooperative abort flag.
    Abort {
        operation_id: String,
        #[arg(long)]
        clear: bool,
    },
    /// Print the operation's current record.
    State { operation_id: String },
    /// Append a line to the operation's forensic log.
    Log {
        operation_id: String,
        message: String,
        #[arg(long, default_value = "info")]
        level: String,
    },
    /// Close a session, optionally cancelling its pending calls.
    Leave {
        operation_id: String,
        session_id: u64,
        #[arg(long)]
        cancel_pending_calls: bool,
    },
    /// Initiator-only: mark the operation completed and archive it.
    Complete { operation_id: String, session_id: u64 },
    /// Push a call frame with no in-process callback to run on completion.
    CallStart {
        operation_id: String,
        session_id: u64,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = true)]
        fail_on_crash: bool,
    },
    /// Remove a call frame after it finished successfully.
    CallEnd { operation_id: String, call_id: String },
    /// Remove a call frame; signals operation-wide failure only if the
    /// matching `call-start` was not run with `--fail-on-crash=false`.
    CallFail {
        operation_id: String,
        call_id: String,
        #[arg(long)]
        error: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("dpl: {e}");
        std::process::exit(e.code);
    }
}

async fn run(cli: Cli) -> Result<(), ExitError> {
    let client = RetryClient::new(cli.daemon_url);
    let format = cli.format;
    let pid = std::process::id();

    match cli.command {
        Command::Status => {
            let resp = client.status().await?;
            output::print(format, &resp, |r| {
                println!("version: {}", r.version);
                println!("uptime_ms: {}", r.uptime_ms);
                println!("operations: {}", r.operation_count);
            });
        }
        Command::Create { participant_id, description } => {
            let request = CreateOperationRequest {
                participant_id: participant_id.into(),
                participant_pid: pid,
                description,
            };
            let resp = client.create_operation(&request).await?;
            output::print(format, &resp, |r| {
                println!("operation_id: {}", r.operation_id);
                println!("session_id: {}", r.session_id);
                println!("is_initiator: {}", r.is_initiator);
            });
        }
        Command::Join { operation_id, participant_id } => {
            let request = JoinOperationRequest {
                operation_id: operation_id.into(),
                participant_id: participant_id.into(),
                participant_pid: pid,
            };
            let resp = client.join_operation(&request).await?;
            output::print(format, &resp, |r| {
                println!("session_id: {}", r.session_id);
                println!("is_initiator: {}", r.is_initiator);
            });
        }
        Command::Heartbeat { operation_id } => {
            let request = OperationIdRequest {
                operation_id: operation_id.into(),
            };
            let resp = client.heartbeat(&request).await?;
            output::print(format, &resp, |r| {
                println!("abort_flag: {}", r.abort_flag);
                println!("frame_count: {}", r.frame_count);
                println!("heartbeat_age_ms: {}", r.heartbeat_age_ms);
                println!("stale_participants: {:?}", r.stale_participants);
            });
        }
        Command::Abort { operation_id, clear } => {
            let request = AbortRequest {
                operation_id: operation_id.into(),
                value: !clear,
            };
            let resp = client.abort(&request).await?;
            output::print(format, &resp, |_| println!("ok"));
        }
        Command::State { operation_id } => {
            let request = OperationIdRequest {
                operation_id: operation_id.into(),
            };
            let resp = client.state(&request).await?;
            output::print(format, &resp, |r| {
                println!("operation_id: {}", r.operation_id);
                println!("status: {}", r.status);
                println!("aborted: {}", r.aborted);
                println!("frame_count: {}", r.frame_count);
                println!("participant_count: {}", r.participant_count);
            });
        }
        Command::Log { operation_id, message, level } => {
            let request = LogRequest {
                operation_id: operation_id.into(),
                message,
                level,
            };
            let resp = client.log(&request).await?;
            output::print(format, &resp, |_| println!("ok"));
        }
        Command::Leave { operation_id, session_id, cancel_pending_calls } => {
            let request = LeaveRequest {
                operation_id: operation_id.into(),
                session_id,
                cancel_pending_calls,
            };
            let resp = client.leave(&request).await?;
            output::print(format, &resp, |_| println!("ok"));
        }
        Command::Complete { operation_id, session_id } => {
            let request = OperationSessionRequest {
                operation_id: operation_id.into(),
                session_id,
            };
            let resp = client.complete(&request).await?;
            output::print(format, &resp, |_| println!("ok"));
        }
        Command::CallStart { operation_id, session_id, description, fail_on_crash } => {
            let request = StartCallRequest {
                operation_id: operation_id.into(),
                session_id,
                description,
                fail_on_crash,
            };
            let resp = client.start_call(&request).await?;
            output::print(format, &resp, |r| {
                println!("call_id: {}", r.call_id);
                println!("started_at_ms: {}", r.started_at_ms);
            });
        }
        Command::CallEnd { operation_id, call_id } => {
            let request = EndCallRequest {
                operation_id: operation_id.into(),
                call_id: call_id.into(),
            };
            let resp = client.end_call(&request).await?;
            output::print(format, &resp, |_| println!("ok"));
        }
        Command::CallFail { operation_id, call_id, error } => {
            let request = FailCallRequest {
                operation_id: operation_id.into(),
                call_id: call_id.into(),
                error,
            };
            let resp = client.fail_call(&request).await?;
            output::print(format, &resp, |_| println!("ok"));
        }
    }
    Ok(())
}
