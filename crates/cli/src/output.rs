// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared text/JSON rendering so every subcommand prints the same way
//! without each handler re-implementing the branch.

use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print `value` as pretty JSON, or hand it to `render` for the text path.
pub fn print<T: Serialize>(format: OutputFormat, value: &T, render: impl FnOnce(&T)) {
    match format {
        OutputFormat::Json => {
            match serde_json::to_string_pretty(value) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("dpl: failed to serialize response: {e}"),
            }
        }
        OutputFormat::Text => render(value),
    }
}
