/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! `tetrisctl` – single-shot administration of a running TETRiS daemon.
//!
//! Every invocation opens one connection to the control endpoint, writes one
//! [`ControlData`] record and exits; the daemon never answers on this
//! channel.  `upd_client` options are passed through environment variables,
//! matching what the client shim understands:
//!
//! | Variable | Effect |
//! |---|---|
//! | `TETRIS_MAPPING_TYPE` | `DYNAMIC` → dynamic placement, anything else → static |
//! | `TETRIS_COMPARE_CRITERIA` | selection criterion |
//! | `TETRIS_COMPARE_MORE_IS_BETTER` | set (any value) → prefer larger values |
//! | `TETRIS_PREFERRED_MAPPING` | mapping name to install verbatim |
//! | `TETRIS_FILTER_CRITERIA` | filter expression, e.g. `executionTime<100` |

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use tetrisd::cpumask::CpuMask;
use tetrisd::net::Connection;
use tetrisd::proto::{ControlData, UpdateClient, CONTROL_SOCKET};

#[derive(Debug, Parser)]
#[command(name = "tetrisctl", version)]
struct Opts {
    /// Path of the daemon's control socket.
    #[arg(long, default_value = CONTROL_SOCKET)]
    socket: PathBuf,

    #[command(subcommand)]
    operation: Operation,
}

// The subcommand names are part of the admin interface: upd_client,
// upd_mappings, block_cpus — not clap's default kebab-case.
#[derive(Debug, Subcommand)]
#[command(rename_all = "snake_case")]
enum Operation {
    /// Update a client's properties (options via TETRIS_* variables).
    UpdClient {
        /// The id of the client managed by TETRiS.
        id: i32,
    },
    /// Update the server's mapping database.
    UpdMappings,
    /// Block the given CPUs from placement.
    BlockCpus {
        /// CPU list like "0-2,5"; omit to unblock all CPUs.
        cpus: Option<String>,
    },
}

fn main() -> ExitCode {
    let opts = Opts::parse();

    match run(&opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Something went wrong: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(opts: &Opts) -> Result<()> {
    let record = match &opts.operation {
        Operation::UpdClient { id } => update_client_record(*id),
        Operation::UpdMappings => ControlData::UpdateMappings,
        Operation::BlockCpus { cpus } => block_cpus_record(cpus.as_deref())?,
    };

    let mut connection = Connection::connect(&opts.socket)
        .with_context(|| format!("cannot reach the daemon at {}", opts.socket.display()))?;
    connection.send(&record).context("failed to send control record")?;

    Ok(())
}

/// Assemble the `UPDATE_CLIENT` record from the environment.
fn update_client_record(id: i32) -> ControlData {
    let dynamic_client = std::env::var("TETRIS_MAPPING_TYPE")
        .ok()
        .map(|kind| kind == "DYNAMIC");

    let comparator = std::env::var("TETRIS_COMPARE_CRITERIA").ok().map(|criteria| {
        let more_is_better = std::env::var("TETRIS_COMPARE_MORE_IS_BETTER").is_ok();
        (criteria, more_is_better)
    });

    ControlData::UpdateClient(UpdateClient {
        client_id: id,
        dynamic_client,
        comparator,
        preferred_mapping: std::env::var("TETRIS_PREFERRED_MAPPING").ok(),
        filter_criteria: std::env::var("TETRIS_FILTER_CRITERIA").ok(),
    })
}

/// Parse the CPU list; an absent list unblocks everything after confirmation.
fn block_cpus_record(cpus: Option<&str>) -> Result<ControlData> {
    let cpus = match cpus {
        Some(list) => CpuMask::parse_list(list).context("malformed CPUs definition")?,
        None => {
            if !confirm("Really unblock all cpus? [Y/n] ")? {
                bail!("aborted");
            }
            CpuMask::empty()
        }
    };

    if cpus.is_empty() {
        println!("Unblocking all cpus");
    } else {
        println!("Blocking cpu(s): {cpus}");
    }

    Ok(ControlData::BlockCpus { cpus })
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;

    Ok(matches!(answer.trim(), "" | "y" | "Y"))
}
