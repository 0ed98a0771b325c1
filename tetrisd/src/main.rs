/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! `tetrisd` – the TETRiS daemon binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tetrisd::manager::Manager;
use tetrisd::server::{Server, ServerConfig};

/// TETRiS CPU-affinity orchestration daemon.
#[derive(Debug, Parser)]
#[command(name = "tetrisd", version)]
struct Opts {
    /// Path to the folder with the per-application mapping catalogues.
    /// Defaults to the current directory.
    mappings: Option<PathBuf>,
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    // Log level comes from TETRIS_LOGLEVEL (e.g. "debug"); default "info".
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TETRIS_LOGLEVEL")
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("Welcome to TETRiS");

    let mappings = match opts.mappings {
        Some(path) => path,
        None => std::env::current_dir().context("cannot determine working directory")?,
    };

    let manager = Manager::new(&mappings);
    let mut server = Server::bind(&ServerConfig::default(), manager)?;
    server.run()
}
