// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! climprep - derived climate dataset preparation
//!
//! Builds the targets of a recipe document in dependency order.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use climprep::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "climprep=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Prepare(args) => climprep::cli::prepare::run(args, cli.verbose).await,
        Commands::Validate { recipe } => climprep::cli::validate::run(recipe, cli.verbose).await,
        Commands::Graph { recipe, format } => {
            climprep::cli::graph::run(recipe, format, cli.verbose).await
        }
        Commands::Store { action, save_dir } => {
            climprep::cli::store::run(action, save_dir, cli.verbose).await
        }
        Commands::Transforms => climprep::cli::transforms::run(cli.verbose).await,
    }
}
