// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Store command - inspect prepared artifacts

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::StoreAction;
use crate::store::{ArtifactStore, FilesystemStore};
use crate::utils::{format_duration, print_header};

/// Run the store command
pub async fn run(action: StoreAction, save_dir: PathBuf, _verbose: bool) -> Result<()> {
    let store = FilesystemStore::new(&save_dir)?;

    match action {
        StoreAction::Stats => {
            let stats = store.stats().await?;

            print_header("Store Statistics");
            println!("  Location: {}", save_dir.display());
            println!("  Entries:  {}", stats.entries);
            println!("  Size:     {}", stats.formatted_size());

            if let Some(oldest) = stats.oldest_entry {
                if let Ok(duration) = oldest.elapsed() {
                    println!("  Oldest:   {} ago", format_duration(duration));
                }
            }

            if let Some(newest) = stats.newest_entry {
                if let Ok(duration) = newest.elapsed() {
                    println!("  Newest:   {} ago", format_duration(duration));
                }
            }

            Ok(())
        }

        StoreAction::List => {
            let artifacts = store.list().await?;

            print_header("Stored Artifacts");

            if artifacts.is_empty() {
                println!("{}", "  No stored artifacts.".dimmed());
                return Ok(());
            }

            for artifact in &artifacts {
                let age = artifact
                    .written_at
                    .elapsed()
                    .map(|d| format!("{} ago", format_duration(d)))
                    .unwrap_or_default();
                let fingerprint: String = artifact.fingerprint.chars().take(12).collect();
                println!(
                    "  {} {} {}",
                    artifact.key.to_string().bold(),
                    fingerprint.dimmed(),
                    age.dimmed()
                );
            }

            Ok(())
        }
    }
}
