// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Validate command - check a recipe without building

use colored::Colorize;
use miette::Result;
use std::path::Path;

use super::prepare::with_recovery;
use super::{default_openers, RecipeArgs};
use crate::recipe::{Recipe, RecipeValidator};
use crate::transforms::TransformRegistry;

/// Run the validate command
pub async fn run(args: RecipeArgs, verbose: bool) -> Result<()> {
    println!("{}", "Validating recipe...".bold());
    println!();

    let path = args.resolve_path();
    let recipe = match Recipe::from_file(&path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("  {} Failed to parse {}", "✗".red(), path.display());
            eprintln!();
            return Err(with_recovery(e));
        }
    };

    println!("  {} {} parses", "✓".green(), path.display());

    let mut validation = RecipeValidator::validate(&recipe);
    RecipeValidator::validate_transforms(
        &recipe,
        &TransformRegistry::with_builtins(),
        &mut validation,
    );
    // The command line opens every collection from the raw directory
    RecipeValidator::validate_openers(&recipe, &default_openers(Path::new(".")), &mut validation);

    if !validation.errors.is_empty() {
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            println!("  {} {}", "✗".red(), error);
        }
    }

    if !validation.warnings.is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
    }

    if verbose {
        println!();
        println!("{}:", "Recipe summary".bold());
        println!("  Collection: {}", recipe.name);
        println!("  Targets: {}", recipe.prepare.len());
        for (identifier, entry) in &recipe.prepare {
            let prepared: Vec<String> =
                entry.uses.prepared.iter().map(|r| r.to_string()).collect();
            let deps = if prepared.is_empty() {
                String::new()
            } else {
                format!(" [depends: {}]", prepared.join(", "))
            };
            println!(
                "    - {} ({} source{}, {} step{}){}",
                identifier,
                entry.source_count(),
                if entry.source_count() == 1 { "" } else { "s" },
                entry.preprocess.len() + entry.apply.len(),
                if entry.preprocess.len() + entry.apply.len() == 1 { "" } else { "s" },
                deps.dimmed()
            );
        }
    }

    println!();

    if !validation.is_valid() {
        Err(miette::miette!("Recipe validation failed"))
    } else if validation.has_warnings() {
        println!("{}", "Recipe is valid but has warnings.".yellow().bold());
        Ok(())
    } else {
        println!("{}", "Recipe is valid!".green().bold());
        Ok(())
    }
}
