// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Prepare command - build the targets of a recipe

use colored::Colorize;
use miette::Result;
use std::sync::Arc;

use super::{default_openers, PrepareArgs};
use crate::engine::{ArtifactBuilder, PipelineDriver, RunReport, TargetStatus};
use crate::errors::PrepError;
use crate::recipe::{Recipe, RecipeValidator};
use crate::store::FilesystemStore;
use crate::transforms::TransformRegistry;
use crate::utils::{
    print_error, print_header, print_info, print_section, print_skipped, print_success,
    print_warning,
};

/// Run the prepare command
pub async fn run(args: PrepareArgs, verbose: bool) -> Result<()> {
    let recipe = args.recipe.load().map_err(with_recovery)?;

    let validation = RecipeValidator::validate_structure(&recipe);
    if !validation.is_valid() {
        eprintln!("{}", "Recipe validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(miette::miette!("Recipe configuration is invalid"));
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Recipe warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let store = FilesystemStore::new(&args.save_dir)?;
    let builder = ArtifactBuilder::new(
        TransformRegistry::with_builtins(),
        default_openers(&args.raw_dir),
    );
    let driver = PipelineDriver::new(Arc::new(store), builder);

    println!();
    print_header(&format!("Recipe: {}", recipe.name));

    if args.dry_run {
        return print_plan(&driver, &recipe, &args.targets).await;
    }

    let report = driver
        .run(&recipe, &args.targets)
        .await
        .map_err(with_recovery)?;

    print_report(&report, verbose);

    if report.is_success() {
        Ok(())
    } else {
        Err(miette::miette!(
            "{} target(s) failed, {} skipped due to failure",
            report.failed(),
            report.skipped()
        ))
    }
}

async fn print_plan(driver: &PipelineDriver, recipe: &Recipe, targets: &[String]) -> Result<()> {
    let planned = driver
        .plan(recipe, targets)
        .await
        .map_err(with_recovery)?;

    println!(
        "Build plan ({} target{}):",
        planned.len(),
        if planned.len() == 1 { "" } else { "s" }
    );
    println!();

    for (i, target) in planned.iter().enumerate() {
        print!("  {}. {}", i + 1, target.identifier.bold());
        if !target.dependencies.is_empty() {
            print!(
                " {}",
                format!("[depends: {}]", target.dependencies.join(", ")).dimmed()
            );
        }
        match (target.present, target.stale) {
            (true, true) => print!(" {}", "(present, stale)".yellow()),
            (true, false) => print!(" {}", "(present)".dimmed()),
            _ => {}
        }
        println!();
    }

    println!();
    Ok(())
}

fn print_report(report: &RunReport, verbose: bool) {
    println!();

    for outcome in &report.outcomes {
        let id = &outcome.identifier;
        match &outcome.status {
            TargetStatus::Built => print_success(&format!(
                "{} ({:.2}s)",
                id.bold(),
                outcome.duration.as_secs_f64()
            )),
            TargetStatus::AlreadyPresent { stale: false } => {
                print_success(&format!("{} {}", id.bold(), "(already present)".dimmed()))
            }
            TargetStatus::AlreadyPresent { stale: true } => print_warning(&format!(
                "{} {}",
                id.bold(),
                "(already present, built from an older recipe entry)".yellow()
            )),
            TargetStatus::SkippedDueToFailure { failed_dependency } => print_skipped(&format!(
                "{} skipped: depends on failed '{}'",
                id.bold(),
                failed_dependency
            )),
            TargetStatus::Failed { error } => {
                print_error(&format!("{} failed", id.bold()));
                eprintln!("      {}", error.to_string().dimmed());
                if verbose {
                    if let Some(suggestion) = error.recovery() {
                        eprintln!("{}", suggestion);
                    }
                }
            }
        }
    }

    print_section("Summary");
    print_info(&format!(
        "{} built, {} already present, {} failed, {} skipped",
        report.built(),
        report.already_present(),
        report.failed(),
        report.skipped()
    ));
    if report.stale() > 0 {
        print_info(&format!(
            "{} stale artifact(s); delete them from the store to rebuild",
            report.stale()
        ));
    }

    println!();
    if report.is_success() {
        println!(
            "{}",
            format!(
                "Succeeded processing all targets in {:.2}s",
                report.duration.as_secs_f64()
            )
            .green()
        );
    } else {
        println!(
            "{}",
            format!("Run failed after {:.2}s", report.duration.as_secs_f64()).red()
        );
    }
}

/// Print a recovery suggestion before handing the error to miette
pub(crate) fn with_recovery(error: PrepError) -> miette::Report {
    if let Some(suggestion) = error.recovery() {
        eprintln!("{}", suggestion);
    }
    error.into()
}
