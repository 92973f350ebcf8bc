// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from errors.

use std::path::Path;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Suggest breaking a dependency cycle
    pub fn fix_cyclic_dependency(cycle: &[String]) -> Self {
        Self {
            action: "Remove the dependency cycle".into(),
            steps: vec![
                format!("Detected cycle: {}", cycle.join(" → ")),
                "A target cannot list itself, directly or through others, under 'prepared'".into(),
            ],
            commands: vec![
                "# Inspect the dependency graph:".into(),
                "climprep graph <recipe> --format mermaid".into(),
            ],
        }
    }

    /// Suggest declaring or materializing a missing target
    pub fn declare_target(target: &str, referenced_by: Option<&str>) -> Self {
        let mut steps = Vec::new();
        if let Some(parent) = referenced_by {
            steps.push(format!("'{}' lists '{}' under 'prepared'", parent, target));
        }
        steps.push(format!(
            "Add a 'prepare' entry named '{}', or qualify the reference with its collection",
            target
        ));

        Self {
            action: format!("Declare target '{}'", target),
            steps,
            commands: vec![
                "# Check what the recipe declares:".into(),
                "climprep validate <recipe>".into(),
            ],
        }
    }

    /// Suggest fixing a step name
    pub fn register_transform(step: &str, target: &str) -> Self {
        Self {
            action: format!("Fix step '{}' in target '{}'", step, target),
            steps: vec![
                "Step names must match a registered transform exactly".into(),
                "Check the spelling, or register the transform before running".into(),
            ],
            commands: vec![
                "# List registered transforms:".into(),
                "climprep transforms".into(),
            ],
        }
    }

    /// Suggest where recipes are looked up
    pub fn locate_recipe(path: &Path) -> Self {
        Self {
            action: "Point climprep at an existing recipe".into(),
            steps: vec![
                format!("Nothing found at {}", path.display()),
                "Relative names are looked up inside --config-dir".into(),
            ],
            commands: vec![
                "# Use an explicit directory:".into(),
                "climprep prepare <recipe> --config-dir <dir>".into(),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}
