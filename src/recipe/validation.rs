// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Recipe validation
//!
//! Eager checks run before a recipe is built. Structural problems are
//! reported together instead of failing on the first one.

use std::collections::HashSet;

use crate::errors::PrepError;
use crate::openers::OpenerRegistry;
use crate::recipe::{ChainKind, Combine, Recipe, RecipeEntry, Resolver};
use crate::transforms::TransformRegistry;

/// Recipe validator
pub struct RecipeValidator;

impl RecipeValidator {
    /// Structural and dependency-graph checks
    pub fn validate(recipe: &Recipe) -> ValidationResult {
        let mut result = Self::validate_structure(recipe);
        Self::validate_graph(recipe, &mut result);
        result
    }

    /// Checks that need nothing beyond the document itself
    pub fn validate_structure(recipe: &Recipe) -> ValidationResult {
        let mut result = ValidationResult::new();

        if recipe.name.trim().is_empty() {
            result.add_error("Recipe has no 'name'; it selects how raw data is opened");
        } else if has_separator(&recipe.name) {
            result.add_error(&format!(
                "Collection name '{}' must not contain path separators",
                recipe.name
            ));
        }

        if recipe.prepare.is_empty() {
            result.add_error("No targets were specified to prepare");
        }

        for (identifier, entry) in &recipe.prepare {
            Self::validate_entry(identifier, entry, &mut result);
        }

        result
    }

    fn validate_entry(identifier: &str, entry: &RecipeEntry, result: &mut ValidationResult) {
        if identifier.trim().is_empty() {
            result.add_error("Target identifier is empty");
        } else if has_separator(identifier) {
            result.add_error(&format!(
                "Target '{}': identifiers must not contain path separators",
                identifier
            ));
        }

        if entry.source_count() == 0 {
            result.add_error(&format!("Target '{}': 'uses' lists no inputs", identifier));
        }

        let mut seen = HashSet::new();
        for group in &entry.uses.groups {
            if !seen.insert(group.label()) {
                result.add_error(&format!(
                    "Target '{}': input group '{}' is listed twice",
                    identifier,
                    group.label()
                ));
            }
        }

        match &entry.combine {
            Combine::Concatenate { dim } if dim.trim().is_empty() => {
                result.add_error(&format!(
                    "Target '{}': concatenate needs a dimension",
                    identifier
                ));
            }
            Combine::Concatenate { .. } if entry.source_count() < 2 => {
                result.add_warning(&format!(
                    "Target '{}': concatenate with a single input has no effect",
                    identifier
                ));
            }
            _ => {}
        }

        if entry.uses.groups.is_empty() && !entry.preprocess.is_empty() {
            result.add_warning(&format!(
                "Target '{}': 'preprocess' only applies to raw input groups and will not run",
                identifier
            ));
        }
    }

    /// Unknown references and cycles
    ///
    /// Undeclared local references may already be in the store, so they
    /// only warn here; the driver decides once it can look.
    pub fn validate_graph(recipe: &Recipe, result: &mut ValidationResult) {
        let undeclared = Resolver::undeclared_references(recipe);
        for identifier in &undeclared {
            result.add_warning(&format!(
                "'{}' is referenced but not declared; it must already be in the store",
                identifier
            ));
        }

        match Resolver::new(recipe)
            .with_materialized(undeclared)
            .resolve_all()
        {
            Ok(_) => {}
            Err(PrepError::CyclicDependency { cycle }) => {
                result.add_error(&format!("Cyclic dependency: {}", cycle.join(" -> ")));
            }
            Err(e) => {
                result.add_error(&format!("Dependency resolution error: {}", e));
            }
        }
    }

    /// Every step name must be registered
    pub fn validate_transforms(
        recipe: &Recipe,
        registry: &TransformRegistry,
        result: &mut ValidationResult,
    ) {
        for (identifier, entry) in &recipe.prepare {
            for kind in [ChainKind::Preprocess, ChainKind::Apply] {
                for (i, step) in entry.chain(kind).iter().enumerate() {
                    if !registry.contains(&step.name) {
                        result.add_error(&format!(
                            "Target '{}': unknown transform '{}' ({} step {})",
                            identifier,
                            step.name,
                            kind,
                            i + 1
                        ));
                    }
                }
            }
        }
    }

    /// Collections with raw input groups need an opener
    pub fn validate_openers(
        recipe: &Recipe,
        openers: &OpenerRegistry,
        result: &mut ValidationResult,
    ) {
        let needs_opener = recipe
            .prepare
            .values()
            .any(|entry| !entry.uses.groups.is_empty());

        if needs_opener && !openers.has(&recipe.name) {
            result.add_error(&format!(
                "No opener registered for collection '{}'",
                recipe.name
            ));
        }
    }
}

fn has_separator(s: &str) -> bool {
    s.contains('/') || s.contains('\\')
}

/// Result of recipe validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Turn collected errors into a single `InvalidRecipe`
    pub fn into_result(self) -> Result<Self, PrepError> {
        if self.is_valid() {
            return Ok(self);
        }
        Err(PrepError::InvalidRecipe {
            reason: self.errors.join("; "),
            help: Some("Run 'climprep validate <recipe>' for the full report".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_empty_recipe() {
        let recipe = Recipe::from_yaml("name: X\n").unwrap();
        let result = RecipeValidator::validate(&recipe);

        assert!(!result.is_valid());
        assert!(result.errors[0].contains("No targets"));
    }

    #[test]
    fn test_validate_missing_collection_name() {
        let recipe = Recipe::from_yaml("name: ''\nprepare:\n  a:\n    uses: [t]\n").unwrap();
        let result = RecipeValidator::validate(&recipe);

        assert!(result.errors.iter().any(|e| e.contains("no 'name'")));
    }

    #[test]
    fn test_validate_path_separator_in_identifier() {
        let recipe = Recipe::from_yaml("name: X\nprepare:\n  a/b:\n    uses: [t]\n").unwrap();
        let result = RecipeValidator::validate(&recipe);

        assert!(result.errors.iter().any(|e| e.contains("path separators")));
    }

    #[test]
    fn test_single_source_concatenate_warns() {
        let recipe = Recipe::from_yaml(
            "name: X\nprepare:\n  a:\n    uses: [t]\n    combine: {mode: concatenate, dim: time}\n",
        )
        .unwrap();
        let result = RecipeValidator::validate(&recipe);

        assert!(result.is_valid());
        assert!(result.has_warnings());
    }

    #[test]
    fn test_cycle_is_reported() {
        let recipe = Recipe::from_yaml(
            "name: X\nprepare:\n  a:\n    uses: {prepared: [b]}\n  b:\n    uses: {prepared: [a]}\n",
        )
        .unwrap();
        let result = RecipeValidator::validate(&recipe);

        assert!(result.errors.iter().any(|e| e.contains("a -> b -> a")));
        assert!(result.into_result().is_err());
    }

    #[test]
    fn test_undeclared_reference_warns() {
        let recipe =
            Recipe::from_yaml("name: X\nprepare:\n  a:\n    uses: {prepared: [stored]}\n").unwrap();
        let result = RecipeValidator::validate(&recipe);

        assert!(result.is_valid());
        assert!(result.warnings[0].contains("'stored'"));
    }

    #[test]
    fn test_unknown_transform_reported_with_position() {
        let recipe = Recipe::from_yaml(
            "name: X\nprepare:\n  a:\n    uses: [t]\n    apply: [rechunk, sharpen]\n",
        )
        .unwrap();
        let mut result = RecipeValidator::validate(&recipe);
        RecipeValidator::validate_transforms(&recipe, &TransformRegistry::with_builtins(), &mut result);

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("'sharpen' (apply step 2)"));
    }

    #[test]
    fn test_missing_opener_reported() {
        let recipe = Recipe::from_yaml("name: X\nprepare:\n  a:\n    uses: [t]\n").unwrap();
        let mut result = ValidationResult::new();
        RecipeValidator::validate_openers(&recipe, &OpenerRegistry::new(), &mut result);

        assert!(!result.is_valid());
    }
}
