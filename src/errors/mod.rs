// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Error types for recipe loading, resolution and building
//!
//! Errors fall in two families. Resolution errors describe the recipe graph
//! itself and abort a run before anything is built. Build errors belong to a
//! single target; the driver records them and carries on with independent
//! targets.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::dataset::DatasetError;
use crate::recipe::ChainKind;

/// Result type for climprep operations
pub type PrepResult<T> = Result<T, PrepError>;

/// Main error type for climprep
#[derive(Error, Debug, Diagnostic)]
pub enum PrepError {
    // ─────────────────────────────────────────────────────────────────────────
    // Recipe Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Recipe file not found: {path}")]
    #[diagnostic(
        code(climprep::recipe_not_found),
        help("Pass a path to a recipe, or a file name inside --config-dir")
    )]
    RecipeNotFound { path: PathBuf },

    #[error("Failed to read recipe '{path}': {error}")]
    #[diagnostic(code(climprep::recipe_read_error))]
    RecipeReadError { path: PathBuf, error: String },

    #[error("Invalid recipe: {reason}")]
    #[diagnostic(code(climprep::invalid_recipe))]
    InvalidRecipe {
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Unknown target '{target}'")]
    #[diagnostic(
        code(climprep::unknown_target),
        help("Declare '{target}' under 'prepare', or build it into the store first")
    )]
    UnknownTarget {
        target: String,
        referenced_by: Option<String>,
    },

    #[error("Cyclic dependency: {}", cycle.join(" -> "))]
    #[diagnostic(
        code(climprep::cyclic_dependency),
        help("Review the 'prepared' references of these targets to remove the cycle")
    )]
    CyclicDependency { cycle: Vec<String> },

    // ─────────────────────────────────────────────────────────────────────────
    // Build Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Target '{target}': unknown transform '{step}' ({chain} step {position})")]
    #[diagnostic(
        code(climprep::unknown_transform),
        help("Run 'climprep transforms' to list the registered step names")
    )]
    UnknownTransform {
        target: String,
        step: String,
        chain: ChainKind,
        position: usize,
    },

    #[error("Target '{target}': transform '{step}' ({chain} step {position}) failed: {cause}")]
    #[diagnostic(code(climprep::transform_failed))]
    TransformFailed {
        target: String,
        step: String,
        chain: ChainKind,
        position: usize,
        cause: String,
    },

    #[error("Target '{target}': failed to combine inputs by {mode}")]
    #[diagnostic(
        code(climprep::combine_failed),
        help("Inputs must agree on shared dimensions; check 'combine' and 'preprocess'")
    )]
    CombineFailed {
        target: String,
        mode: String,
        #[source]
        source: DatasetError,
    },

    #[error("No opener registered for collection '{collection}'")]
    #[diagnostic(code(climprep::opener_not_found), help("Available openers: {available}"))]
    OpenerNotFound {
        collection: String,
        available: String,
    },

    #[error("Failed to open group '{group}' of '{collection}': {reason}")]
    #[diagnostic(code(climprep::open_failed))]
    OpenFailed {
        collection: String,
        group: String,
        reason: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Store Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Artifact store error for '{key}': {message}")]
    #[diagnostic(code(climprep::store_io))]
    StoreIo { key: String, message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(climprep::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(climprep::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(climprep::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(climprep::toml_error))]
    Toml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(climprep::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for PrepError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for PrepError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for PrepError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for PrepError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<glob::PatternError> for PrepError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl PrepError {
    /// Structural errors in the recipe graph; these abort a whole run.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownTarget { .. } | Self::CyclicDependency { .. }
        )
    }

    /// Build a store error for a key
    pub fn store_io(key: impl ToString, message: impl ToString) -> Self {
        Self::StoreIo {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// Matching recovery suggestion, if there is a useful one
    pub fn recovery(&self) -> Option<RecoverySuggestion> {
        match self {
            Self::CyclicDependency { cycle } => {
                Some(RecoverySuggestion::fix_cyclic_dependency(cycle))
            }
            Self::UnknownTarget {
                target,
                referenced_by,
            } => Some(RecoverySuggestion::declare_target(
                target,
                referenced_by.as_deref(),
            )),
            Self::UnknownTransform { step, target, .. } => {
                Some(RecoverySuggestion::register_transform(step, target))
            }
            Self::RecipeNotFound { path } => Some(RecoverySuggestion::locate_recipe(path)),
            _ => None,
        }
    }
}
