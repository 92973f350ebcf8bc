// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! # climprep - Derived Climate Dataset Preparation
//!
//! `climprep` turns recipe documents into prepared datasets. Each recipe
//! names a collection and the targets derived from it; targets are built
//! in dependency order and written once to an artifact store.
//!
//! ## Features
//!
//! - **Dependency resolution** - Targets that use other prepared targets are built after them
//! - **Named transforms** - Recipe steps dispatch to a registry of dataset transforms
//! - **Skip if present** - A stored artifact is never rebuilt or overwritten
//! - **Stale detection** - Recipe fingerprints flag artifacts built from older entries
//!
//! ## Quick Start
//!
//! ```bash
//! # Build every target of config/prepare_data/JRA55.yaml
//! climprep prepare JRA55
//!
//! # Check the recipe first
//! climprep validate JRA55
//!
//! # Show the dependency graph
//! climprep graph JRA55 --format mermaid
//! ```

pub mod cli;
pub mod dataset;
pub mod engine;
pub mod errors;
pub mod openers;
pub mod recipe;
pub mod store;
pub mod transforms;
pub mod utils;

// Re-export commonly used types
pub use dataset::{Dataset, Variable};
pub use engine::{ArtifactBuilder, PipelineDriver, RunReport, TargetStatus};
pub use errors::{PrepError, PrepResult};
pub use recipe::{Recipe, RecipeEntry};
pub use store::{ArtifactStore, FilesystemStore, MemoryStore, StoreKey};
pub use transforms::{StepArgs, Transform, TransformRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
