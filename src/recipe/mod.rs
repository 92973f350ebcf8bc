// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Recipe documents and dependency resolution

mod dag;
mod definition;
mod validation;

pub use dag::{BuildPlan, DependencyGraph, Resolver};
pub use definition::*;
pub use validation::{RecipeValidator, ValidationResult};
