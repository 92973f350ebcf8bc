// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Building and storing targets

mod builder;
mod driver;

pub use builder::ArtifactBuilder;
pub use driver::{PipelineDriver, PlannedTarget, RunReport, TargetOutcome, TargetStatus};
