// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Utility modules
//!
//! Common utilities for the climprep CLI.

pub mod colors;

pub use colors::*;
