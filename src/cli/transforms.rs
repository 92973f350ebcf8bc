// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Transforms command - list step names recipes may use

use miette::Result;

use crate::transforms::TransformRegistry;
use crate::utils::{print_bullet, print_header};

/// Run the transforms command
pub async fn run(_verbose: bool) -> Result<()> {
    let registry = TransformRegistry::with_builtins();

    print_header(&format!("Registered transforms ({})", registry.len()));
    for name in registry.names() {
        print_bullet(name);
    }

    Ok(())
}
