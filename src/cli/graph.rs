// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Graph command - visualize recipe dependencies

use miette::Result;

use super::prepare::with_recovery;
use super::{GraphFormat, RecipeArgs};
use crate::recipe::{DependencyGraph, Resolver};

/// Run the graph command
pub async fn run(args: RecipeArgs, format: GraphFormat, _verbose: bool) -> Result<()> {
    let recipe = args.load().map_err(with_recovery)?;
    let dag = DependencyGraph::build(&recipe);

    let output = match format {
        GraphFormat::Text => {
            // Store contents are not consulted here
            let plan = Resolver::new(&recipe)
                .with_materialized(Resolver::undeclared_references(&recipe))
                .resolve_all()
                .map_err(with_recovery)?;
            dag.to_text(&plan)
        }
        GraphFormat::Dot => dag.to_dot(),
        GraphFormat::Mermaid => dag.to_mermaid(),
    };

    println!("{}", output);

    Ok(())
}
