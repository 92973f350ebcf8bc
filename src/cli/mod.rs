// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for climprep.

pub mod graph;
pub mod prepare;
pub mod store;
pub mod transforms;
pub mod validate;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::errors::PrepResult;
use crate::openers::{JsonDirOpener, OpenerRegistry};
use crate::recipe::Recipe;

/// Derived climate dataset preparation
///
/// Builds the targets of a recipe document in dependency order.
#[derive(Parser, Debug)]
#[clap(
    name = "climprep",
    version,
    about = "Prepare derived climate datasets from recipe documents",
    long_about = None,
    after_help = "Examples:\n\
        climprep prepare JRA55                 Build every target of config/prepare_data/JRA55.yaml\n\
        climprep prepare JRA55 -t annual.t     Build one target and its dependencies\n\
        climprep validate JRA55                Check a recipe without building\n\
        climprep graph JRA55 --format mermaid  Show the dependency graph\n\n\
        See 'climprep <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the targets of a recipe
    Prepare(PrepareArgs),

    /// Validate a recipe without building
    Validate {
        #[clap(flatten)]
        recipe: RecipeArgs,
    },

    /// Show the dependency graph of a recipe
    Graph {
        #[clap(flatten)]
        recipe: RecipeArgs,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },

    /// Inspect the artifact store
    Store {
        #[clap(subcommand)]
        action: StoreAction,

        /// Directory holding prepared artifacts
        #[clap(long, env = "CLIMPREP_SAVE_DIR", default_value = "data/processed")]
        save_dir: PathBuf,
    },

    /// List registered transforms
    Transforms,
}

/// Extensions a recipe document may carry, in lookup order
const RECIPE_EXTENSIONS: [&str; 3] = ["yaml", "yml", "toml"];

/// Recipe lookup
#[derive(Args, Debug, Clone)]
pub struct RecipeArgs {
    /// Recipe name (looked up in --config-dir) or path
    pub config: String,

    /// Directory holding recipe documents
    #[clap(long, env = "CLIMPREP_CONFIG_DIR", default_value = "config/prepare_data")]
    pub config_dir: PathBuf,
}

impl RecipeArgs {
    /// An existing path wins; otherwise the name is looked up in the config
    /// directory, trying `.yaml`, `.yml` and `.toml` when it has no extension.
    pub fn resolve_path(&self) -> PathBuf {
        let direct = Path::new(&self.config);
        if direct.is_file() {
            return direct.to_path_buf();
        }

        // Dotted names such as `CAFE.f6` are not extensions
        let joined = self.config_dir.join(&self.config);
        let has_extension = joined
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| RECIPE_EXTENSIONS.contains(&e));
        if has_extension {
            return joined;
        }

        RECIPE_EXTENSIONS
            .iter()
            .map(|ext| self.config_dir.join(format!("{}.{}", self.config, ext)))
            .find(|p| p.is_file())
            .unwrap_or_else(|| self.config_dir.join(format!("{}.yaml", self.config)))
    }

    pub fn load(&self) -> PrepResult<Recipe> {
        Recipe::from_file(&self.resolve_path())
    }
}

#[derive(Args, Debug, Clone)]
pub struct PrepareArgs {
    #[clap(flatten)]
    pub recipe: RecipeArgs,

    /// Directory prepared artifacts are written to
    #[clap(long, env = "CLIMPREP_SAVE_DIR", default_value = "data/processed")]
    pub save_dir: PathBuf,

    /// Directory raw inputs are opened from
    #[clap(long, env = "CLIMPREP_RAW_DIR", default_value = "data/raw")]
    pub raw_dir: PathBuf,

    /// Build only these targets (and their dependencies)
    #[clap(short = 't', long = "target", value_name = "ID")]
    pub targets: Vec<String>,

    /// Show what would be built without building
    #[clap(long)]
    pub dry_run: bool,
}

/// Store inspection actions
#[derive(Subcommand, Debug, Clone)]
pub enum StoreAction {
    /// Show store statistics
    Stats,

    /// List stored artifacts
    List,
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// Openers used by the command line: JSON files under the raw directory
pub fn default_openers(raw_dir: &Path) -> OpenerRegistry {
    OpenerRegistry::new().with_fallback(JsonDirOpener::new(raw_dir))
}
