// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Recipe document structures
//!
//! Defines the schema for recipe files (YAML or TOML).

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::path::Path;

use crate::errors::{PrepError, PrepResult};
use crate::transforms::StepArgs;

/// Key under `uses` that lists already-prepared targets
pub const PREPARED_KEY: &str = "prepared";

/// Recipe document: one collection and the targets derived from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Collection name; selects how raw data is opened
    pub name: String,

    /// Recipe description
    #[serde(default)]
    pub description: Option<String>,

    /// Targets to prepare, in declaration order
    #[serde(default)]
    pub prepare: IndexMap<String, RecipeEntry>,
}

impl Recipe {
    /// Load a recipe, choosing the format from the file extension
    pub fn from_file(path: &Path) -> PrepResult<Self> {
        if !path.exists() {
            return Err(PrepError::RecipeNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| PrepError::RecipeReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Parse a recipe from YAML
    pub fn from_yaml(yaml: &str) -> PrepResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Parse a recipe from TOML
    pub fn from_toml(toml: &str) -> PrepResult<Self> {
        toml::from_str(toml).map_err(Into::into)
    }

    /// Serialize the recipe to YAML
    pub fn to_yaml(&self) -> PrepResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Get a recipe entry by identifier
    pub fn entry(&self, identifier: &str) -> Option<&RecipeEntry> {
        self.prepare.get(identifier)
    }

    /// Declaration index of an identifier
    pub fn position(&self, identifier: &str) -> Option<usize> {
        self.prepare.get_index_of(identifier)
    }

    /// All declared identifiers, in declaration order
    pub fn identifiers(&self) -> Vec<&str> {
        self.prepare.keys().map(String::as_str).collect()
    }
}

/// How to build one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeEntry {
    /// Inputs: raw variable groups and/or prepared targets
    pub uses: Uses,

    /// How several inputs become one dataset
    #[serde(default)]
    pub combine: Combine,

    /// Steps applied to each raw input group before combination
    #[serde(default, skip_serializing_if = "StepChain::is_empty")]
    pub preprocess: StepChain,

    /// Steps applied to the combined dataset
    #[serde(default, skip_serializing_if = "StepChain::is_empty")]
    pub apply: StepChain,
}

impl RecipeEntry {
    /// Number of datasets feeding the combination step
    pub fn source_count(&self) -> usize {
        self.uses.groups.len() + self.uses.prepared.len()
    }

    /// Steps of one chain
    pub fn chain(&self, kind: ChainKind) -> &StepChain {
        match kind {
            ChainKind::Preprocess => &self.preprocess,
            ChainKind::Apply => &self.apply,
        }
    }
}

/// Inputs of a target, normalized from the document's list or mapping form
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "RawUses")]
pub struct Uses {
    /// Raw variable groups opened through the collection's opener
    pub groups: Vec<InputGroup>,

    /// Previously prepared targets read from the store
    pub prepared: Vec<TargetRef>,
}

/// Raw variables opened together
#[derive(Debug, Clone, PartialEq)]
pub struct InputGroup {
    /// Group (realm) name; `None` when `uses` is a plain list
    pub name: Option<String>,
    pub variables: Vec<String>,
}

impl InputGroup {
    /// Display label for logs and errors
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("default")
    }
}

/// Written back in the document's own shape: a plain list for a single
/// unnamed group, otherwise a mapping with `prepared` last
impl Serialize for Uses {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let ([group], []) = (self.groups.as_slice(), self.prepared.as_slice()) {
            if group.name.is_none() {
                return group.variables.serialize(serializer);
            }
        }

        let mut map = serializer.serialize_map(Some(
            self.groups.len() + usize::from(!self.prepared.is_empty()),
        ))?;
        for group in &self.groups {
            map.serialize_entry(group.label(), &group.variables)?;
        }
        if !self.prepared.is_empty() {
            map.serialize_entry(PREPARED_KEY, &self.prepared)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUses {
    Variables(Vec<String>),
    Groups(IndexMap<String, Vec<TargetRef>>),
}

impl TryFrom<RawUses> for Uses {
    type Error = String;

    fn try_from(raw: RawUses) -> Result<Self, Self::Error> {
        let uses = match raw {
            RawUses::Variables(variables) => Uses {
                groups: vec![InputGroup {
                    name: None,
                    variables,
                }],
                prepared: vec![],
            },
            RawUses::Groups(map) => {
                let mut uses = Uses::default();
                for (group, refs) in map {
                    if refs.is_empty() {
                        return Err(format!("input group '{}' lists nothing", group));
                    }
                    if group == PREPARED_KEY {
                        uses.prepared = refs;
                        continue;
                    }
                    let variables = refs
                        .into_iter()
                        .map(|r| match r {
                            TargetRef::Local(variable) => Ok(variable),
                            TargetRef::Qualified { .. } => Err(format!(
                                "input group '{}' may only list variable names",
                                group
                            )),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    uses.groups.push(InputGroup {
                        name: Some(group),
                        variables,
                    });
                }
                uses
            }
        };

        if uses.groups.is_empty() && uses.prepared.is_empty() {
            return Err("'uses' lists no inputs".to_string());
        }
        if uses.groups.iter().any(|g| g.variables.is_empty()) {
            return Err("'uses' lists an empty variable list".to_string());
        }
        Ok(uses)
    }
}

/// Reference to a prepared target, optionally in another collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetRef {
    /// Identifier in the recipe's own collection
    Local(String),

    /// Identifier qualified with its collection
    Qualified {
        collection: String,
        identifier: String,
    },
}

impl TargetRef {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Local(identifier) => identifier,
            Self::Qualified { identifier, .. } => identifier,
        }
    }

    /// Collection the reference points into, given the recipe's own collection
    pub fn collection<'a>(&'a self, local: &'a str) -> &'a str {
        match self {
            Self::Local(_) => local,
            Self::Qualified { collection, .. } => collection,
        }
    }

    /// Whether the reference stays inside the given collection
    pub fn is_local(&self, local: &str) -> bool {
        self.collection(local) == local
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(identifier) => write!(f, "{}", identifier),
            Self::Qualified {
                collection,
                identifier,
            } => write!(f, "{}.{}", collection, identifier),
        }
    }
}

/// Combination of several input datasets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Combine {
    /// Distinct variables over shared dimensions
    #[default]
    Merge,

    /// The same variables stitched along one dimension
    Concatenate { dim: String },
}

impl std::fmt::Display for Combine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Concatenate { dim } => write!(f, "concatenate along '{}'", dim),
        }
    }
}

/// Which chain a step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    Preprocess,
    Apply,
}

impl std::fmt::Display for ChainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preprocess => write!(f, "preprocess"),
            Self::Apply => write!(f, "apply"),
        }
    }
}

/// One named transform call
#[derive(Debug, Clone, PartialEq)]
pub struct StepInvocation {
    pub name: String,
    pub args: StepArgs,
}

/// A bare name without arguments, else a single-key `name: args` mapping
impl Serialize for StepInvocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.args.is_empty() {
            return serializer.serialize_str(&self.name);
        }
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.args)?;
        map.end()
    }
}

impl StepInvocation {
    /// A step without keyword arguments
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: StepArgs::default(),
        }
    }

    /// A step with keyword arguments
    pub fn with_args(name: &str, args: StepArgs) -> Self {
        Self {
            name: name.to_string(),
            args,
        }
    }
}

/// Ordered list of step invocations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSteps")]
pub struct StepChain(Vec<StepInvocation>);

impl StepChain {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepInvocation> {
        self.0.iter()
    }
}

impl From<Vec<StepInvocation>> for StepChain {
    fn from(steps: Vec<StepInvocation>) -> Self {
        Self(steps)
    }
}

impl<'a> IntoIterator for &'a StepChain {
    type Item = &'a StepInvocation;
    type IntoIter = std::slice::Iter<'a, StepInvocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSteps {
    Nothing(()),
    Listed(Vec<RawStep>),
    Keyed(IndexMap<String, Value>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStep {
    Bare(String),
    Keyed(IndexMap<String, Value>),
}

impl TryFrom<RawSteps> for StepChain {
    type Error = String;

    fn try_from(raw: RawSteps) -> Result<Self, Self::Error> {
        let pairs: Vec<(String, Value)> = match raw {
            RawSteps::Nothing(()) => vec![],
            RawSteps::Keyed(map) => map.into_iter().collect(),
            RawSteps::Listed(items) => items
                .into_iter()
                .map(|item| match item {
                    RawStep::Bare(name) => Ok((name, Value::Null)),
                    RawStep::Keyed(map) if map.len() == 1 => {
                        map.into_iter().next().ok_or_else(|| "empty step".to_string())
                    }
                    RawStep::Keyed(map) => Err(format!(
                        "a listed step must name exactly one transform, found {}",
                        map.len()
                    )),
                })
                .collect::<Result<_, _>>()?,
        };

        pairs
            .into_iter()
            .map(|(name, value)| match StepArgs::from_value(value) {
                Ok(args) => Ok(StepInvocation { name, args }),
                Err(e) => Err(format!("step '{}': {}", name, e)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(StepChain)
    }
}
