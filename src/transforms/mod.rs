// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Named dataset transforms
//!
//! Every recipe step is looked up by name in a [`TransformRegistry`] and
//! called with the current dataset and the step's keyword arguments.

mod builtin;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::dataset::Dataset;

/// Keyword arguments of one step invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StepArgs(Map<String, Value>);

impl StepArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a mapping, or null for no arguments
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Ok(Self(map)),
            other => Err(format!(
                "keyword arguments must be a mapping, found {}",
                kind_of(&other)
            )),
        }
    }

    /// Add one argument
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Deserialize into a transform's typed arguments
    pub fn parse<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| anyhow::anyhow!("invalid arguments: {}", e))
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// A dataset-in, dataset-out step
pub trait Transform: Send + Sync {
    fn apply(&self, dataset: Dataset, args: &StepArgs) -> anyhow::Result<Dataset>;
}

impl<F> Transform for F
where
    F: Fn(Dataset, &StepArgs) -> anyhow::Result<Dataset> + Send + Sync,
{
    fn apply(&self, dataset: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
        self(dataset, args)
    }
}

/// Name to transform mapping, fixed before a run starts
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in catalogue
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register a transform, replacing any previous one with this name
    pub fn register(&mut self, name: &str, transform: impl Transform + 'static) -> &mut Self {
        self.transforms.insert(name.to_string(), Arc::new(transform));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transform>> {
        self.transforms.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.names())
            .finish()
    }
}
