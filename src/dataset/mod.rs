// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Labeled multi-dimensional datasets
//!
//! A [`Dataset`] is a set of named variables laid out over named dimensions,
//! with coordinate variables labelling those dimensions. Values are stored
//! row-major as `f64`, with NaN marking missing data (serialized as `null`).

mod calendar;
mod combine;
mod ops;

pub use combine::{concat, merge};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// Free-form metadata attached to datasets and variables
pub type Attrs = IndexMap<String, Value>;

/// Errors raised by dataset construction and array operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    #[error("variable '{name}' has {actual} values but its dimensions {dims:?} need {expected}")]
    ShapeMismatch {
        name: String,
        dims: Vec<String>,
        expected: usize,
        actual: usize,
    },

    #[error("variable '{name}' repeats dimension '{dim}'")]
    RepeatedDimension { name: String, dim: String },

    #[error("dimension '{dim}' has length {left} in one input and {right} in another")]
    DimensionConflict {
        dim: String,
        left: usize,
        right: usize,
    },

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("unknown dimension '{0}'")]
    UnknownDimension(String),

    #[error("no shared dimension between {left:?} and {right:?}")]
    NoSharedDimension {
        left: Vec<String>,
        right: Vec<String>,
    },

    #[error("coordinate '{0}' differs between inputs")]
    CoordinateConflict(String),

    #[error("variable '{0}' differs between inputs")]
    VariableConflict(String),

    #[error("renaming would give two entries the name '{0}'")]
    NameCollision(String),

    #[error("cannot concatenate: {0}")]
    ConcatMismatch(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("nothing to combine")]
    Empty,
}

/// A named-dimension array with attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Dimension names, outermost first
    pub dims: Vec<String>,

    /// Row-major values
    #[serde(with = "nan_as_null")]
    pub values: Vec<f64>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: Attrs,
}

impl Variable {
    /// Create a variable over the given dimensions
    pub fn new<I, S>(dims: I, values: Vec<f64>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dims: dims.into_iter().map(Into::into).collect(),
            values,
            attrs: Attrs::new(),
        }
    }

    /// Attach an attribute
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    /// Position of a dimension in this variable's layout
    pub fn axis(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// Value equality that treats NaN as equal to NaN
    pub fn same_as(&self, other: &Variable) -> bool {
        self.dims == other.dims
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
    }
}

/// A collection of coordinates and data variables over shared dimensions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    dims: IndexMap<String, usize>,

    #[serde(default)]
    coords: IndexMap<String, Variable>,

    #[serde(default)]
    data_vars: IndexMap<String, Variable>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    attrs: Attrs,

    /// Physical chunk layout for storage (dim -> chunk length, -1 = whole)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    encoding: IndexMap<String, i64>,
}

impl Dataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a dimension length up front (needed before multi-dim variables
    /// whose dimensions are not yet known)
    pub fn with_dim(mut self, name: &str, len: usize) -> Result<Self, DatasetError> {
        match self.dims.get(name) {
            Some(&existing) if existing != len => Err(DatasetError::DimensionConflict {
                dim: name.to_string(),
                left: existing,
                right: len,
            }),
            _ => {
                self.dims.insert(name.to_string(), len);
                Ok(self)
            }
        }
    }

    /// Add a one-dimensional coordinate labelling the dimension of the same name
    pub fn with_coord(mut self, dim: &str, values: Vec<f64>) -> Result<Self, DatasetError> {
        self.insert_coord(dim, Variable::new([dim], values))?;
        Ok(self)
    }

    /// Add a data variable
    pub fn with_var(
        mut self,
        name: &str,
        dims: &[&str],
        values: Vec<f64>,
    ) -> Result<Self, DatasetError> {
        self.insert_var(name, Variable::new(dims.iter().copied(), values))?;
        Ok(self)
    }

    /// Attach a dataset attribute
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    /// Insert or replace a coordinate variable
    pub fn insert_coord(&mut self, name: &str, var: Variable) -> Result<(), DatasetError> {
        if self.data_vars.contains_key(name) {
            return Err(DatasetError::VariableConflict(name.to_string()));
        }
        self.register(name, &var)?;
        self.coords.insert(name.to_string(), var);
        Ok(())
    }

    /// Insert or replace a data variable
    pub fn insert_var(&mut self, name: &str, var: Variable) -> Result<(), DatasetError> {
        if self.coords.contains_key(name) {
            return Err(DatasetError::VariableConflict(name.to_string()));
        }
        self.register(name, &var)?;
        self.data_vars.insert(name.to_string(), var);
        Ok(())
    }

    /// Check a variable against the known dimensions and record any new ones
    fn register(&mut self, name: &str, var: &Variable) -> Result<(), DatasetError> {
        let mut known = 1usize;
        let mut unknown = Vec::new();

        for (i, dim) in var.dims.iter().enumerate() {
            if var.dims[..i].contains(dim) {
                return Err(DatasetError::RepeatedDimension {
                    name: name.to_string(),
                    dim: dim.clone(),
                });
            }
            match self.dims.get(dim) {
                Some(len) => known *= len,
                None => unknown.push(dim.clone()),
            }
        }

        let actual = var.values.len();
        let mismatch = |expected: usize| DatasetError::ShapeMismatch {
            name: name.to_string(),
            dims: var.dims.clone(),
            expected,
            actual,
        };

        match unknown.as_slice() {
            [] if known == actual => Ok(()),
            [] => Err(mismatch(known)),
            [dim] if known > 0 && actual % known == 0 => {
                self.dims.insert(dim.clone(), actual / known);
                Ok(())
            }
            _ => Err(mismatch(known)),
        }
    }

    /// Re-check every variable against the declared dimensions
    pub fn validate(&self) -> Result<(), DatasetError> {
        for (name, var) in self.coords.iter().chain(&self.data_vars) {
            if self.data_vars.contains_key(name) && self.coords.contains_key(name) {
                return Err(DatasetError::VariableConflict(name.clone()));
            }
            let mut expected = 1usize;
            for (i, dim) in var.dims.iter().enumerate() {
                if var.dims[..i].contains(dim) {
                    return Err(DatasetError::RepeatedDimension {
                        name: name.clone(),
                        dim: dim.clone(),
                    });
                }
                expected *= self
                    .dims
                    .get(dim)
                    .ok_or_else(|| DatasetError::UnknownDimension(dim.clone()))?;
            }
            if expected != var.values.len() {
                return Err(DatasetError::ShapeMismatch {
                    name: name.clone(),
                    dims: var.dims.clone(),
                    expected,
                    actual: var.values.len(),
                });
            }
        }
        Ok(())
    }

    pub fn dims(&self) -> &IndexMap<String, usize> {
        &self.dims
    }

    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        self.dims.get(dim).copied()
    }

    pub fn coords(&self) -> &IndexMap<String, Variable> {
        &self.coords
    }

    pub fn data_vars(&self) -> &IndexMap<String, Variable> {
        &self.data_vars
    }

    pub fn coord(&self, name: &str) -> Option<&Variable> {
        self.coords.get(name)
    }

    pub fn var(&self, name: &str) -> Option<&Variable> {
        self.data_vars.get(name)
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attrs {
        &mut self.attrs
    }

    /// Chunk layout requested for storage
    pub fn encoding(&self) -> &IndexMap<String, i64> {
        &self.encoding
    }

    /// Replace the chunk layout; every named dimension must exist
    pub fn set_encoding(&mut self, chunks: IndexMap<String, i64>) -> Result<(), DatasetError> {
        if let Some(dim) = chunks.keys().find(|d| !self.dims.contains_key(*d)) {
            return Err(DatasetError::UnknownDimension(dim.clone()));
        }
        self.encoding = chunks;
        Ok(())
    }

    /// Names of the data variables, in insertion order
    pub fn var_names(&self) -> Vec<&str> {
        self.data_vars.keys().map(String::as_str).collect()
    }

    /// Lengths of a variable's dimensions
    pub fn shape_of(&self, var: &Variable) -> Vec<usize> {
        var.dims
            .iter()
            .map(|d| self.dims.get(d).copied().unwrap_or(0))
            .collect()
    }

    /// Total number of stored values across coordinates and variables
    pub fn value_count(&self) -> usize {
        self.coords
            .values()
            .chain(self.data_vars.values())
            .map(|v| v.values.len())
            .sum()
    }

    /// Keep only the named data variables, and the coordinates they still use
    pub fn select(&self, names: &[String]) -> Result<Dataset, DatasetError> {
        let mut out = Dataset {
            attrs: self.attrs.clone(),
            ..Dataset::default()
        };

        for name in names {
            let var = self
                .data_vars
                .get(name)
                .ok_or_else(|| DatasetError::UnknownVariable(name.clone()))?;
            out.data_vars.insert(name.clone(), var.clone());
        }

        let used: Vec<&String> = out.data_vars.values().flat_map(|v| &v.dims).collect();
        for (name, coord) in &self.coords {
            if coord.dims.iter().all(|d| used.contains(&d)) {
                out.coords.insert(name.clone(), coord.clone());
            }
        }

        out.dims = self
            .dims
            .iter()
            .filter(|(d, _)| used.contains(d))
            .map(|(d, len)| (d.clone(), *len))
            .collect();
        out.encoding = self
            .encoding
            .iter()
            .filter(|(d, _)| out.dims.contains_key(*d))
            .map(|(d, c)| (d.clone(), *c))
            .collect();

        Ok(out)
    }

    /// Rename variables, coordinates and dimensions
    ///
    /// Every key must name at least one of them.
    pub fn rename(self, mapping: &IndexMap<String, String>) -> Result<Dataset, DatasetError> {
        for old in mapping.keys() {
            if !self.dims.contains_key(old)
                && !self.coords.contains_key(old)
                && !self.data_vars.contains_key(old)
            {
                return Err(DatasetError::UnknownVariable(old.clone()));
            }
        }

        let rename = |name: &String| mapping.get(name).cloned().unwrap_or_else(|| name.clone());

        // Variables and coordinates share one namespace, dimensions another
        let variables = self.coords.keys().chain(self.data_vars.keys());
        for names in [variables.collect::<Vec<_>>(), self.dims.keys().collect()] {
            let mut seen = HashSet::new();
            for name in names.into_iter().map(&rename) {
                if !seen.insert(name.clone()) {
                    return Err(DatasetError::NameCollision(name));
                }
            }
        }

        let rename_var = |var: Variable| Variable {
            dims: var.dims.iter().map(rename).collect(),
            ..var
        };

        let out = Dataset {
            dims: self.dims.iter().map(|(d, len)| (rename(d), *len)).collect(),
            coords: self
                .coords
                .into_iter()
                .map(|(n, v)| (rename(&n), rename_var(v)))
                .collect(),
            data_vars: self
                .data_vars
                .into_iter()
                .map(|(n, v)| (rename(&n), rename_var(v)))
                .collect(),
            attrs: self.attrs,
            encoding: self.encoding.iter().map(|(d, c)| (rename(d), *c)).collect(),
        };
        out.validate()?;
        Ok(out)
    }

    /// Apply a function to every value of the chosen data variables (all when `None`)
    pub fn map_values(
        mut self,
        vars: Option<&[String]>,
        f: impl Fn(f64) -> f64,
    ) -> Result<Dataset, DatasetError> {
        if let Some(names) = vars {
            if let Some(missing) = names.iter().find(|n| !self.data_vars.contains_key(*n)) {
                return Err(DatasetError::UnknownVariable(missing.clone()));
            }
        }
        for (name, var) in self.data_vars.iter_mut() {
            if vars.map_or(true, |names| names.contains(name)) {
                var.values.iter_mut().for_each(|v| *v = f(*v));
            }
        }
        Ok(self)
    }

    /// Mutable access to a data variable
    pub fn var_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.data_vars.get_mut(name)
    }

    /// Drop dimensions no longer used by any variable
    fn prune_dims(&mut self) {
        let used: Vec<String> = self
            .coords
            .values()
            .chain(self.data_vars.values())
            .flat_map(|v| v.dims.iter().cloned())
            .collect();
        self.dims.retain(|d, _| used.contains(d));
        let dims = &self.dims;
        self.encoding.retain(|d, _| dims.contains_key(d));
    }
}

/// Split a shape around one axis into (outer, axis length, inner) block sizes
pub(crate) fn split_axis(shape: &[usize], axis: usize) -> (usize, usize, usize) {
    let outer = shape[..axis].iter().product();
    let inner = shape[axis + 1..].iter().product();
    (outer, shape[axis], inner)
}

/// NaN values travel as JSON `null`
mod nan_as_null {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            if value.is_nan() {
                seq.serialize_element(&Option::<f64>::None)?;
            } else {
                seq.serialize_element(value)?;
            }
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let raw = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}
