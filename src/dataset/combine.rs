// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Combining several datasets into one
//!
//! Both operations use an exact join: shared dimensions must already agree.
//! Nothing is reindexed or padded, so inputs that do not line up fail loudly
//! instead of producing a partially empty result.

use super::{split_axis, Dataset, DatasetError, Variable};

/// Merge datasets holding different variables over shared dimensions
///
/// Each input after the first must share at least one dimension with the
/// inputs before it. Variables and coordinates present in several inputs
/// must be identical. Attributes of earlier inputs win.
pub fn merge(inputs: &[Dataset]) -> Result<Dataset, DatasetError> {
    let (first, rest) = inputs.split_first().ok_or(DatasetError::Empty)?;
    let mut merged = first.clone();

    for next in rest {
        if !next.dims.keys().any(|d| merged.dims.contains_key(d)) {
            return Err(DatasetError::NoSharedDimension {
                left: merged.dims.keys().cloned().collect(),
                right: next.dims.keys().cloned().collect(),
            });
        }

        for (dim, &len) in &next.dims {
            match merged.dims.get(dim) {
                Some(&existing) if existing != len => {
                    return Err(DatasetError::DimensionConflict {
                        dim: dim.clone(),
                        left: existing,
                        right: len,
                    });
                }
                Some(_) => {}
                None => {
                    merged.dims.insert(dim.clone(), len);
                }
            }
        }

        for (name, coord) in &next.coords {
            match merged.coords.get(name) {
                Some(existing) if !existing.same_as(coord) => {
                    return Err(DatasetError::CoordinateConflict(name.clone()));
                }
                Some(_) => {}
                None => merged.insert_coord(name, coord.clone())?,
            }
        }

        for (name, var) in &next.data_vars {
            match merged.data_vars.get(name) {
                Some(existing) if !existing.same_as(var) => {
                    return Err(DatasetError::VariableConflict(name.clone()));
                }
                Some(_) => {}
                None => merged.insert_var(name, var.clone())?,
            }
        }

        for (key, value) in &next.attrs {
            merged.attrs.entry(key.clone()).or_insert_with(|| value.clone());
        }
        for (dim, &chunk) in &next.encoding {
            merged.encoding.entry(dim.clone()).or_insert(chunk);
        }
    }

    Ok(merged)
}

/// Concatenate datasets with the same variables along one dimension
///
/// Variables that do not span `dim` must be identical across inputs and are
/// kept once.
pub fn concat(inputs: &[Dataset], dim: &str) -> Result<Dataset, DatasetError> {
    let (first, rest) = inputs.split_first().ok_or(DatasetError::Empty)?;

    for (i, ds) in inputs.iter().enumerate() {
        if !ds.dims.contains_key(dim) {
            return Err(DatasetError::ConcatMismatch(format!(
                "input {} has no dimension '{}'",
                i + 1,
                dim
            )));
        }
    }
    if rest.is_empty() {
        return Ok(first.clone());
    }

    for (i, ds) in rest.iter().enumerate() {
        let position = i + 2;
        if ds.dims.len() != first.dims.len() {
            return Err(DatasetError::ConcatMismatch(format!(
                "input {} has dimensions {:?}, expected {:?}",
                position,
                ds.dims.keys().collect::<Vec<_>>(),
                first.dims.keys().collect::<Vec<_>>()
            )));
        }
        for (name, &len) in first.dims.iter().filter(|(d, _)| d.as_str() != dim) {
            if ds.dims.get(name) != Some(&len) {
                return Err(DatasetError::ConcatMismatch(format!(
                    "dimension '{}' differs in input {}",
                    name, position
                )));
            }
        }
        if !same_names(first.data_vars.keys(), &ds.data_vars)
            || !same_names(first.coords.keys(), &ds.coords)
        {
            return Err(DatasetError::ConcatMismatch(format!(
                "input {} does not hold the same variables",
                position
            )));
        }
    }

    let total: usize = inputs.iter().filter_map(|ds| ds.dim_len(dim)).sum();
    let mut out = Dataset {
        dims: first.dims.clone(),
        attrs: first.attrs.clone(),
        encoding: first.encoding.clone(),
        ..Dataset::default()
    };
    out.dims.insert(dim.to_string(), total);

    for name in first.coords.keys() {
        let parts: Vec<(&Dataset, &Variable)> =
            inputs.iter().map(|ds| (ds, &ds.coords[name])).collect();
        out.coords.insert(name.clone(), stitch(&parts, name, dim)?);
    }
    for name in first.data_vars.keys() {
        let parts: Vec<(&Dataset, &Variable)> =
            inputs.iter().map(|ds| (ds, &ds.data_vars[name])).collect();
        out.data_vars.insert(name.clone(), stitch(&parts, name, dim)?);
    }

    Ok(out)
}

fn same_names<'a>(
    names: impl ExactSizeIterator<Item = &'a String>,
    other: &indexmap::IndexMap<String, Variable>,
) -> bool {
    names.len() == other.len() && names.into_iter().all(|n| other.contains_key(n))
}

fn stitch(parts: &[(&Dataset, &Variable)], name: &str, dim: &str) -> Result<Variable, DatasetError> {
    let (_, template) = parts[0];

    let Some(axis) = template.axis(dim) else {
        if parts.iter().any(|(_, v)| !v.same_as(template)) {
            return Err(DatasetError::ConcatMismatch(format!(
                "'{}' does not span '{}' and differs between inputs",
                name, dim
            )));
        }
        return Ok(template.clone());
    };

    if parts.iter().any(|(_, v)| v.dims != template.dims) {
        return Err(DatasetError::ConcatMismatch(format!(
            "dimension order of '{}' differs between inputs",
            name
        )));
    }

    let (outer, _, inner) = split_axis(&parts[0].0.shape_of(template), axis);
    let capacity = parts.iter().map(|(_, v)| v.values.len()).sum();
    let mut values = Vec::with_capacity(capacity);
    for o in 0..outer {
        for (ds, var) in parts {
            let block = ds.dims[dim] * inner;
            values.extend_from_slice(&var.values[o * block..(o + 1) * block]);
        }
    }

    Ok(Variable {
        dims: template.dims.clone(),
        values,
        attrs: template.attrs.clone(),
    })
}
