// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Array operations along named dimensions

use super::{split_axis, Dataset, DatasetError, Variable};

impl Dataset {
    /// Positional slice `[start, stop)` along a dimension
    pub fn isel_range(&self, dim: &str, start: usize, stop: usize) -> Result<Dataset, DatasetError> {
        let len = self
            .dim_len(dim)
            .ok_or_else(|| DatasetError::UnknownDimension(dim.to_string()))?;
        if start > stop || stop > len {
            return Err(DatasetError::InvalidArgument(format!(
                "slice {}..{} is outside dimension '{}' of length {}",
                start, stop, dim, len
            )));
        }

        let mut out = self.clone();
        for (var, shape) in self.each_variable_mut(&mut out) {
            let Some(axis) = var.axis(dim) else { continue };
            let (outer, n, inner) = split_axis(&shape, axis);
            let mut values = Vec::with_capacity(outer * (stop - start) * inner);
            for o in 0..outer {
                let base = o * n * inner;
                values.extend_from_slice(&var.values[base + start * inner..base + stop * inner]);
            }
            var.values = values;
        }
        out.dims.insert(dim.to_string(), stop - start);
        Ok(out)
    }

    /// Label slice along a dimension using its coordinate, bounds inclusive
    pub fn sel_range(
        &self,
        dim: &str,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Result<Dataset, DatasetError> {
        let coord = self
            .coord(dim)
            .filter(|c| c.dims.len() == 1 && c.dims[0] == dim)
            .ok_or_else(|| {
                DatasetError::InvalidArgument(format!("dimension '{}' has no coordinate", dim))
            })?;

        let inside: Vec<usize> = coord
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| {
                !v.is_nan()
                    && lower.map_or(true, |lo| **v >= lo)
                    && upper.map_or(true, |hi| **v <= hi)
            })
            .map(|(i, _)| i)
            .collect();

        match (inside.first(), inside.last()) {
            (Some(&first), Some(&last)) => {
                if last - first + 1 != inside.len() {
                    return Err(DatasetError::InvalidArgument(format!(
                        "coordinate '{}' is not monotonic",
                        dim
                    )));
                }
                self.isel_range(dim, first, last + 1)
            }
            _ => self.isel_range(dim, 0, 0),
        }
    }

    /// NaN-skipping mean over the given dimensions
    ///
    /// Coordinates along a reduced dimension are dropped.
    pub fn mean(&self, dims: &[String]) -> Result<Dataset, DatasetError> {
        for dim in dims {
            if !self.dims.contains_key(dim) {
                return Err(DatasetError::UnknownDimension(dim.clone()));
            }
        }

        let mut out = self.clone();
        out.coords
            .retain(|_, c| !c.dims.iter().any(|d| dims.contains(d)));
        for (name, var) in &self.data_vars {
            let axes: Vec<usize> = var
                .dims
                .iter()
                .enumerate()
                .filter(|(_, d)| dims.contains(*d))
                .map(|(i, _)| i)
                .collect();
            if axes.is_empty() {
                continue;
            }
            let reduced = reduce_mean(var, &self.shape_of(var), &axes, None);
            out.data_vars.insert(name.clone(), reduced);
        }
        out.prune_dims();
        Ok(out)
    }

    /// Weighted NaN-skipping mean over the given dimensions
    ///
    /// `weights` names a coordinate or data variable (e.g. cell areas) whose
    /// dimensions all lie in `dims`. Every reduced variable must span them.
    /// The weights themselves are dropped from the result.
    pub fn weighted_mean(&self, dims: &[String], weights: &str) -> Result<Dataset, DatasetError> {
        let weight = self
            .coords
            .get(weights)
            .or_else(|| self.data_vars.get(weights))
            .ok_or_else(|| DatasetError::UnknownVariable(weights.to_string()))?;
        if let Some(dim) = weight.dims.iter().find(|d| !dims.contains(*d)) {
            return Err(DatasetError::InvalidArgument(format!(
                "weights '{}' span '{}', which is not averaged over",
                weights, dim
            )));
        }

        let mut source = self.clone();
        source.coords.shift_remove(weights);
        source.data_vars.shift_remove(weights);
        let mut out = source.mean(dims)?;

        let weight_shape = self.shape_of(weight);
        for (name, var) in &source.data_vars {
            let axes: Vec<usize> = var
                .dims
                .iter()
                .enumerate()
                .filter(|(_, d)| dims.contains(*d))
                .map(|(i, _)| i)
                .collect();
            if axes.is_empty() {
                continue;
            }

            // Stride into the weights for each axis of the variable
            let mut strides = vec![0usize; var.dims.len()];
            for (w_axis, dim) in weight.dims.iter().enumerate() {
                let axis = var.axis(dim).ok_or_else(|| {
                    DatasetError::InvalidArgument(format!(
                        "variable '{}' does not span '{}' of weights '{}'",
                        name, dim, weights
                    ))
                })?;
                strides[axis] = weight_shape[w_axis + 1..].iter().product();
            }

            let reduced = reduce_mean(
                var,
                &self.shape_of(var),
                &axes,
                Some((&weight.values, &strides)),
            );
            out.data_vars.insert(name.clone(), reduced);
        }
        Ok(out)
    }

    /// Block means of `window` steps along a dimension, dropping any remainder
    ///
    /// Coordinates along the dimension take the block maximum, so a block of
    /// months is labelled by its last month.
    pub fn coarsen(&self, dim: &str, window: usize) -> Result<Dataset, DatasetError> {
        let len = self
            .dim_len(dim)
            .ok_or_else(|| DatasetError::UnknownDimension(dim.to_string()))?;
        if window == 0 || window > len {
            return Err(DatasetError::InvalidArgument(format!(
                "window {} does not fit dimension '{}' of length {}",
                window, dim, len
            )));
        }
        let blocks = len / window;

        let mut out = self.clone();
        for coord in out.coords.values_mut() {
            coarsen_variable(coord, &self.dims, dim, window, blocks, nan_max);
        }
        for var in out.data_vars.values_mut() {
            coarsen_variable(var, &self.dims, dim, window, blocks, nan_mean);
        }
        out.dims.insert(dim.to_string(), blocks);
        Ok(out)
    }

    /// Subtract the mean over a reference period along a dimension
    pub fn anomalies(
        &self,
        dim: &str,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Result<Dataset, DatasetError> {
        let reference = self.sel_range(dim, lower, upper)?;
        if reference.dim_len(dim) == Some(0) {
            return Err(DatasetError::InvalidArgument(format!(
                "reference period selects nothing along '{}'",
                dim
            )));
        }
        let climatology = reference.mean(&[dim.to_string()])?;

        let mut out = self.clone();
        for (name, var) in out.data_vars.iter_mut() {
            let Some(axis) = var.axis(dim) else { continue };
            let clim = climatology
                .var(name)
                .ok_or_else(|| DatasetError::UnknownVariable(name.clone()))?;
            let shape: Vec<usize> = var.dims.iter().map(|d| self.dims[d]).collect();
            let (outer, n, inner) = split_axis(&shape, axis);
            for o in 0..outer {
                for k in 0..n {
                    for i in 0..inner {
                        var.values[(o * n + k) * inner + i] -= clim.values[o * inner + i];
                    }
                }
            }
        }
        Ok(out)
    }

    /// The `q`-th percentile (0..=100) along a dimension, linearly interpolated
    pub fn percentile(&self, dim: &str, q: f64) -> Result<Dataset, DatasetError> {
        if !(0.0..=100.0).contains(&q) {
            return Err(DatasetError::InvalidArgument(format!(
                "percentile {} is outside 0..=100",
                q
            )));
        }
        if !self.dims.contains_key(dim) {
            return Err(DatasetError::UnknownDimension(dim.to_string()));
        }

        let mut out = self.clone();
        out.coords.retain(|_, c| !c.dims.iter().any(|d| d == dim));
        for (name, var) in &self.data_vars {
            let Some(axis) = var.axis(dim) else { continue };
            let (outer, n, inner) = split_axis(&self.shape_of(var), axis);
            let mut values = Vec::with_capacity(outer * inner);
            for o in 0..outer {
                for i in 0..inner {
                    let mut sample: Vec<f64> = (0..n)
                        .map(|k| var.values[(o * n + k) * inner + i])
                        .filter(|v| !v.is_nan())
                        .collect();
                    sample.sort_by(f64::total_cmp);
                    values.push(interpolated_rank(&sample, q));
                }
            }
            let mut dims = var.dims.clone();
            dims.remove(axis);
            out.data_vars.insert(
                name.clone(),
                Variable {
                    dims,
                    values,
                    attrs: var.attrs.clone(),
                },
            );
        }
        out.prune_dims();
        Ok(out)
    }

    /// Round a coordinate to a number of decimal places
    pub fn round_coord(&self, name: &str, decimals: i32) -> Result<Dataset, DatasetError> {
        let mut out = self.clone();
        let coord = out
            .coords
            .get_mut(name)
            .ok_or_else(|| DatasetError::UnknownVariable(name.to_string()))?;
        let scale = 10f64.powi(decimals);
        coord
            .values
            .iter_mut()
            .for_each(|v| *v = (*v * scale).round() / scale);
        Ok(out)
    }

    /// Pair every variable of `out` with its shape in `self`
    fn each_variable_mut<'a>(
        &self,
        out: &'a mut Dataset,
    ) -> impl Iterator<Item = (&'a mut Variable, Vec<usize>)> {
        let dims = self.dims.clone();
        out.coords
            .values_mut()
            .chain(out.data_vars.values_mut())
            .map(move |var| {
                let shape = var.dims.iter().map(|d| dims[d]).collect();
                (var, shape)
            })
    }
}

/// Mean over `axes`, optionally weighted by `(values, stride per axis)`
fn reduce_mean(
    var: &Variable,
    shape: &[usize],
    axes: &[usize],
    weights: Option<(&[f64], &[usize])>,
) -> Variable {
    let kept: Vec<usize> = (0..shape.len()).filter(|a| !axes.contains(a)).collect();
    let out_len: usize = kept.iter().map(|&a| shape[a]).product();

    let mut out_strides = vec![0usize; shape.len()];
    let mut stride = 1;
    for &a in kept.iter().rev() {
        out_strides[a] = stride;
        stride *= shape[a];
    }

    let mut sums = vec![0.0; out_len];
    let mut totals = vec![0.0; out_len];
    for (flat, &value) in var.values.iter().enumerate() {
        let mut rest = flat;
        let mut target = 0;
        let mut w_index = 0;
        for a in (0..shape.len()).rev() {
            let i = rest % shape[a];
            target += i * out_strides[a];
            if let Some((_, strides)) = weights {
                w_index += i * strides[a];
            }
            rest /= shape[a];
        }
        let weight = weights.map_or(1.0, |(values, _)| values[w_index]);
        if !value.is_nan() && !weight.is_nan() {
            sums[target] += weight * value;
            totals[target] += weight;
        }
    }

    Variable {
        dims: kept.iter().map(|&a| var.dims[a].clone()).collect(),
        values: sums
            .into_iter()
            .zip(totals)
            .map(|(s, t)| if t == 0.0 { f64::NAN } else { s / t })
            .collect(),
        attrs: var.attrs.clone(),
    }
}

fn coarsen_variable(
    var: &mut Variable,
    dims: &indexmap::IndexMap<String, usize>,
    dim: &str,
    window: usize,
    blocks: usize,
    reduce: fn(&[f64]) -> f64,
) {
    let Some(axis) = var.axis(dim) else { return };
    let shape: Vec<usize> = var.dims.iter().map(|d| dims[d]).collect();
    let (outer, n, inner) = split_axis(&shape, axis);

    let mut values = Vec::with_capacity(outer * blocks * inner);
    let mut block = Vec::with_capacity(window);
    for o in 0..outer {
        for b in 0..blocks {
            for i in 0..inner {
                block.clear();
                block.extend((0..window).map(|w| var.values[(o * n + b * window + w) * inner + i]));
                values.push(reduce(&block));
            }
        }
    }
    var.values = values;
}

fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

fn nan_max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NAN, f64::max)
}

fn interpolated_rank(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = q / 100.0 * (n - 1) as f64;
            let low = rank.floor() as usize;
            let high = rank.ceil() as usize;
            sorted[low] + (sorted[high] - sorted[low]) * (rank - low as f64)
        }
    }
}
