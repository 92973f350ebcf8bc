// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Time axis restructuring and grid geometry
//!
//! Time coordinates count days since 1970-01-01 on the proleptic Gregorian
//! calendar; fractions of a day are allowed.

use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;

use super::{Dataset, DatasetError, Variable};

/// WGS84 semi-major and semi-minor axes, metres
const WGS84_A: f64 = 6_378_137.0;
const WGS84_B: f64 = 6_356_752.3142;

impl Dataset {
    /// Floor every value of the named coordinates to the first day of its month
    pub fn floor_to_month_start(&self, names: &[String]) -> Result<Dataset, DatasetError> {
        let mut out = self.clone();
        for name in names {
            let coord = out
                .coords
                .get_mut(name)
                .ok_or_else(|| DatasetError::UnknownVariable(name.clone()))?;
            for value in coord.values.iter_mut() {
                if value.is_nan() {
                    continue;
                }
                *value = month_start(*value).ok_or_else(|| {
                    DatasetError::InvalidArgument(format!(
                        "'{}' value {} is not a representable date",
                        name, value
                    ))
                })?;
            }
        }
        Ok(out)
    }

    /// Turn a single forecast's time axis into `init` and `lead` dimensions
    ///
    /// The new `init` dimension has length one and is labelled by the first
    /// time; `lead` counts steps from zero. Variables along `time` gain
    /// `init` as their outermost dimension and `time` becomes a coordinate
    /// over `(init, lead)`. Forecasts prepared this way concatenate along
    /// `init`.
    pub fn time_to_lead(
        &self,
        time_dim: &str,
        init_dim: &str,
        lead_dim: &str,
    ) -> Result<Dataset, DatasetError> {
        let len = self
            .dim_len(time_dim)
            .ok_or_else(|| DatasetError::UnknownDimension(time_dim.to_string()))?;
        let time = self
            .coord(time_dim)
            .filter(|c| c.dims.len() == 1 && c.dims[0] == time_dim)
            .ok_or_else(|| {
                DatasetError::InvalidArgument(format!("dimension '{}' has no coordinate", time_dim))
            })?;
        let Some(&init) = time.values.first() else {
            return Err(DatasetError::InvalidArgument(format!(
                "dimension '{}' is empty",
                time_dim
            )));
        };
        for name in [init_dim, lead_dim] {
            if self.dims.contains_key(name)
                || self.coords.contains_key(name)
                || self.data_vars.contains_key(name)
            {
                return Err(DatasetError::NameCollision(name.to_string()));
            }
        }

        let mut dims = IndexMap::new();
        for (dim, &n) in &self.dims {
            if dim == time_dim {
                dims.insert(init_dim.to_string(), 1);
                dims.insert(lead_dim.to_string(), n);
            } else {
                dims.insert(dim.clone(), n);
            }
        }

        // A leading length-one axis leaves the row-major layout unchanged
        let expand = |var: &Variable| -> Variable {
            if var.axis(time_dim).is_none() {
                return var.clone();
            }
            let mut dims = vec![init_dim.to_string()];
            dims.extend(var.dims.iter().map(|d| {
                if d == time_dim {
                    lead_dim.to_string()
                } else {
                    d.clone()
                }
            }));
            Variable {
                dims,
                values: var.values.clone(),
                attrs: var.attrs.clone(),
            }
        };

        let mut coords = IndexMap::new();
        coords.insert(init_dim.to_string(), Variable::new([init_dim], vec![init]));
        coords.insert(
            lead_dim.to_string(),
            Variable::new([lead_dim], (0..len).map(|i| i as f64).collect()),
        );
        for (name, coord) in &self.coords {
            coords.insert(name.clone(), expand(coord));
        }

        let out = Dataset {
            dims,
            coords,
            data_vars: self
                .data_vars
                .iter()
                .map(|(name, var)| (name.clone(), expand(var)))
                .collect(),
            attrs: self.attrs.clone(),
            encoding: self
                .encoding
                .iter()
                .map(|(d, &c)| {
                    let dim = if d == time_dim { lead_dim } else { d.as_str() };
                    (dim.to_string(), c)
                })
                .collect(),
        };
        out.validate()?;
        Ok(out)
    }

    /// Approximate cell areas (m²) of a regular latitude/longitude grid
    ///
    /// Uses the WGS84 geocentric radius at each latitude. Cell widths are the
    /// spacing to the previous grid line; the first line reuses the spacing
    /// to the second. Returns a variable over `(lat, lon)`.
    pub fn cell_areas(&self, lat_dim: &str, lon_dim: &str) -> Result<Variable, DatasetError> {
        let lat = grid_axis(self, lat_dim)?;
        let lon = grid_axis(self, lon_dim)?;

        let mut values = Vec::with_capacity(lat.len() * lon.len());
        for i in 0..lat.len() {
            let radius = earth_radius(lat[i]);
            let dy = spacing(lat, i).to_radians() * radius;
            for j in 0..lon.len() {
                let dx = spacing(lon, j).to_radians() * radius * lat[i].to_radians().cos();
                values.push((dy * dx).abs());
            }
        }

        Ok(Variable::new([lat_dim, lon_dim], values).with_attr("units", "m2"))
    }
}

/// Days since the epoch of the first of the month holding `days`
fn month_start(days: f64) -> Option<f64> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?.num_days_from_ce();
    let day = i32::try_from(days.floor() as i64).ok()?.checked_add(epoch)?;
    let first = NaiveDate::from_num_days_from_ce_opt(day)?.with_day(1)?;
    Some(f64::from(first.num_days_from_ce() - epoch))
}

/// Values of a one-dimensional coordinate with at least two grid lines
fn grid_axis<'a>(ds: &'a Dataset, dim: &str) -> Result<&'a [f64], DatasetError> {
    let coord = ds
        .coord(dim)
        .filter(|c| c.dims.len() == 1 && c.dims[0] == dim)
        .ok_or_else(|| {
            DatasetError::InvalidArgument(format!("dimension '{}' has no coordinate", dim))
        })?;
    if coord.values.len() < 2 {
        return Err(DatasetError::InvalidArgument(format!(
            "'{}' needs at least two grid lines to estimate cell sizes",
            dim
        )));
    }
    Ok(&coord.values)
}

fn spacing(values: &[f64], i: usize) -> f64 {
    if i == 0 {
        values[1] - values[0]
    } else {
        values[i] - values[i - 1]
    }
}

/// Earth radius at a geodetic latitude, treating the Earth as the WGS84 spheroid
fn earth_radius(lat_degrees: f64) -> f64 {
    let e2 = 1.0 - WGS84_B.powi(2) / WGS84_A.powi(2);
    let geocentric = ((1.0 - e2) * lat_degrees.to_radians().tan()).atan();
    (WGS84_A * (1.0 - e2).sqrt()) / (1.0 - e2 * geocentric.cos().powi(2)).sqrt()
}
