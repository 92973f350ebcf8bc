// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Built-in transform catalogue

use anyhow::{bail, Context};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use super::{StepArgs, TransformRegistry};
use crate::dataset::Dataset;

pub(super) fn register_all(registry: &mut TransformRegistry) {
    registry
        .register("rename", rename)
        .register("select", select)
        .register("convert_units", convert_units)
        .register("mask", mask)
        .register("isel", isel)
        .register("sel", sel)
        .register("coarsen", coarsen)
        .register("mean", mean)
        .register("anomalise", anomalise)
        .register("percentile", percentile)
        .register("truncate_latitudes", truncate_latitudes)
        .register("round_to_start_of_month", round_to_start_of_month)
        .register("convert_time_to_lead", convert_time_to_lead)
        .register("estimate_cell_areas", estimate_cell_areas)
        .register("set_attrs", set_attrs)
        .register("rechunk", rechunk);
}

/// `rename: {old: new, ...}`
fn rename(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let mapping: IndexMap<String, String> = args.parse()?;
    Ok(ds.rename(&mapping)?)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectArgs {
    variables: Vec<String>,
}

fn select(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: SelectArgs = args.parse()?;
    Ok(ds.select(&args.variables)?)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConvertUnitsArgs {
    #[serde(default = "one")]
    multiply: f64,
    #[serde(default)]
    add: f64,
    units: Option<String>,
    variables: Option<Vec<String>>,
}

fn one() -> f64 {
    1.0
}

/// `value * multiply + add`, optionally stamping a new `units` attribute
fn convert_units(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: ConvertUnitsArgs = args.parse()?;
    let (multiply, add) = (args.multiply, args.add);

    let mut ds = ds.map_values(args.variables.as_deref(), |v| v * multiply + add)?;

    if let Some(units) = args.units {
        let names: Vec<String> = match args.variables {
            Some(names) => names,
            None => ds.var_names().into_iter().map(String::from).collect(),
        };
        for name in names {
            if let Some(var) = ds.var_mut(&name) {
                var.attrs.insert("units".into(), Value::String(units.clone()));
            }
        }
    }

    Ok(ds)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MaskArgs {
    below: Option<f64>,
    above: Option<f64>,
    variables: Option<Vec<String>>,
}

/// Replace values outside `[below, above]` with missing values
fn mask(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: MaskArgs = args.parse()?;
    if args.below.is_none() && args.above.is_none() {
        bail!("mask needs 'below' and/or 'above'");
    }
    let (below, above) = (args.below, args.above);

    Ok(ds.map_values(args.variables.as_deref(), |v| {
        if below.is_some_and(|b| v < b) || above.is_some_and(|a| v > a) {
            f64::NAN
        } else {
            v
        }
    })?)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IselArgs {
    dim: String,
    #[serde(default)]
    start: usize,
    stop: Option<usize>,
}

/// Positional slice `[start, stop)` along a dimension
fn isel(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: IselArgs = args.parse()?;
    let len = ds
        .dim_len(&args.dim)
        .with_context(|| format!("unknown dimension '{}'", args.dim))?;
    let stop = args.stop.unwrap_or(len);
    Ok(ds.isel_range(&args.dim, args.start, stop)?)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SelArgs {
    dim: String,
    from: Option<f64>,
    to: Option<f64>,
}

/// Label slice, bounds inclusive
fn sel(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: SelArgs = args.parse()?;
    Ok(ds.sel_range(&args.dim, args.from, args.to)?)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CoarsenArgs {
    dim: String,
    window: usize,
    /// First label of the first block; earlier steps are dropped
    start: Option<f64>,
}

/// Block means of `window` consecutive steps
fn coarsen(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: CoarsenArgs = args.parse()?;
    let ds = match args.start {
        Some(start) => ds.sel_range(&args.dim, Some(start), None)?,
        None => ds,
    };
    Ok(ds.coarsen(&args.dim, args.window)?)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MeanArgs {
    dims: Vec<String>,
    /// Coordinate or variable to weight by, e.g. `cell_area`
    weights: Option<String>,
}

fn mean(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: MeanArgs = args.parse()?;
    match args.weights {
        Some(weights) => Ok(ds.weighted_mean(&args.dims, &weights)?),
        None => Ok(ds.mean(&args.dims)?),
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AnomaliseArgs {
    #[serde(default = "time")]
    dim: String,
    from: Option<f64>,
    to: Option<f64>,
}

fn time() -> String {
    "time".to_string()
}

/// Anomalies against the mean of a reference period
fn anomalise(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: AnomaliseArgs = args.parse()?;
    Ok(ds.anomalies(&args.dim, args.from, args.to)?)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PercentileArgs {
    dim: String,
    q: f64,
}

fn percentile(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: PercentileArgs = args.parse()?;
    Ok(ds.percentile(&args.dim, args.q)?)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TruncateArgs {
    #[serde(default = "ten")]
    decimals: i32,
}

fn ten() -> i32 {
    10
}

/// Round latitude coordinates so that grids from different sources align
fn truncate_latitudes(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: TruncateArgs = args.parse()?;

    let names: Vec<String> = ds
        .coords()
        .iter()
        .filter(|(_, coord)| coord.dims.iter().any(|d| d.contains("lat")))
        .map(|(name, _)| name.clone())
        .collect();

    names
        .iter()
        .try_fold(ds, |ds, name| ds.round_coord(name, args.decimals))
        .map_err(Into::into)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MonthStartArgs {
    #[serde(default = "time_only")]
    dims: Vec<String>,
}

fn time_only() -> Vec<String> {
    vec![time()]
}

/// Label monthly steps by the first day of their month
fn round_to_start_of_month(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: MonthStartArgs = args.parse()?;
    Ok(ds.floor_to_month_start(&args.dims)?)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LeadArgs {
    #[serde(default = "time")]
    time_dim: String,
    #[serde(default = "init")]
    init_dim: String,
    #[serde(default = "lead")]
    lead_dim: String,
}

fn init() -> String {
    "init".to_string()
}

fn lead() -> String {
    "lead".to_string()
}

/// Restructure one forecast's `time` axis into `init` and `lead`
fn convert_time_to_lead(ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: LeadArgs = args.parse()?;
    Ok(ds.time_to_lead(&args.time_dim, &args.init_dim, &args.lead_dim)?)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CellAreaArgs {
    #[serde(default = "lat")]
    lat_dim: String,
    #[serde(default = "lon")]
    lon_dim: String,
    #[serde(default = "cell_area")]
    name: String,
}

fn lat() -> String {
    "lat".to_string()
}

fn lon() -> String {
    "lon".to_string()
}

fn cell_area() -> String {
    "cell_area".to_string()
}

/// Attach grid cell areas as a coordinate, for use as `mean` weights
fn estimate_cell_areas(mut ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let args: CellAreaArgs = args.parse()?;
    let areas = ds.cell_areas(&args.lat_dim, &args.lon_dim)?;
    ds.insert_coord(&args.name, areas)?;
    Ok(ds)
}

/// Every keyword argument becomes a dataset attribute
fn set_attrs(mut ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    for (key, value) in args.as_map() {
        ds.attrs_mut().insert(key.clone(), value.clone());
    }
    Ok(ds)
}

/// Storage chunk layout, `dim: length` with `-1` for a whole dimension
///
/// Without arguments every dimension becomes a single chunk.
fn rechunk(mut ds: Dataset, args: &StepArgs) -> anyhow::Result<Dataset> {
    let chunks: IndexMap<String, i64> = if args.is_empty() {
        ds.dims().keys().map(|d| (d.clone(), -1)).collect()
    } else {
        args.parse()?
    };

    if let Some((dim, chunk)) = chunks.iter().find(|(_, c)| **c == 0 || **c < -1) {
        bail!("invalid chunk length {} for '{}'", chunk, dim);
    }

    ds.set_encoding(chunks)?;
    Ok(ds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Dataset {
        Dataset::new()
            .with_coord("time", vec![0.0, 1.0, 2.0, 3.0])
            .unwrap()
            .with_coord("lat", vec![-0.30000000000000004, 0.1])
            .unwrap()
            .with_var(
                "t_ref",
                &["time", "lat"],
                vec![270.0, 280.0, 271.0, 281.0, 272.0, 282.0, 273.0, 283.0],
            )
            .unwrap()
    }

    #[test]
    fn test_rename_then_convert() {
        let ds = rename(grid(), &StepArgs::new().with("t_ref", "t")).unwrap();
        assert!(ds.var("t").is_some());

        let args = StepArgs::new()
            .with("add", -273.15)
            .with("units", "degC");
        let ds = convert_units(ds, &args).unwrap();
        let t = ds.var("t").unwrap();
        assert!((t.values[0] - (-3.15)).abs() < 1e-9);
        assert_eq!(t.attrs["units"], "degC");
    }

    #[test]
    fn test_mask_below() {
        let ds = mask(grid(), &StepArgs::new().with("below", 275.0)).unwrap();
        let values = &ds.var("t_ref").unwrap().values;
        assert!(values[0].is_nan());
        assert_eq!(values[1], 280.0);
    }

    #[test]
    fn test_mask_needs_a_bound() {
        assert!(mask(grid(), &StepArgs::new()).is_err());
    }

    #[test]
    fn test_coarsen_rejects_unknown_arguments() {
        let args = StepArgs::new().with("dim", "time").with("window", 2).with("how", "max");
        assert!(coarsen(grid(), &args).is_err());

        let args = StepArgs::new().with("dim", "time").with("window", 2);
        let ds = coarsen(grid(), &args).unwrap();
        assert_eq!(ds.dim_len("time"), Some(2));
    }

    #[test]
    fn test_truncate_latitudes() {
        let ds = truncate_latitudes(grid(), &StepArgs::new()).unwrap();
        assert_eq!(ds.coord("lat").unwrap().values, vec![-0.3, 0.1]);
    }

    #[test]
    fn test_rechunk_defaults_to_whole_dimensions() {
        let ds = rechunk(grid(), &StepArgs::new()).unwrap();
        assert_eq!(ds.encoding()["time"], -1);
        assert_eq!(ds.encoding()["lat"], -1);

        let ds = rechunk(grid(), &StepArgs::new().with("time", 2)).unwrap();
        assert_eq!(ds.encoding().get("time"), Some(&2));

        assert!(rechunk(grid(), &StepArgs::new().with("time", 0)).is_err());
        assert!(rechunk(grid(), &StepArgs::new().with("level", 1)).is_err());
    }

    #[test]
    fn test_coarsen_from_start_label() {
        let args = StepArgs::new()
            .with("dim", "time")
            .with("window", 2)
            .with("start", 1.0);
        let ds = coarsen(grid(), &args).unwrap();

        // Steps 1..=2 form the only full block; step 3 is trimmed
        assert_eq!(ds.dim_len("time"), Some(1));
        assert_eq!(ds.coord("time").unwrap().values, vec![2.0]);
        assert_eq!(ds.var("t_ref").unwrap().values, vec![271.5, 281.5]);
    }

    #[test]
    fn test_area_weighted_mean() {
        let ds = Dataset::new()
            .with_coord("lat", vec![0.0, 60.0])
            .unwrap()
            .with_coord("lon", vec![0.0, 10.0])
            .unwrap()
            .with_var("t", &["lat", "lon"], vec![10.0, 10.0, 0.0, 0.0])
            .unwrap();

        let ds = estimate_cell_areas(ds, &StepArgs::new()).unwrap();
        assert_eq!(ds.coord("cell_area").unwrap().dims, vec!["lat", "lon"]);

        let dims = serde_json::json!(["lat", "lon"]);
        let plain = mean(ds.clone(), &StepArgs::new().with("dims", dims.clone())).unwrap();
        assert_eq!(plain.var("t").unwrap().values, vec![5.0]);

        let weighted = mean(
            ds,
            &StepArgs::new().with("dims", dims).with("weights", "cell_area"),
        )
        .unwrap();
        // The equatorial row covers about twice the area of the row at 60°
        let t = weighted.var("t").unwrap().values[0];
        assert!(t > 6.5 && t < 6.8, "{}", t);
    }

    #[test]
    fn test_convert_time_to_lead_defaults() {
        let ds = convert_time_to_lead(grid(), &StepArgs::new()).unwrap();
        assert_eq!(ds.dim_len("init"), Some(1));
        assert_eq!(ds.dim_len("lead"), Some(4));
        assert_eq!(ds.var("t_ref").unwrap().dims, vec!["init", "lead", "lat"]);
        assert_eq!(ds.coord("time").unwrap().dims, vec!["init", "lead"]);
    }

    #[test]
    fn test_round_to_start_of_month() {
        // 1970-01-20 and 1970-02-14
        let ds = Dataset::new().with_coord("time", vec![19.0, 44.0]).unwrap();
        let ds = round_to_start_of_month(ds, &StepArgs::new()).unwrap();
        assert_eq!(ds.coord("time").unwrap().values, vec![0.0, 31.0]);

        let args = StepArgs::new().with("dims", serde_json::json!(["init"]));
        assert!(round_to_start_of_month(grid(), &args).is_err());
    }

    #[test]
    fn test_isel_defaults_to_end() {
        let args = StepArgs::new().with("dim", "time").with("start", 1);
        let ds = isel(grid(), &args).unwrap();
        assert_eq!(ds.coord("time").unwrap().values, vec![1.0, 2.0, 3.0]);
    }
}
