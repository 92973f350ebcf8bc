// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Whole-run scenarios through the public library API

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use climprep::dataset::DatasetError;
use climprep::openers::{JsonDirOpener, Opener, OpenerRegistry};
use climprep::{
    ArtifactBuilder, ArtifactStore, Dataset, FilesystemStore, MemoryStore, PipelineDriver,
    PrepError, PrepResult, Recipe, StepArgs, StoreKey, TargetStatus, TransformRegistry,
};

/// Opener returning small fixed datasets, shaped by group name
struct Stub;

#[async_trait]
impl Opener for Stub {
    async fn open(
        &self,
        _collection: &str,
        group: Option<&str>,
        variables: &[String],
    ) -> PrepResult<Dataset> {
        let (dim, values) = match group {
            Some("ocean") => ("time", vec![10.0, 20.0, 30.0]),
            Some("deep") => ("depth", vec![100.0, 200.0]),
            _ => ("time", vec![1.0, 2.0, 3.0]),
        };

        let mut ds = Dataset::new();
        for name in variables {
            ds = ds
                .with_var(name, &[dim], values.clone())
                .map_err(|e| PrepError::Io { message: e.to_string() })?;
        }
        Ok(ds)
    }
}

fn scale(factor: f64, offset: f64) -> impl Fn(Dataset, &StepArgs) -> anyhow::Result<Dataset> {
    move |ds: Dataset, _: &StepArgs| Ok(ds.map_values(None, |v| v * factor + offset)?)
}

fn driver_with(store: Arc<MemoryStore>, transforms: TransformRegistry) -> PipelineDriver {
    let openers = OpenerRegistry::new().with_fallback(Stub);
    PipelineDriver::new(store, ArtifactBuilder::new(transforms, openers))
}

fn arithmetic() -> TransformRegistry {
    let mut transforms = TransformRegistry::new();
    transforms
        .register("double", scale(2.0, 0.0))
        .register("add_one", scale(1.0, 1.0));
    transforms
}

fn values(ds: &Dataset, name: &str) -> Vec<f64> {
    ds.var(name).unwrap().values.clone()
}

#[tokio::test]
async fn builds_dependency_first_then_skips_on_rerun() {
    let recipe = Recipe::from_yaml(
        "
name: TEST
prepare:
  A:
    uses: [x]
    apply: [double]
  B:
    uses:
      prepared: [A]
    apply: [add_one]
",
    )
    .unwrap();
    let store = Arc::new(MemoryStore::new());
    let driver = driver_with(store.clone(), arithmetic());

    let report = driver.run(&recipe, &["B".to_string()]).await.unwrap();
    let order: Vec<_> = report.outcomes.iter().map(|o| o.identifier.as_str()).collect();
    assert_eq!(order, vec!["A", "B"]);
    assert_eq!(report.built(), 2);

    let a = store.read(&StoreKey::new("TEST", "A")).await.unwrap();
    let b = store.read(&StoreKey::new("TEST", "B")).await.unwrap();
    assert_eq!(values(&a, "x"), vec![2.0, 4.0, 6.0]);
    assert_eq!(values(&b, "x"), vec![3.0, 5.0, 7.0]);
    assert_eq!(store.writes(), 2);

    let again = driver.run(&recipe, &["B".to_string()]).await.unwrap();
    assert_eq!(store.writes(), 2);
    assert_eq!(again.already_present(), 2);
    assert!(again
        .outcomes
        .iter()
        .all(|o| matches!(o.status, TargetStatus::AlreadyPresent { stale: false })));
    assert!(again.is_success());
}

#[tokio::test]
async fn failed_dependency_skips_dependent() {
    let recipe = Recipe::from_yaml(
        "
name: TEST
prepare:
  C:
    uses:
      prepared: [D]
    apply: [add_one]
  D:
    uses: [x]
    apply: [no_such_step]
",
    )
    .unwrap();
    let store = Arc::new(MemoryStore::new());
    let driver = driver_with(store.clone(), arithmetic());

    let report = driver
        .run(&recipe, &["C".to_string(), "D".to_string()])
        .await
        .unwrap();

    assert!(!report.is_success());
    assert!(matches!(
        report.outcome("D").unwrap().status,
        TargetStatus::Failed {
            error: PrepError::UnknownTransform { .. }
        }
    ));
    match &report.outcome("C").unwrap().status {
        TargetStatus::SkippedDueToFailure { failed_dependency } => {
            assert_eq!(failed_dependency, "D")
        }
        other => panic!("expected C to be skipped, got {:?}", other),
    }
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn steps_run_in_order_around_the_merge() {
    let calls: Arc<Mutex<Vec<(String, Vec<String>)>>> = Arc::new(Mutex::new(Vec::new()));

    let recorder = |name: &'static str, marker: Option<&'static str>| {
        let calls = calls.clone();
        move |ds: Dataset, _: &StepArgs| -> anyhow::Result<Dataset> {
            let seen = ds.var_names().into_iter().map(String::from).collect();
            calls.lock().unwrap().push((name.to_string(), seen));
            match marker {
                Some(var) => Ok(ds.with_var(var, &["time"], vec![0.0, 0.0, 0.0])?),
                None => Ok(ds),
            }
        }
    };

    let mut transforms = TransformRegistry::new();
    transforms
        .register("stepA", recorder("stepA", None))
        .register("stepB", recorder("stepB", Some("from_b")))
        .register("stepC", recorder("stepC", None));

    let recipe = Recipe::from_yaml(
        "
name: TEST
prepare:
  T:
    uses:
      surface: [t]
      ocean: [sst]
    preprocess: [stepA]
    apply: [stepB, stepC]
",
    )
    .unwrap();
    let store = Arc::new(MemoryStore::new());
    let report = driver_with(store, transforms).run(&recipe, &[]).await.unwrap();
    assert!(report.is_success());

    let calls = calls.lock().unwrap().clone();
    let expected: Vec<(String, Vec<String>)> = vec![
        ("stepA".into(), vec!["t".into()]),
        ("stepA".into(), vec!["sst".into()]),
        ("stepB".into(), vec!["t".into(), "sst".into()]),
        ("stepC".into(), vec!["t".into(), "sst".into(), "from_b".into()]),
    ];
    assert_eq!(calls, expected);
}

#[tokio::test]
async fn merge_without_shared_dimension_fails_loudly() {
    let recipe = Recipe::from_yaml(
        "
name: TEST
prepare:
  surface_t:
    uses:
      surface: [t]
  deep_t:
    uses:
      deep: [t_deep]
  combined:
    uses:
      prepared: [surface_t, deep_t]
",
    )
    .unwrap();
    let store = Arc::new(MemoryStore::new());
    let report = driver_with(store.clone(), TransformRegistry::new())
        .run(&recipe, &[])
        .await
        .unwrap();

    assert!(matches!(
        report.outcome("combined").unwrap().status,
        TargetStatus::Failed {
            error: PrepError::CombineFailed {
                source: DatasetError::NoSharedDimension { .. },
                ..
            }
        }
    ));
    assert!(!store.exists(&StoreKey::new("TEST", "combined")).await.unwrap());
    assert_eq!(report.built(), 2);
}

#[tokio::test]
async fn cycles_abort_before_building() {
    for yaml in [
        "name: TEST\nprepare:\n  A:\n    uses: {prepared: [A]}\n",
        "name: TEST\nprepare:\n  A:\n    uses: {prepared: [B]}\n  B:\n    uses: {prepared: [A]}\n  C:\n    uses: [x]\n",
    ] {
        let recipe = Recipe::from_yaml(yaml).unwrap();
        let store = Arc::new(MemoryStore::new());

        let result = driver_with(store.clone(), arithmetic()).run(&recipe, &[]).await;

        assert!(matches!(result, Err(PrepError::CyclicDependency { .. })));
        assert_eq!(store.writes(), 0);
    }
}

#[tokio::test]
async fn filesystem_run_with_builtin_transforms() {
    let raw = TempDir::new().unwrap();
    let save = TempDir::new().unwrap();

    let month = |time: f64, t: f64| {
        Dataset::new()
            .with_coord("time", vec![time])
            .unwrap()
            .with_var("t_ref", &["time"], vec![t])
            .unwrap()
    };
    let dir = raw.path().join("JRA55").join("surface");
    std::fs::create_dir_all(&dir).unwrap();
    for (i, t) in [280.0, 282.0, 290.0, 292.0].iter().enumerate() {
        let path = dir.join(format!("m{:02}.json", i));
        std::fs::write(path, serde_json::to_string(&month(i as f64, *t)).unwrap()).unwrap();
    }

    let recipe = Recipe::from_yaml(
        "
name: JRA55
prepare:
  seasonal.t:
    uses:
      surface: [t_ref]
    apply:
      - rename: {t_ref: t}
      - coarsen: {dim: time, window: 2}
      - rechunk
  seasonal.anom.t:
    uses:
      prepared: [seasonal.t]
    apply:
      - anomalise: {dim: time}
",
    )
    .unwrap();

    let store = Arc::new(FilesystemStore::new(save.path()).unwrap());
    let openers = OpenerRegistry::new().with_fallback(JsonDirOpener::new(raw.path()));
    let driver = PipelineDriver::new(
        store.clone(),
        ArtifactBuilder::new(TransformRegistry::with_builtins(), openers),
    );

    let report = driver.run(&recipe, &[]).await.unwrap();
    assert!(report.is_success(), "{:?}", report);
    assert!(save.path().join("JRA55.seasonal.t.json").is_file());

    let seasonal = store.read(&StoreKey::new("JRA55", "seasonal.t")).await.unwrap();
    assert_eq!(values(&seasonal, "t"), vec![281.0, 291.0]);
    assert_eq!(seasonal.encoding().get("time"), Some(&-1));

    let anomalies = store
        .read(&StoreKey::new("JRA55", "seasonal.anom.t"))
        .await
        .unwrap();
    assert_eq!(values(&anomalies, "t"), vec![-5.0, 5.0]);
}
