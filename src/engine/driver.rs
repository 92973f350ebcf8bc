// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Pipeline driver
//!
//! Realizes requested targets in the artifact store, one at a time, in
//! resolved build order.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::ArtifactBuilder;
use crate::errors::{PrepError, PrepResult};
use crate::recipe::{BuildPlan, Recipe, RecipeEntry, Resolver};
use crate::store::{fingerprint, ArtifactStore, StoreKey};

/// What happened to one target
#[derive(Debug)]
pub enum TargetStatus {
    /// Built and written to the store
    Built,
    /// Already in the store; `stale` when its recipe entry changed since
    AlreadyPresent { stale: bool },
    /// Not attempted because a dependency failed
    SkippedDueToFailure { failed_dependency: String },
    /// Building or storing failed
    Failed { error: PrepError },
}

impl TargetStatus {
    /// Short label for reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::AlreadyPresent { .. } => "already present",
            Self::SkippedDueToFailure { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::SkippedDueToFailure { .. } | Self::Failed { .. })
    }
}

/// Outcome of one target in a run
#[derive(Debug)]
pub struct TargetOutcome {
    pub identifier: String,
    pub key: StoreKey,
    pub status: TargetStatus,
    pub duration: Duration,
}

/// Result of a driver run
#[derive(Debug)]
pub struct RunReport {
    pub collection: String,
    /// Outcomes in build order
    pub outcomes: Vec<TargetOutcome>,
    /// Total run time
    pub duration: Duration,
}

impl RunReport {
    pub fn outcome(&self, identifier: &str) -> Option<&TargetOutcome> {
        self.outcomes.iter().find(|o| o.identifier == identifier)
    }

    fn count(&self, pred: impl Fn(&TargetStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn built(&self) -> usize {
        self.count(|s| matches!(s, TargetStatus::Built))
    }

    pub fn already_present(&self) -> usize {
        self.count(|s| matches!(s, TargetStatus::AlreadyPresent { .. }))
    }

    pub fn stale(&self) -> usize {
        self.count(|s| matches!(s, TargetStatus::AlreadyPresent { stale: true }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, TargetStatus::SkippedDueToFailure { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TargetStatus::Failed { .. }))
    }

    /// No target failed or was skipped because of a failure
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| !o.status.is_failure())
    }
}

/// One target of a dry run
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTarget {
    pub identifier: String,
    pub key: StoreKey,
    pub dependencies: Vec<String>,
    /// Already in the store, so it would not be built
    pub present: bool,
    pub stale: bool,
}

/// Drives builds against an artifact store
pub struct PipelineDriver {
    store: Arc<dyn ArtifactStore>,
    builder: ArtifactBuilder,
}

impl PipelineDriver {
    pub fn new(store: Arc<dyn ArtifactStore>, builder: ArtifactBuilder) -> Self {
        Self { store, builder }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn builder(&self) -> &ArtifactBuilder {
        &self.builder
    }

    /// Resolve the build order; an empty request means every target
    ///
    /// Undeclared local references already in the store become leaves.
    pub async fn resolve(&self, recipe: &Recipe, requested: &[String]) -> PrepResult<BuildPlan> {
        let mut materialized = Vec::new();
        for identifier in Resolver::undeclared_references(recipe) {
            if self
                .store
                .exists(&StoreKey::new(&recipe.name, &identifier))
                .await?
            {
                materialized.push(identifier);
            }
        }

        let resolver = Resolver::new(recipe).with_materialized(materialized);
        if requested.is_empty() {
            resolver.resolve_all()
        } else {
            resolver.resolve(requested)
        }
    }

    /// Resolve and report what a run would do, without building
    pub async fn plan(&self, recipe: &Recipe, requested: &[String]) -> PrepResult<Vec<PlannedTarget>> {
        let plan = self.resolve(recipe, requested).await?;
        let mut planned = Vec::with_capacity(plan.len());

        for identifier in &plan.order {
            let Some(entry) = recipe.entry(identifier) else {
                continue;
            };
            let key = StoreKey::new(&recipe.name, identifier);
            let present = self.store.exists(&key).await?;
            let stale = present && self.is_stale(&key, entry).await?;

            planned.push(PlannedTarget {
                identifier: identifier.clone(),
                dependencies: plan.dependencies_of(identifier).to_vec(),
                key,
                present,
                stale,
            });
        }

        Ok(planned)
    }

    /// Realize the requested targets
    ///
    /// Resolution errors abort the run. A failing target only takes its
    /// dependents down with it; independent targets still run.
    pub async fn run(&self, recipe: &Recipe, requested: &[String]) -> PrepResult<RunReport> {
        let start = Instant::now();
        let plan = self.resolve(recipe, requested).await?;

        info!(
            collection = %recipe.name,
            targets = plan.len(),
            order = ?plan.order,
            "Resolved build order"
        );
        for identifier in &plan.external {
            info!(target_id = %identifier, "Using stored artifact for undeclared reference");
        }

        let mut outcomes = Vec::with_capacity(plan.len());
        // Target -> the failed target it is blocked by
        let mut blocked: HashMap<String, String> = HashMap::new();

        for identifier in &plan.order {
            let Some(entry) = recipe.entry(identifier) else {
                continue;
            };
            let target_start = Instant::now();
            let key = StoreKey::new(&recipe.name, identifier);

            let failed_dependency = plan
                .dependencies_of(identifier)
                .iter()
                .find_map(|dep| blocked.get(dep))
                .cloned();

            // A stored artifact is complete whatever happened to its dependencies
            let status = match self.stored_status(&key, entry).await {
                Ok(Some(status)) => status,
                Ok(None) => match failed_dependency {
                    Some(failed_dependency) => {
                        warn!(
                            target_id = %identifier,
                            failed_dependency = %failed_dependency,
                            "Skipping target because a dependency failed"
                        );
                        blocked.insert(identifier.clone(), failed_dependency.clone());
                        TargetStatus::SkippedDueToFailure { failed_dependency }
                    }
                    None => match self.realize(recipe, identifier, entry, &key).await {
                        Ok(()) => TargetStatus::Built,
                        Err(e) => {
                            error!(target_id = %identifier, "Failed: {}", e);
                            blocked.insert(identifier.clone(), identifier.clone());
                            TargetStatus::Failed { error: e }
                        }
                    },
                },
                Err(e) => {
                    error!(target_id = %identifier, "Failed: {}", e);
                    blocked.insert(identifier.clone(), identifier.clone());
                    TargetStatus::Failed { error: e }
                }
            };

            outcomes.push(TargetOutcome {
                identifier: identifier.clone(),
                key,
                status,
                duration: target_start.elapsed(),
            });
        }

        let report = RunReport {
            collection: recipe.name.clone(),
            outcomes,
            duration: start.elapsed(),
        };

        if report.is_success() {
            info!(
                built = report.built(),
                already_present = report.already_present(),
                "Succeeded processing all targets"
            );
        } else {
            warn!(
                failed = report.failed(),
                skipped = report.skipped(),
                "Run finished with failures"
            );
        }

        Ok(report)
    }

    /// `AlreadyPresent` when the store holds the target, `None` when it must be built
    async fn stored_status(
        &self,
        key: &StoreKey,
        entry: &RecipeEntry,
    ) -> PrepResult<Option<TargetStatus>> {
        if !self.store.exists(key).await? {
            return Ok(None);
        }

        let stale = self.is_stale(key, entry).await?;
        if stale {
            warn!(
                key = %key,
                "Stored artifact was built from a different recipe entry; delete it to rebuild"
            );
        } else {
            info!(key = %key, "Already present");
        }
        Ok(Some(TargetStatus::AlreadyPresent { stale }))
    }

    /// Build one absent target and store it
    async fn realize(
        &self,
        recipe: &Recipe,
        identifier: &str,
        entry: &RecipeEntry,
        key: &StoreKey,
    ) -> PrepResult<()> {
        info!("Processing {} from {}", identifier, recipe.name);

        let mut prepared = IndexMap::new();
        for reference in &entry.uses.prepared {
            let dep_key = StoreKey::new(reference.collection(&recipe.name), reference.identifier());
            let ds = self.store.read(&dep_key).await?;
            prepared.insert(reference.clone(), ds);
        }

        let dataset = self
            .builder
            .build(&recipe.name, identifier, entry, &prepared)
            .await?;

        self.store
            .write(key, &dataset, &fingerprint(key, entry)?)
            .await?;
        info!(key = %key, "Stored artifact");

        Ok(())
    }

    async fn is_stale(&self, key: &StoreKey, entry: &RecipeEntry) -> PrepResult<bool> {
        match self.store.fingerprint(key).await? {
            Some(stored) => Ok(stored != fingerprint(key, entry)?),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::openers::{Opener, OpenerRegistry};
    use crate::store::MemoryStore;
    use crate::transforms::{StepArgs, TransformRegistry};
    use async_trait::async_trait;

    struct Ones;

    #[async_trait]
    impl Opener for Ones {
        async fn open(
            &self,
            _collection: &str,
            _group: Option<&str>,
            variables: &[String],
        ) -> PrepResult<Dataset> {
            let mut ds = Dataset::new();
            for name in variables {
                ds = ds.with_var(name, &["time"], vec![1.0, 1.0]).unwrap();
            }
            Ok(ds)
        }
    }

    fn driver(store: Arc<MemoryStore>) -> PipelineDriver {
        let mut transforms = TransformRegistry::with_builtins();
        transforms.register("explode", |_: Dataset, _: &StepArgs| -> anyhow::Result<Dataset> {
            anyhow::bail!("exploded")
        });
        let openers = OpenerRegistry::new().with_fallback(Ones);
        PipelineDriver::new(store, ArtifactBuilder::new(transforms, openers))
    }

    const RECIPE: &str = "
name: X
prepare:
  base:
    uses: [t]
  bad:
    uses: [t]
    apply: [explode]
  uses_bad:
    uses: {prepared: [bad]}
  uses_uses_bad:
    uses: {prepared: [uses_bad]}
  independent:
    uses: [q]
";

    #[tokio::test]
    async fn test_failure_blocks_only_dependents() {
        let store = Arc::new(MemoryStore::new());
        let recipe = Recipe::from_yaml(RECIPE).unwrap();

        let report = driver(store.clone()).run(&recipe, &[]).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.built(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 2);

        match &report.outcome("uses_uses_bad").unwrap().status {
            TargetStatus::SkippedDueToFailure { failed_dependency } => {
                assert_eq!(failed_dependency, "bad")
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert!(matches!(
            report.outcome("bad").unwrap().status,
            TargetStatus::Failed {
                error: PrepError::TransformFailed { .. }
            }
        ));
        assert!(store.exists(&StoreKey::new("X", "independent")).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_artifact_is_reported_not_rebuilt() {
        let store = Arc::new(MemoryStore::new());
        let recipe = Recipe::from_yaml("name: X\nprepare:\n  a:\n    uses: [t]\n").unwrap();
        driver(store.clone()).run(&recipe, &[]).await.unwrap();

        let changed =
            Recipe::from_yaml("name: X\nprepare:\n  a:\n    uses: [t]\n    apply: [rechunk]\n")
                .unwrap();
        let report = driver(store.clone()).run(&changed, &[]).await.unwrap();

        assert!(matches!(
            report.outcome("a").unwrap().status,
            TargetStatus::AlreadyPresent { stale: true }
        ));
        assert_eq!(store.writes(), 1);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_undeclared_reference_read_from_store() {
        let store = Arc::new(MemoryStore::new());
        let stored = Dataset::new().with_var("t", &["time"], vec![4.0]).unwrap();
        store.write(&StoreKey::new("X", "old"), &stored, "").await.unwrap();

        let recipe = Recipe::from_yaml("name: X\nprepare:\n  a:\n    uses: {prepared: [old]}\n").unwrap();
        let report = driver(store.clone()).run(&recipe, &[]).await.unwrap();

        assert_eq!(report.built(), 1);
        let built = store.read(&StoreKey::new("X", "a")).await.unwrap();
        assert_eq!(built, stored);
    }

    #[tokio::test]
    async fn test_undeclared_reference_missing_everywhere() {
        let store = Arc::new(MemoryStore::new());
        let recipe = Recipe::from_yaml("name: X\nprepare:\n  a:\n    uses: {prepared: [old]}\n").unwrap();

        let result = driver(store).run(&recipe, &[]).await;
        assert!(matches!(result, Err(PrepError::UnknownTarget { .. })));
    }

    #[tokio::test]
    async fn test_plan_reports_presence() {
        let store = Arc::new(MemoryStore::new());
        let recipe = Recipe::from_yaml(RECIPE).unwrap();
        let driver = driver(store.clone());

        driver.run(&recipe, &["base".to_string()]).await.unwrap();
        let planned = driver.plan(&recipe, &["uses_bad".to_string()]).await.unwrap();

        let ids: Vec<_> = planned.iter().map(|p| p.identifier.as_str()).collect();
        assert_eq!(ids, vec!["bad", "uses_bad"]);
        assert!(planned.iter().all(|p| !p.present));

        let planned = driver.plan(&recipe, &["base".to_string()]).await.unwrap();
        assert!(planned[0].present);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_stored_target_survives_failed_dependency() {
        let store = Arc::new(MemoryStore::new());
        let recipe = Recipe::from_yaml(RECIPE).unwrap();
        let stored = Dataset::new().with_var("t", &["time"], vec![3.0]).unwrap();
        store.write(&StoreKey::new("X", "uses_bad"), &stored, "").await.unwrap();

        let report = driver(store.clone())
            .run(&recipe, &["uses_uses_bad".to_string()])
            .await
            .unwrap();

        assert!(matches!(
            report.outcome("bad").unwrap().status,
            TargetStatus::Failed { .. }
        ));
        assert!(matches!(
            report.outcome("uses_bad").unwrap().status,
            TargetStatus::AlreadyPresent { .. }
        ));
        // Built from the stored artifact, not blocked by `bad`
        assert!(matches!(
            report.outcome("uses_uses_bad").unwrap().status,
            TargetStatus::Built
        ));
        assert_eq!(report.skipped(), 0);
    }

    const FOREIGN: &str = "
name: X
prepare:
  regridded:
    uses:
      prepared:
        - {collection: HadISST, identifier: sst}
  local:
    uses: [t]
";

    #[tokio::test]
    async fn test_foreign_reference_read_from_store() {
        let store = Arc::new(MemoryStore::new());
        let stored = Dataset::new().with_var("sst", &["time"], vec![290.0, 291.0]).unwrap();
        store.write(&StoreKey::new("HadISST", "sst"), &stored, "").await.unwrap();

        let recipe = Recipe::from_yaml(FOREIGN).unwrap();
        let report = driver(store.clone()).run(&recipe, &[]).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.built(), 2);
        let built = store.read(&StoreKey::new("X", "regridded")).await.unwrap();
        assert_eq!(built, stored);
    }

    #[tokio::test]
    async fn test_missing_foreign_reference_fails_only_its_dependent() {
        let store = Arc::new(MemoryStore::new());
        let recipe = Recipe::from_yaml(FOREIGN).unwrap();

        let report = driver(store.clone()).run(&recipe, &[]).await.unwrap();

        assert!(!report.is_success());
        assert!(matches!(
            report.outcome("regridded").unwrap().status,
            TargetStatus::Failed {
                error: PrepError::StoreIo { .. }
            }
        ));
        assert!(matches!(
            report.outcome("local").unwrap().status,
            TargetStatus::Built
        ));
        assert!(store.exists(&StoreKey::new("X", "local")).await.unwrap());
    }
}
