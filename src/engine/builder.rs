// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Artifact builder
//!
//! Produces the dataset of one target: open raw groups, preprocess each,
//! add prepared inputs, combine, then run the apply chain. Persisting the
//! result is left to the driver.

use indexmap::IndexMap;
use tracing::debug;

use crate::dataset::{concat, merge, Dataset};
use crate::errors::{PrepError, PrepResult};
use crate::openers::OpenerRegistry;
use crate::recipe::{ChainKind, Combine, RecipeEntry, StepChain, TargetRef};
use crate::transforms::TransformRegistry;

/// Builds target datasets from recipe entries
#[derive(Debug, Clone)]
pub struct ArtifactBuilder {
    transforms: TransformRegistry,
    openers: OpenerRegistry,
}

impl ArtifactBuilder {
    pub fn new(transforms: TransformRegistry, openers: OpenerRegistry) -> Self {
        Self {
            transforms,
            openers,
        }
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    pub fn openers(&self) -> &OpenerRegistry {
        &self.openers
    }

    /// Build one target
    ///
    /// `prepared` must hold a dataset for every `prepared` reference of the
    /// entry.
    pub async fn build(
        &self,
        collection: &str,
        identifier: &str,
        entry: &RecipeEntry,
        prepared: &IndexMap<TargetRef, Dataset>,
    ) -> PrepResult<Dataset> {
        // Unknown step names fail before any data is opened
        self.check_steps(identifier, entry)?;

        let mut sources = Vec::with_capacity(entry.source_count());

        if !entry.uses.groups.is_empty() {
            let opener = self.openers.get(collection)?;
            for group in &entry.uses.groups {
                debug!(
                    target_id = identifier,
                    group = group.label(),
                    variables = ?group.variables,
                    "Opening input group"
                );
                let ds = opener
                    .open(collection, group.name.as_deref(), &group.variables)
                    .await?;
                let ds = self.run_chain(identifier, ChainKind::Preprocess, &entry.preprocess, ds)?;
                sources.push(ds);
            }
        }

        for reference in &entry.uses.prepared {
            let ds = prepared.get(reference).cloned().ok_or_else(|| {
                PrepError::store_io(
                    format!("{}.{}", reference.collection(collection), reference.identifier()),
                    "dependency was not read before building",
                )
            })?;
            sources.push(ds);
        }

        let combined = if sources.len() == 1 {
            sources.remove(0)
        } else {
            let result = match &entry.combine {
                Combine::Merge => merge(&sources),
                Combine::Concatenate { dim } => concat(&sources, dim),
            };
            result.map_err(|source| PrepError::CombineFailed {
                target: identifier.to_string(),
                mode: entry.combine.to_string(),
                source,
            })?
        };

        self.run_chain(identifier, ChainKind::Apply, &entry.apply, combined)
    }

    fn check_steps(&self, identifier: &str, entry: &RecipeEntry) -> PrepResult<()> {
        for kind in [ChainKind::Preprocess, ChainKind::Apply] {
            for (i, step) in entry.chain(kind).iter().enumerate() {
                if !self.transforms.contains(&step.name) {
                    return Err(PrepError::UnknownTransform {
                        target: identifier.to_string(),
                        step: step.name.clone(),
                        chain: kind,
                        position: i + 1,
                    });
                }
            }
        }
        Ok(())
    }

    /// Run a chain in order; each step's output feeds the next
    fn run_chain(
        &self,
        identifier: &str,
        kind: ChainKind,
        chain: &StepChain,
        mut ds: Dataset,
    ) -> PrepResult<Dataset> {
        for (i, step) in chain.iter().enumerate() {
            let position = i + 1;
            let transform =
                self.transforms
                    .get(&step.name)
                    .ok_or_else(|| PrepError::UnknownTransform {
                        target: identifier.to_string(),
                        step: step.name.clone(),
                        chain: kind,
                        position,
                    })?;

            debug!(target_id = identifier, chain = %kind, position, step = %step.name, "Applying step");
            ds = transform
                .apply(ds, &step.args)
                .map_err(|e| PrepError::TransformFailed {
                    target: identifier.to_string(),
                    step: step.name.clone(),
                    chain: kind,
                    position,
                    cause: format!("{:#}", e),
                })?;
        }
        Ok(ds)
    }
}
