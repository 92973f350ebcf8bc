// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Opener for datasets stored as JSON files on disk

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::Opener;
use crate::dataset::{concat, Dataset};
use crate::errors::{PrepError, PrepResult};

/// Reads raw groups from a directory tree of JSON datasets
///
/// Layout under the root, per collection:
///
/// ```text
/// <root>/<collection>/<group>.json        one file for the group
/// <root>/<collection>/<group>/*.json      several files, concatenated
/// <root>/<collection>/*.json              the unnamed group
/// ```
#[derive(Debug, Clone)]
pub struct JsonDirOpener {
    root: PathBuf,
    concat_dim: String,
}

impl JsonDirOpener {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            concat_dim: "time".to_string(),
        }
    }

    /// Dimension along which multi-file groups are concatenated
    pub fn with_concat_dim(mut self, dim: &str) -> Self {
        self.concat_dim = dim.to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Source files of one group, sorted
    fn sources(&self, collection: &str, group: Option<&str>) -> PrepResult<Vec<PathBuf>> {
        let base = self.root.join(collection);

        let dir = match group {
            Some(group) => {
                let file = base.join(format!("{}.json", group));
                if file.is_file() {
                    return Ok(vec![file]);
                }
                base.join(group)
            }
            None => base,
        };

        let pattern = format!(
            "{}/*.json",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let mut files: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(Result::ok).collect();
        files.sort();

        Ok(files)
    }

    async fn read(&self, path: &Path) -> Result<Dataset, String> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        let ds: Dataset = serde_json::from_str(&content)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        ds.validate()
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        Ok(ds)
    }
}

#[async_trait]
impl Opener for JsonDirOpener {
    async fn open(
        &self,
        collection: &str,
        group: Option<&str>,
        variables: &[String],
    ) -> PrepResult<Dataset> {
        let label = group.unwrap_or("default");
        let failed = |reason: String| PrepError::OpenFailed {
            collection: collection.to_string(),
            group: label.to_string(),
            reason,
        };

        let files = self.sources(collection, group)?;
        if files.is_empty() {
            return Err(failed(format!(
                "no JSON files found under {}",
                self.root.join(collection).display()
            )));
        }
        debug!(collection, group = label, files = files.len(), "Opening raw group");

        let mut parts = Vec::with_capacity(files.len());
        for file in &files {
            let ds = self.read(file).await.map_err(&failed)?;
            let ds = ds
                .select(variables)
                .map_err(|e| failed(format!("{}: {}", file.display(), e)))?;
            parts.push(ds);
        }

        if parts.len() == 1 {
            return Ok(parts.remove(0));
        }
        concat(&parts, &self.concat_dim).map_err(|e| failed(e.to_string()))
    }
}
