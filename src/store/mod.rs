// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Artifact store for prepared datasets
//!
//! An artifact's presence under its key is what marks a target as done.
//! Stores never overwrite: reprocessing means deleting the artifact first.

mod filesystem;
mod fingerprint;
mod memory;

pub use filesystem::FilesystemStore;
pub use fingerprint::{fingerprint, RecipeHasher};
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::dataset::Dataset;
use crate::errors::{PrepError, PrepResult};

/// Location of one artifact: `{collection}.{identifier}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreKey {
    pub collection: String,
    pub identifier: String,
}

impl StoreKey {
    pub fn new(collection: &str, identifier: &str) -> Self {
        Self {
            collection: collection.to_string(),
            identifier: identifier.to_string(),
        }
    }

    /// Keys become file names, so both parts must be plain names
    pub fn check_path_safe(&self) -> PrepResult<()> {
        for part in [&self.collection, &self.identifier] {
            if part.is_empty() || part.contains(['/', '\\']) || part == "." || part == ".." {
                return Err(PrepError::store_io(
                    self,
                    format!("'{}' cannot be used in an artifact path", part),
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.collection, self.identifier)
    }
}

/// Persisted form of one artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub key: StoreKey,
    /// Fingerprint of the recipe entry that produced the dataset
    pub fingerprint: String,
    pub written_at: SystemTime,
    pub dataset: Dataset,
}

/// Summary of one stored artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub key: StoreKey,
    pub fingerprint: String,
    pub written_at: SystemTime,
    pub size_bytes: u64,
}

/// Trait for artifact stores
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Whether an artifact exists under the key
    async fn exists(&self, key: &StoreKey) -> PrepResult<bool>;

    /// Read the dataset stored under the key
    async fn read(&self, key: &StoreKey) -> PrepResult<Dataset>;

    /// Persist a dataset; fails if the key is already taken
    async fn write(&self, key: &StoreKey, dataset: &Dataset, fingerprint: &str) -> PrepResult<()>;

    /// Recipe fingerprint recorded with the artifact, if any
    async fn fingerprint(&self, key: &StoreKey) -> PrepResult<Option<String>>;

    /// Every stored artifact, sorted by key
    async fn list(&self) -> PrepResult<Vec<ArtifactInfo>>;

    /// Get store statistics
    async fn stats(&self) -> PrepResult<StoreStats> {
        Ok(StoreStats::from_artifacts(&self.list().await?))
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of stored artifacts
    pub entries: usize,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Oldest write
    pub oldest_entry: Option<SystemTime>,
    /// Newest write
    pub newest_entry: Option<SystemTime>,
}

impl StoreStats {
    pub fn from_artifacts(artifacts: &[ArtifactInfo]) -> Self {
        Self {
            entries: artifacts.len(),
            size_bytes: artifacts.iter().map(|a| a.size_bytes).sum(),
            oldest_entry: artifacts.iter().map(|a| a.written_at).min(),
            newest_entry: artifacts.iter().map(|a| a.written_at).max(),
        }
    }

    /// Format size for display
    pub fn formatted_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if self.size_bytes >= GB {
            format!("{:.2} GB", self.size_bytes as f64 / GB as f64)
        } else if self.size_bytes >= MB {
            format!("{:.2} MB", self.size_bytes as f64 / MB as f64)
        } else if self.size_bytes >= KB {
            format!("{:.2} KB", self.size_bytes as f64 / KB as f64)
        } else {
            format!("{} bytes", self.size_bytes)
        }
    }
}
