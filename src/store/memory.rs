// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! In-process artifact store

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;
use tokio::sync::RwLock;

use super::{ArtifactInfo, ArtifactStore, StoreKey, StoredArtifact};
use crate::dataset::Dataset;
use crate::errors::{PrepError, PrepResult};

/// Store kept in memory; counts writes so runs can be checked for work done
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: RwLock<BTreeMap<StoreKey, StoredArtifact>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes since creation
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.artifacts.read().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn exists(&self, key: &StoreKey) -> PrepResult<bool> {
        Ok(self.artifacts.read().await.contains_key(key))
    }

    async fn read(&self, key: &StoreKey) -> PrepResult<Dataset> {
        self.artifacts
            .read()
            .await
            .get(key)
            .map(|a| a.dataset.clone())
            .ok_or_else(|| PrepError::store_io(key, "no artifact under this key"))
    }

    async fn write(&self, key: &StoreKey, dataset: &Dataset, fingerprint: &str) -> PrepResult<()> {
        let mut artifacts = self.artifacts.write().await;
        if artifacts.contains_key(key) {
            return Err(PrepError::store_io(key, "an artifact already exists under this key"));
        }

        artifacts.insert(
            key.clone(),
            StoredArtifact {
                key: key.clone(),
                fingerprint: fingerprint.to_string(),
                written_at: SystemTime::now(),
                dataset: dataset.clone(),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fingerprint(&self, key: &StoreKey) -> PrepResult<Option<String>> {
        Ok(self
            .artifacts
            .read()
            .await
            .get(key)
            .map(|a| a.fingerprint.clone())
            .filter(|f| !f.is_empty()))
    }

    async fn list(&self) -> PrepResult<Vec<ArtifactInfo>> {
        let artifacts = self.artifacts.read().await;
        artifacts
            .values()
            .map(|a| -> PrepResult<ArtifactInfo> {
                let size_bytes = serde_json::to_vec(&a.dataset)?.len() as u64;
                Ok(ArtifactInfo {
                    key: a.key.clone(),
                    fingerprint: a.fingerprint.clone(),
                    written_at: a.written_at,
                    size_bytes,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_counts_and_refuses_overwrite() {
        let store = MemoryStore::new();
        let key = StoreKey::new("X", "a");

        store.write(&key, &Dataset::new(), "f").await.unwrap();
        assert!(store.write(&key, &Dataset::new(), "g").await.is_err());

        assert_eq!(store.writes(), 1);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.fingerprint(&key).await.unwrap().as_deref(), Some("f"));
    }

    #[tokio::test]
    async fn test_read_missing() {
        let store = MemoryStore::new();
        let result = store.read(&StoreKey::new("X", "a")).await;
        assert!(matches!(result, Err(PrepError::StoreIo { .. })));
    }
}
