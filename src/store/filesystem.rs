// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Filesystem-based artifact store
//!
//! Stores one JSON envelope per artifact, named after its key.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use super::{ArtifactInfo, ArtifactStore, StoreKey, StoredArtifact};
use crate::dataset::Dataset;
use crate::errors::{PrepError, PrepResult};

/// Envelope fields of an artifact file; the dataset is skipped unparsed
#[derive(Deserialize)]
struct Envelope {
    key: StoreKey,
    fingerprint: String,
    written_at: SystemTime,
}

/// Filesystem-based store rooted at a save directory
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Open a store, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> PrepResult<Self> {
        let root = root.into();
        if !root.exists() {
            std::fs::create_dir_all(&root).map_err(|e| PrepError::Io {
                message: format!("Failed to create store directory {}: {}", root.display(), e),
            })?;
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get path for an artifact
    fn artifact_path(&self, key: &StoreKey) -> PrepResult<PathBuf> {
        key.check_path_safe()?;
        Ok(self.root.join(format!("{}.json", key)))
    }

    async fn load(&self, key: &StoreKey) -> PrepResult<StoredArtifact> {
        let path = self.artifact_path(key)?;

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PrepError::store_io(key, format!("Failed to read artifact: {}", e)))?;

        let artifact: StoredArtifact = serde_json::from_str(&content)
            .map_err(|e| PrepError::store_io(key, format!("Failed to parse artifact: {}", e)))?;

        artifact
            .dataset
            .validate()
            .map_err(|e| PrepError::store_io(key, format!("Corrupt artifact: {}", e)))?;

        Ok(artifact)
    }
}

#[async_trait]
impl ArtifactStore for FilesystemStore {
    async fn exists(&self, key: &StoreKey) -> PrepResult<bool> {
        let path = self.artifact_path(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| PrepError::store_io(key, format!("Failed to check for artifact: {}", e)))
    }

    async fn read(&self, key: &StoreKey) -> PrepResult<Dataset> {
        Ok(self.load(key).await?.dataset)
    }

    async fn write(&self, key: &StoreKey, dataset: &Dataset, fingerprint: &str) -> PrepResult<()> {
        let path = self.artifact_path(key)?;

        if self.exists(key).await? {
            return Err(PrepError::store_io(key, "an artifact already exists under this key"));
        }

        let artifact = StoredArtifact {
            key: key.clone(),
            fingerprint: fingerprint.to_string(),
            written_at: SystemTime::now(),
            dataset: dataset.clone(),
        };

        let json = serde_json::to_string(&artifact)
            .map_err(|e| PrepError::store_io(key, format!("Failed to serialize artifact: {}", e)))?;

        // Readers never see a half-written artifact
        let temp = self.root.join(format!(".{}.json.tmp", key));
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| PrepError::store_io(key, format!("Failed to write artifact: {}", e)))?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|e| PrepError::store_io(key, format!("Failed to move artifact into place: {}", e)))?;

        debug!(key = %key, path = %path.display(), "Artifact written");
        Ok(())
    }

    async fn fingerprint(&self, key: &StoreKey) -> PrepResult<Option<String>> {
        if !self.exists(key).await? {
            return Ok(None);
        }
        let path = self.artifact_path(key)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PrepError::store_io(key, format!("Failed to read artifact: {}", e)))?;

        match serde_json::from_str::<Envelope>(&content) {
            Ok(envelope) => Ok(Some(envelope.fingerprint).filter(|f| !f.is_empty())),
            Err(e) => {
                warn!(key = %key, "Cannot read artifact fingerprint: {}", e);
                Ok(None)
            }
        }
    }

    async fn list(&self) -> PrepResult<Vec<ArtifactInfo>> {
        let mut artifacts = Vec::new();

        if !self.root.exists() {
            return Ok(artifacts);
        }

        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let is_artifact = path.extension().and_then(|e| e.to_str()) == Some("json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_artifact {
                continue;
            }

            let size_bytes = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<Envelope>(&content) {
                Ok(envelope) => artifacts.push(ArtifactInfo {
                    key: envelope.key,
                    fingerprint: envelope.fingerprint,
                    written_at: envelope.written_at,
                    size_bytes,
                }),
                Err(e) => warn!(path = %path.display(), "Skipping unreadable artifact: {}", e),
            }
        }

        artifacts.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Dataset {
        Dataset::new()
            .with_coord("time", vec![0.0, 1.0, 2.0])
            .unwrap()
            .with_var("t", &["time"], vec![1.0, f64::NAN, 3.0])
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp_dir.path()).unwrap();
        let key = StoreKey::new("JRA55", "annual.t");

        assert!(!store.exists(&key).await.unwrap());
        store.write(&key, &sample(), "abc").await.unwrap();

        assert!(store.exists(&key).await.unwrap());
        assert!(temp_dir.path().join("JRA55.annual.t.json").is_file());

        let read = store.read(&key).await.unwrap();
        assert!(read.var("t").unwrap().same_as(sample().var("t").unwrap()));
        assert_eq!(store.fingerprint(&key).await.unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_store_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp_dir.path()).unwrap();
        let key = StoreKey::new("JRA55", "annual.t");

        store.write(&key, &sample(), "one").await.unwrap();
        let second = store.write(&key, &Dataset::new(), "two").await;

        assert!(matches!(second, Err(PrepError::StoreIo { .. })));
        assert_eq!(store.fingerprint(&key).await.unwrap().as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn test_read_missing_is_store_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp_dir.path()).unwrap();

        let result = store.read(&StoreKey::new("JRA55", "nothing")).await;
        assert!(matches!(result, Err(PrepError::StoreIo { .. })));
    }

    #[tokio::test]
    async fn test_list_and_stats() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp_dir.path()).unwrap();

        store.write(&StoreKey::new("X", "b"), &sample(), "f").await.unwrap();
        store.write(&StoreKey::new("X", "a"), &sample(), "f").await.unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let listed = store.list().await.unwrap();
        let keys: Vec<String> = listed.iter().map(|a| a.key.to_string()).collect();
        assert_eq!(keys, vec!["X.a", "X.b"]);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.size_bytes > 0);
        assert!(stats.oldest_entry <= stats.newest_entry);
    }

    #[tokio::test]
    async fn test_exists_reports_io_failure() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("store");
        let store = FilesystemStore::new(&root).unwrap();

        // The save directory turns into a plain file under the store
        std::fs::remove_dir(&root).unwrap();
        std::fs::write(&root, "not a directory").unwrap();

        let key = StoreKey::new("JRA55", "annual.t");
        assert!(matches!(store.exists(&key).await, Err(PrepError::StoreIo { .. })));
        assert!(store.write(&key, &sample(), "f").await.is_err());
    }

    #[tokio::test]
    async fn test_fingerprint_of_corrupt_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp_dir.path()).unwrap();
        let key = StoreKey::new("JRA55", "annual.t");
        store.write(&key, &sample(), "abc").await.unwrap();

        let path = temp_dir.path().join("JRA55.annual.t.json");
        let mut envelope: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        envelope["dataset"]["data_vars"]["t"]["values"] = serde_json::json!([1.0]);
        std::fs::write(&path, envelope.to_string()).unwrap();

        assert_eq!(store.fingerprint(&key).await.unwrap().as_deref(), Some("abc"));
        assert!(matches!(store.read(&key).await, Err(PrepError::StoreIo { .. })));

        std::fs::write(&path, "{ truncated").unwrap();
        assert_eq!(store.fingerprint(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_path_separator_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp_dir.path()).unwrap();

        let result = store.write(&StoreKey::new("X", "../escape"), &sample(), "f").await;
        assert!(result.is_err());
    }
}
