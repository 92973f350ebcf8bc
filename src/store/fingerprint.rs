// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Recipe fingerprints
//!
//! Uses BLAKE3 over the canonical JSON of an entry. A fingerprint that no
//! longer matches only marks an artifact as stale; nothing is rebuilt.

use blake3::Hasher;

use super::StoreKey;
use crate::errors::PrepResult;
use crate::recipe::RecipeEntry;

/// Hasher for recipe entries
pub struct RecipeHasher {
    hasher: Hasher,
}

impl RecipeHasher {
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    /// Hash the key and the entry that produces it
    pub fn hash_entry(mut self, key: &StoreKey, entry: &RecipeEntry) -> PrepResult<String> {
        self.hasher.update(key.collection.as_bytes());
        self.hasher.update(&[0]);
        self.hasher.update(key.identifier.as_bytes());
        self.hasher.update(&[0]);

        // Step arguments serialize with sorted keys; input groups keep
        // declaration order since it decides the merge order
        self.hasher.update(serde_json::to_string(entry)?.as_bytes());

        Ok(self.hasher.finalize().to_hex().to_string())
    }
}

impl Default for RecipeHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint of one recipe entry under its key
pub fn fingerprint(key: &StoreKey, entry: &RecipeEntry) -> PrepResult<String> {
    RecipeHasher::new().hash_entry(key, entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Recipe;

    fn entries(yaml: &str) -> Recipe {
        Recipe::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let recipe = entries("name: X\nprepare:\n  a:\n    uses: [t]\n    apply: [rechunk]\n");
        let key = StoreKey::new("X", "a");
        let entry = recipe.entry("a").unwrap();

        assert_eq!(fingerprint(&key, entry).unwrap(), fingerprint(&key, entry).unwrap());
    }

    #[test]
    fn test_fingerprint_follows_entry_changes() {
        let before = entries("name: X\nprepare:\n  a:\n    uses: [t]\n    apply: [rechunk]\n");
        let after = entries(
            "name: X\nprepare:\n  a:\n    uses: [t]\n    apply:\n      - rechunk: {time: 12}\n",
        );
        let key = StoreKey::new("X", "a");

        assert_ne!(
            fingerprint(&key, before.entry("a").unwrap()).unwrap(),
            fingerprint(&key, after.entry("a").unwrap()).unwrap()
        );
    }

    #[test]
    fn test_fingerprint_depends_on_key() {
        let recipe = entries("name: X\nprepare:\n  a:\n    uses: [t]\n");
        let entry = recipe.entry("a").unwrap();

        assert_ne!(
            fingerprint(&StoreKey::new("X", "a"), entry).unwrap(),
            fingerprint(&StoreKey::new("Y", "a"), entry).unwrap()
        );
    }
}
