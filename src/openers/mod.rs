// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Raw data openers
//!
//! An opener turns `(collection, group, variables)` into a dataset. Each
//! collection has its own opening method; combining several source files
//! of one group is the opener's job.

mod json;

pub use json::JsonDirOpener;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::dataset::Dataset;
use crate::errors::{PrepError, PrepResult};

/// Opening method for raw variables
#[async_trait]
pub trait Opener: Send + Sync {
    /// Open the requested variables of one input group
    ///
    /// `group` is `None` when the recipe lists variables without groups.
    async fn open(
        &self,
        collection: &str,
        group: Option<&str>,
        variables: &[String],
    ) -> PrepResult<Dataset>;
}

/// Per-collection openers with an optional fallback
#[derive(Clone, Default)]
pub struct OpenerRegistry {
    openers: HashMap<String, Arc<dyn Opener>>,
    fallback: Option<Arc<dyn Opener>>,
}

impl OpenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the opener of one collection
    pub fn register(&mut self, collection: &str, opener: impl Opener + 'static) -> &mut Self {
        self.openers.insert(collection.to_string(), Arc::new(opener));
        self
    }

    /// Opener used for collections without their own
    pub fn with_fallback(mut self, opener: impl Opener + 'static) -> Self {
        self.fallback = Some(Arc::new(opener));
        self
    }

    pub fn has(&self, collection: &str) -> bool {
        self.openers.contains_key(collection) || self.fallback.is_some()
    }

    /// Collections with a dedicated opener, sorted
    pub fn collections(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.openers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Opener for a collection
    pub fn get(&self, collection: &str) -> PrepResult<Arc<dyn Opener>> {
        self.openers
            .get(collection)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| {
                let available = self.collections();
                PrepError::OpenerNotFound {
                    collection: collection.to_string(),
                    available: if available.is_empty() {
                        "none".to_string()
                    } else {
                        available.join(", ")
                    },
                }
            })
    }
}

impl std::fmt::Debug for OpenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenerRegistry")
            .field("collections", &self.collections())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
