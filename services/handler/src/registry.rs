//! The shared droplet registry.
//!
//! A concurrent identifier → droplet map. Identifier allocation and
//! insertion happen under a single write-lock acquisition so that two
//! concurrent creates for the same template can never clash on an
//! identifier. Iteration snapshots the value set under the read lock and
//! releases it before the caller touches any droplet.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use droplets_protocol::format_identifier;

use crate::droplet::Droplet;

/// Concurrent mapping of identifier to droplet.
#[derive(Debug, Default)]
pub struct Registry {
    droplets: RwLock<HashMap<String, Arc<Droplet>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mapping for an identifier, if any.
    pub async fn get(&self, identifier: &str) -> Option<Arc<Droplet>> {
        self.droplets.read().await.get(identifier).cloned()
    }

    pub async fn contains(&self, identifier: &str) -> bool {
        self.droplets.read().await.contains_key(identifier)
    }

    /// Remove a mapping. Removing an absent identifier is accepted.
    pub async fn remove(&self, identifier: &str) {
        self.droplets.write().await.remove(identifier);
    }

    /// Snapshot of all droplets, in unspecified order. The registry lock
    /// is released before the snapshot is returned.
    pub async fn snapshot(&self) -> Vec<Arc<Droplet>> {
        self.droplets.read().await.values().cloned().collect()
    }

    /// Allocate the smallest free `<template>-<n>` identifier and insert
    /// the droplet built for it, atomically with respect to other
    /// allocations and removals.
    pub async fn allocate(
        &self,
        template_name: &str,
        build: impl FnOnce(String) -> Arc<Droplet>,
    ) -> Arc<Droplet> {
        let mut droplets = self.droplets.write().await;
        let mut ordinal = 1u32;
        let identifier = loop {
            let candidate = format_identifier(template_name, ordinal);
            if !droplets.contains_key(&candidate) {
                break candidate;
            }
            ordinal += 1;
        };
        let droplet = build(identifier.clone());
        droplets.insert(identifier, Arc::clone(&droplet));
        droplet
    }
}
