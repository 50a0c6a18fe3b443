// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Shared context for both controllers.
//!
//! All reconcilers receive an `Arc<Context>` holding the management-cluster
//! client, reflector stores for the four rollout CRDs, and the clientset for
//! target clusters. The stores are populated by background watcher streams
//! and stand in for informer caches: level-triggered, shared-read, and never
//! mutated in place. Reconcilers deep-copy before modifying anything they
//! read from a store.

use crate::crd::{CapacityTarget, InstallationTarget, Release, TrafficTarget};
use crate::errors::TrafficError;
use crate::labels::{APP_LABEL, RELEASE_LABEL};
use kube::runtime::reflector::Store;
use kube::{Client, ResourceExt};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Client for the management cluster holding the rollout CRDs
    pub client: Client,

    /// Reflector stores for all rollout CRD types
    pub stores: Stores,

    /// Clients for the workload clusters traffic is shifted in
    pub clusters: ClusterClientset,
}

/// Work-queue key for an object: `namespace/name`.
#[must_use]
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Collection of reflector stores for cross-controller queries.
#[derive(Clone)]
pub struct Stores {
    pub releases: Store<Release>,
    pub installation_targets: Store<InstallationTarget>,
    pub capacity_targets: Store<CapacityTarget>,
    pub traffic_targets: Store<TrafficTarget>,
}

impl Stores {
    /// Get a specific `Release` by name and namespace from the store.
    #[must_use]
    pub fn get_release(&self, namespace: &str, name: &str) -> Option<Arc<Release>> {
        self.releases
            .state()
            .into_iter()
            .find(|r| r.name_any() == name && r.namespace().as_deref() == Some(namespace))
    }

    /// All `InstallationTarget`s labelled with the given release name.
    #[must_use]
    pub fn installation_targets_for_release(
        &self,
        namespace: &str,
        release_name: &str,
    ) -> Vec<Arc<InstallationTarget>> {
        self.installation_targets
            .state()
            .into_iter()
            .filter(|t| {
                t.namespace().as_deref() == Some(namespace)
                    && t.labels().get(RELEASE_LABEL).map(String::as_str) == Some(release_name)
            })
            .collect()
    }

    /// All `CapacityTarget`s labelled with the given release name.
    #[must_use]
    pub fn capacity_targets_for_release(
        &self,
        namespace: &str,
        release_name: &str,
    ) -> Vec<Arc<CapacityTarget>> {
        self.capacity_targets
            .state()
            .into_iter()
            .filter(|t| {
                t.namespace().as_deref() == Some(namespace)
                    && t.labels().get(RELEASE_LABEL).map(String::as_str) == Some(release_name)
            })
            .collect()
    }

    /// All `TrafficTarget`s labelled with the given release name.
    #[must_use]
    pub fn traffic_targets_for_release(
        &self,
        namespace: &str,
        release_name: &str,
    ) -> Vec<Arc<TrafficTarget>> {
        self.traffic_targets
            .state()
            .into_iter()
            .filter(|t| {
                t.namespace().as_deref() == Some(namespace)
                    && t.labels().get(RELEASE_LABEL).map(String::as_str) == Some(release_name)
            })
            .collect()
    }

    /// All `TrafficTarget`s of one application in a namespace.
    ///
    /// The traffic controller derives the full weight table from these, so a
    /// weight split always accounts for every release of the app.
    #[must_use]
    pub fn traffic_targets_for_app(&self, namespace: &str, app: &str) -> Vec<Arc<TrafficTarget>> {
        let mut targets: Vec<Arc<TrafficTarget>> = self
            .traffic_targets
            .state()
            .into_iter()
            .filter(|t| {
                t.namespace().as_deref() == Some(namespace)
                    && t.labels().get(APP_LABEL).map(String::as_str) == Some(app)
            })
            .collect();
        targets.sort_by_key(|t| t.name_any());
        targets
    }
}

/// Clients for target workload clusters, keyed by cluster name.
///
/// Cluster names in target specs must resolve here; an unknown name is a
/// configuration error on the declaring object, not a controller failure.
#[derive(Clone, Default)]
pub struct ClusterClientset {
    clients: HashMap<String, Client>,
}

impl ClusterClientset {
    #[must_use]
    pub fn new(clients: HashMap<String, Client>) -> Self {
        Self { clients }
    }

    /// Look up the client for a named cluster.
    ///
    /// # Errors
    ///
    /// Returns [`TrafficError::UnknownCluster`] if no client is configured.
    pub fn for_cluster(&self, cluster: &str) -> Result<Client, TrafficError> {
        self.clients
            .get(cluster)
            .cloned()
            .ok_or_else(|| TrafficError::UnknownCluster {
                cluster: cluster.to_string(),
            })
    }

    /// Names of all configured clusters, sorted.
    #[must_use]
    pub fn cluster_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
