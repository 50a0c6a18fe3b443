// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Sibling object resolution and release snapshots.
//!
//! A release named `N` owns exactly one `InstallationTarget`, one
//! `CapacityTarget` and one `TrafficTarget`, all named `N` and labelled with
//! `helmsman-release=N`. The resolver fetches the triplet from the reflector
//! stores with that label selector and fails with
//! [`ResolveError::UnexpectedObjectCountFromSelector`] on anything other than
//! exactly one match per kind.
//!
//! The resolved [`ReleaseInfo`] is a deep-copied snapshot: built fresh for
//! every reconcile, immutable once built, never cached beyond the call.

use crate::constants::{KIND_CAPACITY_TARGET, KIND_INSTALLATION_TARGET, KIND_TRAFFIC_TARGET};
use crate::context::Stores;
use crate::crd::{CapacityTarget, InstallationTarget, Release, TrafficTarget};
use crate::errors::ResolveError;
use crate::labels::RELEASE_LABEL;
use kube::ResourceExt;
use std::sync::Arc;

/// Immutable snapshot of a release and its sibling triplet.
#[derive(Clone, Debug)]
pub struct ReleaseInfo {
    pub release: Release,
    pub installation_target: InstallationTarget,
    pub capacity_target: CapacityTarget,
    pub traffic_target: TrafficTarget,
}

impl ReleaseInfo {
    /// Name shared by the release and its siblings.
    #[must_use]
    pub fn name(&self) -> String {
        self.release.name_any()
    }
}

/// The label selector locating a release's siblings.
#[must_use]
pub fn release_selector(release_name: &str) -> String {
    format!("{RELEASE_LABEL}={release_name}")
}

/// Reduce a candidate list to the single expected sibling.
///
/// # Errors
///
/// Returns [`ResolveError::UnexpectedObjectCountFromSelector`] unless exactly
/// one candidate matched the selector.
pub fn pick_exactly_one<T>(
    kind: &'static str,
    selector: &str,
    mut matches: Vec<Arc<T>>,
) -> Result<Arc<T>, ResolveError> {
    if matches.len() == 1 {
        Ok(matches.remove(0))
    } else {
        Err(ResolveError::UnexpectedObjectCountFromSelector {
            kind,
            selector: selector.to_string(),
            count: matches.len(),
        })
    }
}

/// Resolve the installation/capacity/traffic triplet for a release and group
/// it with the release into a fresh [`ReleaseInfo`] snapshot.
///
/// # Errors
///
/// Returns the first [`ResolveError`] encountered, in
/// installation → capacity → traffic order.
pub fn release_info(stores: &Stores, release: &Release) -> Result<ReleaseInfo, ResolveError> {
    let namespace = release.namespace().unwrap_or_default();
    let name = release.name_any();
    let selector = release_selector(&name);

    let installation_target = pick_exactly_one(
        KIND_INSTALLATION_TARGET,
        &selector,
        stores.installation_targets_for_release(&namespace, &name),
    )?;
    let capacity_target = pick_exactly_one(
        KIND_CAPACITY_TARGET,
        &selector,
        stores.capacity_targets_for_release(&namespace, &name),
    )?;
    let traffic_target = pick_exactly_one(
        KIND_TRAFFIC_TARGET,
        &selector,
        stores.traffic_targets_for_release(&namespace, &name),
    )?;

    Ok(ReleaseInfo {
        release: release.clone(),
        installation_target: (*installation_target).clone(),
        capacity_target: (*capacity_target).clone(),
        traffic_target: (*traffic_target).clone(),
    })
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod resolver_tests;
