// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Per-cluster convergence checks for the strategy executor.
//!
//! All checks are pure predicates over sibling snapshots. The executor never
//! re-derives replica counts from pods; `availableReplicas` is compared as
//! reported by the upstream capacity controller.

use crate::conditions::get_condition;
use crate::constants::{CONDITION_TYPE_OPERATIONAL, CONDITION_TYPE_READY, STATUS_TRUE};
use crate::crd::{
    CapacityTarget, CapacityTargetSpec, ClusterCapacityStatus, ClusterTrafficStatus, Condition,
    InstallationTarget, TrafficTarget, TrafficTargetSpec,
};

/// Replica count a percentage of the release total translates to, rounded up.
#[must_use]
pub fn replicas_for_percent(total: u32, percent: u32) -> u32 {
    (total * percent).div_ceil(100)
}

fn cluster_condition_true(conditions: &[Condition], condition_type: &str) -> bool {
    get_condition(conditions, condition_type).is_some_and(|c| c.status == STATUS_TRUE)
}

/// First declared cluster whose installation is not both `Operational=True`
/// and `Ready=True`, or `None` when the gate passes.
#[must_use]
pub fn pending_installation_cluster(target: &InstallationTarget) -> Option<String> {
    let empty = Vec::new();
    let clusters = target.status.as_ref().map_or(&empty, |s| &s.clusters);

    target
        .spec
        .clusters
        .iter()
        .find(|name| {
            let Some(status) = clusters.iter().find(|c| &c.name == *name) else {
                return true;
            };
            !cluster_condition_true(&status.conditions, CONDITION_TYPE_OPERATIONAL)
                || !cluster_condition_true(&status.conditions, CONDITION_TYPE_READY)
        })
        .cloned()
}

fn capacity_cluster_status<'a>(
    target: &'a CapacityTarget,
    cluster: &str,
) -> Option<&'a ClusterCapacityStatus> {
    target
        .status
        .as_ref()
        .and_then(|s| s.clusters.iter().find(|c| c.name == cluster))
}

/// Whether the `CapacityTarget` spec diverges from the declared step percent
/// in any cluster. Patching only on divergence prevents resync churn.
#[must_use]
pub fn capacity_spec_needs_patch(target: &CapacityTarget, percent: u32) -> bool {
    target.spec.clusters.iter().any(|c| c.percent != percent)
}

/// The spec that sets every declared cluster to the step percent.
#[must_use]
pub fn desired_capacity_spec(target: &CapacityTarget, percent: u32) -> CapacityTargetSpec {
    let mut spec = target.spec.clone();
    for cluster in &mut spec.clusters {
        cluster.percent = percent;
    }
    spec
}

/// Whether every declared cluster observes the step percent, both as the
/// achieved percentage and as the matching available replica count.
#[must_use]
pub fn capacity_achieved(target: &CapacityTarget, percent: u32, total_replicas: u32) -> bool {
    let want_replicas = replicas_for_percent(total_replicas, percent);
    target.spec.clusters.iter().all(|declared| {
        declared.percent == percent
            && capacity_cluster_status(target, &declared.name).is_some_and(|observed| {
                observed.achieved_percent == percent
                    && observed.available_replicas == want_replicas
            })
    })
}

fn traffic_cluster_status<'a>(
    target: &'a TrafficTarget,
    cluster: &str,
) -> Option<&'a ClusterTrafficStatus> {
    target
        .status
        .as_ref()
        .and_then(|s| s.clusters.iter().find(|c| c.name == cluster))
}

/// Whether the `TrafficTarget` spec diverges from the declared step weight in
/// any cluster.
#[must_use]
pub fn traffic_spec_needs_patch(target: &TrafficTarget, weight: u32) -> bool {
    target.spec.clusters.iter().any(|c| c.weight != weight)
}

/// The spec that sets every declared cluster to the step weight.
#[must_use]
pub fn desired_traffic_spec(target: &TrafficTarget, weight: u32) -> TrafficTargetSpec {
    let mut spec = target.spec.clone();
    for cluster in &mut spec.clusters {
        cluster.weight = weight;
    }
    spec
}

/// Whether every declared cluster observes the step weight.
#[must_use]
pub fn traffic_achieved(target: &TrafficTarget, weight: u32) -> bool {
    target.spec.clusters.iter().all(|declared| {
        declared.weight == weight
            && traffic_cluster_status(target, &declared.name)
                .is_some_and(|observed| observed.achieved_traffic == weight)
    })
}
