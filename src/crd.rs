// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for progressive rollouts.
//!
//! This module defines all Kubernetes Custom Resource Definitions used by Helmsman
//! to coordinate multi-cluster rollouts declaratively.
//!
//! # Resource Types
//!
//! - [`Release`] - One revision of an application under rollout, carrying the
//!   rollout strategy and the operator-controlled target step
//! - [`InstallationTarget`] - Declares the clusters a release's manifests must
//!   be present in
//! - [`CapacityTarget`] - Declares per-cluster replica capacity as a percentage
//!   of the release's total replica count
//! - [`TrafficTarget`] - Declares per-cluster traffic weight for a release
//!
//! A release named `N` implies exactly one sibling of each target kind named `N`
//! in the same namespace. Sibling objects carry the release name in the
//! `helmsman-release` label; the release owns them by name convention.
//!
//! # Example: a three-step rollout strategy
//!
//! ```rust
//! use helmsman::crd::{ReleaseSpec, RolloutStrategy, RolloutStrategyStep, StepValues};
//!
//! let spec = ReleaseSpec {
//!     target_step: 0,
//!     replica_count: 10,
//!     strategy: RolloutStrategy {
//!         steps: vec![
//!             RolloutStrategyStep {
//!                 name: "canary".to_string(),
//!                 capacity: StepValues { incumbent: 90, contender: 10 },
//!                 traffic: StepValues { incumbent: 90, contender: 10 },
//!             },
//!             RolloutStrategyStep {
//!                 name: "half".to_string(),
//!                 capacity: StepValues { incumbent: 50, contender: 50 },
//!                 traffic: StepValues { incumbent: 50, contender: 50 },
//!             },
//!             RolloutStrategyStep {
//!                 name: "full".to_string(),
//!                 capacity: StepValues { incumbent: 0, contender: 100 },
//!                 traffic: StepValues { incumbent: 0, contender: 100 },
//!             },
//!         ],
//!     },
//! };
//! assert_eq!(spec.strategy.steps.len(), 3);
//! ```

use crate::constants::PHASE_WAITING_FOR_SCHEDULING;
use crate::labels::{CONTENDER_ANNOTATION, INCUMBENT_ANNOTATION};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition represents an observation of a resource's current state.
///
/// Conditions are used in status subresources to communicate the state of
/// a resource to users and controllers. Exactly one condition per type is
/// kept on any object; merging goes through [`crate::conditions::set_condition`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, e.g. `Strategy`, `StrategyExecuted`, `Ready`, `Operational`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Desired capacity percentage and traffic weight for one side of a step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepValues {
    /// Value declared for the incumbent (the release being supplanted).
    pub incumbent: u32,

    /// Value declared for the contender (the release rolling out).
    pub contender: u32,
}

/// One point on the rollout curve.
///
/// The executor advances past a step only when all four declared values
/// (contender/incumbent × capacity/traffic) match observations across all
/// clusters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStrategyStep {
    /// Human-readable step name, e.g. `canary`, `half`, `full`.
    pub name: String,

    /// Capacity percentages for this step.
    pub capacity: StepValues,

    /// Traffic weights for this step.
    pub traffic: StepValues,
}

/// An ordered list of rollout steps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStrategy {
    /// Steps in rollout order. Must not be empty.
    pub steps: Vec<RolloutStrategyStep>,
}

/// `Release` status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStatus {
    /// Lifecycle phase: `WaitingForScheduling`, `WaitingForCommand`,
    /// `WaitingForStrategy`, `Installed` or `Aborted`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Index of the most recent step the executor observed as converged.
    /// Never decreases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achieved_step: Option<u32>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// `Release` defines one revision of an application under rollout.
///
/// The release owns three sibling objects of the same name (an
/// [`InstallationTarget`], a [`CapacityTarget`] and a [`TrafficTarget`])
/// created by an upstream scheduler. The strategy executor drives the
/// siblings' specs towards the declarations of `targetStep` and records
/// progress in the release status.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "helmsman.dev",
    version = "v1alpha1",
    kind = "Release",
    namespaced,
    status = "ReleaseStatus",
    shortname = "rel"
)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSpec {
    /// Index into `strategy.steps` the rollout should converge on.
    /// Bumped by a human or automation to advance the rollout.
    pub target_step: u32,

    /// Total replica count the capacity percentages refer to.
    pub replica_count: u32,

    /// The ordered rollout steps for this release.
    pub strategy: RolloutStrategy,
}

/// Per-cluster status for an [`InstallationTarget`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInstallationStatus {
    /// Target cluster name.
    pub name: String,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `InstallationTarget` status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstallationTargetStatus {
    #[serde(default)]
    pub clusters: Vec<ClusterInstallationStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// `InstallationTarget` declares the clusters a release's manifests must be
/// present in. The installation controller (external to this core) reports a
/// per-cluster condition set, notably `Operational` and `Ready`.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "helmsman.dev",
    version = "v1alpha1",
    kind = "InstallationTarget",
    namespaced,
    status = "InstallationTargetStatus",
    shortname = "it"
)]
#[serde(rename_all = "camelCase")]
pub struct InstallationTargetSpec {
    /// Clusters the release's manifests must be installed into.
    pub clusters: Vec<String>,

    /// Whether objects already present in a target cluster may be overridden.
    #[serde(default)]
    pub can_override: bool,
}

/// Desired capacity for one cluster, as a percentage of the release's total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCapacityTarget {
    /// Target cluster name.
    pub name: String,

    /// Desired replica capacity as a percentage of the release's
    /// `replicaCount`. Unsigned; values above 100 are invalid.
    pub percent: u32,
}

/// Observed capacity for one cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCapacityStatus {
    /// Target cluster name.
    pub name: String,

    /// Percentage of the release total the cluster currently achieves.
    #[serde(default)]
    pub achieved_percent: u32,

    /// Replicas currently available in the cluster, as reported by the
    /// upstream capacity controller.
    #[serde(default)]
    pub available_replicas: u32,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `CapacityTarget` status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapacityTargetStatus {
    #[serde(default)]
    pub clusters: Vec<ClusterCapacityStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// `CapacityTarget` declares per-cluster replica capacity for a release,
/// expressed as a percentage of the total declared on the release.
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "helmsman.dev",
    version = "v1alpha1",
    kind = "CapacityTarget",
    namespaced,
    status = "CapacityTargetStatus",
    shortname = "ct"
)]
#[serde(rename_all = "camelCase")]
pub struct CapacityTargetSpec {
    /// Desired capacity per cluster.
    pub clusters: Vec<ClusterCapacityTarget>,
}

/// Desired traffic weight for one cluster. Weights are in arbitrary units;
/// a release's share is its weight over the sum of all releases' weights.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTrafficTarget {
    /// Target cluster name.
    pub name: String,

    /// Desired traffic weight for this release in this cluster.
    pub weight: u32,
}

/// Observed traffic for one cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTrafficStatus {
    /// Target cluster name.
    pub name: String,

    /// Weight the release actually achieves, derived from the fraction of
    /// traffic-enabled pods.
    #[serde(default)]
    pub achieved_traffic: u32,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `TrafficTarget` status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTargetStatus {
    #[serde(default)]
    pub clusters: Vec<ClusterTrafficStatus>,

    /// Object-level conditions, e.g. configuration errors that block the
    /// whole target rather than a single cluster.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// `TrafficTarget` declares per-cluster traffic weight for a release. The
/// traffic controller realises the weight split by flipping the
/// `helmsman-traffic-status` label on individual pods.
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "helmsman.dev",
    version = "v1alpha1",
    kind = "TrafficTarget",
    namespaced,
    status = "TrafficTargetStatus",
    shortname = "tt"
)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTargetSpec {
    /// Desired traffic weight per cluster. Multiple entries for the same
    /// cluster accumulate.
    pub clusters: Vec<ClusterTrafficTarget>,
}

/// Accessors for the inter-release pointers carried as annotations.
///
/// The contender/incumbent vocabulary lives entirely in these annotations;
/// the executor and the reconciliation loop resolve them lazily and treat a
/// dangling pointer as "no incumbent".
pub trait ReleasePointers {
    /// Name of the newer release supplanting this one, if any.
    fn contender_of(&self) -> Option<&str>;

    /// Name of the older release this one supplants, if any.
    fn incumbent_of(&self) -> Option<&str>;
}

impl ReleasePointers for Release {
    fn contender_of(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(CONTENDER_ANNOTATION))
            .map(String::as_str)
    }

    fn incumbent_of(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(INCUMBENT_ANNOTATION))
            .map(String::as_str)
    }
}

impl Release {
    /// The release's current phase, defaulting to `WaitingForScheduling`
    /// before the status subresource exists.
    #[must_use]
    pub fn phase(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or(PHASE_WAITING_FOR_SCHEDULING)
    }

    /// The most recent step observed as converged, if any.
    #[must_use]
    pub fn achieved_step(&self) -> Option<u32> {
        self.status.as_ref().and_then(|s| s.achieved_step)
    }
}

impl RolloutStrategy {
    /// Clamp a target step index into the valid range for this strategy.
    ///
    /// Returns `None` for an empty strategy, which is a configuration error
    /// surfaced by the executor.
    #[must_use]
    pub fn clamp_step(&self, target_step: u32) -> Option<usize> {
        if self.steps.is_empty() {
            return None;
        }
        Some((target_step as usize).min(self.steps.len() - 1))
    }

    /// Whether `step` is the final step of the strategy.
    #[must_use]
    pub fn is_last_step(&self, step: usize) -> bool {
        step + 1 == self.steps.len()
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
