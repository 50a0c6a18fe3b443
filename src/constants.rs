// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Global constants for the Helmsman controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all Helmsman CRDs
pub const API_GROUP: &str = "helmsman.dev";

/// API version for all Helmsman CRDs
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "helmsman.dev/v1alpha1";

/// Kind name for `Release` resource
pub const KIND_RELEASE: &str = "Release";

/// Kind name for `InstallationTarget` resource
pub const KIND_INSTALLATION_TARGET: &str = "InstallationTarget";

/// Kind name for `CapacityTarget` resource
pub const KIND_CAPACITY_TARGET: &str = "CapacityTarget";

/// Kind name for `TrafficTarget` resource
pub const KIND_TRAFFIC_TARGET: &str = "TrafficTarget";

// ============================================================================
// Release Phases
// ============================================================================

/// A release waiting for its sibling objects to be scheduled by the upstream scheduler
pub const PHASE_WAITING_FOR_SCHEDULING: &str = "WaitingForScheduling";

/// A release whose current step has converged; a `targetStep` bump moves it forward
pub const PHASE_WAITING_FOR_COMMAND: &str = "WaitingForCommand";

/// A release actively being driven towards its target step
pub const PHASE_WAITING_FOR_STRATEGY: &str = "WaitingForStrategy";

/// A release that completed its final step and carries all traffic
pub const PHASE_INSTALLED: &str = "Installed";

/// A superseded or cancelled release
pub const PHASE_ABORTED: &str = "Aborted";

// ============================================================================
// Condition Types
// ============================================================================

/// Condition tracking what the strategy executor is currently waiting on
pub const CONDITION_TYPE_STRATEGY: &str = "Strategy";

/// Condition set when a strategy step has fully converged
pub const CONDITION_TYPE_STRATEGY_EXECUTED: &str = "StrategyExecuted";

/// Condition set when the executor cannot make progress at all
pub const CONDITION_TYPE_STRATEGY_EXECUTION_FAILED: &str = "StrategyExecutionFailed";

/// Condition tracking whether the installation/capacity/traffic triplet resolved
pub const CONDITION_TYPE_SIBLINGS_RESOLVED: &str = "SiblingsResolved";

/// Per-cluster condition on `InstallationTarget`: manifests applied and serving
pub const CONDITION_TYPE_OPERATIONAL: &str = "Operational";

/// Per-cluster readiness condition used on all three sibling target kinds
pub const CONDITION_TYPE_READY: &str = "Ready";

// ============================================================================
// Condition Statuses
// ============================================================================

/// Condition status: the condition holds
pub const STATUS_TRUE: &str = "True";

/// Condition status: the condition does not hold
pub const STATUS_FALSE: &str = "False";

// ============================================================================
// Condition Reasons
// ============================================================================

/// Strategy reason: contender installation is not yet ready in every cluster
pub const REASON_WAITING_FOR_INSTALLATION: &str = "WaitingForInstallation";

/// Strategy reason: capacity has not converged on the step declaration
pub const REASON_WAITING_FOR_CAPACITY: &str = "WaitingForCapacity";

/// Strategy reason: traffic has not converged on the step declaration
pub const REASON_WAITING_FOR_TRAFFIC: &str = "WaitingForTraffic";

/// Strategy reason: all four declarations match observations
pub const REASON_COMPLETE: &str = "Complete";

/// `StrategyExecuted` reason when a step converges
pub const REASON_STEP_COMPLETE: &str = "StepComplete";

/// `StrategyExecutionFailed` reason when the installation gate blocks
pub const REASON_INSTALLATION_NOT_READY: &str = "InstallationNotReady";

/// `StrategyExecutionFailed` reason when a previously blocked gate clears
pub const REASON_INSTALLATION_READY: &str = "InstallationReady";

/// `SiblingsResolved` reason when the triplet could not be fetched
pub const REASON_SIBLING_RESOLUTION_FAILED: &str = "SiblingResolutionFailed";

/// `SiblingsResolved` reason when a previously failed triplet resolves
pub const REASON_RESOLVED: &str = "Resolved";

/// `Ready` reason on `TrafficTarget` clusters when every planned pod patch landed
pub const REASON_TRAFFIC_SHIFTED: &str = "TrafficShifted";

/// `Ready` reason on `TrafficTarget` clusters when some pod patches failed
pub const REASON_PODS_DEGRADED: &str = "PodsDegraded";

/// `Ready` reason on a `TrafficTarget` whose spec or labels are invalid
pub const REASON_INVALID_CONFIGURATION: &str = "InvalidConfiguration";

// ============================================================================
// Reconciliation Queue Constants
// ============================================================================

/// Default number of concurrent reconcile workers per controller
pub const DEFAULT_THREADINESS: usize = 2;

/// Initial per-key requeue delay after a failed reconcile
pub const BACKOFF_INITIAL_MILLIS: u64 = 5;

/// Upper bound on the per-key requeue delay
pub const BACKOFF_MAX_SECS: u64 = 1000;

/// Jitter applied to requeue delays to prevent thundering herd (±10%)
pub const BACKOFF_JITTER_FACTOR: f64 = 0.1;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Field manager name used for all server-side patches
pub const FIELD_MANAGER: &str = "helmsman-controller";
