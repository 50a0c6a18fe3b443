// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines the Helmsman-specific labels and annotations that tie
//! releases, their sibling target objects, and workload pods together. The
//! label keys are deliberately flat (no `/`) so they can be embedded in JSON
//! Pointer paths without escaping.

// ============================================================================
// Helmsman Labels
// ============================================================================

/// Label carrying the application name on releases, targets, pods and services
pub const APP_LABEL: &str = "helmsman-app";

/// Label carrying the owning release name on targets and pods
pub const RELEASE_LABEL: &str = "helmsman-release";

/// Label carrying the load-balancer role on services
pub const LB_LABEL: &str = "helmsman-lb";

/// Label flipped on individual pods to move them in or out of the traffic fleet
pub const TRAFFIC_STATUS_LABEL: &str = "helmsman-traffic-status";

// ============================================================================
// Label Values
// ============================================================================

/// `LB_LABEL` value selecting the production load-balancer service
pub const LB_PRODUCTION: &str = "production";

/// `TRAFFIC_STATUS_LABEL` value for pods that receive traffic
pub const TRAFFIC_ENABLED: &str = "enabled";

/// `TRAFFIC_STATUS_LABEL` value for pods held out of the traffic fleet
pub const TRAFFIC_DISABLED: &str = "disabled";

// ============================================================================
// Helmsman Annotations
// ============================================================================

/// Annotation on a release naming the newer release supplanting it
pub const CONTENDER_ANNOTATION: &str = "helmsman.dev/contender";

/// Annotation on a release naming the older release it supplants
pub const INCUMBENT_ANNOTATION: &str = "helmsman.dev/incumbent";
