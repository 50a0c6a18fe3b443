// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Patch values emitted by the strategy executor.
//!
//! The executor never talks to the API server; it returns a sequence of
//! tagged patch values, each exposing the target's name, its group/version/
//! kind and the merge-patch body. The tagged representation lets the
//! dispatcher pick patch semantics per variant instead of treating results
//! as a bag of bytes.

use crate::constants::{
    API_GROUP, API_VERSION, KIND_CAPACITY_TARGET, KIND_RELEASE, KIND_TRAFFIC_TARGET,
};
use crate::crd::{CapacityTargetSpec, Condition, TrafficTargetSpec};
use kube::core::GroupVersionKind;
use serde_json::json;

/// Replace a `CapacityTarget` spec.
#[derive(Clone, Debug, PartialEq)]
pub struct CapacityTargetSpecPatch {
    pub name: String,
    pub spec: CapacityTargetSpec,
}

/// Replace a `TrafficTarget` spec.
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficTargetSpecPatch {
    pub name: String,
    pub spec: TrafficTargetSpec,
}

/// Update selected fields of a `Release` status.
///
/// `None` fields are left untouched by the merge patch. A value with no
/// fields set is an empty patch and is filtered out before dispatch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReleaseStatusPatch {
    pub name: String,
    pub phase: Option<String>,
    pub achieved_step: Option<u32>,
    pub conditions: Option<Vec<Condition>>,
}

/// One mutation required to move a rollout forward.
#[derive(Clone, Debug, PartialEq)]
pub enum StrategyPatch {
    CapacityTargetSpec(CapacityTargetSpecPatch),
    TrafficTargetSpec(TrafficTargetSpecPatch),
    ReleaseStatus(ReleaseStatusPatch),
}

impl StrategyPatch {
    /// Name of the namespaced object this patch applies to.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            StrategyPatch::CapacityTargetSpec(p) => &p.name,
            StrategyPatch::TrafficTargetSpec(p) => &p.name,
            StrategyPatch::ReleaseStatus(p) => &p.name,
        }
    }

    /// Group/version/kind of the target object.
    #[must_use]
    pub fn gvk(&self) -> GroupVersionKind {
        let kind = match self {
            StrategyPatch::CapacityTargetSpec(_) => KIND_CAPACITY_TARGET,
            StrategyPatch::TrafficTargetSpec(_) => KIND_TRAFFIC_TARGET,
            StrategyPatch::ReleaseStatus(_) => KIND_RELEASE,
        };
        GroupVersionKind::gvk(API_GROUP, API_VERSION, kind)
    }

    /// Whether the patch would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            StrategyPatch::ReleaseStatus(p) => {
                p.phase.is_none() && p.achieved_step.is_none() && p.conditions.is_none()
            }
            _ => false,
        }
    }

    /// Serialize the merge-patch body.
    ///
    /// # Errors
    ///
    /// Patch bodies are built from validated inputs; serialization failure is
    /// propagated rather than logged and dropped.
    pub fn bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            StrategyPatch::CapacityTargetSpec(p) => serde_json::to_vec(&json!({ "spec": p.spec })),
            StrategyPatch::TrafficTargetSpec(p) => serde_json::to_vec(&json!({ "spec": p.spec })),
            StrategyPatch::ReleaseStatus(p) => {
                let mut status = serde_json::Map::new();
                if let Some(phase) = &p.phase {
                    status.insert("phase".to_string(), json!(phase));
                }
                if let Some(step) = p.achieved_step {
                    status.insert("achievedStep".to_string(), json!(step));
                }
                if let Some(conditions) = &p.conditions {
                    status.insert("conditions".to_string(), serde_json::to_value(conditions)?);
                }
                serde_json::to_vec(&json!({ "status": status }))
            }
        }
    }
}
