// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `patches.rs`

#[cfg(test)]
mod tests {
    use super::super::patches::{
        CapacityTargetSpecPatch, ReleaseStatusPatch, StrategyPatch, TrafficTargetSpecPatch,
    };
    use crate::crd::{
        CapacityTargetSpec, ClusterCapacityTarget, ClusterTrafficTarget, Condition,
        TrafficTargetSpec,
    };
    use serde_json::{json, Value};

    fn capacity_patch() -> StrategyPatch {
        StrategyPatch::CapacityTargetSpec(CapacityTargetSpecPatch {
            name: "my-app-v2".to_string(),
            spec: CapacityTargetSpec {
                clusters: vec![ClusterCapacityTarget {
                    name: "c1".to_string(),
                    percent: 25,
                }],
            },
        })
    }

    #[test]
    fn test_gvk_per_variant() {
        assert_eq!(capacity_patch().gvk().kind, "CapacityTarget");

        let traffic = StrategyPatch::TrafficTargetSpec(TrafficTargetSpecPatch {
            name: "my-app-v2".to_string(),
            spec: TrafficTargetSpec { clusters: vec![] },
        });
        assert_eq!(traffic.gvk().kind, "TrafficTarget");
        assert_eq!(traffic.gvk().group, "helmsman.dev");
        assert_eq!(traffic.gvk().version, "v1alpha1");

        let release = StrategyPatch::ReleaseStatus(ReleaseStatusPatch {
            name: "my-app-v2".to_string(),
            ..Default::default()
        });
        assert_eq!(release.gvk().kind, "Release");
    }

    #[test]
    fn test_capacity_patch_body_is_a_spec_merge() {
        let body: Value = serde_json::from_slice(&capacity_patch().bytes().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({ "spec": { "clusters": [{ "name": "c1", "percent": 25 }] } }),
        );
    }

    #[test]
    fn test_traffic_patch_body_is_a_spec_merge() {
        let patch = StrategyPatch::TrafficTargetSpec(TrafficTargetSpecPatch {
            name: "my-app-v2".to_string(),
            spec: TrafficTargetSpec {
                clusters: vec![ClusterTrafficTarget {
                    name: "c1".to_string(),
                    weight: 50,
                }],
            },
        });

        let body: Value = serde_json::from_slice(&patch.bytes().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({ "spec": { "clusters": [{ "name": "c1", "weight": 50 }] } }),
        );
    }

    #[test]
    fn test_release_status_body_includes_only_set_fields() {
        let patch = StrategyPatch::ReleaseStatus(ReleaseStatusPatch {
            name: "my-app-v2".to_string(),
            phase: Some("Installed".to_string()),
            achieved_step: Some(2),
            conditions: None,
        });

        let body: Value = serde_json::from_slice(&patch.bytes().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({ "status": { "phase": "Installed", "achievedStep": 2 } }),
        );
    }

    #[test]
    fn test_release_status_body_serializes_conditions_camel_case() {
        let patch = StrategyPatch::ReleaseStatus(ReleaseStatusPatch {
            name: "my-app-v2".to_string(),
            phase: None,
            achieved_step: None,
            conditions: Some(vec![Condition {
                r#type: "Strategy".to_string(),
                status: "True".to_string(),
                reason: Some("Complete".to_string()),
                message: None,
                last_transition_time: Some("2025-01-01T00:00:00+00:00".to_string()),
            }]),
        });

        let body: Value = serde_json::from_slice(&patch.bytes().unwrap()).unwrap();
        let condition = &body["status"]["conditions"][0];
        assert_eq!(condition["type"], "Strategy");
        assert_eq!(condition["lastTransitionTime"], "2025-01-01T00:00:00+00:00");
        assert!(condition.get("message").is_none());
    }

    #[test]
    fn test_empty_release_status_patch_is_detected() {
        let empty = StrategyPatch::ReleaseStatus(ReleaseStatusPatch {
            name: "my-app-v2".to_string(),
            ..Default::default()
        });
        assert!(empty.is_empty());

        assert!(!capacity_patch().is_empty());

        let with_phase = StrategyPatch::ReleaseStatus(ReleaseStatusPatch {
            name: "my-app-v2".to_string(),
            phase: Some("Aborted".to_string()),
            ..Default::default()
        });
        assert!(!with_phase.is_empty());
    }

    #[test]
    fn test_patch_name_addresses_the_target() {
        assert_eq!(capacity_patch().name(), "my-app-v2");
    }
}
