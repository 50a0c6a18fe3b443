// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::constants::{PHASE_WAITING_FOR_SCHEDULING, PHASE_WAITING_FOR_STRATEGY};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::CustomResourceExt;

    fn strategy(steps: usize) -> RolloutStrategy {
        RolloutStrategy {
            steps: (0..steps)
                .map(|i| RolloutStrategyStep {
                    name: format!("step-{i}"),
                    capacity: StepValues::default(),
                    traffic: StepValues::default(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_crds_share_the_api_group() {
        assert_eq!(Release::crd().spec.group, "helmsman.dev");
        assert_eq!(InstallationTarget::crd().spec.group, "helmsman.dev");
        assert_eq!(CapacityTarget::crd().spec.group, "helmsman.dev");
        assert_eq!(TrafficTarget::crd().spec.group, "helmsman.dev");
    }

    #[test]
    fn test_release_spec_round_trips_camel_case() {
        let spec = ReleaseSpec {
            target_step: 1,
            replica_count: 10,
            strategy: strategy(2),
        };

        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["targetStep"], 1);
        assert_eq!(value["replicaCount"], 10);
        assert_eq!(value["strategy"]["steps"][0]["name"], "step-0");

        let back: ReleaseSpec = serde_json::from_value(value).unwrap();
        assert_eq!(back.target_step, 1);
        assert_eq!(back.strategy.steps.len(), 2);
    }

    #[test]
    fn test_capacity_status_round_trips_camel_case() {
        let status = CapacityTargetStatus {
            clusters: vec![ClusterCapacityStatus {
                name: "c1".to_string(),
                achieved_percent: 25,
                available_replicas: 3,
                conditions: vec![],
            }],
            observed_generation: Some(4),
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["clusters"][0]["achievedPercent"], 25);
        assert_eq!(value["clusters"][0]["availableReplicas"], 3);
        assert_eq!(value["observedGeneration"], 4);
    }

    #[test]
    fn test_traffic_status_defaults_when_fields_absent() {
        let status: TrafficTargetStatus = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(status.clusters.is_empty());
        assert!(status.conditions.is_empty());
        assert!(status.observed_generation.is_none());
    }

    #[test]
    fn test_phase_defaults_to_waiting_for_scheduling() {
        let release = Release {
            metadata: ObjectMeta::default(),
            spec: ReleaseSpec::default(),
            status: None,
        };
        assert_eq!(release.phase(), PHASE_WAITING_FOR_SCHEDULING);

        let with_phase = Release {
            metadata: ObjectMeta::default(),
            spec: ReleaseSpec::default(),
            status: Some(ReleaseStatus {
                phase: Some(PHASE_WAITING_FOR_STRATEGY.to_string()),
                ..Default::default()
            }),
        };
        assert_eq!(with_phase.phase(), PHASE_WAITING_FOR_STRATEGY);
    }

    #[test]
    fn test_clamp_step_bounds() {
        let empty = strategy(0);
        assert_eq!(empty.clamp_step(0), None);

        let three = strategy(3);
        assert_eq!(three.clamp_step(0), Some(0));
        assert_eq!(three.clamp_step(2), Some(2));
        assert_eq!(three.clamp_step(99), Some(2));
    }

    #[test]
    fn test_is_last_step() {
        let three = strategy(3);
        assert!(!three.is_last_step(0));
        assert!(!three.is_last_step(1));
        assert!(three.is_last_step(2));
    }

    #[test]
    fn test_condition_optional_fields_are_omitted() {
        let condition = Condition {
            r#type: "Ready".to_string(),
            status: "True".to_string(),
            reason: None,
            message: None,
            last_transition_time: None,
        };

        let value = serde_json::to_value(&condition).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert!(object.contains_key("type"));
        assert!(object.contains_key("status"));
    }
}
