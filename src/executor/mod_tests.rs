// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Unit tests for the strategy executor's decision procedure.

#[cfg(test)]
mod tests {
    use super::super::patches::StrategyPatch;
    use super::super::StrategyExecutor;
    use crate::conditions::{self, get_condition, new_condition};
    use crate::constants::{
        CONDITION_TYPE_STRATEGY, CONDITION_TYPE_STRATEGY_EXECUTED,
        CONDITION_TYPE_STRATEGY_EXECUTION_FAILED, PHASE_ABORTED, PHASE_INSTALLED,
        PHASE_WAITING_FOR_COMMAND, PHASE_WAITING_FOR_STRATEGY, REASON_COMPLETE,
        REASON_INSTALLATION_NOT_READY, REASON_STEP_COMPLETE, REASON_WAITING_FOR_CAPACITY,
        REASON_WAITING_FOR_INSTALLATION, REASON_WAITING_FOR_TRAFFIC, STATUS_FALSE, STATUS_TRUE,
    };
    use crate::crd::{
        CapacityTarget, CapacityTargetSpec, ClusterCapacityStatus, ClusterCapacityTarget,
        ClusterInstallationStatus, ClusterTrafficStatus, ClusterTrafficTarget, Condition,
        InstallationTarget, InstallationTargetSpec, InstallationTargetStatus, Release,
        ReleaseSpec, ReleaseStatus, RolloutStrategy, RolloutStrategyStep, StepValues,
        TrafficTarget, TrafficTargetSpec, TrafficTargetStatus,
    };
    use crate::errors::ExecutorError;
    use crate::resolver::ReleaseInfo;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    const CLUSTER: &str = "c1";

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("rollouts".to_string()),
            ..Default::default()
        }
    }

    fn three_step_strategy() -> RolloutStrategy {
        RolloutStrategy {
            steps: vec![
                RolloutStrategyStep {
                    name: "canary".to_string(),
                    capacity: StepValues { incumbent: 75, contender: 25 },
                    traffic: StepValues { incumbent: 75, contender: 25 },
                },
                RolloutStrategyStep {
                    name: "half".to_string(),
                    capacity: StepValues { incumbent: 50, contender: 50 },
                    traffic: StepValues { incumbent: 50, contender: 50 },
                },
                RolloutStrategyStep {
                    name: "full".to_string(),
                    capacity: StepValues { incumbent: 0, contender: 100 },
                    traffic: StepValues { incumbent: 0, contender: 100 },
                },
            ],
        }
    }

    fn release(name: &str, phase: &str, target_step: u32) -> Release {
        Release {
            metadata: meta(name),
            spec: ReleaseSpec {
                target_step,
                replica_count: 100,
                strategy: three_step_strategy(),
            },
            status: Some(ReleaseStatus {
                phase: Some(phase.to_string()),
                achieved_step: None,
                conditions: vec![],
                observed_generation: None,
            }),
        }
    }

    fn ready_installation(name: &str) -> InstallationTarget {
        InstallationTarget {
            metadata: meta(name),
            spec: InstallationTargetSpec {
                clusters: vec![CLUSTER.to_string()],
                can_override: false,
            },
            status: Some(InstallationTargetStatus {
                clusters: vec![ClusterInstallationStatus {
                    name: CLUSTER.to_string(),
                    conditions: vec![
                        condition("Operational", STATUS_TRUE),
                        condition("Ready", STATUS_TRUE),
                    ],
                }],
                observed_generation: None,
            }),
        }
    }

    fn condition(r#type: &str, status: &str) -> Condition {
        Condition {
            r#type: r#type.to_string(),
            status: status.to_string(),
            reason: Some("Testing".to_string()),
            message: Some("testing".to_string()),
            last_transition_time: None,
        }
    }

    fn capacity_target(name: &str, spec_percent: u32, achieved: u32, replicas: u32) -> CapacityTarget {
        CapacityTarget {
            metadata: meta(name),
            spec: CapacityTargetSpec {
                clusters: vec![ClusterCapacityTarget {
                    name: CLUSTER.to_string(),
                    percent: spec_percent,
                }],
            },
            status: Some(crate::crd::CapacityTargetStatus {
                clusters: vec![ClusterCapacityStatus {
                    name: CLUSTER.to_string(),
                    achieved_percent: achieved,
                    available_replicas: replicas,
                    conditions: vec![],
                }],
                observed_generation: None,
            }),
        }
    }

    fn traffic_target(name: &str, spec_weight: u32, achieved: u32) -> TrafficTarget {
        TrafficTarget {
            metadata: meta(name),
            spec: TrafficTargetSpec {
                clusters: vec![ClusterTrafficTarget {
                    name: CLUSTER.to_string(),
                    weight: spec_weight,
                }],
            },
            status: Some(TrafficTargetStatus {
                clusters: vec![ClusterTrafficStatus {
                    name: CLUSTER.to_string(),
                    achieved_traffic: achieved,
                    conditions: vec![],
                }],
                conditions: vec![],
                observed_generation: None,
            }),
        }
    }

    fn info(
        release: Release,
        installation_target: InstallationTarget,
        capacity_target: CapacityTarget,
        traffic_target: TrafficTarget,
    ) -> ReleaseInfo {
        ReleaseInfo {
            release,
            installation_target,
            capacity_target,
            traffic_target,
        }
    }

    fn release_status_patch<'a>(patches: &'a [StrategyPatch], name: &str) -> Option<&'a StrategyPatch> {
        patches.iter().find(|p| {
            matches!(p, StrategyPatch::ReleaseStatus(_)) && p.name() == name
        })
    }

    fn patched_conditions(patch: &StrategyPatch) -> &[Condition] {
        match patch {
            StrategyPatch::ReleaseStatus(p) => p.conditions.as_deref().unwrap_or_default(),
            _ => &[],
        }
    }

    #[test]
    fn test_fresh_rollout_patches_capacity_first() {
        conditions::discard_timestamps(true);

        // Release at step 0, capacity observed 0/0: one capacity patch to 25.
        let contender = info(
            release("r0", PHASE_WAITING_FOR_STRATEGY, 0),
            ready_installation("r0"),
            capacity_target("r0", 0, 0, 0),
            traffic_target("r0", 0, 0),
        );

        let patches = StrategyExecutor::new(&contender, None).execute().unwrap();

        let capacity: Vec<_> = patches
            .iter()
            .filter(|p| matches!(p, StrategyPatch::CapacityTargetSpec(_)))
            .collect();
        assert_eq!(capacity.len(), 1);
        match capacity[0] {
            StrategyPatch::CapacityTargetSpec(p) => {
                assert_eq!(p.name, "r0");
                assert_eq!(p.spec.clusters[0].percent, 25);
            }
            _ => unreachable!(),
        }
        assert!(!patches
            .iter()
            .any(|p| matches!(p, StrategyPatch::TrafficTargetSpec(_))));

        let status = release_status_patch(&patches, "r0").expect("condition patch expected");
        let strategy = get_condition(patched_conditions(status), CONDITION_TYPE_STRATEGY)
            .expect("Strategy condition expected");
        assert_eq!(strategy.status, STATUS_FALSE);
        assert_eq!(strategy.reason.as_deref(), Some(REASON_WAITING_FOR_CAPACITY));
    }

    #[test]
    fn test_capacity_converged_patches_traffic() {
        conditions::discard_timestamps(true);

        let contender = info(
            release("r0", PHASE_WAITING_FOR_STRATEGY, 0),
            ready_installation("r0"),
            capacity_target("r0", 25, 25, 25),
            traffic_target("r0", 0, 0),
        );

        let patches = StrategyExecutor::new(&contender, None).execute().unwrap();

        let traffic: Vec<_> = patches
            .iter()
            .filter(|p| matches!(p, StrategyPatch::TrafficTargetSpec(_)))
            .collect();
        assert_eq!(traffic.len(), 1);
        match traffic[0] {
            StrategyPatch::TrafficTargetSpec(p) => {
                assert_eq!(p.spec.clusters[0].weight, 25);
            }
            _ => unreachable!(),
        }
        assert!(!patches
            .iter()
            .any(|p| matches!(p, StrategyPatch::CapacityTargetSpec(_))));

        let status = release_status_patch(&patches, "r0").unwrap();
        let strategy = get_condition(patched_conditions(status), CONDITION_TYPE_STRATEGY).unwrap();
        assert_eq!(strategy.reason.as_deref(), Some(REASON_WAITING_FOR_TRAFFIC));
    }

    #[test]
    fn test_step_complete_advances_release_status() {
        conditions::discard_timestamps(true);

        let contender = info(
            release("r0", PHASE_WAITING_FOR_STRATEGY, 0),
            ready_installation("r0"),
            capacity_target("r0", 25, 25, 25),
            traffic_target("r0", 25, 25),
        );

        let patches = StrategyExecutor::new(&contender, None).execute().unwrap();

        assert_eq!(patches.len(), 1);
        let status = release_status_patch(&patches, "r0").unwrap();
        match status {
            StrategyPatch::ReleaseStatus(p) => {
                assert_eq!(p.achieved_step, Some(0));
                assert_eq!(p.phase.as_deref(), Some(PHASE_WAITING_FOR_COMMAND));
            }
            _ => unreachable!(),
        }
        let executed =
            get_condition(patched_conditions(status), CONDITION_TYPE_STRATEGY_EXECUTED).unwrap();
        assert_eq!(executed.status, STATUS_TRUE);
        assert_eq!(executed.reason.as_deref(), Some(REASON_STEP_COMPLETE));
        let strategy = get_condition(patched_conditions(status), CONDITION_TYPE_STRATEGY).unwrap();
        assert_eq!(strategy.reason.as_deref(), Some(REASON_COMPLETE));
    }

    #[test]
    fn test_installation_gate_blocks_everything() {
        conditions::discard_timestamps(true);

        let mut installation = ready_installation("r0");
        installation.status.as_mut().unwrap().clusters[0].conditions =
            vec![condition("Operational", STATUS_TRUE), condition("Ready", STATUS_FALSE)];

        let contender = info(
            release("r0", PHASE_WAITING_FOR_STRATEGY, 0),
            installation,
            capacity_target("r0", 0, 0, 0),
            traffic_target("r0", 0, 0),
        );

        let patches = StrategyExecutor::new(&contender, None).execute().unwrap();

        // No spec patches while the gate is blocked.
        assert_eq!(patches.len(), 1);
        let status = release_status_patch(&patches, "r0").unwrap();
        let failed = get_condition(
            patched_conditions(status),
            CONDITION_TYPE_STRATEGY_EXECUTION_FAILED,
        )
        .unwrap();
        assert_eq!(failed.status, STATUS_TRUE);
        assert_eq!(failed.reason.as_deref(), Some(REASON_INSTALLATION_NOT_READY));
        assert!(failed.message.as_deref().unwrap_or_default().contains(CLUSTER));

        let strategy = get_condition(patched_conditions(status), CONDITION_TYPE_STRATEGY).unwrap();
        assert_eq!(
            strategy.reason.as_deref(),
            Some(REASON_WAITING_FOR_INSTALLATION),
        );
    }

    #[test]
    fn test_missing_cluster_status_blocks_installation_gate() {
        conditions::discard_timestamps(true);

        let mut installation = ready_installation("r0");
        installation.status = None;

        let contender = info(
            release("r0", PHASE_WAITING_FOR_STRATEGY, 0),
            installation,
            capacity_target("r0", 25, 25, 25),
            traffic_target("r0", 25, 25),
        );

        let patches = StrategyExecutor::new(&contender, None).execute().unwrap();
        let status = release_status_patch(&patches, "r0").unwrap();
        let strategy = get_condition(patched_conditions(status), CONDITION_TYPE_STRATEGY).unwrap();
        assert_eq!(
            strategy.reason.as_deref(),
            Some(REASON_WAITING_FOR_INSTALLATION),
        );
    }

    #[test]
    fn test_converged_release_emits_no_patches() {
        conditions::discard_timestamps(true);

        let mut rel = release("r0", PHASE_WAITING_FOR_COMMAND, 0);
        {
            let status = rel.status.as_mut().unwrap();
            status.achieved_step = Some(0);
            status.conditions = vec![
                new_condition(
                    CONDITION_TYPE_STRATEGY,
                    STATUS_TRUE,
                    REASON_COMPLETE,
                    "strategy converged on step canary",
                ),
                new_condition(
                    CONDITION_TYPE_STRATEGY_EXECUTED,
                    STATUS_TRUE,
                    REASON_STEP_COMPLETE,
                    "step canary complete",
                ),
            ];
        }

        let contender = info(
            rel,
            ready_installation("r0"),
            capacity_target("r0", 25, 25, 25),
            traffic_target("r0", 25, 25),
        );

        let patches = StrategyExecutor::new(&contender, None).execute().unwrap();
        assert!(patches.is_empty(), "unexpected patches: {patches:?}");
    }

    #[test]
    fn test_achieved_step_never_decreases() {
        conditions::discard_timestamps(true);

        let mut rel = release("r0", PHASE_WAITING_FOR_COMMAND, 0);
        {
            let status = rel.status.as_mut().unwrap();
            status.achieved_step = Some(2);
            status.conditions = vec![
                new_condition(
                    CONDITION_TYPE_STRATEGY,
                    STATUS_TRUE,
                    REASON_COMPLETE,
                    "strategy converged on step canary",
                ),
                new_condition(
                    CONDITION_TYPE_STRATEGY_EXECUTED,
                    STATUS_TRUE,
                    REASON_STEP_COMPLETE,
                    "step canary complete",
                ),
            ];
        }

        let contender = info(
            rel,
            ready_installation("r0"),
            capacity_target("r0", 25, 25, 25),
            traffic_target("r0", 25, 25),
        );

        let patches = StrategyExecutor::new(&contender, None).execute().unwrap();
        assert!(patches.is_empty(), "unexpected patches: {patches:?}");
    }

    #[test]
    fn test_final_step_installs_contender_and_aborts_incumbent() {
        conditions::discard_timestamps(true);

        let contender = info(
            release("r1", PHASE_WAITING_FOR_STRATEGY, 2),
            ready_installation("r1"),
            capacity_target("r1", 100, 100, 100),
            traffic_target("r1", 100, 100),
        );
        let incumbent = info(
            release("r0", PHASE_WAITING_FOR_COMMAND, 2),
            ready_installation("r0"),
            capacity_target("r0", 0, 0, 0),
            traffic_target("r0", 0, 0),
        );

        let patches = StrategyExecutor::new(&contender, Some(&incumbent))
            .execute()
            .unwrap();

        let contender_status = release_status_patch(&patches, "r1").unwrap();
        match contender_status {
            StrategyPatch::ReleaseStatus(p) => {
                assert_eq!(p.phase.as_deref(), Some(PHASE_INSTALLED));
                assert_eq!(p.achieved_step, Some(2));
            }
            _ => unreachable!(),
        }

        let incumbent_status = release_status_patch(&patches, "r0").unwrap();
        match incumbent_status {
            StrategyPatch::ReleaseStatus(p) => {
                assert_eq!(p.phase.as_deref(), Some(PHASE_ABORTED));
                assert!(p.conditions.is_none());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_incumbent_capacity_divergence_is_patched_too() {
        conditions::discard_timestamps(true);

        // Step 1 wants incumbent at 50; it still declares 75.
        let contender = info(
            release("r1", PHASE_WAITING_FOR_STRATEGY, 1),
            ready_installation("r1"),
            capacity_target("r1", 50, 50, 50),
            traffic_target("r1", 25, 25),
        );
        let incumbent = info(
            release("r0", PHASE_WAITING_FOR_COMMAND, 1),
            ready_installation("r0"),
            capacity_target("r0", 75, 75, 75),
            traffic_target("r0", 75, 75),
        );

        let patches = StrategyExecutor::new(&contender, Some(&incumbent))
            .execute()
            .unwrap();

        let capacity: Vec<_> = patches
            .iter()
            .filter(|p| matches!(p, StrategyPatch::CapacityTargetSpec(_)))
            .collect();
        assert_eq!(capacity.len(), 1);
        assert_eq!(capacity[0].name(), "r0");
        match capacity[0] {
            StrategyPatch::CapacityTargetSpec(p) => assert_eq!(p.spec.clusters[0].percent, 50),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_target_step_is_clamped_to_strategy_length() {
        conditions::discard_timestamps(true);

        let contender = info(
            release("r0", PHASE_WAITING_FOR_STRATEGY, 99),
            ready_installation("r0"),
            capacity_target("r0", 100, 100, 100),
            traffic_target("r0", 100, 100),
        );

        let patches = StrategyExecutor::new(&contender, None).execute().unwrap();

        // Clamped to the last step, which is converged: the release installs.
        let status = release_status_patch(&patches, "r0").unwrap();
        match status {
            StrategyPatch::ReleaseStatus(p) => {
                assert_eq!(p.phase.as_deref(), Some(PHASE_INSTALLED));
                assert_eq!(p.achieved_step, Some(2));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_empty_strategy_is_an_error() {
        let mut rel = release("r0", PHASE_WAITING_FOR_STRATEGY, 0);
        rel.spec.strategy.steps.clear();

        let contender = info(
            rel,
            ready_installation("r0"),
            capacity_target("r0", 0, 0, 0),
            traffic_target("r0", 0, 0),
        );

        let err = StrategyExecutor::new(&contender, None).execute().unwrap_err();
        assert!(matches!(err, ExecutorError::EmptyStrategy { .. }));
    }

    #[test]
    fn test_every_emitted_patch_serializes() {
        conditions::discard_timestamps(true);

        let contender = info(
            release("r1", PHASE_WAITING_FOR_STRATEGY, 1),
            ready_installation("r1"),
            capacity_target("r1", 25, 25, 25),
            traffic_target("r1", 25, 25),
        );
        let incumbent = info(
            release("r0", PHASE_WAITING_FOR_COMMAND, 1),
            ready_installation("r0"),
            capacity_target("r0", 75, 75, 75),
            traffic_target("r0", 75, 75),
        );

        let patches = StrategyExecutor::new(&contender, Some(&incumbent))
            .execute()
            .unwrap();

        assert!(!patches.is_empty());
        for patch in &patches {
            let bytes = patch.bytes().expect("patch body must serialize");
            let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert!(value.is_object());
        }
    }
}
