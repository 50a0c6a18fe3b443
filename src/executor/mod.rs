// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! The strategy executor.
//!
//! Given a contender snapshot and an optional incumbent snapshot, the
//! executor decides which sub-objects must be patched to move the rollout
//! one step closer to convergence. It is synchronous and pure over its
//! snapshots: every external read happened before [`StrategyExecutor::execute`]
//! and every write happens after it, so re-running on identical state emits
//! an identical (and, at convergence, empty) patch list.
//!
//! The decision procedure for one reconcile, in order:
//!
//! 1. Installation gate: every declared cluster must report
//!    `Operational=True` and `Ready=True` on the contender's
//!    `InstallationTarget`.
//! 2. Clamp `targetStep` into the strategy and look up the step's four
//!    declarations.
//! 3. Capacity phase: patch diverging `CapacityTarget` specs (contender and
//!    incumbent), or wait for observations to catch up.
//! 4. Traffic phase: same for `TrafficTarget`, only once capacity converged.
//! 5. Step completion: advance `achievedStep`, move the phase forward, and
//!    retire the incumbent after the final step.
//!
//! At every exit the `Strategy` condition reflects what the executor is
//! waiting on. Condition writes go through [`crate::conditions`], so a no-op
//! rewrite produces no patch.

pub mod checks;
pub mod patches;

use crate::conditions::{get_condition, new_condition, set_condition};
use crate::constants::{
    CONDITION_TYPE_STRATEGY, CONDITION_TYPE_STRATEGY_EXECUTED,
    CONDITION_TYPE_STRATEGY_EXECUTION_FAILED, PHASE_ABORTED, PHASE_INSTALLED,
    PHASE_WAITING_FOR_COMMAND, REASON_COMPLETE, REASON_INSTALLATION_NOT_READY,
    REASON_INSTALLATION_READY, REASON_STEP_COMPLETE, REASON_WAITING_FOR_CAPACITY,
    REASON_WAITING_FOR_INSTALLATION, REASON_WAITING_FOR_TRAFFIC, STATUS_FALSE, STATUS_TRUE,
};
use crate::crd::Condition;
use crate::errors::ExecutorError;
use crate::resolver::ReleaseInfo;
use kube::ResourceExt;
use patches::{CapacityTargetSpecPatch, ReleaseStatusPatch, StrategyPatch, TrafficTargetSpecPatch};
use tracing::debug;

/// Decides the next set of patches for one contender/incumbent pair.
pub struct StrategyExecutor<'a> {
    contender: &'a ReleaseInfo,
    incumbent: Option<&'a ReleaseInfo>,
}

impl<'a> StrategyExecutor<'a> {
    /// A nil incumbent is a valid state (first release), not an error.
    #[must_use]
    pub fn new(contender: &'a ReleaseInfo, incumbent: Option<&'a ReleaseInfo>) -> Self {
        Self {
            contender,
            incumbent,
        }
    }

    /// Compute the patches that move the rollout one step forward.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::EmptyStrategy`] for a release with no steps.
    /// Observed state that merely has not converged is never an error.
    pub fn execute(&self) -> Result<Vec<StrategyPatch>, ExecutorError> {
        let release = &self.contender.release;
        let name = release.name_any();
        let strategy = &release.spec.strategy;

        let step_index = strategy.clamp_step(release.spec.target_step).ok_or(
            ExecutorError::EmptyStrategy {
                release: name.clone(),
            },
        )?;
        let step = &strategy.steps[step_index];

        let mut conditions = release
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default();
        let mut conditions_changed = false;

        // Installation gate.
        if let Some(cluster) =
            checks::pending_installation_cluster(&self.contender.installation_target)
        {
            debug!(release = %name, cluster = %cluster, "installation gate blocked");
            conditions_changed |= set_condition(
                &mut conditions,
                new_condition(
                    CONDITION_TYPE_STRATEGY_EXECUTION_FAILED,
                    STATUS_TRUE,
                    REASON_INSTALLATION_NOT_READY,
                    &format!("installation is not ready in cluster {cluster}"),
                ),
            )
            .is_some();
            conditions_changed |= set_condition(
                &mut conditions,
                new_condition(
                    CONDITION_TYPE_STRATEGY,
                    STATUS_FALSE,
                    REASON_WAITING_FOR_INSTALLATION,
                    &format!("waiting for installation in cluster {cluster}"),
                ),
            )
            .is_some();
            return Ok(with_release_status(
                Vec::new(),
                &name,
                conditions,
                conditions_changed,
                None,
                None,
            ));
        }
        if get_condition(&conditions, CONDITION_TYPE_STRATEGY_EXECUTION_FAILED)
            .is_some_and(|c| c.status == STATUS_TRUE)
        {
            conditions_changed |= set_condition(
                &mut conditions,
                new_condition(
                    CONDITION_TYPE_STRATEGY_EXECUTION_FAILED,
                    STATUS_FALSE,
                    REASON_INSTALLATION_READY,
                    "installation is ready in all clusters",
                ),
            )
            .is_some();
        }

        let mut results = Vec::new();

        // Capacity phase.
        if checks::capacity_spec_needs_patch(
            &self.contender.capacity_target,
            step.capacity.contender,
        ) {
            results.push(StrategyPatch::CapacityTargetSpec(CapacityTargetSpecPatch {
                name: self.contender.capacity_target.name_any(),
                spec: checks::desired_capacity_spec(
                    &self.contender.capacity_target,
                    step.capacity.contender,
                ),
            }));
        }
        if let Some(incumbent) = self.incumbent {
            if checks::capacity_spec_needs_patch(
                &incumbent.capacity_target,
                step.capacity.incumbent,
            ) {
                results.push(StrategyPatch::CapacityTargetSpec(CapacityTargetSpecPatch {
                    name: incumbent.capacity_target.name_any(),
                    spec: checks::desired_capacity_spec(
                        &incumbent.capacity_target,
                        step.capacity.incumbent,
                    ),
                }));
            }
        }

        let capacity_converged = results.is_empty()
            && checks::capacity_achieved(
                &self.contender.capacity_target,
                step.capacity.contender,
                release.spec.replica_count,
            )
            && self.incumbent.is_none_or(|incumbent| {
                checks::capacity_achieved(
                    &incumbent.capacity_target,
                    step.capacity.incumbent,
                    incumbent.release.spec.replica_count,
                )
            });
        if !capacity_converged {
            conditions_changed |= set_condition(
                &mut conditions,
                new_condition(
                    CONDITION_TYPE_STRATEGY,
                    STATUS_FALSE,
                    REASON_WAITING_FOR_CAPACITY,
                    &format!("waiting for capacity to converge on step {}", step.name),
                ),
            )
            .is_some();
            return Ok(with_release_status(
                results,
                &name,
                conditions,
                conditions_changed,
                None,
                None,
            ));
        }

        // Traffic phase. Only entered once capacity converged.
        if checks::traffic_spec_needs_patch(&self.contender.traffic_target, step.traffic.contender)
        {
            results.push(StrategyPatch::TrafficTargetSpec(TrafficTargetSpecPatch {
                name: self.contender.traffic_target.name_any(),
                spec: checks::desired_traffic_spec(
                    &self.contender.traffic_target,
                    step.traffic.contender,
                ),
            }));
        }
        if let Some(incumbent) = self.incumbent {
            if checks::traffic_spec_needs_patch(&incumbent.traffic_target, step.traffic.incumbent)
            {
                results.push(StrategyPatch::TrafficTargetSpec(TrafficTargetSpecPatch {
                    name: incumbent.traffic_target.name_any(),
                    spec: checks::desired_traffic_spec(
                        &incumbent.traffic_target,
                        step.traffic.incumbent,
                    ),
                }));
            }
        }

        let traffic_converged = results.is_empty()
            && checks::traffic_achieved(&self.contender.traffic_target, step.traffic.contender)
            && self.incumbent.is_none_or(|incumbent| {
                checks::traffic_achieved(&incumbent.traffic_target, step.traffic.incumbent)
            });
        if !traffic_converged {
            conditions_changed |= set_condition(
                &mut conditions,
                new_condition(
                    CONDITION_TYPE_STRATEGY,
                    STATUS_FALSE,
                    REASON_WAITING_FOR_TRAFFIC,
                    &format!("waiting for traffic to converge on step {}", step.name),
                ),
            )
            .is_some();
            return Ok(with_release_status(
                results,
                &name,
                conditions,
                conditions_changed,
                None,
                None,
            ));
        }

        // Step completion: all four declarations match observations.
        conditions_changed |= set_condition(
            &mut conditions,
            new_condition(
                CONDITION_TYPE_STRATEGY_EXECUTED,
                STATUS_TRUE,
                REASON_STEP_COMPLETE,
                &format!("step {} complete", step.name),
            ),
        )
        .is_some();
        conditions_changed |= set_condition(
            &mut conditions,
            new_condition(
                CONDITION_TYPE_STRATEGY,
                STATUS_TRUE,
                REASON_COMPLETE,
                &format!("strategy converged on step {}", step.name),
            ),
        )
        .is_some();

        let achieved = step_index as u32;
        // achievedStep never decreases.
        let new_achieved_step = match release.achieved_step() {
            Some(current) if current >= achieved => None,
            _ => Some(achieved),
        };
        let target_phase = if strategy.is_last_step(step_index) {
            PHASE_INSTALLED
        } else {
            PHASE_WAITING_FOR_COMMAND
        };
        let new_phase = (release.phase() != target_phase).then(|| target_phase.to_string());

        let mut results = with_release_status(
            results,
            &name,
            conditions,
            conditions_changed,
            new_phase,
            new_achieved_step,
        );

        if strategy.is_last_step(step_index) {
            if let Some(incumbent) = self.incumbent {
                if incumbent.release.phase() != PHASE_ABORTED {
                    results.push(StrategyPatch::ReleaseStatus(ReleaseStatusPatch {
                        name: incumbent.release.name_any(),
                        phase: Some(PHASE_ABORTED.to_string()),
                        ..Default::default()
                    }));
                }
            }
        }

        Ok(results)
    }
}

/// Append a release status patch unless it would change nothing.
fn with_release_status(
    mut results: Vec<StrategyPatch>,
    name: &str,
    conditions: Vec<Condition>,
    conditions_changed: bool,
    phase: Option<String>,
    achieved_step: Option<u32>,
) -> Vec<StrategyPatch> {
    let patch = StrategyPatch::ReleaseStatus(ReleaseStatusPatch {
        name: name.to_string(),
        phase,
        achieved_step,
        conditions: conditions_changed.then_some(conditions),
    });
    if !patch.is_empty() {
        results.push(patch);
    }
    results
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;


#[cfg(test)]
#[path = "patches_tests.rs"]
mod patches_tests;
