// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! The pod label shifter.
//!
//! Traffic weights are realised by flipping the `helmsman-traffic-status`
//! label on individual pods: the production load-balancer service selects
//! pods whose labels are a superset of its selector, so a pod "gets traffic"
//! exactly when the label is `enabled` (given the conventional selector).
//!
//! The planning core is pure: given the services and pods of one cluster it
//! derives the minimal set of JSON Patches that realises the weight split.
//! Re-running on an already-correct fleet plans zero patches, and only pods
//! crossing the enabled/disabled boundary are ever touched. Pods are sorted
//! by name before selection so shrink and grow pick deterministically.
//!
//! [`sync_cluster`] wraps the planner with the cluster-scoped list and patch
//! calls. Per-pod patch failures are collected and degrade the sync; they
//! never abort the cluster.

use crate::crd::TrafficTarget;
use crate::errors::TrafficError;
use crate::labels::{
    APP_LABEL, LB_LABEL, LB_PRODUCTION, RELEASE_LABEL, TRAFFIC_DISABLED, TRAFFIC_ENABLED,
    TRAFFIC_STATUS_LABEL,
};
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Weight per release within one cluster.
pub type ReleaseWeights = BTreeMap<String, u32>;

/// The two-level weight table: cluster → release → weight.
pub type ClusterReleaseWeights = BTreeMap<String, ReleaseWeights>;

/// Per-release ceilings on traffic pods within one cluster, derived from the
/// releases' capacity declarations. Releases absent from the map are
/// uncapped.
pub type DesiredReplicas = BTreeMap<String, u32>;

/// Derive the weight table from the traffic targets of one application.
///
/// Every target must carry a release label, each release may appear in at
/// most one target, and multiple entries for the same cluster within a
/// target accumulate. The result is invariant under reordering the input.
///
/// # Errors
///
/// Returns [`TrafficError::MissingReleaseLabel`] or
/// [`TrafficError::DuplicateTrafficTarget`]; both are configuration errors.
pub fn build_cluster_release_weights(
    targets: &[TrafficTarget],
) -> Result<ClusterReleaseWeights, TrafficError> {
    let mut sorted: Vec<&TrafficTarget> = targets.iter().collect();
    sorted.sort_by_key(|t| t.name_any());

    let mut owners: BTreeMap<String, String> = BTreeMap::new();
    let mut table = ClusterReleaseWeights::new();

    for target in sorted {
        let name = target.name_any();
        let release = target
            .labels()
            .get(RELEASE_LABEL)
            .cloned()
            .ok_or(TrafficError::MissingReleaseLabel { name: name.clone() })?;

        if let Some(first) = owners.get(&release) {
            return Err(TrafficError::DuplicateTrafficTarget {
                release,
                first: first.clone(),
                second: name,
            });
        }
        owners.insert(release.clone(), name);

        for cluster in &target.spec.clusters {
            *table
                .entry(cluster.name.clone())
                .or_default()
                .entry(release.clone())
                .or_default() += cluster.weight;
        }
    }

    Ok(table)
}

/// One planned label flip on one pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodLabelPatch {
    /// Pod name.
    pub pod: String,

    /// Release the pod belongs to.
    pub release: String,

    /// New label value: [`TRAFFIC_ENABLED`] or [`TRAFFIC_DISABLED`].
    pub value: &'static str,

    /// `add` iff the label key is absent on the live object, else `replace`.
    pub op: &'static str,
}

impl PodLabelPatch {
    /// The JSON Patch document realising the flip.
    #[must_use]
    pub fn document(&self) -> Value {
        json!([{
            "op": self.op,
            "path": format!("/metadata/labels/{TRAFFIC_STATUS_LABEL}"),
            "value": self.value,
        }])
    }
}

/// Output of the pure planning pass over one cluster.
#[derive(Debug, Default)]
pub struct ClusterShiftPlan {
    /// Minimal label flips, disable-before-enable per release.
    pub patches: Vec<PodLabelPatch>,

    /// Size of the app's pod fleet in the cluster.
    pub total_pods: usize,

    /// Sum of all releases' weights.
    pub total_weight: u32,

    /// Traffic pod count per release once all planned patches land.
    pub final_traffic_pods: BTreeMap<String, u32>,

    /// Math errors (fleet short of pods). Degraded, not fatal.
    pub problems: Vec<TrafficError>,
}

impl ClusterShiftPlan {
    /// Achieved weight per release, assuming every planned patch lands.
    #[must_use]
    pub fn achieved_weights(&self) -> BTreeMap<String, u32> {
        self.final_traffic_pods
            .iter()
            .map(|(release, &pods)| {
                (
                    release.clone(),
                    achieved_weight(pods, self.total_pods, self.total_weight),
                )
            })
            .collect()
    }
}

/// Share of traffic a release actually gets: `round((traffic / total) × weight-sum)`,
/// rounded half away from zero.
#[must_use]
pub fn achieved_weight(traffic_pods: u32, total_pods: usize, total_weight: u32) -> u32 {
    if total_pods == 0 {
        return 0;
    }
    let exact = f64::from(traffic_pods) / total_pods as f64 * f64::from(total_weight);
    (exact + 0.5).floor() as u32
}

/// Pod count a weight translates to: `ceil(total × weight / weight-sum)`,
/// clamped by the pods the release actually owns and by the replica count
/// its capacity declaration entitles it to. A release cannot lend pods it
/// does not have, nor carry traffic beyond its desired footprint.
#[must_use]
pub fn target_pods(
    total_pods: usize,
    weight: u32,
    total_weight: u32,
    owned: usize,
    desired_replicas: Option<u32>,
) -> usize {
    let raw = (total_pods as u64 * u64::from(weight)).div_ceil(u64::from(total_weight));
    let target = (raw as usize).min(owned);
    match desired_replicas {
        Some(desired) => target.min(desired as usize),
        None => target,
    }
}

fn matches_selector(pod: &Pod, selector: &BTreeMap<String, String>) -> bool {
    let labels = pod.labels();
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

fn label_patch(pod: &Pod, release: &str, value: &'static str) -> PodLabelPatch {
    let op = if pod.labels().contains_key(TRAFFIC_STATUS_LABEL) {
        "replace"
    } else {
        "add"
    };
    PodLabelPatch {
        pod: pod.name_any(),
        release: release.to_string(),
        value,
        op,
    }
}

/// Plan the minimal label flips realising a weight split in one cluster.
///
/// `desired_replicas` carries the per-release traffic-pod ceilings derived
/// from capacity declarations; see [`target_pods`] for the full clamp.
///
/// # Errors
///
/// A missing or ambiguous production load-balancer service is fatal for the
/// cluster. Per-release math problems are collected on the plan instead.
pub fn plan_cluster_shift(
    app: &str,
    namespace: &str,
    weights: &ReleaseWeights,
    desired_replicas: &DesiredReplicas,
    services: &[Service],
    pods: &[Pod],
) -> Result<ClusterShiftPlan, TrafficError> {
    let production: Vec<&Service> = services
        .iter()
        .filter(|service| {
            let labels = service.labels();
            labels.get(APP_LABEL).map(String::as_str) == Some(app)
                && labels.get(LB_LABEL).map(String::as_str) == Some(LB_PRODUCTION)
        })
        .collect();
    let service = match production.as_slice() {
        [service] => *service,
        [] => {
            return Err(TrafficError::MissingProductionService {
                app: app.to_string(),
                namespace: namespace.to_string(),
            })
        }
        many => {
            return Err(TrafficError::MultipleProductionServices {
                app: app.to_string(),
                namespace: namespace.to_string(),
                count: many.len(),
            })
        }
    };
    let traffic_selector: BTreeMap<String, String> = service
        .spec
        .as_ref()
        .and_then(|spec| spec.selector.clone())
        .unwrap_or_default();

    let fleet: Vec<&Pod> = pods
        .iter()
        .filter(|pod| pod.labels().get(APP_LABEL).map(String::as_str) == Some(app))
        .collect();

    let mut plan = ClusterShiftPlan {
        total_pods: fleet.len(),
        total_weight: weights.values().sum(),
        ..Default::default()
    };

    for (release, &weight) in weights {
        let mut release_pods: Vec<&Pod> = fleet
            .iter()
            .filter(|pod| pod.labels().get(RELEASE_LABEL).map(String::as_str) == Some(release))
            .copied()
            .collect();
        release_pods.sort_by_key(|pod| pod.name_any());

        let (traffic, idle): (Vec<&Pod>, Vec<&Pod>) = release_pods
            .iter()
            .copied()
            .partition(|pod| matches_selector(pod, &traffic_selector));

        // A zero weight sum is ambiguous for a running fleet; leave it alone.
        if plan.total_weight == 0 || plan.total_pods == 0 {
            plan.final_traffic_pods
                .insert(release.clone(), traffic.len() as u32);
            continue;
        }

        let target = target_pods(
            plan.total_pods,
            weight,
            plan.total_weight,
            release_pods.len(),
            desired_replicas.get(release).copied(),
        );
        let mut final_traffic = traffic.len();

        if traffic.len() > target {
            let excess = traffic.len() - target;
            for pod in traffic.iter().take(excess) {
                plan.patches.push(label_patch(pod, release, TRAFFIC_DISABLED));
            }
            final_traffic -= excess;
        } else if traffic.len() < target {
            let missing = target - traffic.len();
            if missing > idle.len() {
                plan.problems.push(TrafficError::FleetShortOfPods {
                    release: release.clone(),
                    missing,
                    idle: idle.len(),
                });
                plan.final_traffic_pods
                    .insert(release.clone(), final_traffic as u32);
                continue;
            }
            for pod in idle.iter().take(missing) {
                plan.patches.push(label_patch(pod, release, TRAFFIC_ENABLED));
            }
            final_traffic += missing;
        }

        debug!(
            release = %release,
            target,
            traffic = traffic.len(),
            idle = idle.len(),
            "planned traffic shift"
        );
        plan.final_traffic_pods
            .insert(release.clone(), final_traffic as u32);
    }

    Ok(plan)
}

/// Realise a weight split in one cluster.
///
/// Lists the app's services and pods, plans the shift, applies the pod
/// patches, and reports the achieved weight per release computed from the
/// pods that actually ended up enabled. Per-pod failures are collected in
/// the second element of the result; only list failures and configuration
/// errors abort the cluster.
///
/// # Errors
///
/// Returns the fatal error that aborted the cluster, if any.
pub async fn sync_cluster(
    client: &Client,
    namespace: &str,
    app: &str,
    weights: &ReleaseWeights,
    desired_replicas: &DesiredReplicas,
) -> anyhow::Result<(BTreeMap<String, u32>, Vec<TrafficError>)> {
    let services_api: Api<Service> = Api::namespaced(client.clone(), namespace);
    let pods_api: Api<Pod> = Api::namespaced(client.clone(), namespace);

    let app_selector = ListParams::default().labels(&format!("{APP_LABEL}={app}"));
    let services = services_api.list(&app_selector).await?;
    let pods = pods_api.list(&app_selector).await?;

    let plan = plan_cluster_shift(
        app,
        namespace,
        weights,
        desired_replicas,
        &services.items,
        &pods.items,
    )?;
    let mut final_traffic = plan.final_traffic_pods.clone();
    let mut errors = plan.problems;

    for patch in &plan.patches {
        let document: json_patch::Patch = serde_json::from_value(patch.document())?;
        match pods_api
            .patch(&patch.pod, &PatchParams::default(), &Patch::Json::<()>(document))
            .await
        {
            Ok(_) => {}
            Err(err) => {
                warn!(pod = %patch.pod, error = %err, "pod label patch failed, continuing");
                // A failed flip leaves the pod on its previous side of the split.
                if let Some(count) = final_traffic.get_mut(&patch.release) {
                    if patch.value == TRAFFIC_ENABLED {
                        *count = count.saturating_sub(1);
                    } else {
                        *count += 1;
                    }
                }
                errors.push(TrafficError::PodPatchFailed {
                    pod: patch.pod.clone(),
                    source: err,
                });
            }
        }
    }

    let achieved = final_traffic
        .iter()
        .map(|(release, &pods)| {
            (
                release.clone(),
                achieved_weight(pods, plan.total_pods, plan.total_weight),
            )
        })
        .collect();

    Ok((achieved, errors))
}
