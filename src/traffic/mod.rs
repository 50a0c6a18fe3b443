// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! The traffic reconciliation loop.
//!
//! A controller over `TrafficTarget` on the same queue design as the
//! strategy loop: per-key dedup and single-flight from the kube runtime
//! scheduler, per-key exponential backoff on failure. Each reconcile derives
//! the cluster → release → weight table from all targets of the application,
//! invokes the pod label shifter in every declared cluster, and reports the
//! achieved weights back onto the `TrafficTarget` status.
//!
//! Configuration errors (missing labels, duplicate targets, unknown
//! clusters) are surfaced as conditions on the target and not retried until
//! its spec changes. Per-pod patch failures degrade the cluster's `Ready`
//! condition but never abort the sync.

pub mod shifter;


use crate::conditions::{new_condition, set_condition};
use crate::constants::{
    CONDITION_TYPE_READY, FIELD_MANAGER, REASON_INVALID_CONFIGURATION, REASON_PODS_DEGRADED,
    REASON_TRAFFIC_SHIFTED, STATUS_FALSE, STATUS_TRUE,
};
use crate::context::{object_key, Context, Stores};
use crate::controller::backoff::ItemBackoff;
use crate::controller::ReconcileError;
use crate::crd::{ClusterTrafficStatus, Condition, TrafficTarget};
use crate::errors::TrafficError;
use crate::executor::checks::replicas_for_percent;
use crate::labels::{APP_LABEL, RELEASE_LABEL};
use anyhow::anyhow;
use futures::{FutureExt, StreamExt};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::ResourceExt;
use serde_json::json;
use shifter::ReleaseWeights;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type TrafficContext = (Arc<Context>, Arc<ItemBackoff>);

/// Run the traffic controller until the stream ends or shutdown.
///
/// # Errors
///
/// Returns an error if the controller fails to start.
pub async fn run(ctx: Arc<Context>) -> anyhow::Result<()> {
    info!("Starting traffic controller");

    let api = Api::<TrafficTarget>::all(ctx.client.clone());
    let traffic_ctx: Arc<TrafficContext> = Arc::new((ctx, Arc::new(ItemBackoff::default())));

    Controller::new(api, WatcherConfig::default())
        .run(reconcile_traffic_target, error_policy, traffic_ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

#[allow(clippy::needless_pass_by_value)] // Signature required by kube::runtime::Controller
fn error_policy(
    target: Arc<TrafficTarget>,
    err: &ReconcileError,
    ctx: Arc<TrafficContext>,
) -> Action {
    let key = object_key(&target.namespace().unwrap_or_default(), &target.name_any());
    let delay = ctx.1.next_delay(&key);
    error!(
        traffic_target = %key,
        error = %err,
        "Reconciliation error - will retry in {:?}",
        delay
    );
    Action::requeue(delay)
}

async fn reconcile_traffic_target(
    target: Arc<TrafficTarget>,
    ctx: Arc<TrafficContext>,
) -> Result<Action, ReconcileError> {
    let key = object_key(&target.namespace().unwrap_or_default(), &target.name_any());
    let (ctx, backoff) = &*ctx;

    let result = AssertUnwindSafe(reconcile_inner(target, ctx.clone()))
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(action)) => {
            backoff.forget(&key);
            Ok(action)
        }
        Ok(Err(err)) => Err(err),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ReconcileError::from(anyhow!(
                "reconcile of {key} panicked: {message}"
            )))
        }
    }
}

async fn reconcile_inner(
    target: Arc<TrafficTarget>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let namespace = target.namespace().unwrap_or_default();
    let name = target.name_any();

    let Some(app) = target.labels().get(APP_LABEL).cloned() else {
        warn!(traffic_target = %name, "TrafficTarget carries no app label");
        return surface_configuration_error(
            &ctx.client,
            &target,
            &format!("TrafficTarget {name:?} carries no {APP_LABEL} label"),
        )
        .await;
    };

    // The weight split must account for every release of the app, not just
    // the one this target declares.
    let app_targets: Vec<TrafficTarget> = ctx
        .stores
        .traffic_targets_for_app(&namespace, &app)
        .iter()
        .map(|t| (**t).clone())
        .collect();

    let table = match shifter::build_cluster_release_weights(&app_targets) {
        Ok(table) => table,
        Err(err) if err.is_configuration() => {
            return surface_configuration_error(&ctx.client, &target, &err.to_string()).await;
        }
        Err(err) => return Err(ReconcileError::from(anyhow!(err))),
    };

    // Guaranteed by build_cluster_release_weights succeeding above.
    let release = target
        .labels()
        .get(RELEASE_LABEL)
        .cloned()
        .unwrap_or_default();

    let mut declared_clusters: Vec<String> = Vec::new();
    for cluster in &target.spec.clusters {
        if !declared_clusters.contains(&cluster.name) {
            declared_clusters.push(cluster.name.clone());
        }
    }

    let existing_clusters = target
        .status
        .as_ref()
        .map(|s| s.clusters.as_slice())
        .unwrap_or_default();
    let mut changed = existing_clusters.len() != declared_clusters.len();
    let mut new_clusters = Vec::new();
    let mut degraded_pods = 0usize;

    for cluster in declared_clusters {
        let client = match ctx.clusters.for_cluster(&cluster) {
            Ok(client) => client,
            Err(err) => {
                return surface_configuration_error(&ctx.client, &target, &err.to_string()).await;
            }
        };

        let empty = ReleaseWeights::new();
        let weights = table.get(&cluster).unwrap_or(&empty);
        let caps = desired_replica_caps(&ctx.stores, &namespace, &cluster, weights);
        let (achieved, pod_errors) =
            match shifter::sync_cluster(&client, &namespace, &app, weights, &caps).await {
                Ok(result) => result,
                Err(err) => {
                    if let Some(traffic_err) = err.downcast_ref::<TrafficError>() {
                        surface_configuration_error(
                            &ctx.client,
                            &target,
                            &traffic_err.to_string(),
                        )
                        .await?;
                    }
                    return Err(ReconcileError::from(err));
                }
            };

        let achieved_traffic = achieved.get(&release).copied().unwrap_or(0);
        degraded_pods += pod_errors.len();
        for err in &pod_errors {
            warn!(cluster = %cluster, error = %err, "degraded pod during traffic sync");
        }

        let existing = existing_clusters.iter().find(|c| c.name == cluster);
        let mut conditions = existing.map(|c| c.conditions.clone()).unwrap_or_default();
        let condition = cluster_ready_condition(&pod_errors);
        changed |= set_condition(&mut conditions, condition).is_some();
        changed |= existing.map(|c| c.achieved_traffic) != Some(achieved_traffic);

        debug!(
            cluster = %cluster,
            achieved_traffic,
            degraded = pod_errors.len(),
            "cluster traffic synced"
        );
        new_clusters.push(ClusterTrafficStatus {
            name: cluster,
            achieved_traffic,
            conditions,
        });
    }

    // Object-level condition: degraded when any pod patch failed anywhere.
    let mut object_conditions = target
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    let object_condition = if degraded_pods == 0 {
        new_condition(
            CONDITION_TYPE_READY,
            STATUS_TRUE,
            REASON_TRAFFIC_SHIFTED,
            "traffic shifted in all declared clusters",
        )
    } else {
        new_condition(
            CONDITION_TYPE_READY,
            STATUS_FALSE,
            REASON_PODS_DEGRADED,
            &format!("{degraded_pods} pod patches failed"),
        )
    };
    changed |= set_condition(&mut object_conditions, object_condition).is_some();

    if changed {
        patch_status(&ctx.client, &target, new_clusters, object_conditions).await?;
    }

    Ok(Action::await_change())
}

/// The replica count each release's capacity declaration entitles it to in
/// one cluster: `replicaCount × declared percent`, rounded up. A release
/// whose declaration cannot be resolved from the stores is left uncapped.
fn desired_replica_caps(
    stores: &Stores,
    namespace: &str,
    cluster: &str,
    weights: &shifter::ReleaseWeights,
) -> shifter::DesiredReplicas {
    let mut caps = shifter::DesiredReplicas::new();
    for release_name in weights.keys() {
        let Some(release) = stores.get_release(namespace, release_name) else {
            continue;
        };
        let Some(capacity_target) = stores
            .capacity_targets_for_release(namespace, release_name)
            .into_iter()
            .next()
        else {
            continue;
        };
        let Some(percent) = capacity_target
            .spec
            .clusters
            .iter()
            .find(|c| c.name == cluster)
            .map(|c| c.percent)
        else {
            continue;
        };
        caps.insert(
            release_name.clone(),
            replicas_for_percent(release.spec.replica_count, percent),
        );
    }
    caps
}

fn cluster_ready_condition(pod_errors: &[TrafficError]) -> Condition {
    if pod_errors.is_empty() {
        new_condition(
            CONDITION_TYPE_READY,
            STATUS_TRUE,
            REASON_TRAFFIC_SHIFTED,
            "traffic shift complete",
        )
    } else {
        new_condition(
            CONDITION_TYPE_READY,
            STATUS_FALSE,
            REASON_PODS_DEGRADED,
            &format!("{} pod patches failed", pod_errors.len()),
        )
    }
}

/// Surface a configuration error on the target and stop retrying; the next
/// spec change re-enqueues it.
async fn surface_configuration_error(
    client: &kube::Client,
    target: &TrafficTarget,
    message: &str,
) -> Result<Action, ReconcileError> {
    let mut conditions = target
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    let condition = new_condition(
        CONDITION_TYPE_READY,
        STATUS_FALSE,
        REASON_INVALID_CONFIGURATION,
        message,
    );
    if set_condition(&mut conditions, condition).is_some() {
        let api: Api<TrafficTarget> = Api::namespaced(
            client.clone(),
            &target.namespace().unwrap_or_default(),
        );
        api.patch_status(
            &target.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&json!({ "status": { "conditions": conditions } })),
        )
        .await
        .map_err(|err| ReconcileError::from(anyhow!(err)))?;
    }
    Ok(Action::await_change())
}

async fn patch_status(
    client: &kube::Client,
    target: &TrafficTarget,
    clusters: Vec<ClusterTrafficStatus>,
    conditions: Vec<Condition>,
) -> Result<(), ReconcileError> {
    let api: Api<TrafficTarget> = Api::namespaced(
        client.clone(),
        &target.namespace().unwrap_or_default(),
    );
    api.patch_status(
        &target.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&json!({
            "status": {
                "clusters": clusters,
                "conditions": conditions,
                "observedGeneration": target.metadata.generation,
            }
        })),
    )
    .await
    .map_err(|err| ReconcileError::from(anyhow!(err)))?;
    Ok(())
}
