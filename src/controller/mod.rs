// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! The strategy reconciliation loop.
//!
//! A single rate-limited queue of `namespace/releaseName` keys, fed by four
//! event sources: the `Release` kind itself plus its three sibling target
//! kinds, each mapped back to the owning release by name. The kube runtime
//! scheduler deduplicates pending keys and guarantees at most one in-flight
//! reconcile per key; `threadiness` bounds the concurrent workers.
//!
//! Each reconcile re-reads the world from the reflector stores, hands fresh
//! snapshots to the strategy executor, and applies the resulting patches
//! through the dynamic dispatcher. Transient failures re-enter the queue
//! with per-key exponential backoff; sibling resolution failures surface as
//! a condition on the release and wait for the next spec change; a panic in
//! one item degrades to a reconcile error instead of killing the worker.

pub mod backoff;

use crate::conditions::{get_condition, new_condition, set_condition};
use crate::constants::{
    CONDITION_TYPE_SIBLINGS_RESOLVED, FIELD_MANAGER, PHASE_INSTALLED, PHASE_WAITING_FOR_COMMAND,
    PHASE_WAITING_FOR_STRATEGY, REASON_RESOLVED, REASON_SIBLING_RESOLUTION_FAILED, STATUS_FALSE,
    STATUS_TRUE,
};
use crate::context::{object_key, Context};
use crate::crd::{
    CapacityTarget, Condition, InstallationTarget, Release, ReleasePointers, TrafficTarget,
};
use crate::dispatcher;
use crate::errors::{is_retryable_api_error, DispatchError, ResolveError};
use crate::executor::StrategyExecutor;
use crate::resolver::release_info;
use anyhow::anyhow;
use backoff::ItemBackoff;
use futures::{FutureExt, StreamExt};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Resource, ResourceExt};
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Reconciliation error wrapper
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ReconcileError(#[from] anyhow::Error);

type CtrlContext = (Arc<Context>, Arc<ItemBackoff>);

/// Whether a release phase is one the strategy executor acts on.
#[must_use]
pub fn is_working_on_strategy(phase: &str) -> bool {
    phase == PHASE_WAITING_FOR_COMMAND || phase == PHASE_WAITING_FOR_STRATEGY
}

/// Map a sibling target object to the release owning it.
///
/// Siblings share the release's name and namespace, so the work-queue key
/// for any sibling is always the release key.
pub fn sibling_release<K>(sibling: &K) -> Option<ObjectRef<Release>>
where
    K: Resource<DynamicType = ()>,
{
    let namespace = sibling.meta().namespace.as_deref()?;
    let name = sibling.meta().name.as_deref()?;
    Some(ObjectRef::new(name).within(namespace))
}

/// Run the strategy controller until the stream ends or shutdown.
///
/// # Errors
///
/// Returns an error if the controller fails to start.
pub async fn run(ctx: Arc<Context>, threadiness: usize) -> anyhow::Result<()> {
    info!(threadiness, "Starting strategy controller");

    let client = ctx.client.clone();
    let releases = Api::<Release>::all(client.clone());
    let installation_targets = Api::<InstallationTarget>::all(client.clone());
    let capacity_targets = Api::<CapacityTarget>::all(client.clone());
    let traffic_targets = Api::<TrafficTarget>::all(client);

    // Watch all changes including status updates: sibling convergence is
    // status-only and must still wake the owning release.
    let watcher_config = WatcherConfig::default();
    let ctrl_ctx: Arc<CtrlContext> = Arc::new((ctx, Arc::new(ItemBackoff::default())));

    Controller::new(releases, watcher_config.clone())
        .with_config(controller::Config::default().concurrency(threadiness as u16))
        .watches(installation_targets, watcher_config.clone(), |target| {
            sibling_release(&target)
        })
        .watches(capacity_targets, watcher_config.clone(), |target| {
            sibling_release(&target)
        })
        .watches(traffic_targets, watcher_config, |target| {
            sibling_release(&target)
        })
        .run(reconcile_release, error_policy, ctrl_ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

#[allow(clippy::needless_pass_by_value)] // Signature required by kube::runtime::Controller
fn error_policy(release: Arc<Release>, err: &ReconcileError, ctx: Arc<CtrlContext>) -> Action {
    let key = object_key(&release.namespace().unwrap_or_default(), &release.name_any());
    let delay = ctx.1.next_delay(&key);
    error!(
        release = %key,
        error = %err,
        "Reconciliation error - will retry in {:?}",
        delay
    );
    Action::requeue(delay)
}

/// Top-level reconcile: contains panics and resets the key's backoff on
/// success.
async fn reconcile_release(
    release: Arc<Release>,
    ctx: Arc<CtrlContext>,
) -> Result<Action, ReconcileError> {
    let key = object_key(&release.namespace().unwrap_or_default(), &release.name_any());
    let (ctx, backoff) = &*ctx;

    let result = AssertUnwindSafe(reconcile_inner(release, ctx.clone()))
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
            Err(ReconcileError(anyhow!(
                "reconcile of {key} panicked: {message}"
            )))
        }
    }
}

async fn reconcile_inner(
    release: Arc<Release>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let namespace = release.namespace().unwrap_or_default();

    // Mutations on a completed release indicate the successor is mid-rollout:
    // redirect the key to the contender.
    let subject: Arc<Release> = if release.phase() == PHASE_INSTALLED {
        match release
            .contender_of()
            .and_then(|contender| ctx.stores.get_release(&namespace, contender))
        {
            Some(contender) => contender,
            None => return Ok(Action::await_change()),
        }
    } else {
        release
    };

    if !is_working_on_strategy(subject.phase()) {
        debug!(
            release = %subject.name_any(),
            phase = %subject.phase(),
            "release is not working on strategy, skipping"
        );
        return Ok(Action::await_change());
    }

    // A missing or duplicated sibling is fixed by spec changes, and those
    // re-enqueue the release through the sibling watches: surface the
    // condition and wait instead of burning retries.
    let contender_info = match release_info(&ctx.stores, &subject) {
        Ok(info) => info,
        Err(err) => {
            surface_resolution_failure(&ctx.client, &subject, &err).await?;
            return Ok(Action::await_change());
        }
    };
    clear_resolution_failure(&ctx.client, &subject).await?;

    // A dangling incumbent pointer means no incumbent; an incumbent whose
    // siblings are missing surfaces like any other resolution failure.
    let incumbent_info = match subject
        .incumbent_of()
        .and_then(|incumbent| ctx.stores.get_release(&namespace, incumbent))
    {
        Some(incumbent) => match release_info(&ctx.stores, &incumbent) {
            Ok(info) => Some(info),
            Err(err) => {
                surface_resolution_failure(&ctx.client, &subject, &err).await?;
                return Ok(Action::await_change());
            }
        },
        None => None,
    };

    let executor = StrategyExecutor::new(&contender_info, incumbent_info.as_ref());
    let patches = executor
        .execute()
        .map_err(|err| ReconcileError(err.into()))?;

    debug!(
        release = %subject.name_any(),
        patches = patches.len(),
        "strategy executor finished"
    );

    for patch in &patches {
        if let Err(err) = dispatcher::dispatch(&ctx.client, &namespace, patch).await {
            // Transient errors and discovery misses re-enqueue with backoff;
            // a rejected patch waits for the next event's level re-check.
            if let DispatchError::Api(api_err) = &err {
                if !is_retryable_api_error(api_err) {
                    error!(
                        release = %subject.name_any(),
                        patch = %patch.name(),
                        error = %err,
                        "patch rejected by the API server, waiting for next change"
                    );
                    return Ok(Action::await_change());
                }
            }
            return Err(ReconcileError(err.into()));
        }
    }

    Ok(Action::await_change())
}

/// Record a sibling resolution failure as a condition on the release.
async fn surface_resolution_failure(
    client: &kube::Client,
    release: &Release,
    err: &ResolveError,
) -> Result<(), ReconcileError> {
    let condition = new_condition(
        CONDITION_TYPE_SIBLINGS_RESOLVED,
        STATUS_FALSE,
        REASON_SIBLING_RESOLUTION_FAILED,
        &err.to_string(),
    );
    patch_release_condition(client, release, condition).await
}

/// Clear a previously surfaced resolution failure once the triplet resolves.
async fn clear_resolution_failure(
    client: &kube::Client,
    release: &Release,
) -> Result<(), ReconcileError> {
    let conditions = release
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();
    if !get_condition(conditions, CONDITION_TYPE_SIBLINGS_RESOLVED)
        .is_some_and(|c| c.status == STATUS_FALSE)
    {
        return Ok(());
    }
    let condition = new_condition(
        CONDITION_TYPE_SIBLINGS_RESOLVED,
        STATUS_TRUE,
        REASON_RESOLVED,
        "installation, capacity and traffic targets resolved",
    );
    patch_release_condition(client, release, condition).await
}

async fn patch_release_condition(
    client: &kube::Client,
    release: &Release,
    condition: Condition,
) -> Result<(), ReconcileError> {
    let mut conditions = release
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    if set_condition(&mut conditions, condition).is_none() {
        return Ok(());
    }

    let api: Api<Release> = Api::namespaced(
        client.clone(),
        &release.namespace().unwrap_or_default(),
    );
    api.patch_status(
        &release.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&json!({ "status": { "conditions": conditions } })),
    )
    .await
    .map_err(|err| ReconcileError(err.into()))?;
    Ok(())
}


#[cfg(test)]
#[path = "backoff_tests.rs"]
mod backoff_tests;
