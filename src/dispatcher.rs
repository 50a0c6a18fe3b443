// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Dynamic patch dispatch.
//!
//! The strategy executor emits typed patch values; this module resolves each
//! patch's group/version/kind against API discovery, obtains a dynamic
//! namespaced client for the resource, and submits the merge patch. Status
//! patches go through the status subresource; spec patches through the main
//! resource. A kind discovery cannot resolve surfaces as
//! [`DispatchError::ResourceNotFound`]; the caller re-enqueues, since the
//! miss may be a warm-up race.

use crate::constants::FIELD_MANAGER;
use crate::errors::DispatchError;
use crate::executor::patches::StrategyPatch;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::Client;
use tracing::debug;

/// Apply one executor patch to the management cluster.
///
/// # Errors
///
/// Returns [`DispatchError::ResourceNotFound`] when discovery does not list
/// the patch's kind, or the underlying API error otherwise.
pub async fn dispatch(
    client: &Client,
    namespace: &str,
    patch: &StrategyPatch,
) -> Result<(), DispatchError> {
    let gvk = patch.gvk();
    let (resource, _capabilities) = kube::discovery::pinned_kind(client, &gvk)
        .await
        .map_err(|err| match err {
            kube::Error::Discovery(_) => DispatchError::ResourceNotFound {
                kind: gvk.kind.clone(),
            },
            other => DispatchError::Api(other),
        })?;

    let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), namespace, &resource);
    let body: serde_json::Value = serde_json::from_slice(&patch.bytes()?)?;
    let params = PatchParams::apply(FIELD_MANAGER);

    debug!(
        kind = %gvk.kind,
        name = %patch.name(),
        namespace = %namespace,
        "dispatching patch"
    );

    match patch {
        StrategyPatch::ReleaseStatus(_) => {
            api.patch_status(patch.name(), &params, &Patch::Merge(&body))
                .await?;
        }
        StrategyPatch::CapacityTargetSpec(_) | StrategyPatch::TrafficTargetSpec(_) => {
            api.patch(patch.name(), &params, &Patch::Merge(&body)).await?;
        }
    }

    Ok(())
}
