// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Error types for the rollout controller.
//!
//! Errors are grouped by the subsystem that produces them. The taxonomy
//! distinguishes configuration errors (which are surfaced as conditions on the
//! offending object and not retried until its spec changes) from transient
//! errors (which re-enter the work queue with backoff). Per-pod patch failures
//! are collected and degrade the traffic sync instead of aborting it.

use thiserror::Error;

/// Errors from the target object resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A release must own exactly one sibling of each target kind.
    #[error("expected exactly one {kind} matching selector {selector:?}, found {count}")]
    UnexpectedObjectCountFromSelector {
        kind: &'static str,
        selector: String,
        count: usize,
    },
}

/// Errors from weight derivation and pod label shifting.
#[derive(Debug, Error)]
pub enum TrafficError {
    /// Every `TrafficTarget` must carry a release label.
    #[error("TrafficTarget {name:?} carries no release label")]
    MissingReleaseLabel { name: String },

    /// A release may be referenced by at most one `TrafficTarget`.
    #[error("release {release:?} is referenced by both TrafficTarget {first:?} and {second:?}")]
    DuplicateTrafficTarget {
        release: String,
        first: String,
        second: String,
    },

    /// No service in the namespace carries the app label and the production LB label.
    #[error("no production load-balancer service found for app {app:?} in {namespace:?}")]
    MissingProductionService { app: String, namespace: String },

    /// More than one service claims the production LB role.
    #[error("found {count} production load-balancer services for app {app:?} in {namespace:?}")]
    MultipleProductionServices {
        app: String,
        namespace: String,
        count: usize,
    },

    /// The release owns fewer idle pods than the split needs to enable.
    #[error("release {release:?} needs {missing} more traffic pods but only {idle} idle pods exist")]
    FleetShortOfPods {
        release: String,
        missing: usize,
        idle: usize,
    },

    /// A single pod patch failed; the sync continues with the other pods.
    #[error("failed to patch pod {pod:?}")]
    PodPatchFailed {
        pod: String,
        #[source]
        source: kube::Error,
    },

    /// A declared cluster has no client configured.
    #[error("no client configured for target cluster {cluster:?}")]
    UnknownCluster { cluster: String },
}

impl TrafficError {
    /// Configuration errors are not retried until the offending spec changes.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TrafficError::MissingReleaseLabel { .. }
                | TrafficError::DuplicateTrafficTarget { .. }
                | TrafficError::UnknownCluster { .. }
        )
    }
}

/// Errors from the strategy executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// A release with no strategy steps cannot be rolled out.
    #[error("release {release:?} declares an empty strategy")]
    EmptyStrategy { release: String },
}

/// Errors from the dynamic patch dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// API discovery does not list the requested kind. May be a warm-up race.
    #[error("discovery lists no resource for kind {kind:?}")]
    ResourceNotFound { kind: String },

    /// The patch bytes are not a JSON document.
    #[error("patch bytes are not valid JSON")]
    InvalidPatch(#[from] serde_json::Error),

    /// The API server rejected the patch.
    #[error(transparent)]
    Api(#[from] kube::Error),
}

/// Determine if an HTTP status code from the API server is transient.
///
/// Conflicts (409), rate limiting (429) and server errors (5xx) are
/// retryable; other client errors are not.
#[must_use]
pub fn is_retryable_status(code: u16) -> bool {
    code == 409 || code == 429 || (500..600).contains(&code)
}

/// Determine if a Kubernetes API error is transient.
///
/// Connection failures and retryable status codes (see
/// [`is_retryable_status`]) re-enter the queue with backoff; other client
/// errors are not retried.
#[must_use]
pub fn is_retryable_api_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(api_err) => is_retryable_status(api_err.code),
        kube::Error::Service(_) => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
