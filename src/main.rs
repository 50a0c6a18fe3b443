// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

use anyhow::Result;
use futures::StreamExt;
use helmsman::{
    constants::{DEFAULT_THREADINESS, TOKIO_WORKER_THREADS},
    context::{ClusterClientset, Context, Stores},
    controller,
    crd::{CapacityTarget, InstallationTarget, Release, TrafficTarget},
    traffic,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::{reflector, watcher};
use kube::{Api, Client};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("helmsman-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Initialize logging with custom format
///
/// Respects `RUST_LOG` environment variable if set, otherwise defaults to INFO level.
/// Respects `RUST_LOG_FORMAT` environment variable for output format (json or text).
fn initialize_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting Helmsman rollout controller");
}

/// Number of concurrent reconcile workers, from `HELMSMAN_THREADINESS`.
fn load_threadiness() -> usize {
    std::env::var("HELMSMAN_THREADINESS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_THREADINESS)
}

/// Build clients for the target workload clusters.
///
/// `HELMSMAN_TARGET_CLUSTERS` is a comma-separated list of kubeconfig
/// context names; each becomes a named cluster client. An empty list is
/// valid (strategy-only operation) but traffic cannot shift anywhere.
async fn build_cluster_clientset() -> Result<ClusterClientset> {
    let raw = std::env::var("HELMSMAN_TARGET_CLUSTERS").unwrap_or_default();
    let names: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if names.is_empty() {
        warn!("HELMSMAN_TARGET_CLUSTERS is empty - no traffic can be shifted");
        return Ok(ClusterClientset::default());
    }

    let kubeconfig = Kubeconfig::read()?;
    let mut clients = HashMap::new();
    for name in names {
        let options = KubeConfigOptions {
            context: Some(name.to_string()),
            ..Default::default()
        };
        let config = kube::Config::from_custom_kubeconfig(kubeconfig.clone(), &options).await?;
        clients.insert(name.to_string(), Client::try_from(config)?);
        debug!(cluster = name, "target cluster client initialized");
    }

    let clientset = ClusterClientset::new(clients);
    info!(
        clusters = ?clientset.cluster_names(),
        "target cluster clientset ready"
    );
    Ok(clientset)
}

/// Initialize reflectors for all CRD types and create the shared context.
///
/// Each reflector spawns a background task that watches its resource type
/// and updates the corresponding store. The stores are then made available
/// to both controllers through the shared context.
fn initialize_shared_context(client: Client, clusters: ClusterClientset) -> Arc<Context> {
    info!("Initializing reflectors for all CRD types");

    let releases_api = Api::<Release>::all(client.clone());
    let installation_targets_api = Api::<InstallationTarget>::all(client.clone());
    let capacity_targets_api = Api::<CapacityTarget>::all(client.clone());
    let traffic_targets_api = Api::<TrafficTarget>::all(client.clone());

    let (releases_store, releases_writer) = reflector::store();
    let (installation_targets_store, installation_targets_writer) = reflector::store();
    let (capacity_targets_store, capacity_targets_writer) = reflector::store();
    let (traffic_targets_store, traffic_targets_writer) = reflector::store();

    tokio::spawn(async move {
        let stream = watcher(releases_api, watcher::Config::default());
        reflector::reflector(releases_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("Release reflector stream ended");
    });

    tokio::spawn(async move {
        let stream = watcher(installation_targets_api, watcher::Config::default());
        reflector::reflector(installation_targets_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("InstallationTarget reflector stream ended");
    });

    tokio::spawn(async move {
        let stream = watcher(capacity_targets_api, watcher::Config::default());
        reflector::reflector(capacity_targets_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("CapacityTarget reflector stream ended");
    });

    tokio::spawn(async move {
        let stream = watcher(traffic_targets_api, watcher::Config::default());
        reflector::reflector(traffic_targets_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("TrafficTarget reflector stream ended");
    });

    let stores = Stores {
        releases: releases_store,
        installation_targets: installation_targets_store,
        capacity_targets: capacity_targets_store,
        traffic_targets: traffic_targets_store,
    };

    Arc::new(Context {
        client,
        stores,
        clusters,
    })
}

/// Run both controllers until one fails or a shutdown signal arrives.
async fn run_controllers(context: Arc<Context>, threadiness: usize) -> Result<()> {
    tokio::try_join!(
        controller::run(context.clone(), threadiness),
        traffic::run(context),
    )?;
    Ok(())
}

async fn async_main() -> Result<()> {
    initialize_logging();

    let config = kube::Config::infer().await?;
    let client = Client::try_from(config)?;
    info!("Kubernetes client initialized");

    let clusters = build_cluster_clientset().await?;
    let context = initialize_shared_context(client, clusters);
    let threadiness = load_threadiness();

    let shutdown_result: Result<()> = tokio::select! {
        // Monitor for SIGINT (Ctrl+C)
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            result.map_err(anyhow::Error::from)
        }

        // Monitor for SIGTERM (Kubernetes sends this when deleting pods)
        result = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                sigterm.recv().await;
                Ok::<(), anyhow::Error>(())
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
                Ok::<(), anyhow::Error>(())
            }
        } => {
            info!("Received SIGTERM (pod termination), initiating graceful shutdown...");
            result
        }

        result = run_controllers(context, threadiness) => {
            result
        }
    };

    shutdown_result?;
    info!("Graceful shutdown completed successfully");

    Ok(())
}
