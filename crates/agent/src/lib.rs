// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! cfgsync: keeps a local worker's configuration in sync with a controller.
//!
//! The agent registers with the controller, then runs one distribution
//! strategy (HTTP polling, Redis pub/sub, or a NATS queue group). Every new
//! configuration version is forwarded to the worker's `POST /config`.

pub mod backoff;
pub mod cache;
pub mod config;
pub mod error;
pub mod forward;
pub mod manager;
pub mod model;
pub mod register;
pub mod strategy;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::forward::ExecutorClient;
use crate::manager::DistributionManager;

/// Run the agent until SIGINT or SIGTERM.
pub async fn run(config: AgentConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());
    run_until(config, shutdown).await
}

/// Run the agent until `shutdown` fires or the strategy fails.
pub async fn run_until(config: AgentConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let mut manager_config = config.manager_config();

    if config.skip_register {
        tracing::info!("registration skipped");
    } else {
        let reply = config.registration().register().await.context("registration failed")?;
        if reply.poll_interval_seconds > 0 {
            manager_config.poller.poll_interval =
                Duration::from_secs(reply.poll_interval_seconds.unsigned_abs());
        }
    }

    let forwarder = Arc::new(ExecutorClient::new(config.worker_url.as_str())?);
    let manager = Arc::new(
        DistributionManager::new(&manager_config, forwarder)
            .await
            .context("failed to create distribution manager")?,
    );
    tracing::info!(
        strategy = %manager.kind(),
        controller = %config.controller_url,
        worker = %config.worker_url,
        "agent started"
    );

    let mut task = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start().await })
    };

    let result = tokio::select! {
        _ = shutdown.cancelled() => None,
        r = &mut task => Some(r),
    };

    manager.stop().await?;
    let result = match result {
        Some(r) => r,
        None => task.await,
    };
    result.context("distribution task panicked")??;

    tracing::info!("agent stopped");
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
