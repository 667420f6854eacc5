// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owns the single active strategy and its cancellation token.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::forward::Forwarder;
use crate::model::WorkerConfig;
use crate::strategy::nats::{NatsConfig, NatsStrategy};
use crate::strategy::poller::{Poller, PollerConfig};
use crate::strategy::redis::{RedisConfig, RedisStrategy};
use crate::strategy::{Strategy, StrategyKind};

/// Settings for every strategy; only the selected one is used.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Strategy-name token (`poller`, `redis`, `nats`).
    pub strategy: String,
    pub poller: PollerConfig,
    pub redis: RedisConfig,
    pub nats: NatsConfig,
}

/// Runs exactly one distribution strategy.
pub struct DistributionManager {
    strategy: Strategy,
    shutdown: CancellationToken,
}

impl DistributionManager {
    /// Build the strategy named by `config.strategy`. Construction failures
    /// are returned as-is; there is no fallback strategy.
    pub async fn new(config: &ManagerConfig, forwarder: Arc<dyn Forwarder>) -> anyhow::Result<Self> {
        let kind: StrategyKind = config.strategy.parse()?;
        let strategy = match kind {
            StrategyKind::Poller => Strategy::Poller(Poller::new(config.poller.clone(), forwarder)?),
            StrategyKind::Redis => {
                Strategy::Redis(RedisStrategy::connect(&config.redis, forwarder).await?)
            }
            StrategyKind::Nats => Strategy::Nats(NatsStrategy::connect(&config.nats, forwarder).await?),
        };
        tracing::info!(strategy = %kind, "distribution strategy selected");
        Ok(Self::from_strategy(strategy))
    }

    pub fn from_strategy(strategy: Strategy) -> Self {
        Self { strategy, shutdown: CancellationToken::new() }
    }

    /// Run the strategy until [`stop`](Self::stop) is called or it fails.
    pub async fn start(&self) -> anyhow::Result<()> {
        self.strategy.start(self.shutdown.clone()).await
    }

    /// Cancel the shared token and release the strategy's resources.
    /// Safe to call more than once.
    pub async fn stop(&self) -> anyhow::Result<()> {
        if !self.shutdown.is_cancelled() {
            tracing::info!(strategy = %self.kind(), "stopping distribution manager");
        }
        self.shutdown.cancel();
        self.strategy.stop().await
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub async fn last_version(&self) -> Option<String> {
        self.strategy.last_version().await
    }

    pub async fn last_config(&self) -> Option<WorkerConfig> {
        self.strategy.last_config().await
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
