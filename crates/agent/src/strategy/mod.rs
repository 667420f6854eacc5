// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Distribution strategies: how a configuration change reaches this agent.
//!
//! Exactly one strategy runs per process:
//! - `poller` → conditional HTTP fetch on a timer, with backoff and a disk cache
//! - `redis` → broadcast channel on a Redis pub/sub bus
//! - `nats` → queue-group subscription on a NATS subject

pub mod nats;
pub mod poller;
pub mod redis;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{DistError, ErrorCode};
use crate::forward::Forwarder;
use crate::model::WorkerConfig;

use self::nats::NatsStrategy;
use self::poller::Poller;
use self::redis::RedisStrategy;

/// Strategy-name token selecting the active transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Poller,
    Redis,
    Nats,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poller => "poller",
            Self::Redis => "redis",
            Self::Nats => "nats",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = DistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poller" | "poll" | "http" => Ok(Self::Poller),
            "redis" => Ok(Self::Redis),
            "nats" => Ok(Self::Nats),
            other => Err(ErrorCode::Unsupported
                .err(format!("unsupported distribution strategy: {other:?}"))),
        }
    }
}

/// The single active strategy.
pub enum Strategy {
    Poller(Poller),
    Redis(RedisStrategy),
    Nats(NatsStrategy),
}

impl Strategy {
    /// Run until `shutdown` fires, [`stop`](Self::stop) is called, or the
    /// strategy fails.
    pub async fn start(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        match self {
            Self::Poller(p) => p.start(shutdown).await,
            Self::Redis(r) => r.start(shutdown).await,
            Self::Nats(n) => n.start(shutdown).await,
        }
    }

    /// Release owned connections and subscriptions. Idempotent.
    pub async fn stop(&self) -> anyhow::Result<()> {
        match self {
            Self::Poller(p) => p.stop(),
            Self::Redis(r) => r.stop(),
            Self::Nats(n) => n.stop().await,
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Poller(_) => StrategyKind::Poller,
            Self::Redis(_) => StrategyKind::Redis,
            Self::Nats(_) => StrategyKind::Nats,
        }
    }

    /// Version token of the last adopted configuration, rendered as a string.
    pub async fn last_version(&self) -> Option<String> {
        match self {
            Self::Poller(p) => p.last_version().await.map(|v| v.to_string()),
            Self::Redis(r) => r.last_version().await,
            Self::Nats(n) => n.last_version().await,
        }
    }

    pub async fn last_config(&self) -> Option<WorkerConfig> {
        match self {
            Self::Poller(p) => p.last_config().await,
            Self::Redis(r) => r.last_config().await,
            Self::Nats(n) => n.last_config().await,
        }
    }
}

#[derive(Debug, Clone)]
struct Adopted {
    version: String,
    config: WorkerConfig,
}

/// Dedup state for push strategies.
///
/// Adoption holds the write lock across the forward so messages are applied
/// in arrival order; status queries take the read lock.
pub struct PushState {
    source: &'static str,
    forwarder: Arc<dyn Forwarder>,
    last: RwLock<Option<Adopted>>,
}

impl PushState {
    pub fn new(source: &'static str, forwarder: Arc<dyn Forwarder>) -> Self {
        Self { source, forwarder, last: RwLock::new(None) }
    }

    /// Adopt `config` unless `version` equals the last adopted token.
    ///
    /// Returns `true` when adopted. A forward failure is logged and does not
    /// roll the version back.
    pub async fn offer(&self, version: String, config: WorkerConfig) -> bool {
        let mut last = self.last.write().await;
        if last.as_ref().is_some_and(|a| a.version == version) {
            tracing::debug!(source = self.source, %version, "duplicate config ignored");
            return false;
        }

        tracing::info!(source = self.source, %version, "received new config");
        *last = Some(Adopted { version: version.clone(), config: config.clone() });

        match self.forwarder.forward(&config).await {
            Ok(()) => tracing::info!(source = self.source, %version, "forwarded config to worker"),
            Err(e) => {
                tracing::error!(source = self.source, %version, err = %e, "failed to forward config")
            }
        }
        true
    }

    pub async fn last_version(&self) -> Option<String> {
        self.last.read().await.as_ref().map(|a| a.version.clone())
    }

    pub async fn last_config(&self) -> Option<WorkerConfig> {
        self.last.read().await.as_ref().map(|a| a.config.clone())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
