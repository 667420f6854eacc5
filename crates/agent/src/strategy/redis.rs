// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis pub/sub strategy.
//!
//! Subscribes to the `config:global` broadcast channel. Delivery is
//! at-least-once, so repeated versions are dropped by [`PushState`]. When the
//! pub/sub connection drops, the subscriber reconnects and resubscribes after
//! a short pause.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::PushState;
use crate::error::ErrorCode;
use crate::forward::Forwarder;
use crate::model::{RedisConfigMessage, WorkerConfig};

/// Channel the controller publishes configuration changes on.
pub const GLOBAL_CONFIG_CHANNEL: &str = "config:global";

/// Pause between resubscription attempts.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// `host:port`.
    pub address: String,
    pub password: Option<String>,
    pub db: i64,
}

impl RedisConfig {
    /// Connection URL in the form the `redis` crate accepts.
    pub fn url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!("redis://:{password}@{}/{}", self.address, self.db),
            None => format!("redis://{}/{}", self.address, self.db),
        }
    }
}

/// Redis pub/sub distribution strategy.
pub struct RedisStrategy {
    client: ::redis::Client,
    state: PushState,
    cancel: CancellationToken,
}

impl RedisStrategy {
    /// Open a client and verify the server answers `PING`.
    pub async fn connect(config: &RedisConfig, forwarder: Arc<dyn Forwarder>) -> anyhow::Result<Self> {
        let client = ::redis::Client::open(config.url())
            .map_err(|e| ErrorCode::Construction.err(format!("invalid Redis address: {e}")))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ErrorCode::Construction.err(format!("failed to connect to Redis: {e}")))?;
        let _: String = ::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| ErrorCode::Construction.err(format!("Redis ping failed: {e}")))?;

        tracing::info!(address = %config.address, db = config.db, "connected to Redis");
        Ok(Self { client, state: PushState::new("redis", forwarder), cancel: CancellationToken::new() })
    }

    /// Subscribe and handle messages until cancelled.
    pub async fn start(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(channel = GLOBAL_CONFIG_CHANNEL, "starting Redis pub/sub distribution strategy");

        loop {
            match self.subscribe_once(&shutdown).await {
                Ok(true) => break,
                Ok(false) => tracing::warn!("Redis subscription closed, resubscribing"),
                Err(e) => tracing::error!(err = %e, "Redis subscription failed, resubscribing"),
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            }
        }

        tracing::info!("Redis subscriber shutting down");
        Ok(())
    }

    /// Run one subscription. `Ok(true)` on cancellation, `Ok(false)` when the
    /// server closed the stream.
    async fn subscribe_once(&self, shutdown: &CancellationToken) -> anyhow::Result<bool> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(GLOBAL_CONFIG_CHANNEL).await?;
        tracing::info!(channel = GLOBAL_CONFIG_CHANNEL, "Redis config subscriber started");

        let mut stream = pubsub.on_message();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(true),
                _ = self.cancel.cancelled() => return Ok(true),
                msg = stream.next() => {
                    let Some(msg) = msg else { return Ok(false) };
                    // A message racing a stop must not be applied.
                    if shutdown.is_cancelled() || self.cancel.is_cancelled() {
                        return Ok(true);
                    }
                    self.handle_message(msg.get_payload_bytes()).await;
                }
            }
        }
    }

    /// Decode one payload and offer it for adoption. Malformed payloads are
    /// logged and dropped.
    pub async fn handle_message(&self, payload: &[u8]) -> bool {
        let msg: RedisConfigMessage = match serde_json::from_slice(payload) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(err = %e, "failed to decode Redis config message");
                return false;
            }
        };
        tracing::debug!(version = %msg.version, timestamp = ?msg.timestamp, "Redis config message");
        self.state.offer(msg.version, msg.config).await
    }

    /// Cancel the subscriber. The pub/sub connection closes when its task
    /// unwinds. Idempotent.
    pub fn stop(&self) -> anyhow::Result<()> {
        if !self.cancel.is_cancelled() {
            tracing::info!("stopping Redis distributor");
        }
        self.cancel.cancel();
        Ok(())
    }

    pub async fn last_version(&self) -> Option<String> {
        self.state.last_version().await
    }

    pub async fn last_config(&self) -> Option<WorkerConfig> {
        self.state.last_config().await
    }

    /// Build a strategy around an unconnected client, for exercising message
    /// handling without a server.
    #[cfg(test)]
    pub(crate) fn detached(forwarder: Arc<dyn Forwarder>) -> anyhow::Result<Self> {
        let client = ::redis::Client::open("redis://127.0.0.1:1/0")?;
        Ok(Self { client, state: PushState::new("redis", forwarder), cancel: CancellationToken::new() })
    }
}

#[cfg(test)]
#[path = "redis_tests.rs"]
mod tests;
