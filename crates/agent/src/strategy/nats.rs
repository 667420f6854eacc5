// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NATS subject strategy.
//!
//! Joins a queue group on the configured subject so that, within a group,
//! each published update is delivered to one member. The client reconnects
//! and restores the subscription on its own; connection events are logged.
//! Redeliveries of an already adopted version are dropped by [`PushState`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::PushState;
use crate::error::ErrorCode;
use crate::forward::Forwarder;
use crate::model::{NatsConfigMessage, WorkerConfig};

pub const DEFAULT_SUBJECT: &str = "config.worker.update";
pub const DEFAULT_QUEUE_GROUP: &str = "config-workers";

/// Upper bound on the drain done while stopping.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// NATS connection and subscription settings.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub urls: Vec<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub require_tls: bool,
    pub max_reconnects: usize,
    pub reconnect_wait: Duration,
    pub connection_name: String,
    pub subject: String,
    pub queue_group: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: vec!["nats://127.0.0.1:4222".to_owned()],
            token: None,
            username: None,
            password: None,
            require_tls: false,
            max_reconnects: 60,
            reconnect_wait: Duration::from_secs(2),
            connection_name: format!("cfgsync-agent-{}", uuid::Uuid::new_v4()),
            subject: DEFAULT_SUBJECT.to_owned(),
            queue_group: DEFAULT_QUEUE_GROUP.to_owned(),
        }
    }
}

impl NatsConfig {
    /// Subject, falling back to the default when blank.
    pub fn subject(&self) -> &str {
        non_blank(&self.subject).unwrap_or(DEFAULT_SUBJECT)
    }

    /// Queue group, falling back to the default when blank.
    pub fn queue_group(&self) -> &str {
        non_blank(&self.queue_group).unwrap_or(DEFAULT_QUEUE_GROUP)
    }

    fn connect_options(&self) -> async_nats::ConnectOptions {
        let mut opts = match (&self.token, &self.username, &self.password) {
            (Some(token), _, _) if !token.is_empty() => {
                async_nats::ConnectOptions::with_token(token.clone())
            }
            (_, Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                async_nats::ConnectOptions::with_user_and_password(user.clone(), pass.clone())
            }
            _ => async_nats::ConnectOptions::new(),
        };

        let wait = self.reconnect_wait;
        opts = opts
            .name(self.connection_name.clone())
            .max_reconnects(Some(self.max_reconnects))
            .reconnect_delay_callback(move |_attempts| wait)
            .require_tls(self.require_tls)
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Disconnected => tracing::warn!("NATS disconnected"),
                    async_nats::Event::Connected => tracing::info!("NATS reconnected"),
                    async_nats::Event::Closed => tracing::warn!("NATS connection closed"),
                    other => tracing::debug!(event = %other, "NATS connection event"),
                }
            });
        opts
    }
}

fn non_blank(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

/// NATS queue-group distribution strategy.
pub struct NatsStrategy {
    client: async_nats::Client,
    subject: String,
    queue_group: String,
    state: PushState,
    cancel: CancellationToken,
}

impl NatsStrategy {
    /// Connect to the server. Fails fast: no retry on the initial connect.
    pub async fn connect(config: &NatsConfig, forwarder: Arc<dyn Forwarder>) -> anyhow::Result<Self> {
        let servers = config.urls.join(",");
        let client = config
            .connect_options()
            .connect(servers.as_str())
            .await
            .map_err(|e| ErrorCode::Construction.err(format!("failed to connect to NATS: {e}")))?;

        tracing::info!(servers = %servers, name = %config.connection_name, "NATS client connected");
        Ok(Self {
            client,
            subject: config.subject().to_owned(),
            queue_group: config.queue_group().to_owned(),
            state: PushState::new("nats", forwarder),
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe and handle messages until cancelled. The subscription
    /// ending on its own is a `Transport` error.
    pub async fn start(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        tracing::info!("starting NATS pub/sub distribution strategy");

        let mut sub = self
            .client
            .queue_subscribe(self.subject.clone(), self.queue_group.clone())
            .await
            .map_err(|e| {
                ErrorCode::Transport
                    .err(format!("failed to subscribe to NATS subject {}: {e}", self.subject))
            })?;
        tracing::info!(subject = %self.subject, queue = %self.queue_group, "NATS subscriber started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.cancel.cancelled() => break,
                msg = sub.next() => {
                    let Some(msg) = msg else {
                        return self.subscription_ended(&shutdown);
                    };
                    if shutdown.is_cancelled() || self.cancel.is_cancelled() {
                        break;
                    }
                    self.handle_message(&msg.payload).await;
                }
            }
        }

        if let Err(e) = sub.unsubscribe().await {
            tracing::warn!(err = %e, "failed to unsubscribe from NATS");
        }
        tracing::info!("NATS subscriber shutting down");
        Ok(())
    }

    /// Outcome of the message stream closing. Expected while stopping, fatal
    /// otherwise.
    fn subscription_ended(&self, shutdown: &CancellationToken) -> anyhow::Result<()> {
        if shutdown.is_cancelled() || self.cancel.is_cancelled() {
            tracing::info!("NATS subscriber shutting down");
            return Ok(());
        }
        tracing::error!("NATS subscription closed");
        Err(ErrorCode::Transport.err("NATS subscription closed").into())
    }

    /// Decode one payload and offer it for adoption. Malformed payloads are
    /// logged and dropped.
    pub async fn handle_message(&self, payload: &[u8]) -> bool {
        tracing::debug!(payload = %String::from_utf8_lossy(payload), "received NATS message");
        let msg: NatsConfigMessage = match serde_json::from_slice(payload) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(err = %e, "failed to decode NATS config message");
                return false;
            }
        };
        self.state.offer(msg.version, msg.config).await
    }

    /// Cancel the subscriber, then drain and close the connection. Idempotent.
    pub async fn stop(&self) -> anyhow::Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        tracing::info!("stopping NATS distributor");
        self.cancel.cancel();
        match tokio::time::timeout(DRAIN_TIMEOUT, self.client.drain()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(err = %e, "NATS drain on stop failed"),
            Err(_) => tracing::debug!("NATS drain on stop timed out"),
        }
        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }

    pub async fn last_version(&self) -> Option<String> {
        self.state.last_version().await
    }

    pub async fn last_config(&self) -> Option<WorkerConfig> {
        self.state.last_config().await
    }

    /// Build a strategy around a client that keeps retrying in the
    /// background, for exercising message handling without a server.
    #[cfg(test)]
    pub(crate) async fn detached(forwarder: Arc<dyn Forwarder>) -> anyhow::Result<Self> {
        let client = async_nats::ConnectOptions::new()
            .retry_on_initial_connect()
            .connect("nats://127.0.0.1:1")
            .await?;
        Ok(Self {
            client,
            subject: DEFAULT_SUBJECT.to_owned(),
            queue_group: DEFAULT_QUEUE_GROUP.to_owned(),
            state: PushState::new("nats", forwarder),
            cancel: CancellationToken::new(),
        })
    }
}

#[cfg(test)]
#[path = "nats_tests.rs"]
mod tests;
