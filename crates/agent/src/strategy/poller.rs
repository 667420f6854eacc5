// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pull strategy: conditional fetch from the controller on a timer.
//!
//! Each tick sends `GET /api/v1/config` with `If-None-Match: <version>`.
//! A `304` is a no-op; a `200` carrying a different version is forwarded to
//! the worker, recorded, then written to the disk cache. Failed fetches wait
//! out a jittered backoff before the loop resumes. The controller may change
//! the poll interval through `poll_interval_seconds`; the new value takes
//! effect when the next tick is scheduled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::IF_NONE_MATCH;
use reqwest::{Client, StatusCode};
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::cache;
use crate::error::ErrorCode;
use crate::forward::Forwarder;
use crate::model::{ConfigResponse, WorkerConfig};

/// Per-request timeout for controller fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest poll interval accepted from configuration, cache or controller.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings for the pull strategy.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub controller_url: String,
    pub username: String,
    pub password: Option<String>,
    pub cache_file: PathBuf,
    pub poll_interval: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub backoff_multiplier: f64,
}

impl PollerConfig {
    pub fn new(controller_url: impl Into<String>, cache_file: impl Into<PathBuf>) -> Self {
        Self {
            controller_url: controller_url.into(),
            username: String::new(),
            password: None,
            cache_file: cache_file.into(),
            poll_interval: Duration::from_secs(30),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

/// Result of one successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Controller answered `304 Not Modified`.
    Unchanged,
    /// Controller returned the version already adopted.
    Current,
    /// A new version was forwarded and recorded.
    Adopted(i64),
}

#[derive(Debug, Default)]
struct PullState {
    /// Zero until something is adopted.
    version: i64,
    config: Option<WorkerConfig>,
}

/// HTTP polling strategy.
pub struct Poller {
    config: PollerConfig,
    client: Client,
    forwarder: Arc<dyn Forwarder>,
    state: RwLock<PullState>,
    /// Single-slot interval side-channel. A newer value overwrites an
    /// unconsumed older one.
    interval_tx: watch::Sender<Duration>,
    /// Deadline of the pending tick while the loop runs.
    next_poll_tx: watch::Sender<Option<Instant>>,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(config: PollerConfig, forwarder: Arc<dyn Forwarder>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| ErrorCode::Construction.err(format!("failed to build HTTP client: {e}")))?;
        let interval = config.poll_interval.min(MAX_POLL_INTERVAL);
        let (interval_tx, _) = watch::channel(interval);
        let (next_poll_tx, _) = watch::channel(None);
        Ok(Self {
            config,
            client,
            forwarder,
            state: RwLock::new(PullState::default()),
            interval_tx,
            next_poll_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Current poll interval (including an update not yet picked up by the loop).
    pub fn poll_interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    /// Request a new poll interval. Applied when the next tick is scheduled;
    /// the tick already pending keeps its deadline. Zero is ignored and
    /// anything above [`MAX_POLL_INTERVAL`] is clamped to it.
    pub fn set_poll_interval(&self, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        let interval = interval.min(MAX_POLL_INTERVAL);
        self.interval_tx.send_if_modified(|current| {
            if *current == interval {
                return false;
            }
            *current = interval;
            true
        });
    }

    /// When the loop will fetch next. `None` before `start`.
    pub fn next_poll_at(&self) -> Option<Instant> {
        *self.next_poll_tx.borrow()
    }

    pub async fn last_version(&self) -> Option<i64> {
        let version = self.state.read().await.version;
        (version != 0).then_some(version)
    }

    pub async fn last_config(&self) -> Option<WorkerConfig> {
        self.state.read().await.config.clone()
    }

    /// Pre-seed the worker from the disk cache.
    ///
    /// Returns `Ok(false)` when there is no cache file. The cached version is
    /// only recorded once the worker has accepted the cached configuration.
    pub async fn load_cache(&self) -> anyhow::Result<bool> {
        let Some(record) = cache::load(&self.config.cache_file)? else {
            return Ok(false);
        };
        if record.poll_interval_seconds > 0 {
            self.set_poll_interval(Duration::from_secs(record.poll_interval_seconds.unsigned_abs()));
        }

        self.forwarder.forward(&record.data).await.map_err(|e| {
            ErrorCode::Forward.err(format!("failed to forward cached config: {e:#}"))
        })?;

        let mut state = self.state.write().await;
        state.version = record.version;
        state.config = Some(record.data);
        tracing::info!(version = record.version, "loaded cached config");
        Ok(true)
    }

    /// Perform one conditional fetch and adopt the result if it is new.
    pub async fn poll_once(&self) -> anyhow::Result<PollOutcome> {
        let current = self.state.read().await.version;

        let url = format!("{}/api/v1/config", self.config.controller_url.trim_end_matches('/'));
        let mut req = self.client.get(&url);
        if !self.config.username.is_empty() {
            req = req.basic_auth(&self.config.username, self.config.password.as_deref());
        }
        if current > 0 {
            req = req.header(IF_NONE_MATCH, current.to_string());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ErrorCode::Transport.err(format!("failed to fetch config: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_MODIFIED {
            tracing::debug!(version = current, "configuration unchanged");
            return Ok(PollOutcome::Unchanged);
        }
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(ErrorCode::Transport
                .err(format!("controller returned status {status}: {body}"))
                .into());
        }

        let body: ConfigResponse = resp
            .json()
            .await
            .map_err(|e| ErrorCode::Malformed.err(format!("failed to decode config: {e}")))?;

        // Applied before adoption so a rejected forward does not lose it.
        if body.poll_interval_seconds > 0 {
            self.set_poll_interval(Duration::from_secs(body.poll_interval_seconds.unsigned_abs()));
        }

        if body.version == current {
            return Ok(PollOutcome::Current);
        }
        tracing::info!(from = current, to = body.version, "configuration changed");
        self.adopt(&body).await?;
        Ok(PollOutcome::Adopted(body.version))
    }

    /// Forward first; only an accepted configuration advances the version.
    async fn adopt(&self, body: &ConfigResponse) -> anyhow::Result<()> {
        self.forwarder.forward(&body.data).await.map_err(|e| {
            ErrorCode::Forward.err(format!("failed to forward config to worker: {e:#}"))
        })?;

        {
            let mut state = self.state.write().await;
            state.version = body.version;
            state.config = Some(body.data.clone());
        }

        if let Err(e) = cache::save(&self.config.cache_file, body) {
            tracing::warn!(path = %self.config.cache_file.display(), err = %e, "failed to save cache");
        }
        Ok(())
    }

    /// Run the polling loop until `shutdown` fires or [`stop`](Self::stop)
    /// is called. The first fetch happens immediately.
    pub async fn start(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(controller = %self.config.controller_url, "starting HTTP polling distribution strategy");

        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = self.cancel.cancelled() => return Ok(()),
            loaded = self.load_cache() => {
                if let Err(e) = loaded {
                    tracing::warn!(err = %e, "failed to load cache");
                }
            }
        }

        let mut interval_rx = self.interval_tx.subscribe();
        let mut interval = *interval_rx.borrow_and_update();
        let mut backoff = Backoff::new(
            self.config.backoff_initial,
            self.config.backoff_max,
            self.config.backoff_multiplier,
        );
        let mut next_tick = Instant::now();
        self.next_poll_tx.send_replace(Some(next_tick));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.cancel.cancelled() => break,
                Ok(()) = interval_rx.changed() => {
                    interval = *interval_rx.borrow_and_update();
                    tracing::info!(?interval, "poll interval updated");
                    continue;
                }
                _ = tokio::time::sleep_until(next_tick) => {}
            }

            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.cancel.cancelled() => break,
                r = self.poll_once() => r,
            };

            match result {
                Ok(_) => backoff.reset(),
                Err(e) => {
                    let delay = backoff.next();
                    tracing::error!(err = %e, ?delay, "poll failed, backing off");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }

            if interval_rx.has_changed().unwrap_or(false) {
                interval = *interval_rx.borrow_and_update();
                tracing::info!(?interval, "poll interval updated");
            }
            let now = Instant::now();
            next_tick = next_tick
                .checked_add(interval)
                .unwrap_or_else(|| now + MAX_POLL_INTERVAL)
                .max(now);
            self.next_poll_tx.send_replace(Some(next_tick));
        }

        self.next_poll_tx.send_replace(None);
        tracing::info!("polling stopped");
        Ok(())
    }

    /// Stop the loop. Idempotent.
    pub fn stop(&self) -> anyhow::Result<()> {
        self.cancel.cancel();
        Ok(())
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
