// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::manager::ManagerConfig;
use crate::register::Registration;
use crate::strategy::nats::{NatsConfig, DEFAULT_QUEUE_GROUP, DEFAULT_SUBJECT};
use crate::strategy::poller::PollerConfig;
use crate::strategy::redis::RedisConfig;
use crate::strategy::StrategyKind;

/// Configuration distribution agent: keeps a local worker in sync with the
/// controller's configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "cfgsync-agent", version, about)]
pub struct AgentConfig {
    /// Controller base URL.
    #[arg(long, env = "CONTROLLER_URL", default_value = "http://localhost:8080")]
    pub controller_url: String,

    /// Basic-auth user for the controller.
    #[arg(long, env = "CONTROLLER_USERNAME", default_value = "agent")]
    pub controller_username: String,

    /// Basic-auth password for the controller.
    #[arg(long, env = "CONTROLLER_PASSWORD")]
    pub controller_password: Option<String>,

    /// Worker base URL; configuration is POSTed to `{worker_url}/config`.
    #[arg(long, env = "WORKER_URL", default_value = "http://localhost:8082")]
    pub worker_url: String,

    /// Path of the last-adopted configuration cache.
    #[arg(long, env = "CACHE_FILE", default_value = "./agent_config.cache")]
    pub cache_file: PathBuf,

    /// Distribution strategy (poller, redis, nats).
    #[arg(long, env = "DISTRIBUTION_STRATEGY", default_value = "poller")]
    pub strategy: String,

    /// Initial poll interval in seconds.
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 30)]
    pub poll_interval_secs: u64,

    /// First backoff delay after a failed fetch, in milliseconds.
    #[arg(long, env = "BACKOFF_INITIAL_MS", default_value_t = 1000)]
    pub backoff_initial_ms: u64,

    /// Backoff ceiling in milliseconds.
    #[arg(long, env = "BACKOFF_MAX_MS", default_value_t = 300_000)]
    pub backoff_max_ms: u64,

    /// Backoff growth factor.
    #[arg(long, env = "BACKOFF_MULTIPLIER", default_value_t = 2.0)]
    pub backoff_multiplier: f64,

    /// Do not register with the controller at startup.
    #[arg(long, env = "SKIP_REGISTER")]
    pub skip_register: bool,

    /// Redis `host:port`.
    #[arg(long, env = "REDIS_ADDRESS", default_value = "localhost:6379")]
    pub redis_address: String,

    #[arg(long, env = "REDIS_PASSWORD")]
    pub redis_password: Option<String>,

    #[arg(long, env = "REDIS_DB", default_value_t = 0)]
    pub redis_db: i64,

    /// NATS server URLs, comma separated.
    #[arg(long, env = "NATS_URLS", value_delimiter = ',', default_value = "nats://127.0.0.1:4222")]
    pub nats_urls: Vec<String>,

    #[arg(long, env = "NATS_TOKEN")]
    pub nats_token: Option<String>,

    #[arg(long, env = "NATS_USERNAME")]
    pub nats_username: Option<String>,

    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,

    /// Require TLS for NATS connections.
    #[arg(long, env = "NATS_TLS")]
    pub nats_tls: bool,

    #[arg(long, env = "NATS_MAX_RECONNECT", default_value_t = 60)]
    pub nats_max_reconnect: usize,

    #[arg(long, env = "NATS_RECONNECT_WAIT_MS", default_value_t = 2000)]
    pub nats_reconnect_wait_ms: u64,

    /// Client name reported to the NATS server (default: cfgsync-agent-<uuid>).
    #[arg(long, env = "NATS_CONNECTION_NAME")]
    pub nats_connection_name: Option<String>,

    #[arg(long, env = "NATS_SUBJECT", default_value = DEFAULT_SUBJECT)]
    pub nats_subject: String,

    #[arg(long, env = "NATS_QUEUE_GROUP", default_value = DEFAULT_QUEUE_GROUP)]
    pub nats_queue_group: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (json or text).
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl AgentConfig {
    /// Reject combinations the agent cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let kind = self.strategy_kind()?;

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            anyhow::bail!("--backoff-multiplier must be a finite number of at least 1.0");
        }
        if self.backoff_initial_ms == 0 {
            anyhow::bail!("--backoff-initial-ms must be positive");
        }
        if self.backoff_max_ms < self.backoff_initial_ms {
            anyhow::bail!("--backoff-max-ms must not be below --backoff-initial-ms");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("--poll-interval-secs must be positive");
        }
        if kind == StrategyKind::Nats && self.nats_urls.iter().all(|u| u.trim().is_empty()) {
            anyhow::bail!("--nats-urls is required for the nats strategy");
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("--log-format must be json or text");
        }
        Ok(())
    }

    pub fn strategy_kind(&self) -> anyhow::Result<StrategyKind> {
        Ok(self.strategy.parse()?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            controller_url: self.controller_url.clone(),
            username: self.controller_username.clone(),
            password: self.controller_password.clone(),
            cache_file: self.cache_file.clone(),
            poll_interval: self.poll_interval(),
            backoff_initial: Duration::from_millis(self.backoff_initial_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }

    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig {
            address: self.redis_address.clone(),
            password: self.redis_password.clone(),
            db: self.redis_db,
        }
    }

    pub fn nats_config(&self) -> NatsConfig {
        let defaults = NatsConfig::default();
        NatsConfig {
            urls: self
                .nats_urls
                .iter()
                .map(|u| u.trim().to_owned())
                .filter(|u| !u.is_empty())
                .collect(),
            token: self.nats_token.clone(),
            username: self.nats_username.clone(),
            password: self.nats_password.clone(),
            require_tls: self.nats_tls,
            max_reconnects: self.nats_max_reconnect,
            reconnect_wait: Duration::from_millis(self.nats_reconnect_wait_ms),
            connection_name: self
                .nats_connection_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or(defaults.connection_name),
            subject: self.nats_subject.clone(),
            queue_group: self.nats_queue_group.clone(),
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            strategy: self.strategy.clone(),
            poller: self.poller_config(),
            redis: self.redis_config(),
            nats: self.nats_config(),
        }
    }

    pub fn registration(&self) -> Registration {
        Registration {
            controller_url: self.controller_url.clone(),
            username: self.controller_username.clone(),
            password: self.controller_password.clone(),
            worker_url: self.worker_url.clone(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
