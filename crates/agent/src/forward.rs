// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery of adopted configuration to the local worker.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::error::ErrorCode;
use crate::model::WorkerConfig;

/// Upper bound on a single delivery to the worker.
const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Sink for adopted configuration.
///
/// Implementations bound their own latency; strategies await the returned
/// future without a timeout of their own.
pub trait Forwarder: Send + Sync + 'static {
    fn forward<'a>(
        &'a self,
        config: &'a WorkerConfig,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

/// HTTP client for the worker's `POST /config` endpoint.
pub struct ExecutorClient {
    base_url: String,
    client: Client,
}

impl ExecutorClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(FORWARD_TIMEOUT).build()?;
        Ok(Self { base_url: base_url.into().trim_end_matches('/').to_owned(), client })
    }

    async fn post_config(&self, config: &WorkerConfig) -> anyhow::Result<()> {
        let url = format!("{}/config", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(config)
            .send()
            .await
            .map_err(|e| ErrorCode::Forward.err(format!("failed to forward config: {e}")))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(ErrorCode::Forward.err(format!("worker returned status {status}")).into());
        }

        tracing::info!(url = %config.url, "configuration forwarded to worker");
        Ok(())
    }
}

impl Forwarder for ExecutorClient {
    fn forward<'a>(
        &'a self,
        config: &'a WorkerConfig,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(self.post_config(config))
    }
}

#[cfg(test)]
#[path = "forward_tests.rs"]
mod tests;
