// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot agent registration with the controller.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::error::ErrorCode;
use crate::model::{RegisterRequest, RegisterResponse};

const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Controller endpoint and credentials used for registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub controller_url: String,
    pub username: String,
    pub password: Option<String>,
    pub worker_url: String,
}

impl Registration {
    /// Register this agent. Any non-200 reply is an error.
    pub async fn register(&self) -> anyhow::Result<RegisterResponse> {
        let client = Client::builder()
            .timeout(REGISTER_TIMEOUT)
            .build()
            .map_err(|e| ErrorCode::Construction.err(format!("failed to build HTTP client: {e}")))?;

        let body = RegisterRequest {
            hostname: hostname(),
            metadata: format!("worker_url={}", self.worker_url),
        };
        let url = format!("{}/api/v1/register", self.controller_url.trim_end_matches('/'));
        let mut req = client.post(&url).json(&body);
        if !self.username.is_empty() {
            req = req.basic_auth(&self.username, self.password.as_deref());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ErrorCode::Transport.err(format!("failed to register agent: {e}")))?;
        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            return Err(ErrorCode::Transport
                .err(format!("registration failed with status {status}: {text}"))
                .into());
        }

        let reply: RegisterResponse = resp.json().await.map_err(|e| {
            ErrorCode::Malformed.err(format!("failed to decode registration reply: {e}"))
        })?;
        tracing::info!(
            agent_id = %reply.agent_id,
            hostname = %body.hostname,
            poll_interval_seconds = reply.poll_interval_seconds,
            "registered with controller"
        );
        Ok(reply)
    }
}

/// Best-effort host name: kernel hostname, then `$HOSTNAME`, else empty.
pub fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|s| !s.is_empty()))
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "register_tests.rs"]
mod tests;
