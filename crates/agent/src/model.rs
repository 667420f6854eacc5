// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types shared by the controller, the transports, and the worker.

use serde::{Deserialize, Serialize};

/// The configuration the worker executes. Opaque to the distribution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub url: String,
}

/// Body of a `200` from `GET /api/v1/config`. Also the cache file layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub version: i64,
    pub data: WorkerConfig,
    /// Requested poll interval. Zero or negative means "keep the current one".
    #[serde(default, skip_serializing_if = "is_zero")]
    pub poll_interval_seconds: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Message published on the Redis broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfigMessage {
    pub config: WorkerConfig,
    pub version: String,
    /// Publisher timestamp. Carried for diagnostics only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Message published on the NATS subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfigMessage {
    pub version: String,
    pub config: WorkerConfig,
}

/// Body of `POST /api/v1/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
}

/// Controller reply to a registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub agent_id: String,
    #[serde(default)]
    pub poll_url: String,
    #[serde(default)]
    pub poll_interval_seconds: i64,
}
