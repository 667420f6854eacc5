// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mocks shared by unit tests: a recording forwarder, a scripted controller,
//! and a recording worker, all bound to `127.0.0.1:0`.

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::forward::Forwarder;
use crate::model::{ConfigResponse, RegisterRequest, RegisterResponse, WorkerConfig};

/// Install the ring crypto provider so reqwest clients can be built.
pub fn install_crypto() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Forwarder that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingForwarder {
    calls: Mutex<Vec<WorkerConfig>>,
    fail: AtomicBool,
}

impl RecordingForwarder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let fwd = Self::new();
        fwd.set_failing(true);
        fwd
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<WorkerConfig> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Forwarder for RecordingForwarder {
    fn forward<'a>(
        &'a self,
        config: &'a WorkerConfig,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(config.clone());
            }
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("worker unavailable");
            }
            Ok(())
        })
    }
}

pub fn target(url: &str) -> WorkerConfig {
    WorkerConfig { url: url.to_owned() }
}

/// One scripted controller reply to `GET /api/v1/config`.
#[derive(Debug, Clone)]
pub enum Reply {
    NotModified,
    Config(ConfigResponse),
    Status(u16),
    Garbage,
}

/// Controller whose replies are popped from a script; the last reply repeats.
#[derive(Default)]
pub struct MockController {
    script: Mutex<VecDeque<Reply>>,
    /// `If-None-Match` value of each request (`None` when absent).
    pub seen_versions: Mutex<Vec<Option<String>>>,
    pub seen_auth: Mutex<Vec<Option<String>>>,
    /// Arrival time of each `GET /api/v1/config`.
    pub fetched_at: Mutex<Vec<std::time::Instant>>,
    /// `(authorization, body)` of each registration.
    pub registrations: Mutex<Vec<(Option<String>, RegisterRequest)>>,
    pub register_interval: Mutex<i64>,
    pub reject_register: AtomicBool,
}

impl MockController {
    pub fn new(script: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into_iter().collect()), ..Default::default() })
    }

    pub fn seen_versions(&self) -> Vec<Option<String>> {
        self.seen_versions.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn fetch_times(&self) -> Vec<std::time::Instant> {
        self.fetched_at.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn registrations(&self) -> Vec<(Option<String>, RegisterRequest)> {
        self.registrations.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_reply(&self) -> Reply {
        let Ok(mut script) = self.script.lock() else {
            return Reply::Status(500);
        };
        if script.len() > 1 {
            script.pop_front().unwrap_or(Reply::Status(500))
        } else {
            script.front().cloned().unwrap_or(Reply::Status(500))
        }
    }
}

async fn get_config(State(ctl): State<Arc<MockController>>, headers: HeaderMap) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
    if let Ok(mut f) = ctl.fetched_at.lock() {
        f.push(std::time::Instant::now());
    }
    if let Ok(mut v) = ctl.seen_versions.lock() {
        v.push(header("if-none-match"));
    }
    if let Ok(mut a) = ctl.seen_auth.lock() {
        a.push(header("authorization"));
    }
    match ctl.next_reply() {
        Reply::NotModified => StatusCode::NOT_MODIFIED.into_response(),
        Reply::Config(body) => Json(body).into_response(),
        Reply::Status(code) => {
            (StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), "boom")
                .into_response()
        }
        Reply::Garbage => (StatusCode::OK, "{\"version\":").into_response(),
    }
}

async fn register(
    State(ctl): State<Arc<MockController>>,
    headers: HeaderMap,
    Json(body): Json<RegisterRequest>,
) -> Response {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_owned);
    if let Ok(mut r) = ctl.registrations.lock() {
        r.push((auth, body));
    }
    if ctl.reject_register.load(Ordering::SeqCst) {
        return (StatusCode::FORBIDDEN, "unknown agent").into_response();
    }
    let interval = ctl.register_interval.lock().map(|i| *i).unwrap_or(0);
    Json(RegisterResponse {
        agent_id: "agent-1".to_owned(),
        poll_url: "/api/v1/config".to_owned(),
        poll_interval_seconds: interval,
    })
    .into_response()
}

/// Serve a scripted controller on a random port. Returns its base URL.
pub async fn spawn_controller(ctl: Arc<MockController>) -> anyhow::Result<String> {
    let router = Router::new()
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/register", post(register))
        .with_state(ctl);
    let addr = spawn_router(router).await?;
    Ok(format!("http://{addr}"))
}

/// Worker that records `POST /config` bodies and answers with a settable status.
pub struct MockWorker {
    pub received: Mutex<Vec<WorkerConfig>>,
    pub status: AtomicU16,
}

impl MockWorker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { received: Mutex::new(Vec::new()), status: AtomicU16::new(200) })
    }

    pub fn received(&self) -> Vec<WorkerConfig> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

async fn post_config(
    State(worker): State<Arc<MockWorker>>,
    Json(config): Json<WorkerConfig>,
) -> StatusCode {
    if let Ok(mut r) = worker.received.lock() {
        r.push(config);
    }
    StatusCode::from_u16(worker.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Serve a recording worker on a random port. Returns its base URL.
pub async fn spawn_worker(worker: Arc<MockWorker>) -> anyhow::Result<String> {
    let router = Router::new().route("/config", post(post_config)).with_state(worker);
    let addr = spawn_router(router).await?;
    Ok(format!("http://{addr}"))
}

async fn spawn_router(router: Router) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr)
}

/// A base URL nothing listens on.
pub async fn dead_url() -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
