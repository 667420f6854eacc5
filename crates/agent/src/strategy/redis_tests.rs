// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{RedisConfig, RedisStrategy};
use crate::error::{code_of, ErrorCode};
use crate::test_support::{target, RecordingForwarder};

#[tokio::test]
async fn duplicate_message_forwards_once() -> anyhow::Result<()> {
    let fwd = RecordingForwarder::new();
    let redis = RedisStrategy::detached(fwd.clone())?;
    let payload = br#"{"config":{"url":"https://b.example"},"version":"7"}"#;

    assert!(redis.handle_message(payload).await);
    assert!(!redis.handle_message(payload).await);

    assert_eq!(fwd.calls(), vec![target("https://b.example")]);
    assert_eq!(redis.last_version().await.as_deref(), Some("7"));
    assert_eq!(redis.last_config().await, Some(target("https://b.example")));
    Ok(())
}

#[tokio::test]
async fn timestamp_is_accepted() -> anyhow::Result<()> {
    let fwd = RecordingForwarder::new();
    let redis = RedisStrategy::detached(fwd.clone())?;
    let payload = serde_json::to_vec(&serde_json::json!({
        "config": { "url": "https://c.example" },
        "version": "8",
        "timestamp": "2026-02-14T01:23:45Z"
    }))?;

    assert!(redis.handle_message(&payload).await);
    assert_eq!(fwd.calls(), vec![target("https://c.example")]);
    Ok(())
}

#[tokio::test]
async fn malformed_message_is_dropped() -> anyhow::Result<()> {
    let fwd = RecordingForwarder::new();
    let redis = RedisStrategy::detached(fwd.clone())?;

    assert!(!redis.handle_message(b"not json").await);
    assert!(!redis.handle_message(br#"{"version":"1"}"#).await);
    assert!(!redis.handle_message(br#"{"config":{"url":"x"},"version":1}"#).await);

    assert!(fwd.calls().is_empty());
    assert_eq!(redis.last_version().await, None);

    // A later valid message is still handled.
    assert!(redis.handle_message(br#"{"config":{"url":"https://d.example"},"version":"1"}"#).await);
    Ok(())
}

#[tokio::test]
async fn forward_failure_is_not_retried() -> anyhow::Result<()> {
    let fwd = RecordingForwarder::failing();
    let redis = RedisStrategy::detached(fwd.clone())?;
    let payload = br#"{"config":{"url":"https://b.example"},"version":"7"}"#;

    assert!(redis.handle_message(payload).await);
    fwd.set_failing(false);
    assert!(!redis.handle_message(payload).await);

    assert_eq!(fwd.calls().len(), 1);
    assert_eq!(redis.last_version().await.as_deref(), Some("7"));
    Ok(())
}

#[yare::parameterized(
    no_password    = { None, "redis://localhost:6379/0" },
    empty_password = { Some(""), "redis://localhost:6379/0" },
    with_password  = { Some("hunter2"), "redis://:hunter2@localhost:6379/0" },
)]
fn connection_url(password: Option<&str>, expected: &str) {
    let config = RedisConfig {
        address: "localhost:6379".to_owned(),
        password: password.map(str::to_owned),
        db: 0,
    };
    assert_eq!(config.url(), expected);
}

#[tokio::test]
async fn unreachable_server_is_construction_error() {
    let config = RedisConfig { address: "127.0.0.1:1".to_owned(), password: None, db: 0 };
    let result = RedisStrategy::connect(&config, RecordingForwarder::new()).await;
    let Err(err) = result else {
        panic!("nothing listens on port 1");
    };
    assert_eq!(code_of(&err), Some(ErrorCode::Construction));
}

#[tokio::test]
async fn start_returns_once_stopped() -> anyhow::Result<()> {
    let redis = std::sync::Arc::new(RedisStrategy::detached(RecordingForwarder::new())?);
    let task = {
        let redis = std::sync::Arc::clone(&redis);
        tokio::spawn(async move { redis.start(CancellationToken::new()).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    redis.stop()?;
    redis.stop()?;
    tokio::time::timeout(Duration::from_secs(2), task).await???;
    Ok(())
}
