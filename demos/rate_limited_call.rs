//! Example demonstrating per-call configuration and rate-limit handling.
//!
//! This example shows how to:
//! - Attach a credential and a rate-limit retry policy to a call
//! - Cap server-directed waits and bound the whole call with a deadline
//! - Cancel an in-progress wait from another task
//! - Match on the typed errors a call can return
//!
//! Run with: `cargo run --example rate_limited_call`

use restexec::transport::TransportOptions;
use restexec::{CallConfig, Credential, Error, Executor, Json, RetryOnRateLimit};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("restexec=debug,rate_limited_call=info")
        .init();

    let executor = Executor::builder()
        .transport_options(TransportOptions {
            timeout_ms: 10_000,
            ..TransportOptions::default()
        })
        .build()?;

    println!("=== Example 1: Anonymous call, no retries ===");
    match executor
        .get::<serde_json::Value, _>("https://api.github.com/rate_limit", Json::new(), &[])
        .await
    {
        Ok(value) => {
            if let Some(remaining) = value.get("rate").and_then(|r| r.get("remaining")) {
                println!("Remaining API calls: {}", remaining);
            }
        }
        Err(Error::RateLimited { retry_after, .. }) => {
            println!("Rate limited, server asked for {:?}", retry_after);
        }
        Err(e) => println!("Error: {}", e),
    }
    println!();

    println!("=== Example 2: Credential plus bounded retry policy ===");
    let token = std::env::var("API_TOKEN").unwrap_or_else(|_| "demo-token".to_string());
    let cancel = CancellationToken::new();

    let policy = RetryOnRateLimit::new(3)
        .with_max_wait(Duration::from_secs(2))
        .with_deadline(Duration::from_secs(10))
        .with_cancellation(cancel.clone());
    let configs: [CallConfig; 2] = [Credential::bearer(token)?.into(), policy.into()];

    // Give up on any wait still running after five seconds.
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
    });

    match executor
        .get::<serde_json::Value, _>("https://api.github.com/user", Json::new(), &configs)
        .await
    {
        Ok(user) => println!("Authenticated as {}", user["login"]),
        Err(Error::Authorization { status, .. }) => {
            println!("Credentials rejected ({}); set API_TOKEN to try for real", status)
        }
        Err(Error::Unhandled { code, .. }) if code == Error::WAIT_CANCELLED => {
            println!("Rate-limit wait cancelled")
        }
        Err(Error::Unhandled { code, .. }) if code == Error::WAIT_DEADLINE_EXCEEDED => {
            println!("Call deadline reached while rate limited")
        }
        Err(e) => println!("Error: {}", e),
    }
    canceller.abort();
    println!();

    println!("=== Example 3: Duplicate configuration is rejected before any I/O ===");
    let duplicated: [CallConfig; 2] = [
        RetryOnRateLimit::new(1).into(),
        RetryOnRateLimit::new(5).into(),
    ];
    if let Err(e) = executor
        .delete("https://api.github.com/nothing", &duplicated)
        .await
    {
        println!("Rejected: {}", e);
    }

    Ok(())
}
