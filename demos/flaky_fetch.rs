//! Flaky Fetch Example
//!
//! Demonstrates retrying a fetch against an endpoint that refuses
//! connections for a while before it comes back up:
//! - Exponential backoff with jitter on transient failures
//! - Permanent failures propagating without retries
//! - Exhaustion once the retry budget runs out
//! - Aborting the wait with a deadline
//!
//! Run with: cargo run --example flaky_fetch

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backwater::prelude::*;
use backwater::RetryEvent;

/// A stand-in for an HTTP endpoint.
struct Endpoint {
    url: &'static str,
    refusals: u32,
    status: u16,
    hits: AtomicU32,
}

#[derive(Debug, Clone)]
enum FetchError {
    ConnectionRefused(&'static str),
    Status(u16),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::ConnectionRefused(url) => write!(f, "cannot connect to {}", url),
            FetchError::Status(code) => write!(f, "server answered {}", code),
        }
    }
}

impl Endpoint {
    fn new(url: &'static str, refusals: u32, status: u16) -> Self {
        Self {
            url,
            refusals,
            status,
            hits: AtomicU32::new(0),
        }
    }

    async fn get(&self) -> Result<String, Failure<FetchError>> {
        let hit = self.hits.fetch_add(1, Ordering::SeqCst);
        if hit < self.refusals {
            return Err(Failure::transient(FetchError::ConnectionRefused(self.url)));
        }
        match self.status {
            200 => Ok(format!("<html><body>{}</body></html>", self.url)),
            code if code >= 500 => Err(Failure::transient(FetchError::Status(code))),
            code => Err(Failure::permanent(FetchError::Status(code))),
        }
    }
}

fn demo_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_backoff(Duration::from_secs(4))
        .with_max_retries(5)
}

fn log_retry(event: &RetryEvent<'_, FetchError>) {
    match event.next_delay {
        Some(delay) => println!(
            "  attempt {} failed ({}), retrying in {:?}",
            event.attempt, event.error, delay
        ),
        None => println!("  attempt {} failed ({}), giving up", event.attempt, event.error),
    }
}

async fn fetch(retrier: &BackoffRetrier, endpoint: &Endpoint) {
    println!("\nGET {}", endpoint.url);
    match retrier
        .execute_with_hooks(|| endpoint.get(), log_retry)
        .await
    {
        Ok(body) => println!("  ok: {}", body),
        Err(RetryError::Exhausted(exhausted)) => println!("  {}", exhausted),
        Err(e) => println!("  failed: {}", e),
    }
}

// The tokio clock is paused and auto-advances, so the waits cost no real time.
#[tokio::main(flavor = "current_thread", start_paused = true)]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let retrier = BackoffRetrier::new(demo_policy()).named("fetch_data");

    println!("=== Recovers after three refusals ===");
    fetch(&retrier, &Endpoint::new("https://example.com", 3, 200)).await;

    println!("\n=== 404 is permanent ===");
    fetch(&retrier, &Endpoint::new("https://example.com/missing", 0, 404)).await;

    println!("\n=== 503 forever exhausts the budget ===");
    fetch(&retrier, &Endpoint::new("https://example.com/down", 0, 503)).await;

    println!("\n=== Deadline during backoff ===");
    let endpoint = Endpoint::new("https://example.com/slow", 100, 200);
    let result = retrier
        .execute_with_deadline(|| endpoint.get(), Duration::from_secs(5))
        .await;
    println!("  {:?} after {} hits", result.map(|_| ()), endpoint.hits.load(Ordering::SeqCst));
}
