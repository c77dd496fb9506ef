//! End-to-end scenarios for the backoff retrier.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use backwater::prelude::*;
use backwater::testing::{RecordingSleeper, ScriptedOperation};
use backwater::{NoJitter, SeededJitter, ThreadRngJitter};

#[derive(Debug, Clone, PartialEq)]
enum FetchError {
    ConnectionRefused,
    NotFound,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::ConnectionRefused => write!(f, "connection refused"),
            FetchError::NotFound => write!(f, "404 not found"),
        }
    }
}

impl std::error::Error for FetchError {}

fn classify(error: FetchError) -> Failure<FetchError> {
    match error {
        FetchError::ConnectionRefused => Failure::transient(error),
        FetchError::NotFound => Failure::permanent(error),
    }
}

#[tokio::test]
async fn test_two_failures_then_success_with_two_retries() {
    let op = ScriptedOperation::recovers_after(2, FetchError::ConnectionRefused, "body");
    let retrier = BackoffRetrier::new(RetryPolicy::default().with_max_retries(2))
        .with_sleeper(RecordingSleeper::new());

    let result = retrier.execute(|| op.call_async()).await;

    assert_eq!(result, Ok("body"));
    assert_eq!(op.calls(), 3);
}

#[tokio::test]
async fn test_max_backoff_four_gives_one_two_four_four() {
    let op = ScriptedOperation::<(), _>::always_failing(FetchError::ConnectionRefused);
    let retrier = BackoffRetrier::new(
        RetryPolicy::default()
            .with_max_retries(6)
            .with_max_backoff(Duration::from_secs(4)),
    )
    .with_jitter(NoJitter)
    .with_sleeper(RecordingSleeper::new());

    let _ = retrier.execute(|| op.call_async()).await;

    let secs: Vec<u64> = retrier
        .sleeper()
        .delays()
        .iter()
        .map(|d| d.as_secs())
        .collect();
    assert_eq!(secs, vec![1, 2, 4, 4, 4, 4]);
}

#[tokio::test]
async fn test_classified_errors() {
    let op = ScriptedOperation::<(), _>::new([
        Err(classify(FetchError::ConnectionRefused)),
        Err(classify(FetchError::NotFound)),
    ]);
    let retrier = BackoffRetrier::new(RetryPolicy::default()).with_sleeper(RecordingSleeper::new());

    let err = retrier.execute(|| op.call_async()).await.unwrap_err();

    assert_eq!(err, RetryError::Permanent(FetchError::NotFound));
    assert_eq!(err.to_string(), "404 not found");
    assert_eq!(op.calls(), 2);
}

#[tokio::test]
async fn test_exhaustion_is_distinct_from_attempt_error() {
    use std::error::Error;

    let op = ScriptedOperation::<(), _>::always_failing(FetchError::ConnectionRefused);
    let retrier = BackoffRetrier::new(RetryPolicy::default().with_max_retries(1))
        .with_sleeper(RecordingSleeper::new())
        .named("fetch_data");

    let err = retrier.execute(|| op.call_async()).await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("fetch_data exhausted retries after 2 attempts"));
    assert!(message.contains("connection refused"));
    let source = err.source().and_then(|e| e.source());
    assert_eq!(source.map(|e| e.to_string()), Some("connection refused".into()));
}

#[tokio::test]
async fn test_jitter_is_drawn_per_attempt() {
    let op = ScriptedOperation::<(), _>::always_failing(FetchError::ConnectionRefused);
    let retrier = BackoffRetrier::new(
        RetryPolicy::default()
            .with_max_retries(40)
            .with_max_backoff(Duration::from_secs(1)),
    )
    .with_jitter(ThreadRngJitter)
    .with_sleeper(RecordingSleeper::new());

    let _ = retrier.execute(|| op.call_async()).await;

    let delays = retrier.sleeper().delays();
    assert_eq!(delays.len(), 40);
    for delay in &delays {
        assert!(*delay >= Duration::from_secs(1));
        assert!(*delay <= Duration::from_secs(2));
    }
    let distinct: HashSet<_> = delays.iter().collect();
    assert!(distinct.len() > 10, "jitter repeated: {:?}", delays);
}

#[test]
fn test_callers_sharing_a_jitter_source_are_desynchronized() {
    let policy = RetryPolicy::default().with_max_retries(3);
    let jitter = Arc::new(SeededJitter::new(2024));

    let schedules: Vec<Vec<Duration>> = (0..4)
        .map(|_| {
            let op = ScriptedOperation::<(), _>::always_failing(FetchError::ConnectionRefused);
            let retrier = BackoffRetrier::new(policy.clone())
                .with_jitter(jitter.clone())
                .with_sleeper(RecordingSleeper::new());
            let _ = retrier.execute_blocking(|| op.call());
            retrier.sleeper().delays()
        })
        .collect();

    let distinct: HashSet<_> = schedules.iter().collect();
    assert_eq!(distinct.len(), schedules.len());
}

#[cfg(feature = "async")]
#[tokio::test(start_paused = true)]
async fn test_cancel_signal_aborts_wait() {
    let op = ScriptedOperation::<(), _>::always_failing(FetchError::ConnectionRefused);
    let retrier = BackoffRetrier::new(RetryPolicy::default()).with_jitter(NoJitter);
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let _ = tx.send(());
    });

    let result = retrier
        .execute_until(|| op.call_async(), async {
            let _ = rx.await;
        })
        .await;

    assert_eq!(result, Err(RetryError::Cancelled { attempts: 2 }));
    assert_eq!(op.calls(), 2);
}
