// src/ingest/retry.rs
//! The retry shape every HTTP provider shares: three attempts, 1s then 2s apart.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use metrics::counter;

pub const MAX_ATTEMPTS: u32 = 3;
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Headroom for decoding and scheduling on top of the attempts themselves.
const BUDGET_SLACK: Duration = Duration::from_secs(1);

/// Sum of the waits between attempts when starting from `initial`.
fn total_backoff(initial: Duration) -> Duration {
    (1..MAX_ATTEMPTS).map(|n| initial * 2u32.pow(n - 1)).sum()
}

/// How long a caller must allow for a fetch whose attempts each time out after
/// `per_attempt`, so that no retry is cut short.
pub fn retry_budget(per_attempt: Duration) -> Duration {
    per_attempt * MAX_ATTEMPTS + total_backoff(INITIAL_BACKOFF) + BUDGET_SLACK
}

/// Runs `attempt` until it succeeds or `MAX_ATTEMPTS` are used, doubling the
/// wait from `backoff` after each failure.
pub async fn with_retries<T, F, Fut>(
    source: &'static str,
    resort: &str,
    backoff: Duration,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut wait = backoff;
    let mut last_err = None;
    for n in 1..=MAX_ATTEMPTS {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                counter!("provider_fetch_errors_total", "source" => source).increment(1);
                if n < MAX_ATTEMPTS {
                    tracing::warn!(
                        target: "ingest",
                        source,
                        resort,
                        attempt = n,
                        error = %e,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    wait *= 2;
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("{source} fetch failed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn budget_outlasts_every_attempt_and_wait() {
        let per_attempt = Duration::from_secs(30);
        assert_eq!(total_backoff(INITIAL_BACKOFF), Duration::from_secs(3));
        assert!(retry_budget(per_attempt) > per_attempt * 3 + Duration::from_secs(3));
        assert!(retry_budget(Duration::ZERO) > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn third_attempt_succeeds_after_backoff() {
        let calls = AtomicU32::new(0);
        let t0 = tokio::time::Instant::now();
        let out = with_retries("test", "tignes", INITIAL_BACKOFF, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow!("flaky"))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(t0.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_with_the_last_error() {
        let calls = AtomicU32::new(0);
        let err = with_retries("test", "tignes", INITIAL_BACKOFF, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err::<(), _>(anyhow!("attempt {n}"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "attempt 3");
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
