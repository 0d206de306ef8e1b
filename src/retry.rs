//! Reusable retry and backoff primitives
//!
//! Every network-facing component leans on these helpers to survive
//! transient failures. They are layered in increasing generality: a
//! fixed-count retry, an infinite poll with a cancellable error callback,
//! a predicate-gated loop, and a fixed backoff delay table.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::constants::limits;

/// Run `op` up to `attempts` times with a fixed delay between failures.
///
/// The warning callback receives `(attempt, attempts, &error)` on every
/// failed attempt, before the inter-attempt sleep. After the final failure
/// the last error is returned.
///
/// # Panics
///
/// Panics when `attempts` is zero; a retry count of zero is a programming
/// error, not a runtime condition.
pub async fn retry_fixed<T, E, F, Fut, W>(
    attempts: usize,
    delay: Duration,
    mut on_warn: W,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    W: FnMut(usize, usize, &E),
{
    assert!(attempts > 0, "retry attempt count must be at least 1");

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                on_warn(attempt, attempts, &err);
                if attempt == attempts {
                    return Err(err);
                }
                sleep(delay).await;
            }
        }
    }
    unreachable!("loop returns on the final attempt")
}

/// Like [`retry_fixed`], but swallows the final error and yields the
/// type's default value instead.
pub async fn retry_fixed_or_default<T, E, F, Fut, W>(
    attempts: usize,
    delay: Duration,
    on_warn: W,
    op: F,
) -> T
where
    T: Default,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    W: FnMut(usize, usize, &E),
{
    retry_fixed(attempts, delay, on_warn, op)
        .await
        .unwrap_or_default()
}

/// Repeat `op` on a fixed interval until it succeeds.
///
/// The error callback runs after every failure and may cancel the loop by
/// returning `true`. `limit` optionally bounds the number of iterations;
/// with `None` the loop is unbounded. Returns `None` when cancelled or
/// when the iteration limit is exhausted.
pub async fn poll_until_ok<T, E, F, Fut, C>(
    interval: Duration,
    limit: Option<usize>,
    mut on_err: C,
    mut op: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: FnMut(&E) -> bool,
{
    let mut iterations = 0usize;
    loop {
        match op().await {
            Ok(value) => return Some(value),
            Err(err) => {
                if on_err(&err) {
                    return None;
                }
            }
        }

        iterations += 1;
        if let Some(limit) = limit {
            if iterations >= limit {
                return None;
            }
        }
        sleep(interval).await;
    }
}

/// Repeat `op` until the success qualifier accepts its result.
///
/// The side-effect callback runs after each rejected attempt; the loop is
/// unbounded, so the qualifier must eventually be satisfiable.
pub async fn retry_until<T, F, Fut, Q, S>(mut qualifier: Q, mut after_attempt: S, mut op: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    Q: FnMut(&T) -> bool,
    S: FnMut(&T),
{
    loop {
        let value = op().await;
        if qualifier(&value) {
            return value;
        }
        after_attempt(&value);
    }
}

/// Backoff delay for the given attempt, from a fixed lookup table.
///
/// Attempts beyond the table length clamp to the last entry (30 minutes).
///
/// # Panics
///
/// Panics when `attempt` is zero; attempts are counted from 1.
pub fn increasing_delay(attempt: usize) -> Duration {
    assert!(attempt >= 1, "backoff attempt count starts at 1");
    let table = &limits::INCREASING_DELAYS;
    table[(attempt - 1).min(table.len() - 1)]
}
