//! Backoff driver.
//!
//! Retries a fallible remote call forever, growing the wait linearly by a
//! fixed step per consecutive failure and capping at `max_wait`. The retried
//! operation's error type is pinned to [`ApiError`] at the signature level —
//! a non-`ApiError` failure simply can't be passed to this function, so
//! there's no way to accidentally retry something that was never meant to
//! be transient.

use crate::error::ApiError;
use std::future::Future;
use std::time::Duration;

const STEP: Duration = Duration::from_secs(10);

/// Retry `operation` until it succeeds, logging and sleeping between
/// attempts. The wait grows by [`STEP`] per consecutive failure, capped at
/// `max_wait`.
pub async fn with_backoff<T, F, Fut>(max_wait: Duration, mut operation: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut wait = Duration::ZERO;
    loop {
        match operation().await {
            Ok(value) => return value,
            Err(err) => {
                err.log();
                tokio::time::sleep(wait).await;
                wait = (wait + STEP).min(max_wait);
            }
        }
    }
}
