//! Fail-open helpers for best-effort side effects
//!
//! Secondary notifications (command replies, guidance confirmations, profile
//! updates) must never change the outcome of the primary operation. They are
//! attempted exactly once; a failure is logged and swallowed.
//!
//! DO NOT use fail-open for:
//! - Publishing notes (has its own retry policy)
//! - Content generation (guarded by the circuit breaker)
//! - Admission checks (rate limits, authorization)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Run a best-effort operation once, logging and discarding any error.
///
/// Returns `None` when the operation failed.
///
/// ```no_run
/// use murmur_core::fail_open::fail_open;
/// use murmur_core::Result;
///
/// async fn send_confirmation() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let delivered = fail_open("confirmation", || send_confirmation()).await;
///     // delivered is None if send_confirmation() failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MurmurError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("reply", || async { Ok::<_, MurmurError>("sent") }).await;
        assert_eq!(result, Some("sent"));
    }

    #[tokio::test]
    async fn test_fail_open_swallows_error() {
        let result = fail_open("reply", || async {
            Err::<(), _>(MurmurError::Transport("relay closed".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_fail_open_runs_exactly_once() {
        let mut calls = 0;
        let _ = fail_open("reply", || {
            calls += 1;
            async { Err::<(), _>(MurmurError::Other("nope".to_string())) }
        })
        .await;
        assert_eq!(calls, 1);
    }
}
