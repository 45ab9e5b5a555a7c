//! Retry helpers for queue and history writes that may hit a locked database.

use rand::random;
use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::{Error, Result};

const BUSY_MAX_RETRIES: u32 = 12;
const BUSY_BASE_DELAY_MS: u64 = 10;
const BUSY_MAX_DELAY_MS: u64 = 2000;

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6).
const BUSY_CODES: [&str; 2] = ["5", "6"];

fn is_busy_message(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    msg.contains("database is locked") || msg.contains("database is busy")
}

fn is_sqlite_busy_error(err: &Error) -> bool {
    let Error::DatabaseSqlx(sqlx_err) = err else {
        return false;
    };

    match sqlx_err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(Cow::into_owned);
            code.as_deref().is_some_and(|c| BUSY_CODES.contains(&c))
                || is_busy_message(db_err.message())
        }
        other => is_busy_message(&other.to_string()),
    }
}

/// Jittered exponential delay for the given zero-based attempt, capped at
/// `BUSY_MAX_DELAY_MS`.
fn busy_backoff(attempt: u32) -> Duration {
    let exp_ms = BUSY_BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(20));
    let capped_ms = exp_ms.min(BUSY_MAX_DELAY_MS);
    let jitter_ms = random::<u64>() % (capped_ms / 4 + 1);
    Duration::from_millis((capped_ms + jitter_ms).min(BUSY_MAX_DELAY_MS))
}

/// Run `op`, retrying while SQLite reports the database as busy or locked.
///
/// Any other error is returned immediately.
pub async fn retry_on_sqlite_busy<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_sqlite_busy_error(&err) && attempt < BUSY_MAX_RETRIES => {
                let delay = busy_backoff(attempt);
                debug!(
                    op = op_name,
                    ?delay,
                    attempt = attempt + 1,
                    max = BUSY_MAX_RETRIES,
                    "SQLite busy, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_busy_backoff_is_capped() {
        for attempt in 0..BUSY_MAX_RETRIES {
            assert!(busy_backoff(attempt) <= Duration::from_millis(BUSY_MAX_DELAY_MS));
        }
        assert!(busy_backoff(0) >= Duration::from_millis(BUSY_BASE_DELAY_MS));
    }

    #[test]
    fn test_non_database_errors_are_not_busy() {
        assert!(!is_sqlite_busy_error(&Error::validation("nope")));
        assert!(is_sqlite_busy_error(&Error::DatabaseSqlx(sqlx::Error::Protocol(
            "database is locked".to_string()
        ))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_on_sqlite_busy("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::DatabaseSqlx(sqlx::Error::Protocol(
                        "database is busy".to_string(),
                    )))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_return_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_sqlite_busy("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::validation("bad")) }
        })
        .await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
