//! Classification-driven retries for backend calls.
//!
//! A failed attempt is sorted into one of three paths by its status code:
//! `500` is fatal, `503` backs off linearly with no attempt limit, and
//! everything else (429 and unclassified errors included) walks a short
//! fixed delay table and becomes fatal once the table is used up. The two
//! retrying paths keep separate counters; taking one resets the other.
//!
//! Cancellation is cooperative. It is checked before every attempt and
//! polled during every backoff sleep, never during an in-flight call.

use crate::ai::error::AiError;
use crate::settings::RetrySettings;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// Shared cancel switch between the actor handle and a running turn.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn check(&self) -> Result<(), RetryError> {
        if self.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("{0}")]
    Fatal(AiError),

    #[error("Request failed after {attempts} retries: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: AiError,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

impl RetryError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Fatal,
    Unavailable,
    Other,
}

pub fn classify(error: &AiError) -> Classification {
    match error.status_code() {
        Some(500) => Classification::Fatal,
        Some(503) => Classification::Unavailable,
        _ => Classification::Other,
    }
}

/// Reported before each backoff sleep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    /// 1-based count on the path that was taken.
    pub attempt: u32,
    pub max_retries: Option<u32>,
    pub error: String,
    pub backoff_ms: u64,
}

/// The counters behind the retry loop. `on_failure` either yields the next
/// backoff or the error that ends the loop.
#[derive(Debug, Clone)]
pub struct RetryState {
    settings: RetrySettings,
    unavailable_attempts: u32,
    other_attempts: u32,
}

impl RetryState {
    pub fn new(settings: RetrySettings) -> Self {
        Self {
            settings,
            unavailable_attempts: 0,
            other_attempts: 0,
        }
    }

    pub fn unavailable_delay(&self, attempt: u32) -> Duration {
        let delay = self
            .settings
            .unavailable_base_ms
            .saturating_add(self.settings.unavailable_step_ms.saturating_mul(attempt as u64))
            .min(self.settings.unavailable_max_ms);
        Duration::from_millis(delay)
    }

    pub fn on_failure(&mut self, error: AiError) -> Result<(Duration, RetryNotice), RetryError> {
        let status = error.status_code();
        match classify(&error) {
            Classification::Fatal => {
                warn!(?status, error = %error, "Fatal backend error");
                Err(RetryError::Fatal(error))
            }
            Classification::Unavailable => {
                self.other_attempts = 0;
                let delay = self.unavailable_delay(self.unavailable_attempts);
                self.unavailable_attempts += 1;
                Ok((
                    delay,
                    RetryNotice {
                        attempt: self.unavailable_attempts,
                        max_retries: None,
                        error: error.to_string(),
                        backoff_ms: delay.as_millis() as u64,
                    },
                ))
            }
            Classification::Other => {
                self.unavailable_attempts = 0;
                let Some(&delay_ms) = self.settings.other_delays_ms.get(self.other_attempts as usize)
                else {
                    warn!(
                        ?status,
                        attempts = self.other_attempts,
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: self.other_attempts,
                        source: error,
                    });
                };
                self.other_attempts += 1;
                Ok((
                    Duration::from_millis(delay_ms),
                    RetryNotice {
                        attempt: self.other_attempts,
                        max_retries: Some(self.settings.other_delays_ms.len() as u32),
                        error: error.to_string(),
                        backoff_ms: delay_ms,
                    },
                ))
            }
        }
    }
}

/// Sleeps for `duration`, waking every `poll` to check `cancel`.
pub async fn interruptible_sleep(
    duration: Duration,
    poll: Duration,
    cancel: &CancellationFlag,
) -> Result<(), RetryError> {
    let deadline = Instant::now() + duration;
    let poll = poll.max(Duration::from_millis(1));
    loop {
        cancel.check()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        sleep(poll.min(deadline - now)).await;
    }
}

/// Drives `attempt` until it succeeds, fails fatally, runs out of retries
/// or is cancelled. `on_retry` sees every backoff before it is slept.
pub async fn send_with_retry<T, F, Fut, R>(
    settings: &RetrySettings,
    cancel: &CancellationFlag,
    mut attempt: F,
    mut on_retry: R,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AiError>>,
    R: FnMut(&RetryNotice),
{
    let mut state = RetryState::new(settings.clone());
    let poll = Duration::from_millis(settings.cancel_poll_ms);
    let mut retries = 0u32;

    loop {
        cancel.check()?;

        match attempt().await {
            Ok(value) => {
                if retries > 0 {
                    info!(retries, "Request succeeded after retries");
                }
                return Ok(value);
            }
            Err(error) => {
                let (delay, notice) = state.on_failure(error)?;
                warn!(
                    attempt = notice.attempt,
                    max_retries = ?notice.max_retries,
                    backoff_ms = notice.backoff_ms,
                    error = %notice.error,
                    "Request failed, retrying after backoff"
                );
                on_retry(&notice);
                interruptible_sleep(delay, poll, cancel).await?;
                retries += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    fn fast() -> RetrySettings {
        RetrySettings {
            unavailable_base_ms: 1,
            unavailable_step_ms: 1,
            unavailable_max_ms: 3,
            other_delays_ms: vec![1, 1, 1],
            cancel_poll_ms: 1,
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify(&AiError::status(500, "boom")), Classification::Fatal);
        assert_eq!(
            classify(&AiError::other("upstream said [503] try later")),
            Classification::Unavailable
        );
        assert_eq!(
            classify(&AiError::other(r#"{"error":{"code":503}}"#)),
            Classification::Unavailable
        );
        assert_eq!(classify(&AiError::status(429, "slow down")), Classification::Other);
        assert_eq!(classify(&AiError::other("socket closed")), Classification::Other);
    }

    #[test]
    fn test_unavailable_delay_grows_and_caps() {
        let state = RetryState::new(RetrySettings::default());
        let delays: Vec<u64> = (0..6)
            .map(|n| state.unavailable_delay(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![2000, 4000, 6000, 8000, 10000, 10000]);
    }

    #[test]
    fn test_unavailable_path_has_no_attempt_limit() {
        let mut state = RetryState::new(RetrySettings::default());
        for n in 1..=50 {
            let (_, notice) = state.on_failure(AiError::other("[503] unavailable")).unwrap();
            assert_eq!(notice.attempt, n);
            assert_eq!(notice.max_retries, None);
        }
    }

    #[test]
    fn test_paths_reset_each_other() {
        let mut state = RetryState::new(RetrySettings::default());
        state.on_failure(AiError::status(429, "a")).unwrap();
        state.on_failure(AiError::status(429, "b")).unwrap();
        state.on_failure(AiError::status(503, "c")).unwrap();

        let (delay, notice) = state.on_failure(AiError::status(429, "d")).unwrap();
        assert_eq!(notice.attempt, 1);
        assert_eq!(delay, Duration::from_millis(1000));

        let (delay, _) = state.on_failure(AiError::status(503, "e")).unwrap();
        assert_eq!(delay, Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_500_fails_immediately() {
        let calls = Cell::new(0);
        let retries = RefCell::new(Vec::new());

        let result: Result<(), _> = send_with_retry(
            &RetrySettings::default(),
            &CancellationFlag::new(),
            || {
                calls.set(calls.get() + 1);
                async { Err(AiError::status(500, "internal")) }
            },
            |notice| retries.borrow_mut().push(notice.clone()),
        )
        .await;

        assert!(matches!(result, Err(RetryError::Fatal(_))));
        assert_eq!(calls.get(), 1);
        assert!(retries.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_429_fatal_after_three_retries() {
        let calls = Cell::new(0);

        let result: Result<(), _> = send_with_retry(
            &fast(),
            &CancellationFlag::new(),
            || {
                calls.set(calls.get() + 1);
                async { Err(AiError::status(429, "rate limited")) }
            },
            |_| {},
        )
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source.status_code(), Some(429));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_503_message_retries_until_success() {
        let calls = Cell::new(0);
        let retries = RefCell::new(Vec::new());

        let result = send_with_retry(
            &fast(),
            &CancellationFlag::new(),
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n <= 8 {
                        Err(AiError::other("Service error [503]: overloaded"))
                    } else {
                        Ok("done")
                    }
                }
            },
            |notice| retries.borrow_mut().push(notice.backoff_ms),
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 9);
        assert_eq!(*retries.borrow(), vec![1, 2, 3, 3, 3, 3, 3, 3]);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let calls = Cell::new(0);

        let result: Result<(), _> = send_with_retry(
            &fast(),
            &cancel,
            || {
                calls.set(calls.get() + 1);
                async { Ok(()) }
            },
            |_| {},
        )
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationFlag::new();
        let settings = RetrySettings {
            unavailable_base_ms: 60_000,
            cancel_poll_ms: 5,
            ..RetrySettings::default()
        };

        let started = std::time::Instant::now();
        let result: Result<(), _> = send_with_retry(
            &settings,
            &cancel,
            || async { Err(AiError::status(503, "unavailable")) },
            |_| cancel.cancel(),
        )
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
