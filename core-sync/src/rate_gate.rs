//! # Rate Gate
//!
//! Every outbound call, metadata listing or media transfer alike, goes
//! through one [`RateGate`]. The gate admits at most `max_calls` calls per
//! sliding `period`; callers that arrive early wait on the gate's lock, so
//! calls leave in arrival order.
//!
//! A call that comes back with a rate-limit signal is slept on and retried
//! in place. After `max_retries` such retries the run is aborted.

use bridge_traits::error::BridgeError;
use core_runtime::config::RateLimitConfig;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

pub struct RateGate {
    max_calls: usize,
    period: Duration,
    max_retries: u32,
    backoff: Duration,
    /// Start times of the calls admitted within the current window.
    window: Mutex<VecDeque<Instant>>,
}

impl RateGate {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_calls: config.max_calls.max(1) as usize,
            period: config.period,
            max_retries: config.max_retries,
            backoff: config.backoff,
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until one more call fits into the window, then claim the slot.
    async fn admit(&self) {
        // The lock is held across the sleep so later callers queue behind.
        let mut window = self.window.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&started) = window.front() {
                if now.duration_since(started) >= self.period {
                    window.pop_front();
                } else {
                    break;
                }
            }

            match window.front() {
                Some(&oldest) if window.len() >= self.max_calls => {
                    let wait = self.period.saturating_sub(now.duration_since(oldest));
                    debug!(wait_ms = wait.as_millis() as u64, "Rate gate full, waiting");
                    sleep(wait).await;
                }
                _ => {
                    window.push_back(now);
                    return;
                }
            }
        }
    }

    /// Run `op` through the gate.
    ///
    /// The outer result is the gate's verdict (retries exhausted); the inner
    /// one is whatever non-rate-limit error the call produced, left for the
    /// caller to classify.
    pub async fn try_call<T, F, Fut>(
        &self,
        mut op: F,
    ) -> Result<std::result::Result<T, BridgeError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, BridgeError>>,
    {
        let mut retries = 0;
        loop {
            self.admit().await;
            match op().await {
                Err(err) if err.is_rate_limited() => {
                    if retries >= self.max_retries {
                        warn!(retries, "Giving up after repeated rate limiting");
                        return Err(SyncError::RateLimitExhausted { retries });
                    }
                    retries += 1;
                    let delay = err.retry_after().unwrap_or(self.backoff);
                    warn!(
                        attempt = retries,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, retrying"
                    );
                    sleep(delay).await;
                }
                other => return Ok(other),
            }
        }
    }

    /// Run `op` through the gate; any failure aborts the run.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, BridgeError>>,
    {
        self.try_call(op).await?.map_err(SyncError::Provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(max_calls: u32, period: Duration, max_retries: u32) -> RateGate {
        RateGate::new(&RateLimitConfig {
            max_calls,
            period,
            max_retries,
            backoff: Duration::from_secs(10),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_paces_calls_to_window() {
        let gate = gate(1, Duration::from_secs(1), 0);
        let start = Instant::now();

        for _ in 0..3 {
            gate.call(|| async { Ok::<_, BridgeError>(()) }).await.unwrap();
        }

        // First call is immediate, the other two wait a full period each.
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_within_window() {
        let gate = gate(3, Duration::from_secs(1), 0);
        let start = Instant::now();

        for _ in 0..3 {
            gate.call(|| async { Ok::<_, BridgeError>(()) }).await.unwrap();
        }

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rate_limited_call() {
        let gate = gate(10, Duration::from_secs(1), 5);
        let start = Instant::now();
        let mut attempts = 0u32;

        let value = gate
            .call(|| {
                attempts += 1;
                let attempt = attempts;
                async move {
                    if attempt < 3 {
                        Err(BridgeError::RateLimited {
                            retry_after: Some(Duration::from_secs(2)),
                        })
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_configured_backoff() {
        let gate = gate(10, Duration::from_secs(1), 1);
        let start = Instant::now();
        let mut attempts = 0u32;

        gate.call(|| {
            attempts += 1;
            let attempt = attempts;
            async move {
                if attempt == 1 {
                    Err(BridgeError::RateLimited { retry_after: None })
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_are_fatal() {
        let gate = gate(10, Duration::from_secs(1), 2);
        let mut attempts = 0u32;

        let result = gate
            .call(|| {
                attempts += 1;
                async { Err::<(), _>(BridgeError::RateLimited { retry_after: None }) }
            })
            .await;

        assert!(matches!(
            result,
            Err(SyncError::RateLimitExhausted { retries: 2 })
        ));
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let gate = gate(10, Duration::from_secs(1), 5);
        let mut attempts = 0u32;

        let inner = gate
            .try_call(|| {
                attempts += 1;
                async {
                    Err::<(), _>(BridgeError::Http {
                        status: 404,
                        url: "https://example.com".to_string(),
                    })
                }
            })
            .await
            .unwrap();

        assert!(matches!(inner, Err(BridgeError::Http { status: 404, .. })));
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_maps_errors_to_provider() {
        let gate = gate(10, Duration::from_secs(1), 0);

        let result = gate
            .call(|| async {
                Err::<(), _>(BridgeError::Api {
                    code: 98,
                    message: "Invalid auth token".to_string(),
                })
            })
            .await;

        assert!(matches!(
            result,
            Err(SyncError::Provider(BridgeError::Api { code: 98, .. }))
        ));
    }
}
