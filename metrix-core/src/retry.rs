// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Retry policy shared by the agent's sender and the relational repository.
//!
//! After failed attempt `n` (1-based) the caller waits `unit * (2n - 1)`,
//! i.e. 1s, 3s, 5s, ... with the default unit, optionally capped.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    pub unit: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            unit: Duration::from_secs(1),
            max_delay: Duration::MAX,
        }
    }

    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Wait after failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = attempt.max(1).saturating_mul(2) - 1;
        self.unit.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with an error `retryable`
    /// rejects, or the attempt budget is spent. Returns the last error.
    pub async fn execute<F, Fut, T, E, P>(&self, operation: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        self.execute_until(operation, retryable, &CancellationToken::new())
            .await
    }

    /// Like [`RetryPolicy::execute`], but a cancelled `shutdown` token cuts the
    /// backoff sleep short and returns the last error. An attempt already in
    /// progress is never interrupted.
    pub async fn execute_until<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        retryable: P,
        shutdown: &CancellationToken,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt >= max_attempts || !retryable(&err) {
                return Err(err);
            }

            let delay = self.delay_for_attempt(attempt);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );

            tokio::select! {
                _ = shutdown.cancelled() => return Err(err),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::new(5);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(3));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));

        let capped = policy.with_max_delay(Duration::from_secs(5));
        assert_eq!(capped.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_succeeds() {
        let policy = RetryPolicy::new(3);
        let calls = Arc::new(support::Calls::default());

        let start = Instant::now();
        let result: Result<u32, String> = policy
            .execute(
                || {
                    let calls = calls.clone();
                    async move {
                        let n = calls.record(start.elapsed());
                        if n < 3 {
                            Err(format!("attempt {n} failed"))
                        } else {
                            Ok(n)
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result.unwrap(), 3);
        let times = calls.times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_secs(1));
        assert_eq!(times[2] - times[1], Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let policy = RetryPolicy::new(5);
        let attempts = AtomicU32::new(0);

        let result: Result<(), String> = policy
            .execute(
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err("malformed".to_string()) }
                },
                |_| false,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted_returns_last_error() {
        let policy = RetryPolicy::new(3);
        let attempts = AtomicU32::new(0);

        let result: Result<(), String> = policy
            .execute(
                || {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Err(format!("failure {n}")) }
                },
                |_| true,
            )
            .await;

        assert_eq!(result.unwrap_err(), "failure 3");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cuts_backoff_short() {
        let policy = RetryPolicy::new(10);
        let shutdown = CancellationToken::new();
        let attempts = AtomicU32::new(0);

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result: Result<(), String> = policy
            .execute_until(
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err("unreachable".to_string()) }
                },
                |_| true,
                &shutdown,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    mod support {
        use std::sync::Mutex;
        use std::time::Duration;

        #[derive(Default)]
        pub struct Calls(Mutex<Vec<Duration>>);

        impl Calls {
            pub fn record(&self, at: Duration) -> u32 {
                let mut times = self.0.lock().unwrap();
                times.push(at);
                times.len() as u32
            }

            pub fn times(&self) -> Vec<Duration> {
                self.0.lock().unwrap().clone()
            }
        }
    }
}
