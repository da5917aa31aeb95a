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

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use metrix_core::{MetricRecord, MetrixError, Result, RetryPolicy};

use crate::transport::Transport;

/// Wraps a [`Transport`] with the retry schedule: after failed attempt `n`
/// wait `2n - 1` seconds, for at most `retries` attempts in total.
pub struct RetryingSender {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryingSender {
    pub fn new(transport: Arc<dyn Transport>, retries: u32) -> Self {
        Self::with_policy(transport, RetryPolicy::new(retries))
    }

    pub fn with_policy(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Only transport failures are retried. A cancelled `shutdown` abandons
    /// the remaining backoff and returns the last error.
    pub async fn deliver(
        &self,
        batch: &[MetricRecord],
        shutdown: &CancellationToken,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.policy
            .execute_until(
                || self.transport.send(batch),
                MetrixError::is_transport,
                shutdown,
            )
            .await
    }
}

#[cfg(test)]
pub(crate) mod support {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Scripted transport: pops one outcome per call, succeeds once the
    /// script runs out, and records every call.
    pub struct MockTransport {
        script: Mutex<VecDeque<MetrixError>>,
        calls: Mutex<Vec<(Instant, Vec<MetricRecord>)>>,
        latency: Duration,
    }

    impl MockTransport {
        pub fn new(failures: Vec<MetrixError>) -> Self {
            Self {
                script: Mutex::new(failures.into()),
                calls: Mutex::new(Vec::new()),
                latency: Duration::ZERO,
            }
        }

        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        pub fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().iter().map(|(at, _)| *at).collect()
        }

        pub fn batches(&self) -> Vec<Vec<MetricRecord>> {
            self.calls.lock().iter().map(|(_, b)| b.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn send(&self, batch: &[MetricRecord]) -> Result<()> {
            self.calls.lock().push((Instant::now(), batch.to_vec()));
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            match self.script.lock().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }
}
