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

//! Poll and report loops.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::MetricBuffer;
use crate::config::AgentConfig;
use crate::pool::WorkerPool;
use crate::sender::RetryingSender;
use crate::source::MetricSource;

pub struct Agent {
    poll_every: Duration,
    report_every: Duration,
    workers: usize,
    source: Arc<dyn MetricSource>,
    buffer: Arc<MetricBuffer>,
    sender: Arc<RetryingSender>,
}

impl Agent {
    pub fn new(
        config: &AgentConfig,
        source: Arc<dyn MetricSource>,
        sender: Arc<RetryingSender>,
    ) -> Self {
        Self {
            poll_every: config.poll_every(),
            report_every: config.report_every(),
            workers: config.rate_limit,
            source,
            buffer: Arc::new(MetricBuffer::new()),
            sender,
        }
    }

    pub fn buffer(&self) -> &Arc<MetricBuffer> {
        &self.buffer
    }

    pub fn poll_once(&self) {
        poll(self.source.as_ref(), &self.buffer);
    }

    /// Run until `shutdown` is cancelled. Returns after the worker pool has
    /// drained its queue.
    pub async fn run(&self, shutdown: CancellationToken) {
        let pool = WorkerPool::spawn(self.workers, self.sender.clone(), shutdown.clone());

        let poller = tokio::spawn(poll_loop(
            self.source.clone(),
            self.buffer.clone(),
            self.poll_every,
            shutdown.clone(),
        ));

        info!(
            poll_secs = self.poll_every.as_secs(),
            report_secs = self.report_every.as_secs(),
            workers = self.workers,
            "Agent started"
        );

        let mut ticker = interval_at(Instant::now() + self.report_every, self.report_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = self.buffer.take_snapshot();
                    if snapshot.is_empty() {
                        debug!("Nothing polled since last report");
                        continue;
                    }
                    debug!(count = snapshot.len(), "Queueing report");
                    if !pool.submit(snapshot, &shutdown).await {
                        break;
                    }
                }
            }
        }

        if let Err(e) = poller.await {
            warn!(error = %e, "Poll loop panicked");
        }
        pool.shutdown().await;
        info!(total_polls = self.buffer.total_polls(), "Agent stopped");
    }
}

fn poll(source: &dyn MetricSource, buffer: &MetricBuffer) {
    buffer.record_poll(source.sample(), rand::random::<f64>());
}

async fn poll_loop(
    source: Arc<dyn MetricSource>,
    buffer: Arc<MetricBuffer>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => poll(source.as_ref(), &buffer),
        }
    }
    debug!("Poll loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{POLL_COUNT, RANDOM_VALUE};
    use crate::sender::support::MockTransport;
    use metrix_core::MetricRecord;

    struct FixedSource;

    impl MetricSource for FixedSource {
        fn sample(&self) -> Vec<(String, f64)> {
            vec![("Alloc".to_string(), 42.0)]
        }
    }

    fn config() -> AgentConfig {
        AgentConfig {
            poll_interval: 2,
            report_interval: 10,
            rate_limit: 1,
            ..Default::default()
        }
    }

    fn poll_count(batch: &[MetricRecord]) -> i64 {
        batch
            .iter()
            .find(|m| m.id == POLL_COUNT)
            .and_then(|m| m.delta)
            .unwrap_or(0)
    }

    #[test]
    fn test_poll_once_fills_buffer() {
        let transport = Arc::new(MockTransport::new(Vec::new()));
        let agent = Agent::new(
            &config(),
            Arc::new(FixedSource),
            Arc::new(RetryingSender::new(transport, 1)),
        );

        agent.poll_once();
        agent.poll_once();

        let snapshot = agent.buffer().take_snapshot();
        assert_eq!(poll_count(&snapshot), 2);
        assert!(snapshot.iter().any(|m| m.id == "Alloc" && m.value == Some(42.0)));
        let random = snapshot
            .iter()
            .find(|m| m.id == RANDOM_VALUE)
            .and_then(|m| m.value)
            .unwrap();
        assert!((0.0..1.0).contains(&random));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_every_interval_until_shutdown() {
        let transport = Arc::new(MockTransport::new(Vec::new()));
        let agent = Arc::new(Agent::new(
            &config(),
            Arc::new(FixedSource),
            Arc::new(RetryingSender::new(transport.clone(), 1)),
        ));

        let shutdown = CancellationToken::new();
        let runner = {
            let agent = agent.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { agent.run(shutdown).await })
        };

        tokio::time::sleep(Duration::from_secs(21)).await;
        shutdown.cancel();
        runner.await.unwrap();

        let batches = transport.batches();
        assert_eq!(batches.len(), 2);
        for batch in &batches {
            assert!(batch.iter().any(|m| m.id == "Alloc"));
            assert!(poll_count(batch) > 0);
        }

        // Every poll is either delivered or still buffered.
        let delivered: i64 = batches.iter().map(|b| poll_count(b)).sum();
        let pending = poll_count(&agent.buffer().take_snapshot());
        assert_eq!((delivered + pending) as u64, agent.buffer().total_polls());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_first_report_sends_nothing() {
        let transport = Arc::new(MockTransport::new(Vec::new()));
        let agent = Agent::new(
            &config(),
            Arc::new(FixedSource),
            Arc::new(RetryingSender::new(transport.clone(), 1)),
        );

        let shutdown = CancellationToken::new();
        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });
        agent.run(shutdown).await;

        assert!(transport.batches().is_empty());
        assert!(agent.buffer().total_polls() >= 1);
    }
}
