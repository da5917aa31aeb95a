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

//! Metrics observed since the last report.

use parking_lot::Mutex;
use std::collections::BTreeMap;

use metrix_core::{Metric, MetricRecord};

pub const POLL_COUNT: &str = "PollCount";
pub const RANDOM_VALUE: &str = "RandomValue";

#[derive(Debug, Default)]
struct Inner {
    gauges: BTreeMap<String, f64>,
    polls_since_report: i64,
    total_polls: u64,
}

/// Shared between the poll and report loops.
///
/// Gauges keep their latest sample. `PollCount` is reported as the number of
/// polls since the previous snapshot, so the server-side counter adds up to
/// the total number of delivered polls.
#[derive(Debug, Default)]
pub struct MetricBuffer {
    inner: Mutex<Inner>,
}

impl MetricBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one poll: its gauge samples plus one random sample.
    pub fn record_poll(&self, samples: impl IntoIterator<Item = (String, f64)>, random: f64) {
        let mut inner = self.inner.lock();
        // The server rejects a whole batch containing a non-finite gauge.
        inner
            .gauges
            .extend(samples.into_iter().filter(|(_, value)| value.is_finite()));
        inner.gauges.insert(RANDOM_VALUE.to_string(), random);
        inner.polls_since_report += 1;
        inner.total_polls += 1;
    }

    /// Drain the buffer into a report batch. Empty when nothing was polled.
    pub fn take_snapshot(&self) -> Vec<MetricRecord> {
        let mut inner = self.inner.lock();
        let gauges = std::mem::take(&mut inner.gauges);
        let polls = std::mem::take(&mut inner.polls_since_report);
        drop(inner);

        let mut snapshot: Vec<MetricRecord> = gauges
            .into_iter()
            .map(|(id, value)| MetricRecord::from(Metric::gauge(id, value)))
            .collect();
        if polls > 0 {
            snapshot.push(MetricRecord::from(Metric::counter(POLL_COUNT, polls)));
        }
        snapshot
    }

    /// Polls since the agent started.
    pub fn total_polls(&self) -> u64 {
        self.inner.lock().total_polls
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.gauges.is_empty() && inner.polls_since_report == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(alloc: f64) -> Vec<(String, f64)> {
        vec![("Alloc".to_string(), alloc), ("Frees".to_string(), 1.0)]
    }

    #[test]
    fn test_snapshot_keeps_last_gauge_and_counts_polls() {
        let buffer = MetricBuffer::new();
        buffer.record_poll(samples(1.0), 0.1);
        buffer.record_poll(samples(2.0), 0.2);
        buffer.record_poll(samples(3.0), 0.3);

        let snapshot = buffer.take_snapshot();
        assert_eq!(
            snapshot,
            vec![
                MetricRecord::from(Metric::gauge("Alloc", 3.0)),
                MetricRecord::from(Metric::gauge("Frees", 1.0)),
                MetricRecord::from(Metric::gauge(RANDOM_VALUE, 0.3)),
                MetricRecord::from(Metric::counter(POLL_COUNT, 3)),
            ]
        );
    }

    #[test]
    fn test_snapshot_drains() {
        let buffer = MetricBuffer::new();
        buffer.record_poll(samples(1.0), 0.5);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.take_snapshot().len(), 4);

        assert!(buffer.is_empty());
        assert!(buffer.take_snapshot().is_empty());

        buffer.record_poll(Vec::new(), 0.5);
        let snapshot = buffer.take_snapshot();
        assert_eq!(snapshot.last().unwrap().delta, Some(1));
        assert_eq!(buffer.total_polls(), 2);
    }

    #[test]
    fn test_non_finite_samples_are_skipped() {
        let buffer = MetricBuffer::new();
        buffer.record_poll(
            vec![
                ("CPUutilization1".to_string(), f64::NAN),
                ("Alloc".to_string(), 7.0),
            ],
            0.5,
        );

        let snapshot = buffer.take_snapshot();
        assert!(snapshot.iter().all(|m| m.id != "CPUutilization1"));
        assert!(snapshot.iter().any(|m| m.id == "Alloc"));
    }
}
