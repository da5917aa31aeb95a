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

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use metrix_core::{accumulate, Metric, MetricValue, Result};

use super::Repository;

#[derive(Debug, Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// Process-local backend: one map per kind behind a single lock.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    maps: RwLock<Maps>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let maps = self.maps.read();
        maps.gauges.len() + maps.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_durable(&self) -> bool {
        false
    }

    async fn update_gauge(&self, id: &str, value: f64) -> Result<f64> {
        self.maps.write().gauges.insert(id.to_string(), value);
        Ok(value)
    }

    async fn update_counter(&self, id: &str, delta: i64) -> Result<i64> {
        let mut maps = self.maps.write();
        let stored = maps.counters.get(id).copied().unwrap_or(0);
        let total = accumulate(stored, delta)?;
        maps.counters.insert(id.to_string(), total);
        Ok(total)
    }

    async fn get_gauge(&self, id: &str) -> Result<Option<f64>> {
        Ok(self.maps.read().gauges.get(id).copied())
    }

    async fn get_counter(&self, id: &str) -> Result<Option<i64>> {
        Ok(self.maps.read().counters.get(id).copied())
    }

    async fn get_all(&self) -> Result<Vec<Metric>> {
        let maps = self.maps.read();
        let mut gauges: Vec<Metric> = maps
            .gauges
            .iter()
            .map(|(id, value)| Metric::gauge(id.clone(), *value))
            .collect();
        let mut counters: Vec<Metric> = maps
            .counters
            .iter()
            .map(|(id, delta)| Metric::counter(id.clone(), *delta))
            .collect();
        drop(maps);

        gauges.sort_by(|a, b| a.id.cmp(&b.id));
        counters.sort_by(|a, b| a.id.cmp(&b.id));
        gauges.append(&mut counters);
        Ok(gauges)
    }

    async fn set_all(&self, metrics: &[Metric]) -> Result<()> {
        let mut maps = self.maps.write();

        // Stage counter totals first so an overflow leaves the maps untouched.
        let mut staged: HashMap<&str, i64> = HashMap::new();
        for metric in metrics {
            if let MetricValue::Counter(delta) = metric.value {
                let stored = match staged.get(metric.id.as_str()) {
                    Some(total) => *total,
                    None => maps.counters.get(&metric.id).copied().unwrap_or(0),
                };
                staged.insert(metric.id.as_str(), accumulate(stored, delta)?);
            }
        }

        for metric in metrics {
            if let MetricValue::Gauge(value) = metric.value {
                maps.gauges.insert(metric.id.clone(), value);
            }
        }
        for (id, total) in staged {
            maps.counters.insert(id.to_string(), total);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_gauge_last_write_wins() {
        let repo = MemoryRepository::new();
        for value in [1.0, 7.5, -2.25] {
            repo.update_gauge("Alloc", value).await.unwrap();
        }
        assert_eq!(repo.get_gauge("Alloc").await.unwrap(), Some(-2.25));
        assert_eq!(repo.get_gauge("Missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_counter_accumulates() {
        let repo = MemoryRepository::new();
        let mut totals = Vec::new();
        for delta in [5, 3, -1] {
            totals.push(repo.update_counter("PollCount", delta).await.unwrap());
        }
        assert_eq!(totals, vec![5, 8, 7]);
        assert_eq!(repo.get_counter("PollCount").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_kinds_are_separate_namespaces() {
        let repo = MemoryRepository::new();
        repo.update_gauge("X", 1.5).await.unwrap();
        repo.update_counter("X", 2).await.unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all, vec![Metric::gauge("X", 1.5), Metric::counter("X", 2)]);
    }

    #[tokio::test]
    async fn test_set_all_merges_duplicates_in_order() {
        let repo = MemoryRepository::new();
        repo.update_counter("PollCount", 10).await.unwrap();
        repo.set_all(&[
            Metric::counter("PollCount", 1),
            Metric::gauge("Alloc", 1.0),
            Metric::counter("PollCount", 2),
            Metric::gauge("Alloc", 2.0),
        ])
        .await
        .unwrap();

        assert_eq!(repo.get_counter("PollCount").await.unwrap(), Some(13));
        assert_eq!(repo.get_gauge("Alloc").await.unwrap(), Some(2.0));
    }

    #[tokio::test]
    async fn test_set_all_overflow_applies_nothing() {
        let repo = MemoryRepository::new();
        repo.update_counter("Big", i64::MAX - 1).await.unwrap();

        let err = repo
            .set_all(&[Metric::gauge("Alloc", 1.0), Metric::counter("Big", 2)])
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(repo.get_gauge("Alloc").await.unwrap(), None);
        assert_eq!(repo.get_counter("Big").await.unwrap(), Some(i64::MAX - 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_counter_updates() {
        let repo = Arc::new(MemoryRepository::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                for _ in 0..250 {
                    repo.update_counter("Hits", 1).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(repo.get_counter("Hits").await.unwrap(), Some(2000));
    }
}
