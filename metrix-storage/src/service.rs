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

//! Storage Service: the single entry point for metric writes and reads.
//!
//! Validates input, routes it to the active [`Repository`] and owns the file
//! backup of non-durable backends.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Serializer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use metrix_core::{Metric, MetricKind, MetricRecord, MetricValue, MetrixError, Result};

use crate::repository::Repository;

/// Backup settings.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Snapshot file. No file means no backup and no restore.
    pub path: Option<PathBuf>,
    /// Period of the backup loop. Zero switches to write-through.
    pub interval: Duration,
}

pub struct StorageService {
    repo: Arc<dyn Repository>,
    backup: BackupOptions,
    backup_lock: tokio::sync::Mutex<()>,
}

impl StorageService {
    pub fn new(repo: Arc<dyn Repository>, backup: BackupOptions) -> Self {
        Self {
            repo,
            backup,
            backup_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// In-memory service without backup, for tests and embedding.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(crate::MemoryRepository::new()),
            BackupOptions::default(),
        )
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    fn backup_path(&self) -> Option<&Path> {
        if self.repo.is_durable() {
            return None;
        }
        self.backup.path.as_deref()
    }

    /// Every accepted write is followed by a synchronous backup.
    pub fn is_write_through(&self) -> bool {
        self.backup_path().is_some() && self.backup.interval.is_zero()
    }

    /// Parse `raw` per `kind` and merge it. Returns the stored value.
    pub async fn save_raw(&self, kind: &str, id: &str, raw: &str) -> Result<MetricValue> {
        let kind: MetricKind = kind.parse()?;
        let value = MetricValue::parse(kind, raw)?;
        if id.is_empty() {
            return Err(MetrixError::invalid_value(kind, "empty metric id"));
        }
        self.apply(&Metric {
            id: id.to_string(),
            value,
        })
        .await
    }

    /// Merge a structured metric. Returns the record filled with the stored
    /// value.
    pub async fn save_metric(&self, record: &MetricRecord) -> Result<MetricRecord> {
        let metric = Metric::try_from(record)?;
        let merged = self.apply(&metric).await?;

        let mut stored = MetricRecord::query(metric.kind(), metric.id);
        stored.fill(merged);
        Ok(stored)
    }

    /// Validate every record, then merge the whole batch atomically.
    pub async fn save_batch(&self, records: &[MetricRecord]) -> Result<usize> {
        let metrics = records
            .iter()
            .map(Metric::try_from)
            .collect::<Result<Vec<_>>>()?;
        if metrics.is_empty() {
            return Ok(0);
        }

        self.repo.set_all(&metrics).await?;
        debug!(count = metrics.len(), backend = self.repo.name(), "batch applied");
        self.after_write().await;
        Ok(metrics.len())
    }

    /// Merge one metric. Returns the value this write produced.
    async fn apply(&self, metric: &Metric) -> Result<MetricValue> {
        let merged = match metric.value {
            MetricValue::Gauge(value) => {
                MetricValue::Gauge(self.repo.update_gauge(&metric.id, value).await?)
            }
            MetricValue::Counter(delta) => {
                MetricValue::Counter(self.repo.update_counter(&metric.id, delta).await?)
            }
        };
        self.after_write().await;
        Ok(merged)
    }

    async fn after_write(&self) {
        if self.is_write_through() {
            if let Err(e) = self.backup().await {
                error!(error = %e, "write-through backup failed");
            }
        }
    }

    /// Current value of `kind`/`id`.
    pub async fn get(&self, kind: &str, id: &str) -> Result<MetricValue> {
        self.get_value(kind.parse()?, id).await
    }

    async fn get_value(&self, kind: MetricKind, id: &str) -> Result<MetricValue> {
        let value = match kind {
            MetricKind::Gauge => self.repo.get_gauge(id).await?.map(MetricValue::Gauge),
            MetricKind::Counter => self.repo.get_counter(id).await?.map(MetricValue::Counter),
        };
        value.ok_or_else(|| MetrixError::not_found(kind, id))
    }

    /// Fill `record`'s value slot from the store, keyed by its id and type.
    pub async fn get_metric(&self, record: &mut MetricRecord) -> Result<()> {
        let kind = record.metric_kind()?;
        let value = self.get_value(kind, &record.id).await?;
        record.fill(value);
        Ok(())
    }

    pub async fn get_all(&self) -> Result<Vec<Metric>> {
        self.repo.get_all().await
    }

    pub async fn ping(&self) -> Result<()> {
        self.repo.ping().await
    }

    /// Write the full snapshot to the backup file.
    ///
    /// The snapshot goes to a sibling temporary file first and is renamed
    /// over the target, so readers never see a partial file.
    pub async fn backup(&self) -> Result<usize> {
        let Some(path) = self.backup_path() else {
            return Ok(0);
        };

        let _guard = self.backup_lock.lock().await;
        let records: Vec<MetricRecord> = self
            .repo
            .get_all()
            .await?
            .iter()
            .map(MetricRecord::from)
            .collect();

        let mut body = Vec::with_capacity(64 * records.len() + 2);
        let mut serializer =
            Serializer::with_formatter(&mut body, PrettyFormatter::with_indent(b"    "));
        records.serialize(&mut serializer)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(count = records.len(), path = %path.display(), "backup written");
        Ok(records.len())
    }

    /// Replay the backup file through the batch merge path.
    ///
    /// A missing file is an empty snapshot. Durable backends skip restore.
    pub async fn restore(&self) -> Result<usize> {
        let Some(path) = self.backup_path() else {
            return Ok(0);
        };

        let body = match tokio::fs::read(path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no backup to restore");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(0);
        }

        let records: Vec<MetricRecord> = serde_json::from_slice(&body)?;
        let metrics = records
            .iter()
            .map(Metric::try_from)
            .collect::<Result<Vec<_>>>()?;
        self.repo.set_all(&metrics).await?;

        info!(count = metrics.len(), path = %path.display(), "metrics restored");
        Ok(metrics.len())
    }

    /// Start the periodic backup task. Returns `None` when there is nothing to
    /// schedule (durable backend, no file, or write-through mode).
    ///
    /// The task takes a final backup when `shutdown` is cancelled.
    pub fn spawn_backup_loop(self: &Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        if self.backup_path().is_none() || self.is_write_through() {
            return None;
        }

        let service = Arc::clone(self);
        let period = self.backup.interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = period.as_secs(), "backup loop started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = service.backup().await {
                            warn!(error = %e, "periodic backup failed");
                        }
                    }
                }
            }

            match service.backup().await {
                Ok(count) => info!(count, "final backup written"),
                Err(e) => error!(error = %e, "final backup failed"),
            }
        }))
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
