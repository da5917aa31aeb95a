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
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use tracing::info;

use metrix_core::{Metric, MetricRecord, MetricValue, MetrixError, Result, RetryPolicy};

use super::Repository;
use crate::migrations;

const UPSERT_GAUGE: &str = r#"
    INSERT INTO metric (id, type, value, delta) VALUES ($1, 'gauge', $2, NULL)
    ON CONFLICT (id, type) DO UPDATE SET value = EXCLUDED.value
    RETURNING value
"#;

const UPSERT_COUNTER: &str = r#"
    INSERT INTO metric (id, type, value, delta) VALUES ($1, 'counter', NULL, $2)
    ON CONFLICT (id, type) DO UPDATE SET delta = metric.delta + EXCLUDED.delta
    RETURNING delta
"#;

/// SQLSTATE class 08: connection exception.
const CONNECTION_EXCEPTION_CLASS: &str = "08";

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code.starts_with(CONNECTION_EXCEPTION_CLASS)),
        _ => false,
    }
}

fn classify(err: sqlx::Error) -> MetrixError {
    if is_transient(&err) {
        MetrixError::TransientStorage(err.to_string())
    } else {
        MetrixError::Storage(err.to_string())
    }
}

/// For a statement that may already have committed. An I/O failure there
/// leaves the outcome unknown, so it is never retried.
fn classify_committing(err: sqlx::Error) -> MetrixError {
    match err {
        sqlx::Error::Io(e) => MetrixError::Storage(format!("write outcome unknown: {e}")),
        other => classify(other),
    }
}

/// Relational backend: one `metric` row per (id, type), merged by upsert.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresRepository {
    /// Connect, apply migrations and verify the connection.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(dsn)
            .await
            .map_err(classify)?;

        migrations::run(&pool).await?;

        let repo = Self::from_pool(pool);
        repo.ping().await?;
        info!("PostgreSQL repository ready");
        Ok(repo)
    }

    /// Wrap an existing pool. Migrations are not applied.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::new(3).with_max_delay(Duration::from_secs(5)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn retrying<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry
            .execute(operation, MetrixError::is_transient_storage)
            .await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn is_durable(&self) -> bool {
        true
    }

    async fn update_gauge(&self, id: &str, value: f64) -> Result<f64> {
        self.retrying(|| async move {
            sqlx::query_scalar::<_, f64>(UPSERT_GAUGE)
                .bind(id)
                .bind(value)
                .fetch_one(&self.pool)
                .await
                .map_err(classify)
        })
        .await
    }

    /// Counter upserts are not idempotent: only failures to obtain a
    /// connection are retried, never an I/O error after the statement went
    /// out.
    async fn update_counter(&self, id: &str, delta: i64) -> Result<i64> {
        self.retrying(|| async move {
            let mut conn = self.pool.acquire().await.map_err(classify)?;
            sqlx::query_scalar::<_, i64>(UPSERT_COUNTER)
                .bind(id)
                .bind(delta)
                .fetch_one(&mut *conn)
                .await
                .map_err(classify_committing)
        })
        .await
    }

    async fn get_gauge(&self, id: &str) -> Result<Option<f64>> {
        self.retrying(|| async move {
            let value: Option<Option<f64>> =
                sqlx::query_scalar("SELECT value FROM metric WHERE type = 'gauge' AND id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(classify)?;
            Ok(value.flatten())
        })
        .await
    }

    async fn get_counter(&self, id: &str) -> Result<Option<i64>> {
        self.retrying(|| async move {
            let delta: Option<Option<i64>> =
                sqlx::query_scalar("SELECT delta FROM metric WHERE type = 'counter' AND id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(classify)?;
            Ok(delta.flatten())
        })
        .await
    }

    async fn get_all(&self) -> Result<Vec<Metric>> {
        let rows: Vec<(String, String, Option<f64>, Option<i64>)> = self
            .retrying(|| async move {
                sqlx::query_as("SELECT id, type, value, delta FROM metric ORDER BY type DESC, id")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(classify)
            })
            .await?;

        rows.into_iter()
            .map(|(id, kind, value, delta)| {
                Metric::try_from(MetricRecord {
                    id,
                    kind,
                    delta,
                    value,
                })
                .map_err(|e| MetrixError::Storage(format!("corrupt metric row: {e}")))
            })
            .collect()
    }

    async fn set_all(&self, metrics: &[Metric]) -> Result<()> {
        self.retrying(|| async move {
            let mut tx = self.pool.begin().await.map_err(classify)?;
            for metric in metrics {
                let query = match metric.value {
                    MetricValue::Gauge(value) => {
                        sqlx::query(UPSERT_GAUGE).bind(&metric.id).bind(value)
                    }
                    MetricValue::Counter(delta) => {
                        sqlx::query(UPSERT_COUNTER).bind(&metric.id).bind(delta)
                    }
                };
                query.execute(&mut *tx).await.map_err(classify)?;
            }
            // Uncommitted statements roll back with the connection; a lost
            // COMMIT does not.
            tx.commit().await.map_err(classify_committing)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }
}
