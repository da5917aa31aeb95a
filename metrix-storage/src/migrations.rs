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

//! PostgreSQL schema migrations.
//!
//! Forward-only. The whole run happens in one transaction holding an
//! advisory lock, so concurrently starting servers migrate exactly once.

use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument};

use metrix_core::{MetrixError, Result};

const SCHEMA_VERSION: i32 = 2;
const MIGRATION_LOCK_KEY: i64 = 0x6d65_7472_6978;

fn migration_failed(e: sqlx::Error) -> MetrixError {
    MetrixError::Storage(format!("migration failed: {e}"))
}

#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await.map_err(migration_failed)?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .map_err(migration_failed)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(&mut *tx)
    .await
    .map_err(migration_failed)?;

    let current_version: Option<i32> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&mut *tx)
            .await
            .map_err(migration_failed)?;
    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(&mut tx).await?;
    }

    if current_version < 2 {
        migrate_to_v2(&mut tx).await?;
    }

    tx.commit().await.map_err(migration_failed)
}

async fn record_version(conn: &mut PgConnection, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
        .bind(version)
        .execute(conn)
        .await
        .map_err(migration_failed)?;
    Ok(())
}

async fn migrate_to_v1(conn: &mut PgConnection) -> Result<()> {
    info!("Running migration to schema version 1");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metric (
            id TEXT NOT NULL,
            type TEXT NOT NULL,
            value DOUBLE PRECISION,
            delta BIGINT,
            PRIMARY KEY (id, type)
        )
        "#,
    )
    .execute(&mut *conn)
    .await
    .map_err(migration_failed)?;

    record_version(conn, 1).await
}

async fn migrate_to_v2(conn: &mut PgConnection) -> Result<()> {
    info!("Running migration to schema version 2");

    // One value column per kind, never both.
    sqlx::query(
        r#"
        ALTER TABLE metric
            ADD CONSTRAINT metric_kind_value CHECK (
                (type = 'gauge' AND delta IS NULL)
                OR (type = 'counter' AND value IS NULL)
            )
        "#,
    )
    .execute(&mut *conn)
    .await
    .map_err(migration_failed)?;

    record_version(conn, 2).await
}
