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

//! Storage backends.
//!
//! A [`Repository`] only knows how to apply the per-kind merge rule to
//! already-validated metrics. Parsing and validation live in
//! [`crate::StorageService`].

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

use async_trait::async_trait;
use metrix_core::{Metric, Result};

#[async_trait]
pub trait Repository: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Durable backends keep their data across restarts and never take part
    /// in file backup or restore.
    fn is_durable(&self) -> bool;

    /// Overwrite the gauge `id`. Returns the stored value.
    async fn update_gauge(&self, id: &str, value: f64) -> Result<f64>;

    /// Add `delta` to the counter `id`, starting from zero. Returns the total
    /// produced by this write.
    async fn update_counter(&self, id: &str, delta: i64) -> Result<i64>;

    async fn get_gauge(&self, id: &str) -> Result<Option<f64>>;

    async fn get_counter(&self, id: &str) -> Result<Option<i64>>;

    /// Every stored metric, ordered by kind then id.
    async fn get_all(&self) -> Result<Vec<Metric>>;

    /// Merge a batch in input order. Either every metric is applied or none.
    async fn set_all(&self, metrics: &[Metric]) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}
