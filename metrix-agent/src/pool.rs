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

//! Bounded queue of report snapshots drained by a fixed set of workers.
//!
//! At most `size` deliveries are in flight at once and at most `size`
//! snapshots wait in the queue; a full queue applies back-pressure to the
//! report loop.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use metrix_core::MetricRecord;

use crate::sender::RetryingSender;

type Snapshot = Vec<MetricRecord>;

pub struct WorkerPool {
    queue: Option<mpsc::Sender<Snapshot>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// `size` of zero is treated as one.
    pub fn spawn(size: usize, sender: Arc<RetryingSender>, shutdown: CancellationToken) -> Self {
        let size = size.max(1);
        let (tx, rx) = mpsc::channel::<Snapshot>(size);
        let receiver = Arc::new(Mutex::new(rx));

        let workers = (0..size)
            .map(|worker| {
                let receiver = receiver.clone();
                let sender = sender.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    run_worker(worker, receiver, sender, shutdown).await;
                })
            })
            .collect();

        info!(workers = size, transport = sender.transport_name(), "Worker pool started");
        Self {
            queue: Some(tx),
            workers,
        }
    }

    /// Enqueue a snapshot, waiting while the queue is full. Returns `false`
    /// when the pool is shutting down and the snapshot was dropped.
    pub async fn submit(&self, snapshot: Snapshot, shutdown: &CancellationToken) -> bool {
        let Some(queue) = &self.queue else {
            return false;
        };
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            sent = queue.send(snapshot) => sent.is_ok(),
        }
    }

    /// Close the queue and wait for the workers to drain it.
    pub async fn shutdown(mut self) {
        self.queue.take();
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Report worker panicked");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Snapshot>>>,
    sender: Arc<RetryingSender>,
    shutdown: CancellationToken,
) {
    loop {
        // Guard is released before delivery so other workers can receive.
        let next = receiver.lock().await.recv().await;
        let Some(snapshot) = next else {
            break;
        };

        match sender.deliver(&snapshot, &shutdown).await {
            Ok(()) => debug!(worker, count = snapshot.len(), "Snapshot delivered"),
            Err(e) => error!(worker, count = snapshot.len(), error = %e, "Dropping snapshot"),
        }
    }
    debug!(worker, "Report worker exiting");
}
