//! Worker lifecycle
//!
//! `Idle → (claimed) → Busy → (handler returns) → Idle`, and
//! `Idle | Busy → (stop) → Terminated`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use super::{DispatchStats, Handler, WorkerState};
use crate::request::PollResponse;

/// Single-use slot a worker advertises while idle
pub(crate) type JobSlot = oneshot::Sender<PollResponse>;

pub(crate) struct Worker {
    id: usize,
    idle: mpsc::Sender<JobSlot>,
    handler: Handler,
    shutdown: CancellationToken,
    state: watch::Sender<WorkerState>,
    stats: Arc<DispatchStats>,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        idle: mpsc::Sender<JobSlot>,
        handler: Handler,
        shutdown: CancellationToken,
        stats: Arc<DispatchStats>,
    ) -> (Self, watch::Receiver<WorkerState>) {
        let (state, state_rx) = watch::channel(WorkerState::Idle);
        let worker = Self {
            id,
            idle,
            handler,
            shutdown,
            state,
            stats,
        };
        (worker, state_rx)
    }

    pub(crate) async fn run(self) {
        debug!(worker = self.id, "Worker started");

        loop {
            // Idle: a fresh slot per cycle, so a worker is claimable at most once
            let (slot, job) = oneshot::channel();
            self.state.send_replace(WorkerState::Idle);

            let advertised = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => false,
                sent = self.idle.send(slot) => sent.is_ok(),
            };
            if !advertised {
                break;
            }

            // A delivered job wins over a concurrent stop
            let response = tokio::select! {
                biased;
                delivered = job => match delivered {
                    Ok(response) => response,
                    Err(_) => break,
                },
                _ = self.shutdown.cancelled() => break,
            };

            self.state.send_replace(WorkerState::Busy);
            self.handle(response).await;
        }

        self.state.send_replace(WorkerState::Terminated);
        debug!(worker = self.id, "Worker stopped");
    }

    async fn handle(&self, response: PollResponse) {
        let tick = response.tick;
        trace!(worker = self.id, tick, status = %response.status, "Worker: handling response");

        let handler = Arc::clone(&self.handler);
        let outcome = AssertUnwindSafe(async move { handler(response).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(()) => self.stats.record_handled(),
            Err(_) => {
                self.stats.record_panicked();
                error!(worker = self.id, tick, "Response handler panicked");
            }
        }
    }
}
