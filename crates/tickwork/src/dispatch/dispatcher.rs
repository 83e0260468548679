//! Dispatcher: bounded intake and one-to-one assignment to idle workers

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::worker::{JobSlot, Worker};
use super::{DispatchSnapshot, DispatchStats, Handler, WorkerState};
use crate::error::DispatchError;
use crate::request::PollResponse;

/// Owns a fixed set of workers and hands each response to exactly one of them
///
/// # Example
///
/// ```ignore
/// use tickwork::dispatch::{handler_fn, Dispatcher};
/// use tokio_util::sync::CancellationToken;
///
/// let dispatcher = Dispatcher::start(
///     4,
///     4,
///     handler_fn(|response| async move { println!("{}", response.status) }),
///     CancellationToken::new(),
/// );
///
/// dispatcher.dispatch(response).await?;
///
/// // ... later, graceful shutdown
/// dispatcher.shutdown(Duration::from_secs(5)).await?;
/// ```
pub struct Dispatcher {
    inbound: mpsc::Sender<PollResponse>,
    shutdown: CancellationToken,
    workers_shutdown: CancellationToken,
    assigner: JoinHandle<()>,
    workers: JoinSet<()>,
    states: Vec<watch::Receiver<WorkerState>>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Start `max_workers` workers and the assignment task
    ///
    /// `queue_capacity` bounds how many accepted responses may wait for a
    /// worker. Cancelling `shutdown` (or any parent token) closes intake;
    /// responses already accepted are still delivered, then every worker
    /// stops. Must be called inside a tokio runtime.
    pub fn start(
        max_workers: usize,
        queue_capacity: usize,
        handler: Handler,
        shutdown: CancellationToken,
    ) -> Self {
        let max_workers = max_workers.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(queue_capacity.max(1));
        let (idle_tx, idle_rx) = mpsc::channel::<JobSlot>(max_workers);
        let workers_shutdown = CancellationToken::new();
        let stats = Arc::new(DispatchStats::default());

        info!(max_workers, queue_capacity, "Starting dispatcher");

        let mut workers = JoinSet::new();
        let mut states = Vec::with_capacity(max_workers);
        for id in 0..max_workers {
            let (worker, state) = Worker::new(
                id,
                idle_tx.clone(),
                Arc::clone(&handler),
                workers_shutdown.child_token(),
                Arc::clone(&stats),
            );
            states.push(state);
            workers.spawn(worker.run());
        }
        // Only workers hold the registry sender, so it closes once they are all gone
        drop(idle_tx);

        let assigner = tokio::spawn(assign(
            inbound_rx,
            idle_rx,
            shutdown.clone(),
            workers_shutdown.clone(),
            Arc::clone(&stats),
        ));

        Self {
            inbound: inbound_tx,
            shutdown,
            workers_shutdown,
            assigner,
            workers,
            states,
            stats,
        }
    }

    /// Hand a response to the pool
    ///
    /// Waits while the inbound queue is full. Fails with
    /// [`DispatchError::Stopped`] once the dispatcher is stopping.
    pub async fn dispatch(&self, response: PollResponse) -> Result<(), DispatchError> {
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::Stopped);
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(DispatchError::Stopped),
            sent = self.inbound.send(response) => {
                sent.map_err(|_| DispatchError::Stopped)?;
                self.stats.record_accepted();
                Ok(())
            }
        }
    }

    /// Close intake; workers stop once accepted responses are delivered
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Whether a stop has been signalled
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of workers owned by this dispatcher
    pub fn max_workers(&self) -> usize {
        self.states.len()
    }

    /// Current state of every worker
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.states.iter().map(|s| *s.borrow()).collect()
    }

    /// Number of workers currently waiting for a response
    pub fn idle_workers(&self) -> usize {
        self.states
            .iter()
            .filter(|s| *s.borrow() == WorkerState::Idle)
            .count()
    }

    /// Dispatch counters
    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }

    /// Stop, deliver what was already accepted, and wait for the workers
    ///
    /// If that takes longer than `timeout`, the assignment task and all
    /// workers are aborted and [`DispatchError::ShutdownTimeout`] is
    /// returned with the counters reached so far.
    #[instrument(skip(self), fields(max_workers = self.states.len()))]
    pub async fn shutdown(mut self, timeout: Duration) -> Result<DispatchSnapshot, DispatchError> {
        self.shutdown.cancel();

        let assigner = &mut self.assigner;
        let workers = &mut self.workers;
        let workers_shutdown = &self.workers_shutdown;
        let drained = tokio::time::timeout(timeout, async {
            if let Err(e) = assigner.await {
                error!("Assignment task failed: {}", e);
            }
            workers_shutdown.cancel();
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!("Worker task failed: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            let remaining = self.workers.len();
            warn!(remaining, "Dispatcher shutdown timeout reached, aborting workers");
            self.assigner.abort();
            self.workers_shutdown.cancel();
            self.workers.abort_all();
            while self.workers.join_next().await.is_some() {}
            return Err(DispatchError::ShutdownTimeout {
                remaining,
                stats: self.stats.snapshot(),
            });
        }

        let snapshot = self.stats.snapshot();
        info!(
            accepted = snapshot.accepted,
            handled = snapshot.handled,
            "Dispatcher stopped"
        );
        Ok(snapshot)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.workers_shutdown.cancel();
    }
}

/// Assignment loop: one response, one idle worker, repeat
///
/// On stop, intake is closed and the responses already queued are still
/// delivered before the workers are told to stop.
async fn assign(
    mut inbound: mpsc::Receiver<PollResponse>,
    mut idle: mpsc::Receiver<JobSlot>,
    shutdown: CancellationToken,
    workers_shutdown: CancellationToken,
    stats: Arc<DispatchStats>,
) {
    let mut draining = false;
    loop {
        let next = if draining {
            inbound.recv().await
        } else {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Dispatcher intake closed, draining accepted responses");
                    inbound.close();
                    draining = true;
                    continue;
                }
                next = inbound.recv() => next,
            }
        };
        let Some(response) = next else {
            break;
        };
        if !deliver(response, &mut idle, &stats).await {
            break;
        }
    }

    workers_shutdown.cancel();
    debug!("Assignment loop exited");
}

/// Hand one response to one idle worker; false once no worker is left
async fn deliver(
    mut pending: PollResponse,
    idle: &mut mpsc::Receiver<JobSlot>,
    stats: &DispatchStats,
) -> bool {
    loop {
        let Some(slot) = idle.recv().await else {
            warn!(tick = pending.tick, "No workers left to take response");
            return false;
        };

        match slot.send(pending) {
            Ok(()) => {
                stats.record_assigned();
                trace!("Response assigned to worker");
                return true;
            }
            Err(returned) => {
                // Claimed worker stopped after advertising; offer to the next one
                stats.record_reoffered();
                pending = returned;
            }
        }
    }
}
