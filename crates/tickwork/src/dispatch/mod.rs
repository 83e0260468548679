//! Response dispatch to a fixed worker pool
//!
//! This module provides:
//! - [`Dispatcher`] - owns the workers and pairs each response with one idle worker
//! - [`Handler`] - the user callback every worker runs
//! - [`WorkerState`] - per-worker lifecycle state
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐ dispatch() ┌──────────────────┐        ┌──────────────────┐
//! │  Ticker  │───────────▶│  inbound queue   │───────▶│ assignment task  │
//! └──────────┘  (blocks   │ (bounded, cap N) │        │ 1 response ⇄ 1   │
//!               when full)└──────────────────┘        │ idle job slot    │
//!                                                     └────────┬─────────┘
//!                                   ┌──────────────────┐       │ oneshot
//!                                   │  idle registry   │◀──────┘
//!                                   │ (job slots)      │
//!                                   └──────────────────┘
//!                                      ▲   ▲   ▲ advertise when idle
//!                                   [W1] [W2] ... [Wn]  run handler
//! ```
//!
//! A worker advertises a fresh single-use job slot every time it becomes
//! idle, so it can never be assigned two responses at once. The only queue
//! between ticker and workers is the bounded inbound channel; when it is
//! full `dispatch()` waits, which is the ticker's single backpressure point.

mod dispatcher;
mod worker;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::request::PollResponse;

pub use dispatcher::Dispatcher;

/// Response handler shared by all workers
///
/// Invoked once per dispatched response; may run on up to `max_workers`
/// workers concurrently.
pub type Handler = Arc<dyn Fn(PollResponse) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`Handler`]
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(PollResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |response| Box::pin(f(response)))
}

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Advertised in the idle registry, waiting to be claimed
    Idle,
    /// Running the handler on a response
    Busy,
    /// Stopped; never leaves this state
    Terminated,
}

/// Dispatch counters, updated lock-free by the dispatcher and its workers
#[derive(Debug, Default)]
pub struct DispatchStats {
    accepted: AtomicU64,
    assigned: AtomicU64,
    handled: AtomicU64,
    panicked: AtomicU64,
    reoffered: AtomicU64,
}

impl DispatchStats {
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_assigned(&self) {
        self.assigned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reoffered(&self) {
        self.reoffered.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            assigned: self.assigned.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            reoffered: self.reoffered.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    /// Responses accepted into the inbound queue
    pub accepted: u64,
    /// Responses delivered to a worker
    pub assigned: u64,
    /// Handler invocations that returned normally
    pub handled: u64,
    /// Handler invocations that panicked
    pub panicked: u64,
    /// Deliveries retried because the claimed worker had already stopped
    pub reoffered: u64,
}
