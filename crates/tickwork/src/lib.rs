//! # Tickwork
//!
//! A fixed-interval HTTP polling engine. A ticker issues one request per
//! tick and hands every successful response to a bounded pool of workers
//! running a user-supplied async handler.
//!
//! ## Features
//!
//! - **Fixed-interval polling**: first attempt one interval after start, no catch-up bursts
//! - **Lifecycle hooks**: ordered error and after-response hooks that can adjust the interval, rewrite the request or stop the ticker
//! - **Bounded worker pool**: at most `max_workers` handler invocations in flight, each response handled exactly once
//! - **Backpressure**: the ticker waits only when every worker is busy and the pending queue is full
//! - **Graceful shutdown**: one stop signal cascades from the ticker to the dispatcher to every worker
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Ticker                              │
//! │  (interval timer, request executor, error/response hooks)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ dispatch()
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                            │
//! │  (bounded inbound queue, pairs responses with idle workers) │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Worker × max_workers                     │
//! │  (runs the handler, re-advertises itself when done)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use tickwork::prelude::*;
//!
//! let running = Ticker::new()
//!     .with_url("https://api.example.com/updates")
//!     .with_interval(Duration::from_secs(1))
//!     .with_max_workers(4)
//!     .with_handler(|response: PollResponse| async move {
//!         println!("tick {}: {}", response.tick, response.text());
//!     })
//!     .after_response(|ctx, _response| {
//!         if ctx.tick() >= 100 {
//!             ctx.stop();
//!         }
//!     })
//!     .spawn()?;
//!
//! let report = running.join().await?;
//! println!("{} ticks, {} handled", report.ticks, report.handled);
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod request;
pub mod ticker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::TickerConfig;
    pub use crate::dispatch::{handler_fn, Handler};
    pub use crate::error::{ConfigError, FetchError, TickerError};
    pub use crate::executor::{HttpExecutor, RequestExecutor};
    pub use crate::hooks::HookContext;
    pub use crate::request::{PollRequest, PollResponse};
    pub use crate::ticker::{RunningTicker, StopHandle, Ticker, TickerReport};
}

// Re-export key types at crate root
pub use config::TickerConfig;
pub use dispatch::{handler_fn, DispatchSnapshot, Dispatcher, Handler, WorkerState};
pub use error::{ConfigError, DispatchError, FetchError, Result, TickerError};
pub use executor::{HttpExecutor, RequestExecutor};
pub use hooks::{ErrorHook, HookContext, Hooks, ResponseHook};
pub use request::{PollRequest, PollResponse};
pub use ticker::{RunningTicker, StopHandle, Ticker, TickerReport};
