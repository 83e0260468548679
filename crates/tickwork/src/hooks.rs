//! Tick lifecycle hooks
//!
//! Hooks run synchronously on the ticker's own task, in registration order:
//! - error hooks after a failed attempt (transport error or 5xx status)
//! - after-response hooks after every other response, before it is dispatched
//!
//! Both receive a [`HookContext`] through which they may change the
//! ticker's interval or request for subsequent ticks, or stop it.

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::request::{PollRequest, PollResponse};

/// Hook invoked on request failure: `(context, response-if-any, error)`
pub type ErrorHook =
    Box<dyn FnMut(&mut HookContext<'_>, Option<&PollResponse>, &FetchError) + Send>;

/// Hook invoked on every non-error response, before dispatch
pub type ResponseHook = Box<dyn FnMut(&mut HookContext<'_>, &PollResponse) + Send>;

/// The ticker's mutable configuration as seen from inside a hook
pub struct HookContext<'a> {
    request: &'a mut PollRequest,
    interval: &'a mut Duration,
    shutdown: &'a CancellationToken,
    tick: u64,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(
        request: &'a mut PollRequest,
        interval: &'a mut Duration,
        shutdown: &'a CancellationToken,
        tick: u64,
    ) -> Self {
        Self {
            request,
            interval,
            shutdown,
            tick,
        }
    }

    /// Tick number being processed (1-based)
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Current polling interval
    pub fn interval(&self) -> Duration {
        *self.interval
    }

    /// Change the polling interval, effective from the next tick
    ///
    /// A zero interval is rejected and leaves the current one in place.
    pub fn set_interval(&mut self, interval: Duration) -> bool {
        if interval.is_zero() {
            warn!(tick = self.tick, "Hook tried to set a zero interval, ignoring");
            return false;
        }
        if interval != *self.interval {
            debug!(tick = self.tick, ?interval, "Hook changed polling interval");
        }
        *self.interval = interval;
        true
    }

    /// The request issued on every tick
    pub fn request(&self) -> &PollRequest {
        self.request
    }

    /// Mutable access to the request (headers, body, method, ...)
    pub fn request_mut(&mut self) -> &mut PollRequest {
        self.request
    }

    /// Replace the request
    pub fn set_request(&mut self, request: PollRequest) {
        *self.request = request;
    }

    /// Point the request at a new URL
    ///
    /// The URL is not validated here; an unusable URL surfaces as a
    /// transport error on the next tick.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.request.url = url.into();
    }

    /// Stop the ticker after the current tick
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Whether a stop has been requested
    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Ordered hook registrations
#[derive(Default)]
pub struct Hooks {
    on_error: Vec<ErrorHook>,
    after_response: Vec<ResponseHook>,
}

impl Hooks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an error hook
    pub fn on_error<F>(&mut self, hook: F)
    where
        F: FnMut(&mut HookContext<'_>, Option<&PollResponse>, &FetchError) + Send + 'static,
    {
        self.on_error.push(Box::new(hook));
    }

    /// Register an after-response hook
    pub fn after_response<F>(&mut self, hook: F)
    where
        F: FnMut(&mut HookContext<'_>, &PollResponse) + Send + 'static,
    {
        self.after_response.push(Box::new(hook));
    }

    /// Number of registered error hooks
    pub fn error_hook_count(&self) -> usize {
        self.on_error.len()
    }

    /// Number of registered after-response hooks
    pub fn response_hook_count(&self) -> usize {
        self.after_response.len()
    }

    pub(crate) fn run_error(
        &mut self,
        ctx: &mut HookContext<'_>,
        response: Option<&PollResponse>,
        error: &FetchError,
    ) {
        for hook in self.on_error.iter_mut() {
            hook(ctx, response, error);
        }
    }

    pub(crate) fn run_after_response(&mut self, ctx: &mut HookContext<'_>, response: &PollResponse) {
        for hook in self.after_response.iter_mut() {
            hook(ctx, response);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_error", &self.on_error.len())
            .field("after_response", &self.after_response.len())
            .finish()
    }
}
