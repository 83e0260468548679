//! The ticker: fixed-interval request loop
//!
//! On every tick the ticker executes its request, classifies the outcome,
//! runs the matching hooks and forwards successful responses to its
//! [`Dispatcher`]. Response processing never delays the next tick beyond
//! the single `dispatch()` call, which waits only when every worker is busy
//! and the pending queue is full.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{TickerConfig, MAX_INTERVAL};
use crate::dispatch::{handler_fn, Dispatcher, Handler};
use crate::error::{ConfigError, DispatchError, FetchError, TickerError};
use crate::executor::{HttpExecutor, RequestExecutor};
use crate::hooks::{HookContext, Hooks};
use crate::request::{PollRequest, PollResponse};

/// Counters for one ticker run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickerReport {
    /// Request attempts made
    pub ticks: u64,
    /// Responses forwarded to the dispatcher
    pub dispatched: u64,
    /// Attempts that failed in the executor
    pub request_failures: u64,
    /// Attempts answered with a 5xx status
    pub server_errors: u64,
    /// Handler invocations that completed
    pub handled: u64,
    /// Handler invocations that panicked
    pub handler_panics: u64,
}

/// Fixed-interval poller
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use tickwork::Ticker;
///
/// let mut ticker = Ticker::new()
///     .with_url("http://localhost:8080/status")
///     .with_interval(Duration::from_secs(5))
///     .with_max_workers(5)
///     .with_handler(|response| async move {
///         println!("{} {}", response.tick, response.status);
///     })
///     .on_error(|ctx, _response, error| {
///         eprintln!("tick {} failed: {}", ctx.tick(), error);
///         ctx.set_interval(Duration::from_secs(30));
///     });
///
/// // Blocks until stopped
/// let report = ticker.start().await?;
/// ```
pub struct Ticker {
    id: String,
    config: TickerConfig,
    request: Option<PollRequest>,
    handler: Option<Handler>,
    executor: Arc<dyn RequestExecutor>,
    hooks: Hooks,
    shutdown: CancellationToken,
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker {
    /// Create an unconfigured ticker with default settings
    pub fn new() -> Self {
        Self::with_config(TickerConfig::default())
    }

    /// Create an unconfigured ticker with the given settings
    pub fn with_config(config: TickerConfig) -> Self {
        Self {
            id: format!("ticker-{}", Uuid::now_v7()),
            config,
            request: None,
            handler: None,
            executor: Arc::new(HttpExecutor::new()),
            hooks: Hooks::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Poll the given URL with GET
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.request = Some(PollRequest::get(url));
        self
    }

    /// Poll with a full request template
    pub fn with_request(mut self, request: PollRequest) -> Self {
        self.request = Some(request);
        self
    }

    /// Set the polling interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the number of workers
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.config = self.config.with_max_workers(max);
        self
    }

    /// Set the pending response buffer size
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_queue_capacity(capacity);
        self
    }

    /// Set how long shutdown waits for busy workers
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Set the response handler
    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(PollResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handler = Some(handler_fn(handler));
        self
    }

    /// Set an already-wrapped response handler
    pub fn with_shared_handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Replace the request executor
    pub fn with_executor<E>(mut self, executor: E) -> Self
    where
        E: RequestExecutor + 'static,
    {
        self.executor = Arc::new(executor);
        self
    }

    /// Use the default HTTP executor with a custom client
    pub fn with_http_client(self, client: reqwest::Client) -> Self {
        self.with_executor(HttpExecutor::with_client(client))
    }

    /// Register an error hook (runs in registration order)
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut HookContext<'_>, Option<&PollResponse>, &FetchError) + Send + 'static,
    {
        self.hooks.on_error(hook);
        self
    }

    /// Register an after-response hook (runs in registration order)
    pub fn after_response<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut HookContext<'_>, &PollResponse) + Send + 'static,
    {
        self.hooks.after_response(hook);
        self
    }

    /// Unique id, used in log spans
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current settings (reflects interval changes made by hooks)
    pub fn config(&self) -> &TickerConfig {
        &self.config
    }

    /// Current request (reflects changes made by hooks)
    pub fn request(&self) -> Option<&PollRequest> {
        self.request.as_ref()
    }

    /// Registered hooks
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Handle that can stop this ticker from another task
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.shutdown.clone(),
        }
    }

    /// Signal the loop to exit; cascades to the dispatcher and its workers
    ///
    /// A tick already in flight completes, and its response is still handed
    /// to a worker.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Check that the ticker can start
    ///
    /// The target is checked before the handler.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let request = self.request.as_ref().ok_or(ConfigError::MissingTarget)?;
        if self.handler.is_none() {
            return Err(ConfigError::MissingHandler);
        }
        request.parsed_url()?;
        if self.config.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    /// Run the polling loop until stopped
    ///
    /// Returns immediately with a [`ConfigError`] if the ticker is not fully
    /// configured; no request is made in that case. A ticker runs at most
    /// once: starting it after a stop returns [`TickerError::AlreadyStopped`].
    #[instrument(skip(self), fields(ticker_id = %self.id))]
    pub async fn start(&mut self) -> Result<TickerReport, TickerError> {
        self.validate()?;
        if self.shutdown.is_cancelled() {
            return Err(TickerError::AlreadyStopped);
        }

        let Self {
            config,
            request,
            handler,
            executor,
            hooks,
            shutdown,
            ..
        } = self;
        let (Some(request), Some(handler)) = (request.as_mut(), handler.clone()) else {
            return Err(ConfigError::MissingTarget.into());
        };

        info!(
            url = %request.url,
            interval_ms = config.interval.as_millis() as u64,
            max_workers = config.max_workers,
            "Starting ticker"
        );

        // Own token: a stop raised during a tick must not reject that tick's response
        let dispatcher = Dispatcher::start(
            config.max_workers,
            config.queue_capacity(),
            handler,
            CancellationToken::new(),
        );

        let mut report = TickerReport::default();
        let mut period = config.interval;
        let mut timer = new_timer(period);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            report.ticks += 1;
            let tick = report.ticks;
            debug!(tick, url = %request.url, "Executing request");

            let outcome = executor.execute(request).await;

            let forward = {
                let mut ctx = HookContext::new(request, &mut config.interval, shutdown, tick);
                match classify(outcome, tick) {
                    Ok(response) => {
                        hooks.run_after_response(&mut ctx, &response);
                        Some(response)
                    }
                    Err((response, error)) => {
                        if error.is_server_status() {
                            report.server_errors += 1;
                        } else {
                            report.request_failures += 1;
                        }
                        warn!(tick, error = %error, "Request failed, waiting for next tick");
                        hooks.run_error(&mut ctx, response.as_ref(), &error);
                        None
                    }
                }
            };

            if let Some(response) = forward {
                if let Err(e) = dispatcher.dispatch(response).await {
                    warn!(tick, error = %e, "Dispatcher rejected response");
                    break;
                }
                report.dispatched += 1;
            }

            if config.interval != period {
                period = config.interval;
                timer = new_timer(period);
                info!(interval_ms = period.as_millis() as u64, "Polling interval changed");
            }
        }

        match dispatcher.shutdown(config.shutdown_timeout).await {
            Ok(stats) => {
                report.handled = stats.handled;
                report.handler_panics = stats.panicked;
            }
            Err(DispatchError::ShutdownTimeout { remaining, stats }) => {
                report.handled = stats.handled;
                report.handler_panics = stats.panicked;
                warn!(
                    remaining,
                    ticks = report.ticks,
                    dispatched = report.dispatched,
                    handled = report.handled,
                    "Ticker stopped with handlers still running"
                );
                return Err(TickerError::ShutdownTimeout { remaining, report });
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            ticks = report.ticks,
            dispatched = report.dispatched,
            handled = report.handled,
            "Ticker stopped"
        );
        Ok(report)
    }

    /// Validate, then run the loop on a background task
    pub fn spawn(mut self) -> Result<RunningTicker, TickerError> {
        self.validate()?;
        if self.shutdown.is_cancelled() {
            return Err(TickerError::AlreadyStopped);
        }

        let stop = self.stop_handle();
        let handle = tokio::spawn(async move { self.start().await });
        Ok(RunningTicker { stop, handle })
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticker")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("request", &self.request)
            .field("has_handler", &self.handler.is_some())
            .field("hooks", &self.hooks)
            .field("stopped", &self.shutdown.is_cancelled())
            .finish()
    }
}

/// Stops a ticker from outside its loop
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Signal the ticker to stop
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether a stop has been signalled
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until a stop is signalled
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

/// A ticker running on a background task
#[derive(Debug)]
pub struct RunningTicker {
    stop: StopHandle,
    handle: JoinHandle<Result<TickerReport, TickerError>>,
}

impl RunningTicker {
    /// Handle that can stop the ticker
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the ticker and wait for its report
    pub async fn stop(self) -> Result<TickerReport, TickerError> {
        self.stop.stop();
        self.join().await
    }

    /// Wait for the ticker to exit on its own (e.g. a hook called `stop`)
    pub async fn join(self) -> Result<TickerReport, TickerError> {
        self.handle.await?
    }
}

fn new_timer(period: Duration) -> Interval {
    let period = period.min(MAX_INTERVAL);
    // First attempt one period after start, and never burst after a slow request
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Split an attempt into a forwardable response or an error-hook payload
fn classify(
    outcome: Result<PollResponse, FetchError>,
    tick: u64,
) -> Result<PollResponse, (Option<PollResponse>, FetchError)> {
    match outcome {
        Ok(mut response) => {
            response.tick = tick;
            if response.is_server_error() {
                let status = response.status;
                Err((Some(response), FetchError::ServerStatus(status)))
            } else {
                Ok(response)
            }
        }
        Err(error) => Err((None, error)),
    }
}
