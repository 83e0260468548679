// Tickwork CLI
//
// Design Decision: Use clap derive with env fallbacks so the poller can run from a .env file.
// Design Decision: Ticker settings come from TICKWORK_* env first, flags override them.
// Design Decision: Print one line per handled response; the run report goes to stdout on exit.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use tickwork::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tickwork")]
#[command(about = "Poll an HTTP endpoint at a fixed interval and print each response")]
#[command(version)]
pub struct Cli {
    /// URL to poll
    #[arg(env = "TICKWORK_URL")]
    pub url: String,

    /// HTTP method
    #[arg(long, short = 'X', default_value = "GET", value_parser = parse_method)]
    pub method: Method,

    /// Request header as "Name: value" (repeatable)
    #[arg(long = "header", short = 'H', value_parser = parse_header)]
    pub headers: Vec<(HeaderName, HeaderValue)>,

    /// Request body
    #[arg(long, short = 'd')]
    pub body: Option<String>,

    /// Polling interval in milliseconds (overrides TICKWORK_INTERVAL_MS)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Number of workers (overrides TICKWORK_MAX_WORKERS)
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Interval to use after a failed request, until the next success
    #[arg(long)]
    pub error_interval_ms: Option<u64>,

    /// Stop after this many ticks
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// Print response bodies
    #[arg(long)]
    pub print_body: bool,

    /// Output format for the final report
    #[arg(long, short, default_value = "text", value_parser = ["text", "json"])]
    pub output: String,
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|e| format!("invalid method '{}': {}", raw, e))
}

fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{}'", raw))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| format!("invalid header name '{}': {}", name.trim(), e))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| format!("invalid header value for '{}': {}", name, e))?;
    Ok((name, value))
}

fn init_logging() {
    // RUST_LOG wins; LOG_LEVEL sets the level for both crates
    let filter = std::env::var("RUST_LOG")
        .ok()
        .or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .map(|level| format!("tickwork={},tickwork_cli={}", level, level))
        })
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new("tickwork=info,tickwork_cli=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    fn config(&self) -> TickerConfig {
        let mut config = TickerConfig::from_env();
        if let Some(ms) = self.interval_ms {
            config = config.with_interval(Duration::from_millis(ms));
        }
        if let Some(n) = self.max_workers {
            config = config.with_max_workers(n);
        }
        config
    }

    fn request(&self) -> PollRequest {
        let mut request = PollRequest::new(self.method.clone(), self.url.clone());
        for (name, value) in &self.headers {
            request = request.with_header(name.clone(), value.clone());
        }
        if let Some(body) = &self.body {
            request = request.with_body(body.clone());
        }
        if let Some(ms) = self.timeout_ms {
            request = request.with_timeout(Duration::from_millis(ms));
        }
        request
    }

    fn ticker(&self) -> Ticker {
        let config = self.config();
        let base_interval = config.interval;
        let error_interval = self.error_interval_ms.map(Duration::from_millis);
        let max_ticks = self.max_ticks;
        let print_body = self.print_body;

        Ticker::with_config(config)
            .with_request(self.request())
            .with_handler(move |response: PollResponse| async move {
                println!(
                    "#{} {} {}ms",
                    response.tick,
                    response.status,
                    response.elapsed.as_millis()
                );
                if print_body {
                    println!("{}", response.text());
                }
            })
            .on_error(move |ctx, response, error| {
                let status = response.map(|r| r.status.as_u16());
                tracing::warn!(tick = ctx.tick(), ?status, error = %error, "Poll failed");
                if let Some(backoff) = error_interval {
                    ctx.set_interval(backoff);
                }
                if max_ticks.is_some_and(|max| ctx.tick() >= max) {
                    ctx.stop();
                }
            })
            .after_response(move |ctx, _| {
                ctx.set_interval(base_interval);
                if max_ticks.is_some_and(|max| ctx.tick() >= max) {
                    ctx.stop();
                }
            })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before parsing so its values feed the env fallbacks
    let dotenv = dotenvy::dotenv();
    init_logging();
    if let Ok(path) = dotenv {
        tracing::info!("Loaded .env from {:?}", path);
    }

    let cli = Cli::parse();
    let ticker = cli.ticker();
    ticker.validate().context("Invalid poller configuration")?;

    tracing::info!(
        ticker_id = %ticker.id(),
        url = %cli.url,
        method = %cli.method,
        interval_ms = ticker.config().interval.as_millis() as u64,
        max_workers = ticker.config().max_workers,
        "Starting poller"
    );

    let running = ticker.spawn().context("Failed to start poller")?;

    let stop = running.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            stop.stop();
        }
    });

    let report = match running.join().await {
        Ok(report) => report,
        Err(TickerError::ShutdownTimeout { remaining, report }) => {
            tracing::warn!(remaining, "Aborted handlers still running at shutdown");
            report
        }
        Err(e) => return Err(e).context("Poller failed"),
    };

    match cli.output.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => println!(
            "ticks={} dispatched={} handled={} server_errors={} request_failures={} handler_panics={}",
            report.ticks,
            report.dispatched,
            report.handled,
            report.server_errors,
            report.request_failures,
            report.handler_panics
        ),
    }

    tracing::info!("Poller shutdown complete");
    Ok(())
}
