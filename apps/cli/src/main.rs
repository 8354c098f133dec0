//! `steadfast`: issue one HTTP call through the resilient client and print the
//! result envelope as JSON.
//!
//! Client settings come from `SF_*` environment variables (and `.env`); log
//! output is controlled by `RUST_LOG` and `SF_LOG_FORMAT` (`text` or `json`).

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use serde_json::{json, Value};
use steadfast_client::{
    ApiResponse, ClientConfig, Method, RequestError, RequestOptions, ResilientClient,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "steadfast", version, about = "Send an HTTP request with retries and circuit breaking")]
struct Args {
    /// Endpoint path resolved against SF_BASE_URL, or an absolute URL
    endpoint: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// JSON request body
    #[arg(short, long)]
    data: Option<String>,

    /// Extra header as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Make exactly one attempt, bypassing the circuit breaker
    #[arg(long)]
    skip_retry: bool,

    /// Per-attempt timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Maximum attempts for this call
    #[arg(long)]
    max_retries: Option<u32>,

    /// Use this correlation id instead of generating one
    #[arg(long)]
    correlation_id: Option<String>,

    /// Send the call this many times in sequence
    #[arg(long, default_value_t = 1)]
    repeat: u32,
}

fn init_tracing() {
    let log_format = std::env::var("SF_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn build_options(args: &Args) -> anyhow::Result<RequestOptions> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method '{}'", args.method))?;
    let mut options = RequestOptions::new(method);

    if let Some(data) = &args.data {
        let body: Value = serde_json::from_str(data).context("request body is not valid JSON")?;
        options = options.json(body);
    }
    for raw in &args.headers {
        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| anyhow!("header '{}' is not in `Name: value` form", raw))?;
        options = options.header(name.trim(), value.trim());
    }
    if args.skip_retry {
        options = options.skip_retry();
    }
    if let Some(ms) = args.timeout_ms {
        options = options.timeout(Duration::from_millis(ms));
    }
    if let Some(max_retries) = args.max_retries {
        options = options.max_retries(max_retries);
    }
    if let Some(id) = &args.correlation_id {
        options = options.correlation_id(id.clone());
    }
    Ok(options)
}

fn envelope(response: &ApiResponse<Value>) -> Value {
    let error = match response.error() {
        None => Value::Null,
        Some(RequestError::Network(classified)) => json!(classified),
        Some(RequestError::Decode(e)) => json!({ "type": "DECODE_ERROR", "message": e.to_string() }),
    };
    json!({
        "success": response.success(),
        "data": response.data(),
        "error": error,
        "retryInfo": response.retry_info,
        "correlationId": response.correlation_id,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing();

    let config = ClientConfig::from_env()?;
    tracing::debug!("Using base URL {}", config.base_url);
    let client = ResilientClient::new(config);
    let options = build_options(&args)?;

    let mut all_succeeded = true;
    for _ in 0..args.repeat.max(1) {
        let response: ApiResponse<Value> = client.request(&args.endpoint, options.clone()).await;
        all_succeeded &= response.success();
        println!("{}", serde_json::to_string_pretty(&envelope(&response))?);
    }

    let snapshot = client.circuit_breaker_snapshot();
    tracing::info!(
        "Circuit breaker {} ({}/{} consecutive failures)",
        snapshot.state,
        snapshot.consecutive_failures,
        snapshot.failure_threshold
    );

    Ok(if all_succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
