//! # Bedrock Gateway
//!
//! Serves one OpenAI-style chat completion from AWS Bedrock.
//!
//! ## Usage
//!
//! ```bash
//! # Non-streaming: prints the uniform reply as JSON
//! bedrock-gateway --config gateway.yaml --request request.json
//!
//! # Streaming: prints `data:` frames ending in `data: [DONE]`
//! cat request.json | bedrock-gateway --config gateway.yaml --request - --stream
//! ```
//!
//! Adapter errors are printed as `{"error": {...}}` and exit with status 1.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use gateway_config::{load_config, GatewayConfig, LogFormat as ConfigLogFormat};
use gateway_core::{GatewayError, GatewayRequest, LLMProvider, StreamOptions};
use gateway_providers::{BedrockAdapter, BedrockConfig, HttpBedrockRuntime};
use gateway_resilience::{RegionHealthConfig, RegionHealthTracker};
use gateway_telemetry::{
    init_logging, init_tracing, shutdown_tracing, LogFormat, LoggingConfig, TracingConfig,
};
use secrecy::ExposeSecret;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bedrock Gateway - OpenAI-style chat completions from AWS Bedrock
#[derive(Parser, Debug)]
#[command(name = "bedrock-gateway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (.yaml, .yml or .toml)
    #[arg(short, long, env = "BEDROCK_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Chat completion request JSON file, or `-` for stdin
    #[arg(short, long, default_value = "-")]
    request: String,

    /// Stream the reply as server-sent events
    #[arg(long)]
    stream: bool,

    /// Export spans through OpenTelemetry
    #[arg(long)]
    otel: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;

    let logging = logging_config(&config);
    let provider = if cli.otel {
        init_tracing(&TracingConfig::default(), &logging)?
    } else {
        init_logging(&logging)?;
        None
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        region = %config.bedrock.region,
        "Starting Bedrock gateway"
    );

    let outcome = run(&cli, &config).await;
    shutdown_tracing(provider);

    match outcome {
        Ok(()) => Ok(()),
        Err(RunError::Gateway(e)) => {
            warn!(error = %e, code = e.error_code(), "Request failed");
            println!("{}", e.to_error_body());
            std::process::exit(1);
        }
        Err(RunError::Setup(e)) => Err(e),
    }
}

/// Failure of one CLI run
enum RunError {
    /// Reported to the caller as an error body
    Gateway(GatewayError),
    /// Anything before the adapter is reached
    Setup(anyhow::Error),
}

impl From<GatewayError> for RunError {
    fn from(e: GatewayError) -> Self {
        Self::Gateway(e)
    }
}

impl From<anyhow::Error> for RunError {
    fn from(e: anyhow::Error) -> Self {
        Self::Setup(e)
    }
}

impl From<io::Error> for RunError {
    fn from(e: io::Error) -> Self {
        Self::Setup(e.into())
    }
}

async fn run(cli: &Cli, config: &GatewayConfig) -> Result<(), RunError> {
    let adapter = build_adapter(config)?;

    let mut request = read_request(&cli.request)?;
    if cli.stream {
        request.stream = true;
    }
    apply_stream_defaults(&mut request, config);

    debug!(
        request_id = %request.id,
        model = %request.model,
        stream = request.stream,
        "Request loaded"
    );

    if request.stream {
        stream_reply(&adapter, &request).await
    } else {
        let response = adapter.chat_completion(&request).await?;
        let body = serde_json::to_string_pretty(&response)
            .context("failed to serialize response")?;
        println!("{body}");
        Ok(())
    }
}

async fn stream_reply(adapter: &BedrockAdapter, request: &GatewayRequest) -> Result<(), RunError> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling stream");
            on_interrupt.cancel();
        }
    });

    let mut events = adapter
        .chat_completion_stream(request, cancel.clone())
        .await?;

    let mut stdout = io::stdout();
    while let Some(event) = events.next().await {
        stdout.write_all(event.to_sse().as_bytes())?;
        stdout.flush()?;
        if event.is_done() {
            break;
        }
    }

    if cancel.is_cancelled() {
        return Err(GatewayError::Cancelled.into());
    }
    Ok(())
}

fn build_adapter(config: &GatewayConfig) -> Result<BedrockAdapter, RunError> {
    let bedrock = bedrock_config(config);
    let runtime = HttpBedrockRuntime::new(&bedrock)?;

    let health = RegionHealthTracker::new(RegionHealthConfig {
        failure_threshold: config.health.failure_threshold,
        latency_smoothing: config.health.latency_smoothing,
    });

    Ok(BedrockAdapter::new(bedrock, Arc::new(runtime)).with_health_tracker(Arc::new(health)))
}

fn bedrock_config(config: &GatewayConfig) -> BedrockConfig {
    let settings = &config.bedrock;
    let mut builder = BedrockConfig::builder()
        .region(&settings.region)
        .timeout(settings.timeout)
        .default_max_tokens(settings.default_max_tokens)
        .cross_region(settings.cross_region)
        .health_aware(settings.health_aware);

    if let Some(key) = &settings.access_key_id {
        builder = builder.access_key_id(key);
    }
    if let Some(secret) = &settings.secret_access_key {
        builder = builder.secret_access_key(secret.expose_secret().as_str());
    }
    if let Some(token) = &settings.session_token {
        builder = builder.session_token(token.expose_secret().as_str());
    }
    if let Some(url) = &settings.endpoint_url {
        builder = builder.endpoint_url(url);
    }
    builder.build()
}

fn logging_config(config: &GatewayConfig) -> LoggingConfig {
    let format = match config.logging.format {
        ConfigLogFormat::Pretty => LogFormat::Pretty,
        ConfigLogFormat::Json => LogFormat::Json,
    };
    LoggingConfig::new(&config.logging.level).with_format(format)
}

fn read_request(source: &str) -> Result<GatewayRequest> {
    let raw = if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("failed to read request file {source}"))?
    };
    serde_json::from_str(&raw).context("request is not a valid chat completion body")
}

/// Fill in `stream_options.include_usage` from configuration when the
/// request leaves it out.
fn apply_stream_defaults(request: &mut GatewayRequest, config: &GatewayConfig) {
    if !request.stream {
        return;
    }
    let options = request.stream_options.get_or_insert_with(StreamOptions::default);
    if options.include_usage.is_none() {
        options.include_usage = Some(config.streaming.include_usage);
    }
}
