use anyhow::{Context, Result};
use bridge_core::{Dispatcher, RelayMetrics, StaticMetadata};
use bridge_jsonl::{JsonLinesBackend, JsonLinesIntegration};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod server;

use config::{BridgeConfig, LogFormat, CONFIG_ENV, DEFAULT_CONFIG_FILE, STDIO};

type Input = Box<dyn AsyncBufRead + Send + Unpin>;
type Output = Box<dyn AsyncWrite + Send + Unpin>;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_tracing(&config);

    info!("Starting gateway-bridge...");

    let metrics = RelayMetrics::new().context("failed to create metrics")?;
    if let Some(bind) = config.metrics.bind {
        let metrics = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve_metrics(bind, metrics).await {
                error!(error = %e, "Metrics server error");
            }
        });
    }

    let (backend, backend_feed) = JsonLinesBackend::new(
        open_output(&config.backend.output).await?,
        config.backend.channel_capacity,
    );
    let (integration, integration_feed) = JsonLinesIntegration::new(
        open_output(&config.integration.output).await?,
        config.integration.channel_capacity,
    );

    let relays = Dispatcher::builder()
        .backend(Arc::new(backend))
        .integration(Arc::new(integration))
        .metadata(Arc::new(StaticMetadata::new(
            config.meta_data.static_values.clone(),
        )))
        .metrics(metrics)
        .config(config.forwarder.clone())
        .build()?
        .setup()
        .await
        .context("forwarder setup failed")?;

    // Feeds own the channel senders; stopping them closes the relay loops
    let mut feeds: Vec<JoinHandle<()>> = Vec::new();
    let mut idle_feeds = (None, None);
    match &config.backend.input {
        Some(path) => {
            let reader = open_input(path).await?;
            feeds.push(tokio::spawn(async move {
                match backend_feed.run(reader).await {
                    Ok(lines) => info!(lines, "Backend feed finished"),
                    Err(e) => error!(error = %e, "Backend feed error"),
                }
            }));
        }
        None => idle_feeds.0 = Some(backend_feed),
    }
    match &config.integration.input {
        Some(path) => {
            let reader = open_input(path).await?;
            feeds.push(tokio::spawn(async move {
                match integration_feed.run(reader).await {
                    Ok(lines) => info!(lines, "Integration feed finished"),
                    Err(e) => error!(error = %e, "Integration feed error"),
                }
            }));
        }
        None => idle_feeds.1 = Some(integration_feed),
    }

    tokio::select! {
        result = shutdown_signal() => {
            result.context("failed to listen for shutdown signal")?;
            info!("Shutdown signal received, draining relay loops...");
        }
        _ = wait_for_inputs(&mut feeds) => {
            info!("All inputs exhausted, draining relay loops...");
        }
    }

    for feed in &feeds {
        feed.abort();
    }
    drop(feeds);
    drop(idle_feeds);

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    if relays.shutdown(grace).await {
        info!("gateway-bridge stopped");
    } else {
        warn!(grace_secs = config.shutdown_grace_secs, "Relay loops did not drain in time");
    }

    Ok(())
}

/// Resolve the config path from the first argument, then the environment
fn load_config() -> Result<BridgeConfig> {
    let explicit = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok());

    match explicit {
        Some(path) => BridgeConfig::load(&PathBuf::from(path), true),
        None => BridgeConfig::load(&PathBuf::from(DEFAULT_CONFIG_FILE), false),
    }
}

fn init_tracing(config: &BridgeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // stdout may carry JSON-lines traffic, so logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Resolve on ctrl-c, or SIGTERM on unix
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Wait until every running feed has finished. Never resolves without feeds.
async fn wait_for_inputs(feeds: &mut [JoinHandle<()>]) {
    if feeds.is_empty() {
        return std::future::pending().await;
    }
    for feed in feeds.iter_mut() {
        if let Err(e) = feed.await {
            if e.is_panic() {
                error!(error = %e, "input feed panicked");
            }
        }
    }
}

async fn open_input(path: &str) -> Result<Input> {
    if path == STDIO {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = File::open(path)
        .await
        .with_context(|| format!("failed to open input {path}"))?;
    Ok(Box::new(BufReader::new(file)))
}

async fn open_output(path: &str) -> Result<Output> {
    if path == STDIO {
        return Ok(Box::new(tokio::io::stdout()));
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open output {path}"))?;
    Ok(Box::new(file))
}
