//! Protoscope CLI
//!
//! Runs inline taps: each accepts clients, relays them to an upstream
//! server and dissects the traffic, writing request/response entries as
//! JSON lines.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use protoscope_core::config::{LoggingConfig, ScopeConfig};
use protoscope_core::metrics::ScopeMetrics;
use protoscope_core::network::{ScopeTap, TapListener};
use protoscope_core::pipeline::{output_channel, EmissionPipeline, EntrySink, KnownServiceIps, PipelineStats};
use protoscope_core::registry::ExtensionRegistry;
use protoscope_core::OrphanSweeper;

/// How long to wait for in-flight items to drain after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Protocol tap for AMQP and Kafka traffic.
#[derive(Parser)]
#[command(name = "protoscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, default_value = "protoscope.yaml")]
    config: String,

    /// Write entries to this file instead of the configured output.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Validate the configuration, list extensions and exit.
    #[arg(long)]
    check: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ScopeConfig::from_file(&args.config)?;
    if let Some(path) = args.output {
        config.output.path = Some(path);
    }

    let log_config = match args.verbose {
        0 => config.logging.clone(),
        1 => LoggingConfig {
            level: "debug".to_string(),
            ..config.logging.clone()
        },
        _ => LoggingConfig {
            level: "trace".to_string(),
            ..config.logging.clone()
        },
    };
    setup_tracing(&log_config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        taps = config.taps.len(),
        orphan_retention_ms = config.matcher.orphan_retention_ms,
        "starting protoscope"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move { run_scope(config, args.check).await })
}

fn setup_tracing(config: &LoggingConfig) {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer()).init();
    }
}

async fn run_scope(config: ScopeConfig, check_only: bool) -> anyhow::Result<()> {
    let metrics = Arc::new(ScopeMetrics::new());
    let registry = Arc::new(ExtensionRegistry::with_defaults(&config.matcher, &metrics));
    config.validate_protocols(&registry.names())?;

    for answer in registry.ping_all() {
        info!(answer, "extension ready");
    }
    if check_only {
        for (name, expression) in registry.macros() {
            println!("{name}\t{expression}");
        }
        return Ok(());
    }

    if config.metrics.enabled {
        let metrics_clone = Arc::clone(&metrics);
        let metrics_addr = config.metrics.address.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(&metrics_addr, metrics_clone).await {
                error!(error = %e, "metrics server error");
            }
        });
    }

    let known_ips = KnownServiceIps::new(config.pipeline.parsed_service_ips()?);
    let (output, input) = output_channel(config.pipeline.channel_capacity);
    let pipeline = EmissionPipeline::new(input, known_ips, Arc::clone(&metrics));
    let pipeline = match &config.output.path {
        Some(path) => {
            let file = tokio::fs::File::create(path).await?;
            info!(path = %path.display(), "writing entries to file");
            pipeline.with_sink(EntrySink::new(file, Arc::clone(&registry)))
        }
        None => pipeline.with_sink(EntrySink::new(tokio::io::stdout(), Arc::clone(&registry))),
    };
    let pipeline_task = tokio::spawn(pipeline.run());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = OrphanSweeper::new(
        registry.matchers(),
        output.clone(),
        config.matcher.sweep_interval(),
        shutdown_rx,
    );
    let sweeper_task = tokio::spawn(sweeper.run());

    let tap = ScopeTap::from_config(&config, Arc::clone(&registry), output, Arc::clone(&metrics));
    if config.taps.is_empty() {
        warn!("no taps configured, waiting for shutdown");
    }

    let mut handles = Vec::with_capacity(config.taps.len());
    let mut listeners: Vec<JoinHandle<()>> = Vec::with_capacity(config.taps.len());
    for tap_config in &config.taps {
        let listener = TapListener::new(tap_config.clone(), tap.clone());
        handles.push(listener.shutdown_handle());
        let protocol = tap_config.protocol.clone();
        listeners.push(tokio::spawn(async move {
            if let Err(e) = listener.run().await {
                error!(protocol = %protocol, error = %e, "tap stopped");
            }
        }));
    }
    drop(tap);

    shutdown_signal().await;
    info!("shutdown signal received, stopping taps");
    for handle in &handles {
        let _ = handle.send(());
    }
    let _ = shutdown_tx.send(true);

    for listener in listeners {
        let _ = listener.await;
    }
    let _ = sweeper_task.await;

    match tokio::time::timeout(DRAIN_TIMEOUT, pipeline_task).await {
        Ok(Ok(Ok(stats))) => log_stats(&stats),
        Ok(Ok(Err(e))) => error!(error = %e, "pipeline flush failed"),
        Ok(Err(e)) => error!(error = %e, "pipeline task failed"),
        Err(_) => warn!("connections still open, not waiting for the pipeline"),
    }

    for matcher in registry.matchers() {
        let stats = matcher.stats();
        info!(
            protocol = matcher.protocol().name,
            pairs = stats.pairs,
            orphans = stats.orphans,
            dropped = stats.dropped,
            pending = stats.pending,
            "matcher totals"
        );
    }

    info!("protoscope shutdown complete");
    Ok(())
}

fn log_stats(stats: &PipelineStats) {
    info!(
        received = stats.received,
        filtered = stats.filtered,
        emitted = stats.emitted,
        sink_errors = stats.sink_errors,
        "pipeline drained"
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

async fn start_metrics_server(
    addr: &str,
    metrics: Arc<ScopeMetrics>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(address = %addr, "metrics server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = Arc::clone(&metrics);

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let metrics = Arc::clone(&metrics);
                async move {
                    let (status, body) = match req.uri().path() {
                        "/" | "/metrics" => match metrics.encode() {
                            Ok(text) => (StatusCode::OK, text),
                            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                        },
                        _ => (StatusCode::NOT_FOUND, String::new()),
                    };
                    let mut response = Response::new(Full::new(Bytes::from(body)));
                    *response.status_mut() = status;
                    Ok::<_, hyper::Error>(response)
                }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(error = %e, "metrics connection error");
            }
        });
    }
}
