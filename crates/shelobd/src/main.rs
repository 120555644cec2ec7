//! shelobd — the shelob daemon.
//!
//! Single binary that assembles the prober:
//! - Peer discovery (Kubernetes Endpoints, or a static list)
//! - Probe loop + HTTP prober
//! - Metrics sink
//! - HTTP front (probe target `/` and `/metrics`)
//!
//! # Usage
//!
//! ```text
//! PODIP=10.1.0.4 shelobd --endpointsname shelob --period-duration 1s --port 8080
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use shelob_discovery::{KubeEndpoints, PeerDirectory, StaticPeers};
use shelob_metrics::MetricsSink;
use shelob_probe::{HttpProber, ProbeConfig, ProbeLoop, resolve_period};

#[derive(Debug, Parser)]
#[command(name = "shelobd", about = "Measures HTTP latency between the replicas of a service")]
struct Cli {
    /// Endpoints object name, usually the service this pod belongs to.
    #[arg(long = "endpointsname", default_value = "shelob")]
    endpoints_name: String,

    /// Namespace of the Endpoints object.
    #[arg(long, default_value = "utils")]
    namespace: String,

    /// Time between peer tests, e.g. "1s" or "500ms". Falls back to 1s if unparsable.
    #[arg(long = "period-duration", default_value = "1s")]
    period_duration: String,

    /// Port to serve the test (/) and metrics (/metrics) endpoints on; also the port probed on peers.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Upper bound on a single probe.
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    probe_timeout: Duration,

    /// Maximum number of probes in flight. Unbounded when unset or 0.
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Identity of this instance, used as the `source` label.
    #[arg(long, env = "PODIP", default_value = "")]
    source: String,

    /// Comma-separated peer IPs to probe instead of querying the cluster.
    #[arg(long, value_name = "IP,IP,...")]
    static_peers: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            group: self.endpoints_name.clone(),
            namespace: self.namespace.clone(),
            period: resolve_period(&self.period_duration),
            probe_port: self.port,
            source: self.source.clone(),
            probe_timeout: self.probe_timeout,
            max_in_flight: self.max_in_flight,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = Arc::new(cli.probe_config());
    info!(group = %config.group, namespace = %config.namespace, source = %config.source, "watched endpoint");

    match &cli.static_peers {
        Some(list) => {
            let directory = StaticPeers::parse(list);
            info!(peers = directory.len(), "using static peer list");
            run(config, Arc::new(directory)).await
        }
        None => {
            let directory = KubeEndpoints::in_cluster(&config.namespace)
                .context("error building in-cluster client")?;
            run(config, Arc::new(directory)).await
        }
    }
}

/// Used when `RUST_LOG` is unset. `shelob` covers `shelobd` and every `shelob_*` crate.
const DEFAULT_LOG_FILTER: &str = "info,shelob=debug";

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run<D: PeerDirectory>(config: Arc<ProbeConfig>, directory: Arc<D>) -> anyhow::Result<()> {
    // ── Initialize subsystems ──────────────────────────────────

    let sink = Arc::new(MetricsSink::new());
    let prober = Arc::new(HttpProber::new(&config.source, config.probe_timeout));
    let probe_loop = ProbeLoop::new(
        Arc::clone(&config),
        directory,
        prober,
        Arc::clone(&sink),
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let loop_handle = tokio::spawn(async move {
        probe_loop.run(shutdown_rx).await;
    });

    // ── Start HTTP front ───────────────────────────────────────

    let router = shelob_api::build_router(sink);
    // The front listens on the same port peers are probed on.
    let addr = SocketAddr::from(([0, 0, 0, 0], config.probe_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "HTTP server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // In-flight probes are abandoned.
    let _ = loop_handle.await;

    info!("shelob daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
