//! Probe loop — discovery, fan-out and cadence.
//!
//! Each tick resolves the peer group once, then spawns one independent
//! task per ready peer and goes straight to sleep. Probe tasks are never
//! awaited by the loop: a slow peer cannot delay the next tick, and tasks
//! from overlapping ticks may complete in any order.

use std::sync::Arc;

use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};

use shelob_discovery::PeerDirectory;
use shelob_metrics::MetricsSink;

use crate::config::ProbeConfig;
use crate::prober::{PeerAddress, ProbeOutcome, ProbeResult, Prober};

/// Where the loop currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Discovering,
    FanningOut,
    Sleeping,
    Stopped,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Addresses listed by the directory, ready or not.
    pub discovered: usize,
    /// Probe tasks spawned (one per ready address).
    pub launched: usize,
    /// Ready addresses not probed this tick because the in-flight cap was full.
    pub skipped: usize,
    pub discovery_failed: bool,
}

/// Drives the discovery → fan-out → sleep cycle for one peer group.
pub struct ProbeLoop<D, P> {
    config: Arc<ProbeConfig>,
    directory: Arc<D>,
    prober: Arc<P>,
    sink: Arc<MetricsSink>,
    /// Cap on in-flight probes, if configured.
    in_flight: Option<Arc<Semaphore>>,
    state: watch::Sender<LoopState>,
}

impl<D: PeerDirectory, P: Prober> ProbeLoop<D, P> {
    pub fn new(
        config: Arc<ProbeConfig>,
        directory: Arc<D>,
        prober: Arc<P>,
        sink: Arc<MetricsSink>,
    ) -> Self {
        // Zero means no cap, like an absent value.
        let in_flight = config
            .max_in_flight
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));
        let (state, _) = watch::channel(LoopState::Idle);

        Self {
            config,
            directory,
            prober,
            sink,
            in_flight,
            state,
        }
    }

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Run one discovery + fan-out cycle.
    ///
    /// Returns as soon as every probe task is spawned; the tasks record
    /// their own results into the sink.
    pub async fn tick(&self) -> TickReport {
        self.transition(LoopState::Discovering);
        let peers = match self.directory.list_peers(&self.config.group).await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(group = %self.config.group, error = %e, "unable to fetch peers");
                return TickReport {
                    discovery_failed: true,
                    ..TickReport::default()
                };
            }
        };

        self.transition(LoopState::FanningOut);
        let discovered = peers.len();
        let mut launched = 0;
        let mut skipped = 0;
        for endpoint in peers.into_iter().filter(|p| p.ready) {
            let peer = PeerAddress::new(endpoint.ip, self.config.probe_port);
            if self.launch(peer) {
                launched += 1;
            } else {
                skipped += 1;
            }
        }

        if skipped > 0 {
            warn!(group = %self.config.group, skipped, "in-flight cap reached, probes skipped");
        }
        debug!(group = %self.config.group, discovered, launched, "probes launched");
        TickReport {
            discovered,
            launched,
            skipped,
            discovery_failed: false,
        }
    }

    /// Tick, sleep for the configured period, repeat until `shutdown` fires.
    ///
    /// In-flight probes are not waited for on shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            group = %self.config.group,
            namespace = %self.config.namespace,
            period_ms = self.config.period.as_millis() as u64,
            port = self.config.probe_port,
            "probe loop started"
        );

        loop {
            self.tick().await;
            self.transition(LoopState::Sleeping);

            tokio::select! {
                _ = tokio::time::sleep(self.config.period) => {
                    self.transition(LoopState::Idle);
                }
                _ = shutdown.changed() => {
                    info!("probe loop shutting down");
                    break;
                }
            }
        }

        self.transition(LoopState::Stopped);
    }

    /// Spawn a probe task for `peer`. Returns `false` when the in-flight
    /// cap has no free slot; the peer is then left for the next tick.
    fn launch(&self, peer: PeerAddress) -> bool {
        let permit = match &self.in_flight {
            Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => return false,
            },
            None => None,
        };
        let prober = Arc::clone(&self.prober);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            let _permit = permit;
            probe_and_record(prober.as_ref(), &sink, &peer).await;
        });
        true
    }

    fn transition(&self, next: LoopState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = ?prev, to = ?next, "probe loop state");
        }
    }
}

/// Probe one peer and record its latency.
///
/// `NetworkError` results carry no latency and are never observed;
/// unexpected statuses are observed like successes.
pub async fn probe_and_record<P: Prober + ?Sized>(
    prober: &P,
    sink: &MetricsSink,
    peer: &PeerAddress,
) -> ProbeResult {
    let result = prober.probe(peer).await;
    if result.outcome != ProbeOutcome::NetworkError {
        if let Some(latency_ms) = result.latency_ms {
            sink.observe(&result.source, &result.destination.ip, latency_ms)
                .await;
        }
    }
    result
}
