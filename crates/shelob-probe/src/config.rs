//! Probe loop configuration.

use std::time::Duration;

use tracing::warn;

/// Cadence used when the configured period is unusable.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Upper bound on a single probe attempt.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Immutable settings shared by the loop and its probe tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Name of the peer group (Endpoints object) to watch.
    pub group: String,
    /// Namespace the group lives in.
    pub namespace: String,
    /// Time between the end of one fan-out and the next discovery.
    pub period: Duration,
    /// Port probed on every peer.
    pub probe_port: u16,
    /// This instance's identity, used as the `source` label.
    pub source: String,
    pub probe_timeout: Duration,
    /// Cap on concurrently running probes. `None` is unbounded. Peers that
    /// find the cap full are skipped for that tick, not queued.
    pub max_in_flight: Option<usize>,
}

impl ProbeConfig {
    pub fn new(group: &str, source: &str, probe_port: u16) -> Self {
        Self {
            group: group.to_string(),
            namespace: "utils".to_string(),
            period: DEFAULT_PERIOD,
            probe_port,
            source: source.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_in_flight: None,
        }
    }
}

/// Parse a cadence like "1s", "250ms" or "2m".
///
/// Unparsable or zero values fall back to `DEFAULT_PERIOD` with a warning;
/// a bad cadence never stops the prober from starting.
pub fn resolve_period(raw: &str) -> Duration {
    match humantime::parse_duration(raw.trim()) {
        Ok(period) if !period.is_zero() => period,
        Ok(_) => {
            warn!(period = %raw, "period must be positive, using default of 1s");
            DEFAULT_PERIOD
        }
        Err(e) => {
            warn!(period = %raw, error = %e, "period cannot be parsed, using default of 1s");
            DEFAULT_PERIOD
        }
    }
}
