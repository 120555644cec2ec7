//! shelob-probe — peer latency measurement.
//!
//! Periodically resolves the peer group, fans out one timed HTTP probe
//! per ready peer, and feeds the measured latencies into the shared
//! `MetricsSink`.
//!
//! # Architecture
//!
//! ```text
//! ProbeLoop
//!   ├── Discovering → PeerDirectory::list_peers()
//!   ├── FanningOut  → one spawned task per ready peer
//!   │   ├── Prober::probe() → ProbeResult
//!   │   └── MetricsSink::observe() (unless NetworkError)
//!   └── Sleeping    → configured period, then repeat
//! ```
//!
//! # Timing
//!
//! Latency runs from the instant the TCP connect starts to the instant the
//! first response byte is read off the socket. Probes that never receive
//! a byte produce no latency and are never observed.

pub mod config;
pub mod prober;
pub mod scheduler;

pub use config::{DEFAULT_PERIOD, DEFAULT_PROBE_TIMEOUT, ProbeConfig, resolve_period};
pub use prober::{HttpProber, PeerAddress, ProbeOutcome, ProbeResult, Prober};
pub use scheduler::{LoopState, ProbeLoop, TickReport, probe_and_record};
