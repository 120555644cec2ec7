//! shelob-metrics — latency histograms for peer-to-peer probes.
//!
//! Accumulates probe latencies into cumulative histograms keyed by a
//! `(source, destination)` label pair and renders them in the Prometheus
//! text exposition format.
//!
//! # Architecture
//!
//! ```text
//! MetricsSink
//!   ├── observe() ← called once per completed probe
//!   ├── per-series Mutex (one lock per label pair)
//!   └── snapshot() → HistogramSnapshot
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod histogram;
pub mod prometheus;

pub use histogram::{
    DEFAULT_BUCKETS_MS, HistogramError, HistogramSnapshot, LabelPair, MetricsSink,
    SeriesSnapshot,
};
pub use prometheus::{REQUEST_DURATION_HELP, REQUEST_DURATION_METRIC, render_prometheus};
