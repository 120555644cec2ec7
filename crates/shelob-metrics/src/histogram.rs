//! Metrics sink — labeled cumulative latency histograms.
//!
//! Each `(source, destination)` pair owns its own mutex-protected series,
//! so observations for unrelated peer pairs never contend. The outer map
//! lock is held only long enough to find or insert a series handle.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Bucket upper bounds in milliseconds, shared by every series.
pub const DEFAULT_BUCKETS_MS: &[f64] = &[
    1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, //
    11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 18.0, 19.0, 20.0, //
    25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 65.0, 70.0, //
    75.0, 80.0, 85.0, 90.0, 95.0, 100.0, //
    110.0, 120.0, 130.0, 140.0, 150.0, 160.0, 170.0, 180.0, 190.0, 200.0, //
    250.0, 300.0, 350.0, 400.0, 450.0, 500.0, //
    600.0, 700.0, 800.0, 900.0, 1000.0, //
    2000.0, 3000.0, 4000.0, 5000.0, //
    10000.0,
];

/// Errors from building a histogram with custom bucket bounds.
#[derive(Debug, Error, PartialEq)]
pub enum HistogramError {
    #[error("bucket list is empty")]
    Empty,

    #[error("bucket bound {0} is not finite")]
    NonFinite(f64),

    #[error("bucket bounds must be strictly increasing: {prev} is followed by {next}")]
    NotIncreasing { prev: f64, next: f64 },
}

/// The identity of one series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelPair {
    pub source: String,
    pub destination: String,
}

impl LabelPair {
    pub fn new(source: &str, destination: &str) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
        }
    }
}

/// Mutable accumulator for a single label pair.
struct Series {
    /// Cumulative counts, one per bound.
    buckets: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Series {
    fn new(bucket_count: usize) -> Self {
        Self {
            buckets: vec![0; bucket_count],
            sum: 0.0,
            count: 0,
        }
    }

    /// Count `value` in every bucket whose bound is >= `value`.
    fn record(&mut self, bounds: &[f64], value: f64) {
        let first = bounds.partition_point(|bound| *bound < value);
        for slot in &mut self.buckets[first..] {
            *slot += 1;
        }
        self.sum += value;
        self.count += 1;
    }
}

/// Point-in-time copy of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub labels: LabelPair,
    /// Cumulative counts aligned with `HistogramSnapshot::bounds`.
    pub buckets: Vec<u64>,
    pub sum: f64,
    pub count: u64,
}

impl SeriesSnapshot {
    /// Whether every bucket count is >= the count of the bucket before it.
    pub fn is_cumulative(&self) -> bool {
        self.buckets.windows(2).all(|w| w[0] <= w[1])
            && self.buckets.last().is_none_or(|last| *last <= self.count)
    }
}

/// Point-in-time copy of every series, sorted by label pair.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    pub bounds: Vec<f64>,
    pub series: Vec<SeriesSnapshot>,
}

impl HistogramSnapshot {
    /// Look up the series for a label pair.
    pub fn get(&self, source: &str, destination: &str) -> Option<&SeriesSnapshot> {
        self.series
            .iter()
            .find(|s| s.labels.source == source && s.labels.destination == destination)
    }

    /// Observations across all series.
    pub fn total_count(&self) -> u64 {
        self.series.iter().map(|s| s.count).sum()
    }
}

/// Thread-safe accumulator of probe latencies.
///
/// Owned by the daemon and shared by `Arc` between the probe loop and the
/// `/metrics` handler. Series are created on first observation and live
/// for the lifetime of the sink.
pub struct MetricsSink {
    bounds: Arc<[f64]>,
    series: RwLock<HashMap<LabelPair, Arc<Mutex<Series>>>>,
}

impl MetricsSink {
    /// Create a sink using `DEFAULT_BUCKETS_MS`.
    pub fn new() -> Self {
        Self {
            bounds: Arc::from(DEFAULT_BUCKETS_MS),
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Create a sink with custom bucket bounds (milliseconds).
    pub fn with_buckets(bounds: Vec<f64>) -> Result<Self, HistogramError> {
        validate_bounds(&bounds)?;
        Ok(Self {
            bounds: Arc::from(bounds),
            series: RwLock::new(HashMap::new()),
        })
    }

    /// Record one latency sample for a label pair.
    ///
    /// Negative and non-finite values are dropped.
    pub async fn observe(&self, source: &str, destination: &str, latency_ms: f64) {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            debug!(%source, %destination, latency_ms, "dropping invalid latency sample");
            return;
        }

        let series = self.series_for(source, destination).await;
        series.lock().await.record(&self.bounds, latency_ms);
    }

    /// Number of label pairs observed so far.
    pub async fn series_count(&self) -> usize {
        self.series.read().await.len()
    }

    /// Copy every series. Each series is locked only while it is copied.
    pub async fn snapshot(&self) -> HistogramSnapshot {
        let handles: Vec<(LabelPair, Arc<Mutex<Series>>)> = {
            let map = self.series.read().await;
            map.iter()
                .map(|(labels, series)| (labels.clone(), Arc::clone(series)))
                .collect()
        };

        let mut series = Vec::with_capacity(handles.len());
        for (labels, handle) in handles {
            let s = handle.lock().await;
            series.push(SeriesSnapshot {
                labels,
                buckets: s.buckets.clone(),
                sum: s.sum,
                count: s.count,
            });
        }
        series.sort_by(|a, b| a.labels.cmp(&b.labels));

        HistogramSnapshot {
            bounds: self.bounds.to_vec(),
            series,
        }
    }

    async fn series_for(&self, source: &str, destination: &str) -> Arc<Mutex<Series>> {
        let key = LabelPair::new(source, destination);
        if let Some(series) = self.series.read().await.get(&key) {
            return Arc::clone(series);
        }

        let bucket_count = self.bounds.len();
        let mut map = self.series.write().await;
        let series = map.entry(key).or_insert_with(|| {
            debug!(%source, %destination, "new latency series");
            Arc::new(Mutex::new(Series::new(bucket_count)))
        });
        Arc::clone(series)
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_bounds(bounds: &[f64]) -> Result<(), HistogramError> {
    if bounds.is_empty() {
        return Err(HistogramError::Empty);
    }
    if let Some(bad) = bounds.iter().find(|b| !b.is_finite()) {
        return Err(HistogramError::NonFinite(*bad));
    }
    for w in bounds.windows(2) {
        if w[0] >= w[1] {
            return Err(HistogramError::NotIncreasing {
                prev: w[0],
                next: w[1],
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn bucket_count_at(snap: &SeriesSnapshot, bounds: &[f64], bound: f64) -> u64 {
        let idx = bounds.iter().position(|b| *b == bound).unwrap();
        snap.buckets[idx]
    }

    #[test]
    fn default_buckets_are_strictly_increasing() {
        assert!(validate_bounds(DEFAULT_BUCKETS_MS).is_ok());
        assert_eq!(DEFAULT_BUCKETS_MS.len(), 62);
        assert_eq!(DEFAULT_BUCKETS_MS.first(), Some(&1.0));
        assert_eq!(DEFAULT_BUCKETS_MS.last(), Some(&10000.0));
        for bound in [20.0, 25.0, 100.0, 110.0, 200.0, 250.0, 500.0, 600.0, 1000.0, 2000.0, 5000.0] {
            assert!(DEFAULT_BUCKETS_MS.contains(&bound), "missing {bound}");
        }
    }

    #[test]
    fn custom_buckets_are_validated() {
        assert_eq!(
            MetricsSink::with_buckets(vec![]).err(),
            Some(HistogramError::Empty)
        );
        assert_eq!(
            MetricsSink::with_buckets(vec![1.0, 5.0, 5.0]).err(),
            Some(HistogramError::NotIncreasing { prev: 5.0, next: 5.0 })
        );
        assert!(matches!(
            MetricsSink::with_buckets(vec![1.0, f64::INFINITY]).err(),
            Some(HistogramError::NonFinite(_))
        ));
        assert!(MetricsSink::with_buckets(vec![0.5, 1.0, 10.0]).is_ok());
    }

    #[tokio::test]
    async fn series_created_lazily() {
        let sink = MetricsSink::new();
        assert_eq!(sink.series_count().await, 0);
        assert!(sink.snapshot().await.series.is_empty());

        sink.observe("10.0.0.1", "10.0.0.2", 3.0).await;
        sink.observe("10.0.0.1", "10.0.0.2", 4.0).await;
        sink.observe("10.0.0.1", "10.0.0.3", 4.0).await;
        assert_eq!(sink.series_count().await, 2);
    }

    #[tokio::test]
    async fn observe_counts_every_bucket_at_or_above_value() {
        let sink = MetricsSink::new();
        sink.observe("a", "b", 3.5).await;
        sink.observe("a", "b", 5.0).await;

        let snap = sink.snapshot().await;
        let series = snap.get("a", "b").unwrap();
        assert_eq!(bucket_count_at(series, &snap.bounds, 3.0), 0);
        assert_eq!(bucket_count_at(series, &snap.bounds, 4.0), 1);
        // Bounds are inclusive.
        assert_eq!(bucket_count_at(series, &snap.bounds, 5.0), 2);
        assert_eq!(bucket_count_at(series, &snap.bounds, 10000.0), 2);
        assert_eq!(series.count, 2);
        assert!((series.sum - 8.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn value_above_largest_bound_only_counts_in_total() {
        let sink = MetricsSink::new();
        sink.observe("a", "b", 25_000.0).await;

        let snap = sink.snapshot().await;
        let series = snap.get("a", "b").unwrap();
        assert!(series.buckets.iter().all(|c| *c == 0));
        assert_eq!(series.count, 1);
        assert!(series.is_cumulative());
    }

    #[tokio::test]
    async fn invalid_samples_are_dropped() {
        let sink = MetricsSink::new();
        sink.observe("a", "b", -1.0).await;
        sink.observe("a", "b", f64::NAN).await;
        sink.observe("a", "b", f64::INFINITY).await;
        assert_eq!(sink.series_count().await, 0);
    }

    #[tokio::test]
    async fn zero_latency_lands_in_first_bucket() {
        let sink = MetricsSink::new();
        sink.observe("a", "b", 0.0).await;
        let snap = sink.snapshot().await;
        assert!(snap.get("a", "b").unwrap().buckets.iter().all(|c| *c == 1));
    }

    #[tokio::test]
    async fn snapshot_twice_without_observe_is_identical() {
        let sink = MetricsSink::new();
        for v in [0.4, 7.0, 120.0, 9000.0] {
            sink.observe("src", "dst-1", v).await;
            sink.observe("src", "dst-2", v * 2.0).await;
        }

        let first = sink.snapshot().await;
        let second = sink.snapshot().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn snapshot_is_sorted_by_labels() {
        let sink = MetricsSink::new();
        sink.observe("b", "z", 1.0).await;
        sink.observe("a", "y", 1.0).await;
        sink.observe("a", "x", 1.0).await;

        let snap = sink.snapshot().await;
        let labels: Vec<(&str, &str)> = snap
            .series
            .iter()
            .map(|s| (s.labels.source.as_str(), s.labels.destination.as_str()))
            .collect();
        assert_eq!(labels, vec![("a", "x"), ("a", "y"), ("b", "z")]);
    }

    #[tokio::test]
    async fn custom_bounds_are_used() {
        let sink = MetricsSink::with_buckets(vec![10.0, 100.0]).unwrap();
        sink.observe("a", "b", 50.0).await;
        let snap = sink.snapshot().await;
        assert_eq!(snap.bounds, vec![10.0, 100.0]);
        assert_eq!(snap.get("a", "b").unwrap().buckets, vec![0, 1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_observes_keep_buckets_cumulative() {
        const WORKERS: u64 = 16;
        const SAMPLES: u64 = 500;
        let destinations = ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"];

        let sink = Arc::new(MetricsSink::new());
        let done = Arc::new(tokio::sync::Notify::new());

        // Reader checking the invariant while writers are running.
        let reader = {
            let sink = Arc::clone(&sink);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                let mut checks = 0u32;
                loop {
                    let snap = sink.snapshot().await;
                    for series in &snap.series {
                        assert!(series.is_cumulative(), "not cumulative: {series:?}");
                    }
                    checks += 1;
                    tokio::select! {
                        _ = done.notified() => break,
                        _ = tokio::task::yield_now() => {}
                    }
                }
                checks
            })
        };

        let mut writers = Vec::new();
        for worker in 0..WORKERS {
            let sink = Arc::clone(&sink);
            writers.push(tokio::spawn(async move {
                let mut rng = StdRng::seed_from_u64(worker);
                for _ in 0..SAMPLES {
                    let dst = destinations[rng.gen_range(0..destinations.len())];
                    let value = rng.gen_range(0.0..12_000.0);
                    sink.observe("10.0.0.9", dst, value).await;
                }
            }));
        }
        for w in writers {
            w.await.unwrap();
        }
        done.notify_one();
        assert!(reader.await.unwrap() > 0);

        let snap = sink.snapshot().await;
        assert_eq!(snap.total_count(), WORKERS * SAMPLES);
        for series in &snap.series {
            assert!(series.is_cumulative());
        }
    }
}
