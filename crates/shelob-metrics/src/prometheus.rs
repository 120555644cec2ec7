//! Prometheus text exposition format.
//!
//! Renders a histogram snapshot into the Prometheus text exposition format
//! (version 0.0.4) for scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use crate::histogram::HistogramSnapshot;

/// Name of the exported probe latency histogram.
///
/// The spelling is kept as-is so existing dashboards keep working.
pub const REQUEST_DURATION_METRIC: &str = "test_request_druation_ms";

/// Help text of the exported probe latency histogram.
pub const REQUEST_DURATION_HELP: &str = "Histogram 1 to 10000 linear ms.";

/// Render a histogram snapshot as a Prometheus `histogram` family.
///
/// Produces `_bucket` lines for every bound plus `+Inf`, followed by
/// `_sum` and `_count`, with `source` and `destination` labels.
pub fn render_prometheus(name: &str, help: &str, snapshot: &HistogramSnapshot) -> String {
    let mut out = String::new();

    // Help + type declarations.
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} histogram");

    for series in &snapshot.series {
        let labels = format!(
            "source=\"{}\",destination=\"{}\"",
            escape_label_value(&series.labels.source),
            escape_label_value(&series.labels.destination)
        );

        for (bound, count) in snapshot.bounds.iter().zip(&series.buckets) {
            let _ = writeln!(out, "{name}_bucket{{{labels},le=\"{bound}\"}} {count}");
        }
        let _ = writeln!(
            out,
            "{name}_bucket{{{labels},le=\"+Inf\"}} {}",
            series.count
        );
        let _ = writeln!(out, "{name}_sum{{{labels}}} {}", series.sum);
        let _ = writeln!(out, "{name}_count{{{labels}}} {}", series.count);
    }

    out
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
