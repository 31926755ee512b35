//! Process-local observability
//!
//! Counters and distributions for the processing loop, logged periodically
//! and at shutdown. No exporter: these are observational only. The alert log
//! backs the optional evaluation mode, which summarizes detection latency
//! and accuracy against an expected-AKI CSV after a replayed feed.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Upper bounds for the lab-value histogram, final bucket unbounded
const VALUE_BUCKETS: [f64; 5] = [80.0, 90.0, 105.0, 120.0, 140.0];

/// Counters and distributions for one process lifetime
#[derive(Debug, Default)]
pub struct Metrics {
    /// Frames successfully decoded, whether or not they parsed
    pub total_messages: u64,
    /// Lab-result messages processed
    pub lab_results: u64,
    /// Positive predictions raised
    pub positive_predictions: u64,
    /// Pager responses with a non-200 status
    pub non_success_pages: u64,
    /// Alerts lost to an unreachable pager
    pub missed_alerts: u64,
    /// Feed reconnections over the process lifetime
    pub reconnections: u64,
    /// Frames dropped by the per-frame error boundary
    pub dropped_frames: u64,
    value_buckets: [u64; VALUE_BUCKETS.len() + 1],
    response_times: Vec<f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one lab value in the fixed-bucket distribution.
    pub fn record_lab_value(&mut self, value: f64) {
        let bucket = VALUE_BUCKETS
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(VALUE_BUCKETS.len());
        self.value_buckets[bucket] += 1;
    }

    /// Record the arrival-to-page latency of one positive detection.
    pub fn record_response_time(&mut self, seconds: f64) {
        self.response_times.push(seconds);
    }

    /// 99th percentile of recorded response times, if any exist.
    pub fn p99_response_time(&self) -> Option<f64> {
        percentile(&self.response_times, 99.0)
    }

    /// Log a one-line summary at info level.
    pub fn log_summary(&self) {
        log::info!(
            "messages={} lab_results={} positives={} non_200_pages={} missed_alerts={} \
             reconnections={} dropped={} p99_response={}",
            self.total_messages,
            self.lab_results,
            self.positive_predictions,
            self.non_success_pages,
            self.missed_alerts,
            self.reconnections,
            self.dropped_frames,
            self.p99_response_time()
                .map_or_else(|| "n/a".to_string(), |p| format!("{:.3}s", p)),
        );
        log::debug!(
            "lab value distribution (bounds {:?}): {:?}",
            VALUE_BUCKETS,
            self.value_buckets
        );
    }
}

/// Nearest-rank percentile over an unsorted sample.
fn percentile(samples: &[f64], pct: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}

/// Per-MRN response latency for positive detections (evaluation mode)
#[derive(Debug, Default)]
pub struct AlertLog {
    responses: BTreeMap<String, f64>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite with) the latest latency for an alerted MRN.
    pub fn record(&mut self, mrn: &str, seconds: f64) {
        self.responses.insert(mrn.to_string(), seconds);
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Print the offline evaluation summary: latency statistics, and when an
    /// expected-AKI CSV is given, missing/incorrect alert counts.
    pub fn summarize(&self, expected_csv: Option<&Path>) {
        let times: Vec<f64> = self.responses.values().copied().collect();
        if times.is_empty() {
            println!("No alerts raised");
            return;
        }

        let mean = times.iter().sum::<f64>() / times.len() as f64;
        println!("Mean: {:.4}s", mean);
        if let Some(p90) = percentile(&times, 90.0) {
            println!("90th percentile: {:.4}s", p90);
        }
        println!("Number of aki events: {}", times.len());

        let Some(path) = expected_csv else { return };
        match load_expected(path) {
            Ok(expected) => {
                let missing = expected
                    .iter()
                    .filter(|mrn| !self.responses.contains_key(*mrn))
                    .count();
                let incorrect = self
                    .responses
                    .keys()
                    .filter(|mrn| !expected.contains(*mrn))
                    .count();
                println!("Missing aki events: {}", missing);
                println!("Incorrect aki events: {}", incorrect);
            }
            Err(e) => log::error!("Cannot read expected-AKI file {}: {}", path.display(), e),
        }
    }
}

/// First CSV column of each row is an expected-AKI MRN.
fn load_expected(path: &Path) -> std::io::Result<Vec<String>> {
    let file = File::open(path)?;
    let mut mrns = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if let Some(mrn) = line.split(',').next() {
            if !mrn.is_empty() {
                mrns.push(mrn.to_string());
            }
        }
    }
    Ok(mrns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lab_value_buckets() {
        let mut m = Metrics::new();
        m.record_lab_value(70.0); // <= 80
        m.record_lab_value(80.0); // <= 80 (inclusive bound)
        m.record_lab_value(100.0); // <= 105
        m.record_lab_value(500.0); // overflow bucket
        assert_eq!(m.value_buckets, [2, 0, 1, 0, 0, 1]);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&samples, 99.0), Some(99.0));
        assert_eq!(percentile(&samples, 90.0), Some(90.0));
        assert_eq!(percentile(&samples, 100.0), Some(100.0));
        assert_eq!(percentile(&[], 99.0), None);
    }

    #[test]
    fn test_p99_single_sample() {
        let mut m = Metrics::new();
        m.record_response_time(0.25);
        assert_eq!(m.p99_response_time(), Some(0.25));
    }

    #[test]
    fn test_alert_log_overwrites_per_mrn() {
        let mut log = AlertLog::new();
        log.record("497030", 0.5);
        log.record("497030", 0.7);
        assert_eq!(log.len(), 1);
    }
}
