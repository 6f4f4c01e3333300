//! Decision statistics for the loan approval service.

use crate::error::RequestError;
use crate::types::decision::PredictionReport;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Refusal kind for lines that are not applicant JSON
pub const MALFORMED_REQUEST: &str = "malformed_request";

/// Metrics collector for decision requests
pub struct DecisionMetrics {
    /// Total requests received
    pub requests: AtomicU64,
    /// Loans approved
    pub approvals: AtomicU64,
    /// Loans rejected by the model
    pub rejections: AtomicU64,
    /// Decisions returned without an explanation
    pub degraded_explanations: AtomicU64,
    /// Requests refused before a decision, by error kind
    refused_by_kind: RwLock<BTreeMap<&'static str, u64>>,
    /// Request latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// P(approve) distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl DecisionMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            approvals: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            degraded_explanations: AtomicU64::new(0),
            refused_by_kind: RwLock::new(BTreeMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a request that produced a decision
    pub fn record_decision(&self, report: &PredictionReport, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);

        if report.verdict().is_approved() {
            self.approvals.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejections.fetch_add(1, Ordering::Relaxed);
        }
        if report.attribution.is_none() {
            self.degraded_explanations.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(p) = report.decision.probability {
            let bucket = ((p.approve * 10.0) as usize).min(9);
            if let Ok(mut buckets) = self.probability_buckets.write() {
                buckets[bucket] += 1;
            }
        }
    }

    /// Record a request refused before a decision
    pub fn record_refusal(&self, error: &RequestError, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);

        if let Ok(mut by_kind) = self.refused_by_kind.write() {
            *by_kind.entry(error.kind()).or_insert(0) += 1;
        }
    }

    /// Record a line that could not be parsed as an applicant
    pub fn record_malformed(&self, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);

        if let Ok(mut by_kind) = self.refused_by_kind.write() {
            *by_kind.entry(MALFORMED_REQUEST).or_insert(0) += 1;
        }
    }

    fn record_latency(&self, latency: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    pub fn refusals(&self) -> u64 {
        self.refused_by_kind
            .read()
            .map(|by_kind| by_kind.values().sum())
            .unwrap_or(0)
    }

    pub fn refusals_by_kind(&self) -> BTreeMap<&'static str, u64> {
        self.refused_by_kind
            .read()
            .map(|by_kind| by_kind.clone())
            .unwrap_or_default()
    }

    pub fn latency_stats(&self) -> LatencyStats {
        let times = match self.latencies.read() {
            Ok(times) => times,
            Err(_) => return LatencyStats::default(),
        };
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    pub fn probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|buckets| *buckets)
            .unwrap_or([0; 10])
    }

    /// Requests per second since startup
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let requests = self.requests.load(Ordering::Relaxed);
        let approvals = self.approvals.load(Ordering::Relaxed);
        let rejections = self.rejections.load(Ordering::Relaxed);
        let degraded = self.degraded_explanations.load(Ordering::Relaxed);
        let decided = approvals + rejections;
        let approval_rate = if decided > 0 {
            (approvals as f64 / decided as f64) * 100.0
        } else {
            0.0
        };

        let latency = self.latency_stats();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║             LOAN APPROVAL SERVICE - METRICS SUMMARY          ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests: {:>8}  │  Throughput: {:>8.1} req/s              ║",
            requests,
            self.throughput()
        );
        info!(
            "║ Approved: {:>8}  │  Rejected: {:>8}  │  Rate: {:>5.1}%    ║",
            approvals, rejections, approval_rate
        );
        info!(
            "║ Refused:  {:>8}  │  Without explanation: {:>8}          ║",
            self.refusals(),
            degraded
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}      ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );

        let refused = self.refusals_by_kind();
        if !refused.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Refused Requests by Kind:                                    ║");
            for (kind, count) in &refused {
                info!("║   {:16}: {:>6}                                    ║", kind, count);
            }
        }

        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ P(approve) Distribution:                                     ║");
        let distribution = self.probability_distribution();
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let bar = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for DecisionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Request latency statistics
#[derive(Debug, Default, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints a summary every `interval_secs`
pub struct MetricsReporter {
    metrics: Arc<DecisionMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<DecisionMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let period = Duration::from_secs(self.interval_secs.max(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
