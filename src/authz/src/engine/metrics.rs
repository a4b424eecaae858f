//! Counters for decisions, cache behaviour and compilations

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::time::Duration;

/// Snapshot of engine counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMetrics {
    /// Total number of authorization requests
    pub total_requests: u64,

    /// Number of allowed decisions
    pub allowed_decisions: u64,

    /// Number of denied decisions
    pub denied_decisions: u64,

    /// Denials where no rule matched
    pub default_denials: u64,

    /// Compiled table served from the cache slot
    pub cache_hits: u64,

    /// Cache slot empty or unusable
    pub cache_misses: u64,

    /// Cache slot held data that failed validation
    pub cache_corruptions: u64,

    /// Rule source compilations
    pub compilations: u64,

    /// Latency percentiles of `authorize`, over the retained samples
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,

    /// Average latency
    pub avg_latency_ms: f64,
}

impl EngineMetrics {
    /// Calculate cache hit rate
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed_decisions + self.denied_decisions;
        if total == 0 {
            0.0
        } else {
            self.allowed_decisions as f64 / total as f64
        }
    }
}

/// Metrics collector shared by the runtime, the cache and the engine
#[derive(Debug)]
pub struct MetricsCollector {
    metrics: RwLock<EngineMetrics>,

    /// Most recent latency samples; percentiles are derived on snapshot
    latency_samples: Mutex<VecDeque<f64>>,

    /// Maximum samples to keep
    max_samples: usize,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(EngineMetrics::default()),
            latency_samples: Mutex::new(VecDeque::with_capacity(1_024)),
            max_samples: 10_000,
        }
    }

    /// Record a cache hit
    pub fn record_cache_hit(&self) {
        self.metrics.write().cache_hits += 1;
    }

    /// Record a cache miss
    pub fn record_cache_miss(&self) {
        self.metrics.write().cache_misses += 1;
    }

    /// Record a corrupted cache slot (also counted as a miss by the caller)
    pub fn record_cache_corruption(&self) {
        self.metrics.write().cache_corruptions += 1;
    }

    /// Record a rule source compilation
    pub fn record_compilation(&self) {
        self.metrics.write().compilations += 1;
    }

    /// Record an authorization decision
    pub fn record_decision(&self, allowed: bool, default_rule: bool) {
        let mut metrics = self.metrics.write();
        metrics.total_requests += 1;

        if allowed {
            metrics.allowed_decisions += 1;
        } else {
            metrics.denied_decisions += 1;
            if default_rule {
                metrics.default_denials += 1;
            }
        }
    }

    /// Record request latency
    pub fn record_latency(&self, latency: Duration) {
        let mut samples = self.latency_samples.lock();
        if samples.len() == self.max_samples {
            samples.pop_front();
        }
        samples.push_back(latency.as_secs_f64() * 1000.0);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> EngineMetrics {
        let mut sorted: Vec<f64> = self.latency_samples.lock().iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let mut metrics = self.metrics.read().clone();
        if !sorted.is_empty() {
            metrics.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
            metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
            metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
        }
        metrics
    }

    /// Reset all metrics
    pub fn reset(&self) {
        *self.metrics.write() = EngineMetrics::default();
        self.latency_samples.lock().clear();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let metrics = self.metrics.read();

        format!(
            r#"# HELP racktag_requests_total Total number of authorization requests
# TYPE racktag_requests_total counter
racktag_requests_total {}

# HELP racktag_allowed_total Number of allowed decisions
# TYPE racktag_allowed_total counter
racktag_allowed_total {}

# HELP racktag_denied_total Number of denied decisions
# TYPE racktag_denied_total counter
racktag_denied_total {}

# HELP racktag_cache_hits_total Compiled table cache hits
# TYPE racktag_cache_hits_total counter
racktag_cache_hits_total {}

# HELP racktag_cache_misses_total Compiled table cache misses
# TYPE racktag_cache_misses_total counter
racktag_cache_misses_total {}

# HELP racktag_cache_corruptions_total Corrupted cache slots discarded
# TYPE racktag_cache_corruptions_total counter
racktag_cache_corruptions_total {}

# HELP racktag_compilations_total Rule source compilations
# TYPE racktag_compilations_total counter
racktag_compilations_total {}
"#,
            metrics.total_requests,
            metrics.allowed_decisions,
            metrics.denied_decisions,
            metrics.cache_hits,
            metrics.cache_misses,
            metrics.cache_corruptions,
            metrics.compilations,
        )
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        let idx = idx.min(sorted.len() - 1);
        sorted[idx]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
