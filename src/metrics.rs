use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for the rate limiter
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    checks: CounterVec,
    store_errors: CounterVec,
    check_duration: Histogram,
    flushed_keys: Counter,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let checks = CounterVec::new(
            Opts::new(
                "ratelimit_checks_total",
                "Number of check-and-record calls by decision",
            ),
            &["service", "decision"],
        )?;

        let store_errors = CounterVec::new(
            Opts::new(
                "ratelimit_store_errors_total",
                "Number of failed shared store operations",
            ),
            &["operation"],
        )?;

        let check_duration = Histogram::with_opts(HistogramOpts::new(
            "ratelimit_check_duration_seconds",
            "Duration of check-and-record calls in seconds",
        ))?;

        let flushed_keys = Counter::new(
            "ratelimit_flushed_keys_total",
            "Number of access logs removed by flushes",
        )?;

        registry.register(Box::new(checks.clone()))?;
        registry.register(Box::new(store_errors.clone()))?;
        registry.register(Box::new(check_duration.clone()))?;
        registry.register(Box::new(flushed_keys.clone()))?;

        Ok(Self {
            registry,
            checks,
            store_errors,
            check_duration,
            flushed_keys,
        })
    }

    /// Get the Prometheus registry for this metrics instance
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_decision(&self, service: &str, within_limits: bool) {
        let decision = if within_limits { "allowed" } else { "denied" };
        self.checks.with_label_values(&[service, decision]).inc();
    }

    pub fn record_store_error(&self, operation: &str) {
        self.store_errors.with_label_values(&[operation]).inc();
    }

    pub fn record_flushed_keys(&self, count: u64) {
        self.flushed_keys.inc_by(count as f64);
    }

    /// Create a timer for measuring check duration
    pub fn start_check_timer(&self) -> prometheus::HistogramTimer {
        self.check_duration.start_timer()
    }
}
