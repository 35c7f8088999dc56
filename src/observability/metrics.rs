use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::TrustError;

/// Metrics registry for the application.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Total pipeline invocations
    pub invocations_total: AtomicU64,

    /// Invocations by outcome
    pub invocations_authorized: AtomicU64,
    pub invocations_unauthorized: AtomicU64,
    pub invocations_invalid_input: AtomicU64,
    pub invocations_timed_out: AtomicU64,

    /// Invocation latency buckets
    pub latency_under_1ms: AtomicU64,
    pub latency_1_5ms: AtomicU64,
    pub latency_5_10ms: AtomicU64,
    pub latency_10_50ms: AtomicU64,
    pub latency_50_100ms: AtomicU64,
    pub latency_over_100ms: AtomicU64,

    /// Policy reloads observed by the server
    pub policy_reloads_total: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Record the outcome of an invocation.
    pub fn record_outcome<T>(&self, outcome: &Result<T, TrustError>) {
        self.invocations_total.fetch_add(1, Ordering::Relaxed);

        let counter = match outcome {
            Ok(_) => &self.invocations_authorized,
            Err(TrustError::Unauthorized(_)) => &self.invocations_unauthorized,
            Err(TrustError::Capture(_) | TrustError::Context(_)) => {
                &self.invocations_invalid_input
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an invocation abandoned at the external deadline.
    pub fn record_timeout(&self) {
        self.invocations_total.fetch_add(1, Ordering::Relaxed);
        self.invocations_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Record invocation latency.
    pub fn record_latency(&self, start: Instant) {
        let micros = start.elapsed().as_micros() as u64;

        let bucket = if micros < 1000 {
            &self.latency_under_1ms
        } else if micros < 5000 {
            &self.latency_1_5ms
        } else if micros < 10000 {
            &self.latency_5_10ms
        } else if micros < 50000 {
            &self.latency_10_50ms
        } else if micros < 100000 {
            &self.latency_50_100ms
        } else {
            &self.latency_over_100ms
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_policy_reload(&self) {
        self.policy_reloads_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        format!(
            r#"# HELP trustr_invocations_total Total number of pipeline invocations
# TYPE trustr_invocations_total counter
trustr_invocations_total {}

# HELP trustr_invocations Pipeline invocations by outcome
# TYPE trustr_invocations counter
trustr_invocations{{outcome="authorized"}} {}
trustr_invocations{{outcome="unauthorized"}} {}
trustr_invocations{{outcome="invalid_input"}} {}
trustr_invocations{{outcome="timeout"}} {}

# HELP trustr_invocation_latency_bucket Invocation latency histogram
# TYPE trustr_invocation_latency_bucket counter
trustr_invocation_latency_bucket{{le="0.001"}} {}
trustr_invocation_latency_bucket{{le="0.005"}} {}
trustr_invocation_latency_bucket{{le="0.01"}} {}
trustr_invocation_latency_bucket{{le="0.05"}} {}
trustr_invocation_latency_bucket{{le="0.1"}} {}
trustr_invocation_latency_bucket{{le="+Inf"}} {}

# HELP trustr_policy_reloads_total Policy reloads picked up
# TYPE trustr_policy_reloads_total counter
trustr_policy_reloads_total {}
"#,
            self.invocations_total.load(Ordering::Relaxed),
            self.invocations_authorized.load(Ordering::Relaxed),
            self.invocations_unauthorized.load(Ordering::Relaxed),
            self.invocations_invalid_input.load(Ordering::Relaxed),
            self.invocations_timed_out.load(Ordering::Relaxed),
            self.latency_under_1ms.load(Ordering::Relaxed),
            self.latency_1_5ms.load(Ordering::Relaxed),
            self.latency_5_10ms.load(Ordering::Relaxed),
            self.latency_10_50ms.load(Ordering::Relaxed),
            self.latency_50_100ms.load(Ordering::Relaxed),
            self.latency_over_100ms.load(Ordering::Relaxed),
            self.policy_reloads_total.load(Ordering::Relaxed),
        )
    }
}

/// Guard for timing operations.
pub struct TimingGuard<'a> {
    registry: &'a MetricsRegistry,
    start: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn new(registry: &'a MetricsRegistry) -> Self {
        TimingGuard {
            registry,
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl<'a> Drop for TimingGuard<'a> {
    fn drop(&mut self) {
        self.registry.record_latency(self.start);
    }
}
