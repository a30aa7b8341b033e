//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `surety_operations_total{operation}` - committed operations
//! - `surety_operation_failures_total{operation,kind}` - rejected operations
//! - `surety_oracle_requests_closed_total` - requests that reached quorum or a default
//! - `surety_credited_gwei_total` - gwei credited to passengers
//! - `surety_paid_gwei_total` - gwei withdrawn by passengers
//! - `surety_registered_airlines` - registered airline count
//!
//! Each engine owns its registry, so several engines can live in one process.

use crate::error::ErrorKind;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Committed operations by name
    pub operations_total: IntCounterVec,

    /// Rejected operations by name and error kind
    pub failures_total: IntCounterVec,

    /// Closed oracle requests
    pub requests_closed: IntCounter,

    /// Gwei credited
    pub credited_gwei: IntCounter,

    /// Gwei paid out
    pub paid_gwei: IntCounter,

    /// Registered airlines
    pub registered_airlines: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("surety_operations_total", "Committed operations"),
            &["operation"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let failures_total = IntCounterVec::new(
            Opts::new("surety_operation_failures_total", "Rejected operations"),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(failures_total.clone()))?;

        let requests_closed = IntCounter::new(
            "surety_oracle_requests_closed_total",
            "Oracle requests closed",
        )?;
        registry.register(Box::new(requests_closed.clone()))?;

        let credited_gwei =
            IntCounter::new("surety_credited_gwei_total", "Gwei credited to passengers")?;
        registry.register(Box::new(credited_gwei.clone()))?;

        let paid_gwei = IntCounter::new("surety_paid_gwei_total", "Gwei paid to passengers")?;
        registry.register(Box::new(paid_gwei.clone()))?;

        let registered_airlines =
            IntGauge::new("surety_registered_airlines", "Registered airline count")?;
        registry.register(Box::new(registered_airlines.clone()))?;

        Ok(Self {
            operations_total,
            failures_total,
            requests_closed,
            credited_gwei,
            paid_gwei,
            registered_airlines,
            registry,
        })
    }

    /// Record a committed operation
    pub fn record_operation(&self, operation: &str) {
        self.operations_total.with_label_values(&[operation]).inc();
    }

    /// Record a rejected operation
    pub fn record_failure(&self, operation: &str, kind: ErrorKind) {
        self.failures_total
            .with_label_values(&[operation, kind.as_str()])
            .inc();
    }

    /// Record a closed request
    pub fn record_request_closed(&self) {
        self.requests_closed.inc();
    }

    /// Record a credit given in wei
    pub fn record_credit(&self, wei: u128) {
        add_gwei(&self.credited_gwei, wei);
    }

    /// Record a payment given in wei
    pub fn record_payment(&self, wei: u128) {
        add_gwei(&self.paid_gwei, wei);
    }

    /// Update registered airline count
    pub fn set_registered_airlines(&self, count: usize) {
        self.registered_airlines.set(count as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Add `wei` as whole gwei, stopping at `u64::MAX` instead of wrapping
fn add_gwei(counter: &IntCounter, wei: u128) {
    let gwei = u64::try_from(wei / WEI_PER_GWEI).unwrap_or(u64::MAX);
    let headroom = u64::MAX - counter.get();
    counter.inc_by(gwei.min(headroom));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.requests_closed.get(), 0);
        assert_eq!(metrics.registered_airlines.get(), 0);
    }

    #[test]
    fn test_two_collectors_coexist() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.record_operation("buy");
        assert_eq!(first.operations_total.with_label_values(&["buy"]).get(), 1);
        assert_eq!(second.operations_total.with_label_values(&["buy"]).get(), 0);
    }

    #[test]
    fn test_record_failure_by_kind() {
        let metrics = Metrics::new().unwrap();
        metrics.record_failure("buy", ErrorKind::PremiumTooHigh);
        metrics.record_failure("buy", ErrorKind::PremiumTooHigh);
        assert_eq!(
            metrics
                .failures_total
                .with_label_values(&["buy", "premium_too_high"])
                .get(),
            2
        );
    }

    #[test]
    fn test_credit_totals_past_u64_wei() {
        let metrics = Metrics::new().unwrap();
        for _ in 0..13 {
            metrics.record_credit(1_500_000_000_000_000_000);
        }
        // 19.5 ether, beyond u64::MAX in wei
        assert_eq!(metrics.credited_gwei.get(), 19_500_000_000);
    }

    #[test]
    fn test_payment_total_stops_at_counter_range() {
        let metrics = Metrics::new().unwrap();
        metrics.record_payment(u128::MAX);
        metrics.record_payment(1_000_000_000_000_000_000);
        assert_eq!(metrics.paid_gwei.get(), u64::MAX);
    }
}
