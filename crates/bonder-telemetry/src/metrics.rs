//! Prometheus metrics for the bonder subsystems.
//!
//! All metrics follow the naming convention: `bn_<subsystem>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CHAIN WATCHERS (bn-01)
    // =========================================================================

    /// Poll cycles by chain, event kind and outcome (ok/reorg/error/idle)
    pub static ref WATCHER_POLLS: CounterVec = CounterVec::new(
        Opts::new("bn_watcher_polls_total", "Watcher poll cycles"),
        &["chain", "kind", "outcome"]
    ).expect("metric creation failed");

    /// Events committed by watchers
    pub static ref WATCHER_EVENTS: CounterVec = CounterVec::new(
        Opts::new("bn_watcher_events_total", "Events committed by watchers"),
        &["chain", "kind"]
    ).expect("metric creation failed");

    /// Reorgs detected
    pub static ref WATCHER_REORGS: CounterVec = CounterVec::new(
        Opts::new("bn_watcher_reorgs_total", "Reorgs detected by watchers"),
        &["chain"]
    ).expect("metric creation failed");

    /// Current watermark
    pub static ref WATCHER_WATERMARK: GaugeVec = GaugeVec::new(
        Opts::new("bn_watcher_watermark_block", "Last committed block per watcher"),
        &["chain", "kind"]
    ).expect("metric creation failed");

    // =========================================================================
    // TRANSFER STORE (bn-02)
    // =========================================================================

    /// Events by apply outcome (applied/duplicate/buffered/retracted)
    pub static ref STORE_EVENTS: CounterVec = CounterVec::new(
        Opts::new("bn_store_events_total", "Events handled by the transfer store"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Transfers currently unresolvable
    pub static ref STORE_UNRESOLVABLE_GAPS: Gauge = Gauge::new(
        "bn_store_unresolvable_gaps",
        "Buffered events that exceeded the gap timeout"
    ).expect("metric creation failed");

    // =========================================================================
    // BONDING (bn-03)
    // =========================================================================

    /// Decisions by outcome and reason
    pub static ref BONDING_DECISIONS: CounterVec = CounterVec::new(
        Opts::new("bn_bonding_decisions_total", "Bonding decisions"),
        &["decision", "reason"]
    ).expect("metric creation failed");

    /// Bond submissions that failed after retries
    pub static ref BONDING_SUBMISSION_FAILURES: Counter = Counter::new(
        "bn_bonding_submission_failures_total",
        "Bond transactions that failed after retries"
    ).expect("metric creation failed");

    // =========================================================================
    // SETTLEMENT (bn-04)
    // =========================================================================

    /// Bundles waiting for member bonds
    pub static ref SETTLEMENT_PENDING: Gauge = Gauge::new(
        "bn_settlement_pending_reconciliations",
        "Bundles with members not yet bonded"
    ).expect("metric creation failed");

    /// Reconciliations that missed their deadline
    pub static ref SETTLEMENT_INCOMPLETE: Counter = Counter::new(
        "bn_settlement_incomplete_total",
        "Reconciliations escalated as incomplete settlements"
    ).expect("metric creation failed");

    /// Liquidity releases after settlement
    pub static ref SETTLEMENT_RELEASES: Counter = Counter::new(
        "bn_settlement_liquidity_releases_total",
        "Bonded transfers whose liquidity was released"
    ).expect("metric creation failed");

    // =========================================================================
    // MESSAGE RELAY (bn-05)
    // =========================================================================

    /// Attestation polls by outcome (pending/complete/error)
    pub static ref RELAY_ATTESTATION_POLLS: CounterVec = CounterVec::new(
        Opts::new("bn_relay_attestation_polls_total", "Attestation service polls"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Messages relayed
    pub static ref RELAY_RELAYED: Counter = Counter::new(
        "bn_relay_messages_relayed_total",
        "Messages that reached the relayed state"
    ).expect("metric creation failed");

    /// Messages in flight
    pub static ref RELAY_IN_FLIGHT: Gauge = Gauge::new(
        "bn_relay_messages_in_flight",
        "Messages with an active relay task"
    ).expect("metric creation failed");

    // =========================================================================
    // HEALTH CHECKS (bn-06)
    // =========================================================================

    /// 1 when the named check is failing
    pub static ref HEALTH_CHECK_FAILING: GaugeVec = GaugeVec::new(
        Opts::new("bn_health_check_failing", "Health check status (1 = failing)"),
        &["check"]
    ).expect("metric creation failed");

    // =========================================================================
    // ERROR METRICS
    // =========================================================================

    /// Errors by subsystem and class
    pub static ref SUBSYSTEM_ERRORS: CounterVec = CounterVec::new(
        Opts::new("bn_subsystem_errors_total", "Errors by subsystem and class"),
        &["subsystem", "class"]
    ).expect("metric creation failed");
}

/// Keeps the registry referenced.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry. Safe to call twice.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(WATCHER_POLLS.clone()),
        Box::new(WATCHER_EVENTS.clone()),
        Box::new(WATCHER_REORGS.clone()),
        Box::new(WATCHER_WATERMARK.clone()),
        Box::new(STORE_EVENTS.clone()),
        Box::new(STORE_UNRESOLVABLE_GAPS.clone()),
        Box::new(BONDING_DECISIONS.clone()),
        Box::new(BONDING_SUBMISSION_FAILURES.clone()),
        Box::new(SETTLEMENT_PENDING.clone()),
        Box::new(SETTLEMENT_INCOMPLETE.clone()),
        Box::new(SETTLEMENT_RELEASES.clone()),
        Box::new(RELAY_ATTESTATION_POLLS.clone()),
        Box::new(RELAY_RELAYED.clone()),
        Box::new(RELAY_IN_FLIGHT.clone()),
        Box::new(HEALTH_CHECK_FAILING.clone()),
        Box::new(SUBSYSTEM_ERRORS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
