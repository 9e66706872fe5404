//! Prometheus metrics for the channel engine.
//!
//! Counters cover the mutation surface (moderation patches, membership
//! churn, lifecycle transitions) and errors labeled by code. The embedding
//! process is expected to expose [`gather_metrics`] on whatever endpoint it
//! already serves.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Engine operations by name.
pub static OPERATIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Engine operation failures by name and error code.
pub static OPERATION_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Channel schemes materialized by moderation patches.
pub static SCHEMES_CREATED: OnceLock<IntCounter> = OnceLock::new();

/// Channel schemes retired after converging back to the higher scope.
pub static SCHEMES_RETIRED: OnceLock<IntCounter> = OnceLock::new();

/// Members admitted to channels.
pub static MEMBERS_ADDED: OnceLock<IntCounter> = OnceLock::new();

/// Members removed from channels.
pub static MEMBERS_REMOVED: OnceLock<IntCounter> = OnceLock::new();

/// Group-constraint denials (admission and removal).
pub static GROUP_CONSTRAINT_DENIALS: OnceLock<IntCounter> = OnceLock::new();

/// Lazily backfilled root-mention counters.
pub static UNREAD_BACKFILLS: OnceLock<IntCounter> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at process startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(
        OPERATIONS,
        IntCounterVec::new(
            Opts::new("chanwarden_operations_total", "Engine operations by name"),
            &["operation"]
        )
    );
    register!(
        OPERATION_ERRORS,
        IntCounterVec::new(
            Opts::new(
                "chanwarden_operation_errors_total",
                "Engine operation failures by name and error code"
            ),
            &["operation", "error"]
        )
    );
    register!(
        SCHEMES_CREATED,
        IntCounter::new(
            "chanwarden_schemes_created_total",
            "Channel schemes materialized by moderation patches"
        )
    );
    register!(
        SCHEMES_RETIRED,
        IntCounter::new(
            "chanwarden_schemes_retired_total",
            "Channel schemes retired after converging to the higher scope"
        )
    );
    register!(
        MEMBERS_ADDED,
        IntCounter::new("chanwarden_members_added_total", "Members admitted to channels")
    );
    register!(
        MEMBERS_REMOVED,
        IntCounter::new("chanwarden_members_removed_total", "Members removed from channels")
    );
    register!(
        GROUP_CONSTRAINT_DENIALS,
        IntCounter::new(
            "chanwarden_group_constraint_denials_total",
            "Group-constraint denials"
        )
    );
    register!(
        UNREAD_BACKFILLS,
        IntCounter::new(
            "chanwarden_unread_backfills_total",
            "Lazily backfilled root-mention counters"
        )
    );
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record an operation execution.
#[inline]
pub fn record_operation(operation: &str) {
    if let Some(c) = OPERATIONS.get() {
        c.with_label_values(&[operation]).inc();
    }
}

/// Record an operation failure.
#[inline]
pub fn record_operation_error(operation: &str, error: &str) {
    if let Some(c) = OPERATION_ERRORS.get() {
        c.with_label_values(&[operation, error]).inc();
    }
}

#[inline]
fn bump(metric: &OnceLock<IntCounter>) {
    if let Some(c) = metric.get() {
        c.inc();
    }
}

/// Record a materialized channel scheme.
#[inline]
pub fn record_scheme_created() {
    bump(&SCHEMES_CREATED);
}

/// Record a retired channel scheme.
#[inline]
pub fn record_scheme_retired() {
    bump(&SCHEMES_RETIRED);
}

/// Record a member admission.
#[inline]
pub fn record_member_added() {
    bump(&MEMBERS_ADDED);
}

/// Record a member removal.
#[inline]
pub fn record_member_removed() {
    bump(&MEMBERS_REMOVED);
}

/// Record a group-constraint denial.
#[inline]
pub fn record_group_constraint_denial() {
    bump(&GROUP_CONSTRAINT_DENIALS);
}

/// Record a lazy unread backfill.
#[inline]
pub fn record_unread_backfill() {
    bump(&UNREAD_BACKFILLS);
}
