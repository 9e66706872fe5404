//! Telemetry utilities for operation timing and span construction.

use std::time::Instant;

/// Guard recording an engine operation (and, on early return, nothing else)
/// when dropped.
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Start timing an operation.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        crate::metrics::record_operation(self.operation);
        tracing::debug!(operation = %self.operation, elapsed_us = elapsed.as_micros() as u64, "operation finished");
    }
}

/// Standardized span constructors for engine observability.
pub mod spans {
    use tracing::{Span, info_span};

    /// Create a span for an operation against a channel.
    pub fn channel_op(name: &str, channel_id: &str, actor: &str) -> Span {
        info_span!("channel_op", name = %name, channel = %channel_id, actor = %actor)
    }

    /// Create a span for a store interaction.
    pub fn store(query: &str) -> Span {
        info_span!("store", query = %query)
    }
}

/// Initialize a tracing subscriber from `RUST_LOG`, for binaries and tests.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
