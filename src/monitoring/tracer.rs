/*!
 * Structured Tracing
 * Trace initialization and per-dispatch spans using the tracing crate
 *
 * Features:
 * - Trace ID generation for correlating deferred continuations with the
 *   dispatch that registered them
 * - JSON-formatted logs for structured parsing
 * - Span hierarchies across async boundaries
 */

use std::time::Instant;
use tracing::{debug, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Initialize structured tracing.
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - JIT_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("JIT_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        // JSON output for production/parsing
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::FULL),
            )
            .init();
    } else {
        // Human-readable output for development
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .init();
    }
}

/// Generate a unique trace ID for request correlation
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering the synchronous portion of one dispatch.
///
/// The trace ID outlives the span: deferred continuations log it so their
/// events correlate back to the dispatch that registered them.
pub struct DispatchSpan {
    _span: tracing::Span,
    start: Instant,
    trace_id: String,
}

impl DispatchSpan {
    pub fn new(entrypoint: &str, num_results: usize) -> Self {
        let trace_id = generate_trace_id();

        let span = span!(
            Level::DEBUG,
            "dispatch",
            trace_id = %trace_id,
            entrypoint = entrypoint,
            num_results = num_results,
            duration_us = tracing::field::Empty,
            deferred = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        let _entered = span.enter();
        debug!(
            entrypoint = entrypoint,
            num_results = num_results,
            "dispatch started"
        );
        drop(_entered);

        Self {
            _span: span,
            start: Instant::now(),
            trace_id,
        }
    }

    /// Get the trace ID for this dispatch
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Record whether delivery went through the deferred path
    pub fn record_deferred(&self, deferred: bool) {
        self._span.record("deferred", deferred);
    }

    /// Record an error broadcast to the results
    pub fn record_error(&self, error: &str) {
        self._span.record("error", error);
    }

    /// Enter the span context (useful for async operations)
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self._span.enter()
    }
}

impl Drop for DispatchSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self._span.enter();

        if duration.as_millis() > 10 {
            warn!(
                trace_id = %self.trace_id,
                duration_ms = duration.as_millis(),
                slow = true,
                "slow dispatch issue path"
            );
        } else {
            self._span.record("duration_us", duration.as_micros());
            debug!(
                trace_id = %self.trace_id,
                duration_us = duration.as_micros(),
                "dispatch issued"
            );
        }
    }
}

/// Helper to create a dispatch span with automatic context propagation
#[inline]
pub fn span_dispatch(entrypoint: &str, num_results: usize) -> DispatchSpan {
    DispatchSpan::new(entrypoint, num_results)
}
