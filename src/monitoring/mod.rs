/*!
 * Monitoring
 * Tracing initialization and dispatch spans
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, span_dispatch, DispatchSpan};
