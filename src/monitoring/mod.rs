/*!
 * Monitoring
 * Tracing subscriber setup and span helpers
 */

mod tracer;

pub use tracer::{generate_run_id, init_tracing, span_cpu, span_run};
