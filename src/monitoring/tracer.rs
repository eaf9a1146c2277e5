/*!
 * Tracing Setup
 * Structured logging for the scheduler and the simulated CPUs
 */

use crate::core::types::CpuId;
use tracing::{info, info_span, Span};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - KERNEL_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("KERNEL_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .init();
        info!("Structured tracing initialized");
    }
}

/// Unique id correlating every event of one kernel run
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Root span for a kernel run
#[inline]
pub fn span_run(run_id: &str) -> Span {
    info_span!("kernel", run_id = %run_id)
}

/// Span wrapping everything one simulated CPU does
#[inline]
pub fn span_cpu(cpu: CpuId) -> Span {
    info_span!("cpu", cpu)
}
