use tracing::Span;

use super::TraceId;

/// Root span for one compute tick across all instruments.
pub fn tick_span(trace_id: &TraceId, now_ms: u64) -> Span {
    tracing::info_span!("compute_tick", trace_id = %trace_id, now_ms)
}

/// Span for the lifecycle of a single spike, detection through resolution.
pub fn spike_span(spike_id: &TraceId, instrument: &str) -> Span {
    tracing::info_span!("spike", spike_id = %spike_id, instrument = %instrument)
}
