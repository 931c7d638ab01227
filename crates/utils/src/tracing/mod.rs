use deltaplan_core::constants::DELTAPLAN_LOG_VAR;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, instrument, span, trace, warn, Level, Span};

/// Initialize the tracing system
///
/// The filter comes from `DELTAPLAN_LOG`, then `RUST_LOG`, then defaults to
/// `info`. Output is a compact, non-ANSI formatter on stderr so plan output on
/// stdout stays machine readable. Returns an error if a global subscriber is
/// already installed.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = std::env::var(DELTAPLAN_LOG_VAR)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    init_with_filter(filter)
}

/// Initialize the tracing system with an explicit filter
pub fn init_with_filter(
    filter: EnvFilter,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Create a span covering one planning request
pub fn plan_span(seed_count: usize) -> Span {
    span!(Level::INFO, "plan", seed_count = %seed_count)
}

/// Create a span for work on a single operation
pub fn operation_span(name: &str) -> Span {
    span!(Level::DEBUG, "operation", operation = %name)
}

/// Emit a structured event for a fast-track decision
pub fn fast_track_event(operation: &str, pruned: bool, reason: &str) {
    if pruned {
        info!(operation = %operation, reason = %reason, "fast_track_pruned");
    } else {
        debug!(operation = %operation, reason = %reason, "fast_track_kept");
    }
}

/// Emit a structured event for graph cache lookups
pub fn cache_event(fingerprint: &str, hit: bool) {
    if hit {
        debug!(fingerprint = %fingerprint, "graph_cache_hit");
    } else {
        debug!(fingerprint = %fingerprint, "graph_cache_miss");
    }
}
