//! Telemetry initialization.
//!
//! A single self-hosted process with no distributed trace context to
//! propagate has no use for the teacher's OTLP exporter path — this keeps
//! only structured logging, seeded from `LOG_LEVEL` (§6).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Initialize the global tracing subscriber.
///
/// `log_level` seeds the [`EnvFilter`]; an invalid or empty value falls back
/// to `"info"`. Every mutating request handler (`sync`, `sync/v2`, `rename`,
/// `delete`) and every Operation Engine entry point is `#[instrument]`ed with
/// a span carrying `vault` and, where applicable, `file_id`/`path`/
/// `base_commit` — see `http::handlers` and `engine`. Read-only endpoints and
/// the fan-out layer log at `debug`/`warn`/`error` without their own spans.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
