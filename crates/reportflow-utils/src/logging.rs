//! Logging and observability helpers for reportflow
//!
//! All crates log through `tracing`. Binaries embedding the orchestrator call
//! [`init_tracing`] once at startup; libraries and tests never install a
//! subscriber themselves.

use std::time::Duration;
use tracing::{Level, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the verbose format enables debug output
/// for reportflow crates and closes spans with timing, while the compact
/// format only shows info and above.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("reportflow=debug,info")
            } else {
                EnvFilter::try_new("reportflow=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Initialize JSON-formatted tracing for log shipping.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_json_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reportflow=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_current_span(true))
        .try_init()?;

    Ok(())
}

/// Create the span that scopes everything logged for one tracked request.
pub fn request_span(request_id: &str, profile: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "request",
        request_id = %request_id,
        profile = %profile,
    )
}

/// Log the start of a tracked request
pub fn log_request_start(request_id: &str, profile: &str, hard_timeout: Duration) {
    info!(
        request_id = %request_id,
        profile = %profile,
        hard_timeout_ms = hard_timeout.as_millis() as u64,
        "Tracking request"
    );
}

/// Log a terminal transition
pub fn log_request_finished(request_id: &str, status: &str, elapsed: Duration) {
    info!(
        request_id = %request_id,
        status = %status,
        elapsed_ms = elapsed.as_millis() as u64,
        "Request finished"
    );
}

/// Log that a subscriber callback panicked; the remaining subscribers still run.
pub fn log_subscriber_panic(request_id: &str, event: &str) {
    warn!(
        request_id = %request_id,
        event = %event,
        "Subscriber panicked; continuing with remaining subscribers"
    );
}
