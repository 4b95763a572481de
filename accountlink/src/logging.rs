//! Structured logging setup and security-event helpers.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var; the default keeps
/// sqlx quiet.
///
/// # Example
///
/// ```no_run
/// accountlink::logging::init();
/// tracing::info!("Auth service starting");
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // Another subscriber may already be installed (tests, embedding apps)
    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
    {
        tracing::info!("Structured logging initialized");
    }
}

/// Log security event with structured data
///
/// # Arguments
///
/// * `event_type` - Type of security event, e.g. `failed_login`
/// * `account_id` - Account involved, when known
/// * `message` - Event message
pub fn log_security_event(event_type: &str, account_id: Option<Uuid>, message: &str) {
    tracing::warn!(
        event_type = event_type,
        account_id = ?account_id,
        "SECURITY: {}",
        message
    );
}
