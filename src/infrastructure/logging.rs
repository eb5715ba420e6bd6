//! Logging configuration
//!
//! Logs go to stderr; stdout is reserved for tool output. `RUST_LOG` takes
//! precedence over the configured level.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

/// Turns a configured level into filter directives.
///
/// A bare level (`debug`) applies to this crate only and keeps dependencies
/// at `warn`. Anything else is taken as a full directive string.
fn directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    if level.is_empty() {
        return "warn,skopeo_mirror=info".to_string();
    }
    match level.parse::<LevelFilter>() {
        Ok(_) => format!("warn,skopeo_mirror={level}"),
        Err(_) => level,
    }
}

/// Initializes logging with the specified level
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives(level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true)
        .try_init();
}
