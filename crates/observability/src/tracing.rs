//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize JSON logging at `info` unless `RUST_LOG` says otherwise.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    init_with_directive("info");
}

/// Initialize logging with an explicit fallback directive.
///
/// `RUST_LOG` still wins when set; `default_directive` applies otherwise.
/// Tests use this to quiet modules they exercise deliberately.
pub fn init_with_directive(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_a_no_op() {
        init();
        init_with_directive("debug");
    }
}
