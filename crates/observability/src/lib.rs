//! Tracing and logging setup shared by binaries and tests.

/// Initialize process-wide tracing with the default configuration.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(&TracingConfig::default());
}

pub use self::tracing::{init_with, LogFormat, TracingConfig};

/// Tracing configuration (filters, layers).
pub mod tracing;
