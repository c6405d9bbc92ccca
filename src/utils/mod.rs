//! Utility modules: statement tracing.
pub mod sqllog;
