//! Utility functions and helpers

pub mod logger;

// Re-export commonly used utilities
pub use self::logger::{
    init_logging, sanitize_message, HttpLogSink, LogRelay, LogSink, Logger, RelayContext,
    RelayQueue,
};
