//! # crashsym Utilities
//!
//! Shared helpers for the crashsym workspace.
//!
//! Right now that is logging: a `tracing` subscriber with pretty or JSON
//! output on stderr and an optional file sink, configured from the environment.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingConfig, LoggingError, LoggingGuard,
};
pub use tracing::{debug, error, info, trace, warn};
