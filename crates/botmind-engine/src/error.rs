//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode during startup, the tick
//! loop, and the final report.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: botmind_core::config::ConfigError,
    },

    /// The tick driver failed.
    #[error("driver error: {source}")]
    Driver {
        /// The underlying driver error.
        #[from]
        source: botmind_core::runner::DriverError,
    },

    /// Statistics could not be serialized.
    #[error("report error: {source}")]
    Report {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}
