//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of a run so `main` can
//! propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: interleave_core::ConfigError,
    },

    /// A generator could not be initialized.
    #[error("init error: {source}")]
    Init {
        /// The underlying init error.
        #[from]
        source: interleave_core::InitError,
    },

    /// Event generation failed beyond recovery.
    #[error("generation error: {source}")]
    Generate {
        /// The underlying generation error.
        #[from]
        source: interleave_core::GenerateError,
    },

    /// A worker task panicked or was cancelled.
    #[error("worker {worker} failed: {message}")]
    Worker {
        /// Worker index.
        worker: u64,
        /// Description of the failure.
        message: String,
    },

    /// The run summary could not be serialized.
    #[error("summary serialization failed: {source}")]
    Summary {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
