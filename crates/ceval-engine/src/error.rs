//! Engine error types

use ceval_config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal pipeline errors.
///
/// Everything here aborts the run after the configuration guard has
/// restored the original document. Probe and metrics parse failures are
/// not represented; those degrade in place.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration capture, mutation or restore failed
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An orchestration command kept failing after bounded retries
    #[error("orchestration command `{command}` failed after {attempts} attempts: {detail}")]
    Orchestration {
        /// The command line that failed
        command: String,
        /// Attempts made, including the first
        attempts: u32,
        /// Last exit status or spawn error
        detail: String,
    },

    /// The router never answered during the readiness window
    #[error("router not ready for mode `{mode}` after {attempts} attempts")]
    ReadinessTimeout {
        /// Scenario being applied when readiness timed out
        mode: String,
        /// Attempts made
        attempts: u32,
    },

    /// The HTTP client could not be constructed
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),

    /// Results-directory or artifact I/O failed
    #[error("i/o error on {path}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Run-configuration value could not be interpreted
    #[error("invalid run setting {name}={value}")]
    InvalidSetting {
        /// Environment variable or flag name
        name: String,
        /// Rejected value
        value: String,
    },
}

impl EngineError {
    /// I/O error with path context.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
