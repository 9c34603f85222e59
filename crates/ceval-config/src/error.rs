//! Configuration handling errors.

use std::path::PathBuf;

/// Errors while loading, mutating or restoring the router configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read or written
    #[error("config io failed for {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration document is not valid JSON
    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),

    /// Document shape is not what the mutator expects
    #[error("unexpected config shape: {0}")]
    Shape(String),
}

impl ConfigError {
    /// Wrap an I/O error with the file it concerns.
    #[inline]
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_file() {
        let err = ConfigError::io(
            "/tmp/config.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/config.json"));
    }
}
