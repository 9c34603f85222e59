//! Guaranteed restoration of the router configuration file
//!
//! The original text is captured before the first mutation and written
//! back exactly once, whether the run succeeds, errors or unwinds. The
//! on-disk file must end up byte-identical to what was captured, which
//! makes repeated runs idempotent.

use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// Holds the original configuration text and restores it on drop.
///
/// Prefer calling [`ConfigGuard::restore`] explicitly so write failures
/// surface; the `Drop` impl is the backstop for panics and early
/// returns.
#[derive(Debug)]
pub struct ConfigGuard {
    path: PathBuf,
    original: String,
    restored: bool,
}

impl ConfigGuard {
    /// Capture the current on-disk configuration text.
    pub fn capture(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let original =
            fs::read_to_string(&path).map_err(|e| ConfigError::io(path.clone(), e))?;
        Ok(Self {
            path,
            original,
            restored: false,
        })
    }

    /// The captured original text.
    #[inline]
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The guarded file.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the guarded file with mutated configuration text.
    pub fn write_mutated(&self, text: &str) -> Result<(), ConfigError> {
        fs::write(&self.path, text).map_err(|e| ConfigError::io(self.path.clone(), e))
    }

    /// Restore the original text. Idempotent.
    pub fn restore(&mut self) -> Result<(), ConfigError> {
        if self.restored {
            return Ok(());
        }
        fs::write(&self.path, &self.original)
            .map_err(|e| ConfigError::io(self.path.clone(), e))?;
        self.restored = true;
        tracing::info!(path = %self.path.display(), "restored original configuration");
        Ok(())
    }
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(err) = self.restore() {
                tracing::error!(%err, "failed to restore configuration on drop");
            }
        }
    }
}
