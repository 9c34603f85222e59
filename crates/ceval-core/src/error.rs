//! Error types for the leaf algorithms
//!
//! Every parsing unit (one exposition line, one probe read, one fixture
//! load) gets its own `Result`, so callers decide between degrading and
//! propagating instead of relying on blanket suppression.

/// A single counter-exposition line that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    /// Line does not carry a label block
    #[error("no label block")]
    MissingLabels,

    /// Label block is not `key="value"` pairs
    #[error("malformed label pair: {0}")]
    MalformedLabel(String),

    /// Sample value is not a finite number
    #[error("unparsable sample value: {0}")]
    BadValue(String),
}

/// A resource probe read that did not produce a usable sample.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    /// The probe command failed or produced no output
    #[error("probe produced no output")]
    Empty,

    /// Probe output could not be parsed
    #[error("unparsable probe output: {0}")]
    Unparsable(String),
}

/// Carbon-intensity fixture problems; all of them degrade to "no
/// expectation available" at the call site.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// Fixture file missing or unreadable
    #[error("fixture unreadable: {0}")]
    Io(#[from] std::io::Error),

    /// Fixture is not the expected document shape
    #[error("fixture malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_error_display() {
        let err = LineError::BadValue("abc".to_string());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn probe_error_display() {
        assert_eq!(ProbeError::Empty.to_string(), "probe produced no output");
    }
}
