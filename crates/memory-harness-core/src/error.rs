//! Error taxonomy shared by the core and its backends.
//!
//! Two families, handled at different call sites:
//!
//! - [`ConfigError`]: misuse detected while building parameters
//!   (chunk windows, weights, limits). Raised at construction time and
//!   expected to abort the command.
//! - [`BackendError`]: a remote or on-disk backend misbehaved. The query
//!   path turns these into a degraded result instead of surfacing them.

use thiserror::Error;

/// Invalid parameters supplied while constructing core objects.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A chunk window of zero characters.
    #[error("chunk window must be > 0")]
    ZeroWindow,

    /// Overlap that would make the sliding step zero or negative.
    #[error("chunk overlap ({overlap}) must be smaller than the window ({window})")]
    OverlapTooLarge { window: usize, overlap: usize },

    /// Any other out-of-range setting.
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Failure reported by a keyword, vector, or embedding backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// The backend could not be reached (connection refused, DNS, pool).
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A call exceeded its time bound.
    #[error("backend timed out after {0} ms")]
    Timeout(u64),

    /// The backend answered with something we could not interpret.
    #[error("malformed backend response: {0}")]
    Malformed(String),

    /// The backend rejected or failed the query itself.
    #[error("backend query failed: {0}")]
    Query(String),
}

impl BackendError {
    /// True for conditions worth retrying (network hiccups and timeouts).
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable(_) | BackendError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::Timeout(500).is_transient());
        assert!(BackendError::Unavailable("refused".into()).is_transient());
        assert!(!BackendError::Malformed("bad json".into()).is_transient());
        assert!(!BackendError::Query("syntax".into()).is_transient());
    }

    #[test]
    fn test_overlap_message_names_both_values() {
        let msg = ConfigError::OverlapTooLarge {
            window: 10,
            overlap: 10,
        }
        .to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("window"));
    }
}
