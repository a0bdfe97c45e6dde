use std::time::Duration;
use thiserror::Error;

/// Unified error type for the caching layer.
///
/// Infrastructure failures (remote store down) are normally recovered inside
/// the facade by degrading to the local tier; they only surface from
/// operations that cannot degrade, such as lock acquisition.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote store could not be reached or returned a protocol error.
    #[error("remote store unavailable: {0}")]
    Remote(String),

    /// A remote store call exceeded the configured command timeout.
    #[error("remote store timed out after {0:?}")]
    Timeout(Duration),

    /// A value could not be encoded or decoded. This propagates to the
    /// caller of the specific operation; it never degrades into stale data.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied fetcher or query failed.
    #[error("source error: {0}")]
    Source(String),
}

impl Error {
    pub fn remote(message: impl std::fmt::Display) -> Self {
        Error::Remote(message.to_string())
    }

    pub fn source(message: impl std::fmt::Display) -> Self {
        Error::Source(message.to_string())
    }

    /// True for failures of the remote tier itself, i.e. the ones the facade
    /// is allowed to swallow while falling through to the local store.
    pub fn is_remote_unavailable(&self) -> bool {
        matches!(self, Error::Remote(_) | Error::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_and_timeout_are_degradable() {
        assert!(Error::remote("refused").is_remote_unavailable());
        assert!(Error::Timeout(Duration::from_secs(1)).is_remote_unavailable());
    }

    #[test]
    fn serialization_is_not_degradable() {
        let err = serde_json::from_str::<u32>("not a number").unwrap_err();
        assert!(!Error::Serialization(err).is_remote_unavailable());
    }
}
