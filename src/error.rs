//! Error types for the cache subsystem

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache subsystem
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid cache configuration (non-positive size, zero TTL where required)
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// Eviction policy name not recognized
    #[error("Unknown eviction policy: {0}")]
    UnknownPolicy(String),

    /// External metadata source failed during warm-up
    #[error("Metadata source failed for subject {subject}: {reason}")]
    MetadataSource { subject: String, reason: String },

    /// Compression failed
    #[error("Compression failed: {reason}")]
    CompressionFailed { reason: String },

    /// Decompression failed
    #[error("Decompression failed: {reason}")]
    DecompressionFailed { reason: String },

    /// Payload serialization / deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Imported snapshot failed structural validation
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// Named cache not registered with the manager
    #[error("Unknown cache: {0}")]
    UnknownCache(String),

    /// Cache does not support warm-up
    #[error("Cache does not support warm-up: {0}")]
    NotWarmable(String),

    /// Glob pattern could not be compiled
    #[error("Invalid pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownPolicy("mru".to_string());
        assert_eq!(err.to_string(), "Unknown eviction policy: mru");

        let err = Error::MetadataSource {
            subject: "User".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("User"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let bad: std::result::Result<u32, _> = serde_json::from_str("not json");
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
