use thiserror::Error;

/// Top-level error type for Synapse.
///
/// Subsystem crates define their own error types and implement
/// `From<SynapseError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SynapseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for SynapseError {
    fn from(err: toml::de::Error) -> Self {
        SynapseError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SynapseError {
    fn from(err: serde_json::Error) -> Self {
        SynapseError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Synapse operations.
pub type Result<T> = std::result::Result<T, SynapseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SynapseError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = SynapseError::Serialization("bad record".to_string());
        assert_eq!(err.to_string(), "Serialization error: bad record");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SynapseError = io_err.into();
        assert!(matches!(err, SynapseError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SynapseError = json_err.into();
        assert!(matches!(err, SynapseError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: SynapseError = toml_err.into();
        assert!(matches!(err, SynapseError::Config(_)));
    }
}
