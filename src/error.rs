use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolyrunError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    // Routing errors
    #[error("Unsupported language: '{language}'")]
    UnknownLanguage { language: String },

    #[error("Backend '{backend}' is not available: {reason}")]
    BackendNotAvailable { backend: String, reason: String },

    // Runtime lifecycle errors
    #[error("Failed to load {runtime} runtime: {reason}")]
    RuntimeLoad { runtime: String, reason: String },

    #[error("WASM compilation failed: {0}")]
    WasmCompilation(String),

    // Execution errors
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Execution timed out after {0}")]
    Timeout(String),

    #[error("Remote execution service unreachable: {0}")]
    RemoteTransport(String),

    #[error("Package installation failed for '{package}': {reason}")]
    PackageInstall { package: String, reason: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PolyrunError {
    /// Environmental faults the user can fix by retrying, as opposed to bugs in their code.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RuntimeLoad { .. } | Self::RemoteTransport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PolyrunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let load = PolyrunError::RuntimeLoad {
            runtime: "python".to_string(),
            reason: "offline".to_string(),
        };
        assert!(load.is_retryable());
        assert!(PolyrunError::RemoteTransport("refused".to_string()).is_retryable());
        assert!(!PolyrunError::Execution("boom".to_string()).is_retryable());
        assert!(!PolyrunError::Timeout("30 seconds".to_string()).is_retryable());
    }

    #[test]
    fn test_unknown_language_message_names_key() {
        let err = PolyrunError::UnknownLanguage {
            language: "cobol".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported language: 'cobol'");
    }
}
