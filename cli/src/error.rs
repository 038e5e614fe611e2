//! Command error types for the CLI
//!
//! Provides structured errors that serialize to `{"code": "...", "message": "..."}`,
//! so scripts driving the CLI can match on the code.

use serde::Serialize;

/// Errors returned by CLI commands
///
/// Each variant serializes with a snake_case `code` field.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum CommandError {
    // Validation errors
    InvalidArgument { message: String },
    InvalidResultFile { message: String, path: String },

    // Not found errors
    FileNotFound { message: String, path: String },
    ExtractedDataNotFound { message: String },

    // Configuration errors
    ConfigError { message: String },
    ProviderNotConfigured { message: String },

    // Operation errors
    StorageError { message: String },
    InternalError { message: String },
}

impl CommandError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn invalid_result_file(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        let path = path.into();
        Self::InvalidResultFile {
            message: format!("Not a pipeline result: {} ({})", path, reason),
            path,
        }
    }

    pub fn file_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::FileNotFound {
            message: format!("File not found: {}", path),
            path,
        }
    }

    pub fn extracted_data_not_found() -> Self {
        Self::ExtractedDataNotFound {
            message: "Result has no extracted data to convert".to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn provider_not_configured(message: impl Into<String>) -> Self {
        Self::ProviderNotConfigured {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument { message } => write!(f, "{}", message),
            Self::InvalidResultFile { message, .. } => write!(f, "{}", message),
            Self::FileNotFound { message, .. } => write!(f, "{}", message),
            Self::ExtractedDataNotFound { message } => write!(f, "{}", message),
            Self::ConfigError { message } => write!(f, "{}", message),
            Self::ProviderNotConfigured { message } => write!(f, "{}", message),
            Self::StorageError { message } => write!(f, "{}", message),
            Self::InternalError { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for CommandError {}

// Conversion from anyhow::Error (used by lessonscan-core); keeps the context chain
impl From<anyhow::Error> for CommandError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", err))
    }
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(err.to_string())
    }
}

/// Result type alias for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Extension trait for converting Results to CommandResult
pub trait ResultExt<T> {
    fn storage_err(self) -> CommandResult<T>;
    fn internal_err(self) -> CommandResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn storage_err(self) -> CommandResult<T> {
        self.map_err(|e| CommandError::storage(e.to_string()))
    }

    fn internal_err(self) -> CommandResult<T> {
        self.map_err(|e| CommandError::internal(e.to_string()))
    }
}
