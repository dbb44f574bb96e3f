use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("LOAD_FAILED: {0}")]
    Load(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("INSUFFICIENT_DATA: {0}")]
    InsufficientData(String),
    #[error("FORBIDDEN_OPERATION: {0}")]
    Forbidden(String),
    #[error("TIMEOUT: {0}")]
    Timeout(String),
    #[error("QUERY_FAILED: {0}")]
    Query(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Load(_) => "LOAD_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InsufficientData(_) => "INSUFFICIENT_DATA",
            Self::Forbidden(_) => "FORBIDDEN_OPERATION",
            Self::Timeout(_) => "TIMEOUT",
            Self::Query(_) => "QUERY_FAILED",
            Self::Config(_) => "CONFIG_INVALID",
            Self::Io(_) => "IO_FAILURE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Failures the caller can show and move on from. Everything else means the
    /// process is misconfigured or broken.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::InsufficientData(_)
                | Self::Forbidden(_)
                | Self::Timeout(_)
                | Self::Query(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
