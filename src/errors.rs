// Error Module
// Request-level and configuration-level failures, with their HTTP projection.
// Truncation is a successful outcome and never appears here.

use crate::openai::ErrorResponse;

/// A request that cannot be planned.
///
/// Surfaced immediately to the caller; no partial output is produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    /// Unknown length tag, non-positive duration, malformed message list
    #[error("{message}")]
    InvalidRequest {
        message: String,
        param: Option<&'static str>,
    },
    /// Model id is neither registered nor a tagged local-model name
    #[error("The model '{0}' does not exist")]
    ModelNotFound(String),
}

impl PlanError {
    pub fn invalid(message: impl Into<String>) -> Self {
        PlanError::InvalidRequest {
            message: message.into(),
            param: None,
        }
    }

    pub fn invalid_param(param: &'static str, message: impl Into<String>) -> Self {
        PlanError::InvalidRequest {
            message: message.into(),
            param: Some(param),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PlanError::InvalidRequest { .. } => 400,
            PlanError::ModelNotFound(_) => 404,
        }
    }

    /// Convert to OpenAI-style error response
    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            PlanError::InvalidRequest { message, param } => {
                let response = ErrorResponse::invalid_request(message.clone());
                match param {
                    Some(param) => response.with_param(*param),
                    None => response,
                }
            }
            PlanError::ModelNotFound(model) => ErrorResponse::model_not_found(model),
        }
    }
}

/// Configuration errors
///
/// Raised while loading a config file or applying a registration. The
/// registry in effect before the failing operation stays in effect.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(String),
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ConfigError::Validation(_) => 400,
            ConfigError::Io(_) | ConfigError::Parse(_) => 500,
        }
    }

    /// Convert to OpenAI-style error response
    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            ConfigError::Validation(_) => ErrorResponse::invalid_request(self.to_string()),
            ConfigError::Io(_) | ConfigError::Parse(_) => {
                ErrorResponse::new(self.to_string(), "server_error")
            }
        }
    }
}
