// Service Errors
// Every service operation fails with one of three kinds. The HTTP layer maps
// them to 400, 404 and 500 in `http_types`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormsError {
    /// Malformed id, missing required field, bad enum value
    #[error("{0}")]
    InvalidInput(String),

    /// No matching entity, or an empty search result
    #[error("{0}")]
    NotFound(String),

    /// Any unexpected persistence failure. Never shown to clients.
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl FormsError {
    pub fn invalid(message: impl Into<String>) -> Self {
        FormsError::InvalidInput(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        FormsError::NotFound(message.into())
    }

    /// Wrap a validation failure from the `types`/`models` layer
    pub fn from_validation(err: anyhow::Error) -> Self {
        FormsError::InvalidInput(err.to_string())
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, FormsError::InvalidInput(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FormsError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, FormsError>;
