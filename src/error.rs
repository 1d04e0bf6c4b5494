use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArboreaError {
    #[error("Not in an arborea project. Run 'arborea init' first.")]
    NotInitialized,

    #[error("Already initialized. Remove .arborea/ to reinitialize.")]
    AlreadyInitialized,

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Permit not found: {0}")]
    PermitNotFound(String),

    #[error("Species not found: {0}")]
    SpeciesNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArboreaError {
    /// Shorthand for a field-level validation failure.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ArboreaError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for ArboreaError {
    fn from(e: rusqlite::Error) -> Self {
        ArboreaError::Storage(format!("SQLite error: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, ArboreaError>;
