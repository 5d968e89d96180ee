use thiserror::Error;

pub type SanitizerResult<T> = Result<T, SanitizerError>;

/// Construction-time and caller errors.
///
/// Rule violations found while walking a document are never reported through
/// this type; they become [`crate::ValidationError`] records instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SanitizerError {
    #[error("Unknown argument '{key}' for sanitizer '{sanitizer}'. Declared arguments: {declared}")]
    UnknownArg {
        sanitizer: String,
        key: String,
        declared: String,
    },

    #[error("Argument '{key}' is not declared by sanitizer '{sanitizer}'")]
    UndeclaredArg { sanitizer: String, key: String },

    #[error("Invalid value for argument '{key}': expected {expected}")]
    InvalidArgType { key: String, expected: String },

    #[error("Unknown sanitizer '{name}' in pipeline configuration")]
    UnknownSanitizer { name: String },

    #[error("Unknown validation error '{id}'")]
    UnknownValidationError { id: String },

    #[error("Invalid document tree: {0}")]
    InvalidTree(String),

    #[error("YAML error: {0}")]
    YamlError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<serde_yaml::Error> for SanitizerError {
    fn from(err: serde_yaml::Error) -> Self {
        SanitizerError::YamlError(err.to_string())
    }
}

impl From<std::io::Error> for SanitizerError {
    fn from(err: std::io::Error) -> Self {
        SanitizerError::IoError(err.to_string())
    }
}
