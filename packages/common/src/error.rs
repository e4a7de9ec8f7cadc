use thiserror::Error;

/// Failures reported by the external collaborators (loaders, packages, models)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Resource not found: {url}")]
    NotFound { url: String },

    #[error("IO error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("Package {name} failed: {message}")]
    Package { name: String, message: String },

    #[error("Model {name} failed: {message}")]
    Model { name: String, message: String },

    #[error("Unknown validation rule: {0}")]
    UnknownRule(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Generic error: {0}")]
    Generic(String),
}

impl ServiceError {
    pub fn not_found(url: impl Into<String>) -> Self {
        Self::NotFound { url: url.into() }
    }

    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn package(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Package {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn model(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Model {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<String> for ServiceError {
    fn from(s: String) -> Self {
        ServiceError::Generic(s)
    }
}

impl From<&str> for ServiceError {
    fn from(s: &str) -> Self {
        ServiceError::Generic(s.to_string())
    }
}
