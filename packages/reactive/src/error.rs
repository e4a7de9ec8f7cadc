use thiserror::Error;

pub type ReactiveResult<T> = Result<T, ReactiveError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReactiveError {
    #[error("Watcher re-triggered while running (write to {path})")]
    Reentrant { path: String },

    #[error("Broadcast chain deeper than {depth} (write to {path})")]
    DepthExceeded { path: String, depth: usize },
}

impl ReactiveError {
    pub fn reentrant(path: impl Into<String>) -> Self {
        Self::Reentrant { path: path.into() }
    }

    pub fn depth_exceeded(path: impl Into<String>, depth: usize) -> Self {
        Self::DepthExceeded {
            path: path.into(),
            depth,
        }
    }
}
