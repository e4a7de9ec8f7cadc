use crate::error::ServiceError;
use futures::future::LocalBoxFuture;

/// Common Result type alias
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Single-threaded future returned by every collaborator
pub type ServiceFuture<T> = LocalBoxFuture<'static, ServiceResult<T>>;
