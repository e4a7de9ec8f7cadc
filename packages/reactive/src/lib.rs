//! Reactive data layer: observed values, dependency recording and scopes.

pub mod error;
pub mod observer;
pub mod record;
pub mod scope;
pub mod value;

pub use error::{ReactiveError, ReactiveResult};
pub use observer::{child_path, element_path, is_private, observe, observe_root, ArrayRef, ObjectRef};
pub use record::{Bucket, Callback, Change, HandlerId, Reactor, Tag, MAX_BROADCAST_DEPTH};
pub use scope::Scope;
pub use value::{format_number, Function, Value};
