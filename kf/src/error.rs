//! Error types

use std::any::Any;
use std::fmt::Display;

use thiserror::Error;

/// A producer rejection, normalized so `message` is always available
///
/// Whatever the producer failed with is flattened through `Display`. This is the only
/// failure kind a fetch can end in; it is stored in the cache entry and the exposed
/// state, never returned to the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
}

impl FetchError {
    /// Create an error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Normalize any displayable failure value
    pub fn from_display(err: impl Display) -> Self {
        Self::new(err.to_string())
    }

    /// Normalize a panic payload caught while polling a producer
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(format!("producer panicked: {}", detail))
    }
}
