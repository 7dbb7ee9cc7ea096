use std::fmt;

use crate::types::EndpointId;

/// Errors surfaced by registry and engine operations.
///
/// Delivery failures are *not* errors: they are recorded on the
/// delivery record and retried or terminated inside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No endpoint with the given id is registered.
    EndpointNotFound { endpoint_id: EndpointId },

    /// An endpoint must subscribe to at least one event type.
    NoSubscribedEvents,

    /// The target URL is not an http(s) URL.
    InvalidUrl { url: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::EndpointNotFound { endpoint_id } => {
                write!(f, "endpoint not found: {}", endpoint_id.0)
            }
            EngineError::NoSubscribedEvents => {
                write!(f, "endpoint must subscribe to at least one event type")
            }
            EngineError::InvalidUrl { url } => {
                write!(f, "invalid endpoint url: {}", url)
            }
        }
    }
}

impl std::error::Error for EngineError {}
