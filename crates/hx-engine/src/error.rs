//! Engine errors and exchange failure kinds

use crate::request::RequestState;
use hx_dom::{DomError, NodeId};
use hx_html::ParseError;

/// Why an exchange (or one part of it) did not go as requested.
///
/// These are reported through lifecycle events and the request log; they are
/// never returned as `Err` from the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureKind {
    /// A listener or extension canceled the request before it was sent
    #[error("request vetoed before send")]
    ConfigVetoed,
    /// No response was received
    #[error("network failure: {0}")]
    NetworkFailure(String),
    /// A response arrived with a non-success status
    #[error("HTTP error status {0}")]
    HttpError(u16),
    #[error("request timed out")]
    Timeout,
    /// The primary target matched nothing at swap time
    #[error("swap target missing: {0}")]
    SwapTargetMissing(String),
    /// One out-of-band fragment had no live target
    #[error("out-of-band target missing: {0}")]
    OobTargetMissing(String),
    /// An extension hook failed and was skipped
    #[error("extension {0} failed")]
    ExtensionError(String),
}

/// Error returned by an extension hook
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ExtensionError {
    pub message: String,
}

impl ExtensionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Extension registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("extension {0:?} is already registered")]
    Duplicate(String),
    #[error("extension {0:?} is not registered")]
    NotFound(String),
    #[error("extension registry has been disposed")]
    Disposed,
}

/// Rejected request state transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid request transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: RequestState,
    pub to: RequestState,
}

/// Engine API errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("HTML parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}
