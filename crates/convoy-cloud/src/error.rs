//! Error types for provider calls and inbound event decoding.

use thiserror::Error;

/// Errors surfaced by a [`CloudProvider`](crate::CloudProvider)
/// implementation.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The node group cannot grow or shrink to the requested size.
    #[error("node group {0} is at its size boundary")]
    AtCapacity(String),

    /// A freshly created IAM-style role has not propagated yet.
    /// Transient; callers retry a fixed number of times.
    #[error("execution role for {0} not yet consistent")]
    RoleNotYetConsistent(String),

    #[error("provider error: {0}")]
    Provider(String),
}

pub type CloudResult<T> = Result<T, CloudError>;

/// Errors decoding an inbound cloud notification.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("event payload has no kind discriminator")]
    MissingKind,

    /// Kinds we don't handle are rejected, not silently dropped.
    #[error("unknown event kind: {0}")]
    UnknownKind(String),
}
