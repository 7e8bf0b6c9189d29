//! Inbound cloud notifications.
//!
//! Events arrive as JSON with a `kind` discriminator. Decoding is
//! strict: payloads with a kind we don't handle fail with
//! [`EventError::UnknownKind`] so the caller can reject them instead
//! of silently dropping state updates.

use convoy_state::NodeStatus;
use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// A decoded inbound notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CloudEvent {
    /// A node's free resources or drain status changed.
    NodeStateChange(NodeStateChange),
    /// A node entered the termination lifecycle and waits on a hook.
    TerminationLifecycle(TerminationLifecycle),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeStateChange {
    pub cluster_name: String,
    pub node_id: String,
    pub availability_zone: String,
    pub status: NodeStatus,
    pub free_cpu: i64,
    pub free_memory: i64,
    pub registered_cpu: i64,
    pub registered_memory: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminationLifecycle {
    pub node_id: String,
    pub node_group: String,
    pub hook_ref: String,
    pub token: String,
}

impl CloudEvent {
    /// Decode a raw JSON payload, rejecting unknown kinds.
    pub fn from_json(raw: &str) -> Result<Self, EventError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or(EventError::MissingKind)?;
        match kind {
            "node_state_change" | "termination_lifecycle" => {
                Ok(serde_json::from_value(value)?)
            }
            other => Err(EventError::UnknownKind(other.to_string())),
        }
    }
}
