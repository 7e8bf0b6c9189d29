//! convoy-autoscale — cluster capacity management.
//!
//! Keeps an append-only cache of node capacity, turns node
//! state-change notifications into node group resize decisions, and
//! runs a leader-gated sweep that catches tasks the event path never
//! saw placed. Decisions are pure functions over a snapshot; the
//! engine wires them to the store and the provider.

pub mod cache;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod poller;

pub use cache::{CapacityCache, apply_node_event};
pub use config::{AutoscaleConfig, UpMode};
pub use decision::{Requirement, zones_fit, zones_have_headroom};
pub use engine::DecisionEngine;
pub use error::{AutoscaleError, AutoscaleResult};
pub use poller::{CapacityPoller, SweepState};
