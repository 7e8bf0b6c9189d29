//! convoy-cloud — the provider seam between Convoy and the cloud.
//!
//! Defines the [`CloudProvider`] trait every orchestration component
//! is generic over, the typed inbound [`CloudEvent`] notifications, a
//! scripted [`fake::FakeCloud`] double for tests, and a
//! [`noop::NoopCloud`] for processes without a configured adapter.

pub mod error;
pub mod events;
pub mod fake;
pub mod noop;
pub mod provider;
pub mod types;

pub use error::{CloudError, CloudResult, EventError};
pub use events::{CloudEvent, NodeStateChange, TerminationLifecycle};
pub use provider::CloudProvider;
pub use types::*;
