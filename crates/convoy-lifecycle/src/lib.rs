//! convoy-lifecycle — best-effort node drain on termination hooks.

pub mod error;
pub mod manager;

pub use error::{LifecycleError, LifecycleResult};
pub use manager::{LifecycleConfig, LifecycleManager};
