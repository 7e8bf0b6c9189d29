//! convoy-deploy — rolling deployment orchestration.
//!
//! The [`Orchestrator`] drives the full deploy flow: execution role,
//! task definition registration, service create/update with listener
//! rule allocation, version-conditioned history writes, and the
//! asynchronous stability wait with rollback to the newest prior
//! success.

pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod plan;
mod stability;
pub mod tasks;

pub use error::DeployError;
pub use notify::{CapturingNotifier, LogNotifier, Notifier};
pub use orchestrator::{DeployConfig, DeployReceipt, Orchestrator};
pub use tasks::TaskRegistry;
