//! convoy-state — embedded state store for Convoy.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state management for deployment history, the service registry, cluster
//! capacity snapshots, and the autoscaling leader lock.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{service}:{timestamp:020}`, zero-padded epoch millis)
//! enable ordered prefix scans of per-service history; day/month index
//! tables support cross-service recency queries.
//!
//! Shared documents carry a version counter. Every mutation is a
//! conditional write that fails with `StateError::VersionConflict` when a
//! concurrent writer advanced the version first, making lost updates
//! impossible across processes sharing one store.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod retry;
pub mod store;
pub mod tables;
pub mod time;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{HistoryBucket, StateStore, CAPACITY_TTL_MS};
pub use types::*;
