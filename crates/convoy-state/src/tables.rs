//! redb table definitions for the Convoy state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized
//! domain types). Timestamps inside keys are zero-padded to 20 digits
//! so lexicographic order matches numeric order and range scans walk
//! records in submission order.

use redb::TableDefinition;

/// Deployment records keyed by `{service_name}:{submitted_at:020}`.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

/// Day secondary index: `{day}:{submitted_at:020}:{service_name}` →
/// primary deployment key.
pub const DEPLOYMENTS_BY_DAY: TableDefinition<&str, &str> =
    TableDefinition::new("deployments_by_day");

/// Month secondary index: `{month}:{submitted_at:020}:{service_name}` →
/// primary deployment key.
pub const DEPLOYMENTS_BY_MONTH: TableDefinition<&str, &str> =
    TableDefinition::new("deployments_by_month");

/// Singleton service registry document (key [`REGISTRY_KEY`]).
pub const REGISTRY: TableDefinition<&str, &[u8]> = TableDefinition::new("registry");

/// Capacity snapshot lineage keyed by `{captured_at:020}`.
pub const CAPACITY: TableDefinition<&str, &[u8]> = TableDefinition::new("capacity");

/// Leader lock rows keyed by scope (key [`LEADER_SCOPE`]).
pub const LEADER: TableDefinition<&str, &[u8]> = TableDefinition::new("leader");

/// Fixed key of the singleton registry document.
pub const REGISTRY_KEY: &str = "__services";

/// Fixed scope of the autoscaling poller's leader lock.
pub const LEADER_SCOPE: &str = "__autoscalingpull";
