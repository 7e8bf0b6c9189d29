//! Domain types for the Convoy state store.
//!
//! These types represent the persisted state of deployments, the
//! service registry, cluster capacity snapshots, and the leader lock.
//! All types are serializable to/from JSON for storage in redb tables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Deploy spec ───────────────────────────────────────────────────

/// Specification for one service revision, as submitted by a caller.
///
/// The full spec is stored inside every `DeploymentRecord` so a
/// historical record can be redeployed by value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeploySpec {
    pub cluster: String,
    /// Load balancer to attach to; defaults to the cluster name.
    #[serde(default)]
    pub load_balancer: Option<String>,
    pub service_port: u16,
    /// Backend protocol ("http", "https").
    pub service_protocol: String,
    pub desired_count: u64,
    #[serde(default)]
    pub minimum_healthy_percent: Option<u64>,
    #[serde(default)]
    pub maximum_percent: Option<u64>,
    pub containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub health_check: HealthCheckSpec,
    /// Explicit listener rule conditions; empty means default
    /// path-based rules.
    #[serde(default)]
    pub rule_conditions: Vec<RuleCondition>,
    /// Seconds before a deregistering target is released.
    #[serde(default)]
    pub deregistration_delay_secs: Option<u64>,
    #[serde(default)]
    pub stickiness: StickinessSpec,
}

/// One container within a deploy spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub essential: bool,
    /// Hard memory limit in MiB.
    #[serde(default)]
    pub memory: Option<i64>,
    /// Soft memory reservation in MiB.
    #[serde(default)]
    pub memory_reservation: Option<i64>,
    /// Hard CPU limit in shares.
    #[serde(default)]
    pub cpu: Option<i64>,
    /// Soft CPU reservation in shares.
    #[serde(default)]
    pub cpu_reservation: Option<i64>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Target-group health check parameters. Unset fields fall back to
/// central defaults at rule-allocation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckSpec {
    #[serde(default)]
    pub healthy_threshold: Option<u32>,
    #[serde(default)]
    pub unhealthy_threshold: Option<u32>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub interval_secs: Option<u32>,
    /// HTTP status matcher, e.g. "200" or "200-299".
    #[serde(default)]
    pub matcher: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u32>,
    /// Grace period before health checks count against the service.
    /// Also scales the deployment stability-wait bound.
    #[serde(default)]
    pub grace_period_secs: Option<u64>,
}

/// An explicit listener rule condition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleCondition {
    /// Listener protocols this condition applies to ("http", "https").
    pub listeners: Vec<String>,
    #[serde(default)]
    pub path_pattern: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    /// Identity-provider authentication in front of the rule.
    /// Requires HTTPS; plain HTTP listeners get a redirect instead.
    #[serde(default)]
    pub auth: Option<IdpAuth>,
}

/// Cognito-style identity provider attached to a listener rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdpAuth {
    pub client_name: String,
    pub user_pool: String,
    pub domain: String,
}

/// Target-group stickiness.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StickinessSpec {
    pub enabled: bool,
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

// ── Deployment history ────────────────────────────────────────────

/// Lifecycle status of one deployment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Running,
    Success,
    Failed,
    Aborted,
}

/// One entry in a service's append-only deployment history.
///
/// Partitioned by service name, sorted by submission time. Every
/// write increments `version` and is conditioned on the previous
/// version, so concurrent mutators cannot lose updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentRecord {
    pub service_name: String,
    /// Submission time, epoch milliseconds. Sort key.
    pub submitted_at: u64,
    /// Day bucket ("2026-08-29") for the secondary index.
    pub day: String,
    /// Month bucket ("2026-08") for the secondary index.
    pub month: String,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub failure_reason: Option<String>,
    /// Task definition revision this record deployed.
    pub task_def_ref: String,
    pub deploy_spec: DeploySpec,
    pub scaling: ScalingState,
    /// One-off task refs launched against this revision.
    #[serde(default)]
    pub manual_task_refs: Vec<String>,
    pub version: u64,
}

/// Desired-count state carried across redeploys so manual scale-outs
/// survive.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScalingState {
    pub desired_count: u64,
}

impl DeploymentRecord {
    /// Build the composite key for the deployments table.
    pub fn table_key(&self) -> String {
        deployment_key(&self.service_name, self.submitted_at)
    }
}

/// Composite key `{service}:{submitted_at:020}` — zero padding keeps
/// lexicographic and numeric ordering identical.
pub fn deployment_key(service_name: &str, submitted_at: u64) -> String {
    format!("{service_name}:{submitted_at:020}")
}

// ── Service registry ──────────────────────────────────────────────

/// The singleton registry of deployed services, one versioned
/// document shared by all orchestrator instances.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceRegistry {
    pub entries: Vec<ServiceRegistryEntry>,
    pub version: u64,
}

impl ServiceRegistry {
    pub fn entry(&self, service_name: &str) -> Option<&ServiceRegistryEntry> {
        self.entries.iter().find(|e| e.service_name == service_name)
    }
}

/// Registry row for one service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceRegistryEntry {
    pub service_name: String,
    pub cluster_name: String,
    /// Listener refs that carry rules for this service.
    pub listener_rules: Vec<String>,
    pub cpu_reservation: i64,
    pub cpu_limit: i64,
    pub memory_reservation: i64,
    pub memory_limit: i64,
}

// ── Cluster capacity ──────────────────────────────────────────────

/// Node placement state as tracked in capacity snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Draining,
}

/// Free capacity of one node at snapshot time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeCapacity {
    pub node_id: String,
    pub availability_zone: String,
    pub free_cpu: i64,
    pub free_memory: i64,
    pub status: NodeStatus,
}

/// Direction of a scaling action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingDirection {
    Up,
    Down,
}

/// Scaling action attached to a capacity snapshot. The snapshot
/// lineage doubles as cooldown history: a recent snapshot with an
/// `action` (or `pending_action`) set suppresses new triggers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScalingOperation {
    pub cluster_name: String,
    #[serde(default)]
    pub action: Option<ScalingDirection>,
    #[serde(default)]
    pub pending_action: Option<ScalingDirection>,
}

/// Point-in-time capacity snapshot for a cluster. Append-only;
/// the newest entry wins and old entries expire after 30 days.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CapacitySnapshot {
    pub cluster_name: String,
    /// Capture time, epoch milliseconds. Sort key.
    pub captured_at: u64,
    pub nodes: Vec<NodeCapacity>,
    pub scaling: ScalingOperation,
    /// TTL, epoch milliseconds.
    pub expires_at: u64,
}

impl CapacitySnapshot {
    pub fn node_mut(&mut self, node_id: &str) -> Option<&mut NodeCapacity> {
        self.nodes.iter_mut().find(|n| n.node_id == node_id)
    }
}

// ── Leader lock ───────────────────────────────────────────────────

/// Self-expiring lock row for the autoscaling poller. Granted by a
/// conditional write; never explicitly released.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderLock {
    pub holder_id: String,
    /// Acquisition time, epoch milliseconds.
    pub acquired_at: u64,
}
