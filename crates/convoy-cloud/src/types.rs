//! Provider-facing request and response types.

use convoy_state::HealthCheckSpec;
use serde::{Deserialize, Serialize};

/// Everything a provider needs to create or update a service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServicePlan {
    pub cluster_name: String,
    pub service_name: String,
    pub task_def_ref: String,
    pub desired_count: u64,
    pub minimum_healthy_percent: u64,
    pub maximum_percent: u64,
    pub health_grace_secs: Option<u64>,
    /// Target group to attach; None for services without a load balancer.
    pub target_group_ref: Option<String>,
    pub container_name: String,
    pub container_port: u16,
}

/// Live state of a service as the provider reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceDescription {
    pub cluster_name: String,
    pub service_name: String,
    pub desired_count: u64,
    pub running_count: u64,
    pub pending_count: u64,
    pub deployments: Vec<ServiceDeployment>,
    pub events: Vec<ServiceEvent>,
}

/// One in-flight or settled rollout inside a service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceDeployment {
    pub task_def_ref: String,
    pub desired_count: u64,
    pub running_count: u64,
}

/// A provider-emitted service event, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceEvent {
    pub occurred_at: u64,
    pub message: String,
}

impl ServiceEvent {
    /// Whether this event reports that a task could not be placed on
    /// any node.
    pub fn is_placement_failure(&self) -> bool {
        self.message.contains("unable to place a task")
    }
}

/// Resolved target group creation parameters. The health check here
/// is already filled in; the provider applies it as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetGroupPlan {
    pub service_name: String,
    pub protocol: String,
    pub port: u16,
    pub health_check: HealthCheckSpec,
}

/// Post-creation target group attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetGroupAttributes {
    pub deregistration_delay_secs: Option<u64>,
    pub stickiness_enabled: bool,
    pub stickiness_duration_secs: Option<u64>,
}

/// A load balancer listener.
#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub listener_ref: String,
    pub protocol: ListenerProtocol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerProtocol {
    Http,
    Https,
}

/// A listener rule match condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatch {
    PathPattern(String),
    HostHeader(String),
}

/// A listener rule action. Actions execute in order; authentication
/// precedes the forward it guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    Forward { target_group_ref: String },
    RedirectToHttps,
    AuthenticateIdp {
        user_pool: String,
        client_name: String,
        domain: String,
    },
}

/// A rule as the provider reports it. Priority is None for the
/// listener's default rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDescription {
    pub rule_ref: String,
    pub priority: Option<u64>,
    pub conditions: Vec<RuleMatch>,
    pub actions: Vec<RuleAction>,
}

/// Size bounds and current desired size of a node group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupLimits {
    pub min_size: u64,
    pub max_size: u64,
    pub desired: u64,
}

/// What the lifecycle manager hands back to unblock a terminating node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LifecycleCompletion {
    pub node_group: String,
    pub hook_ref: String,
    pub token: String,
    pub node_id: String,
}
