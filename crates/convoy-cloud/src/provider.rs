//! The provider seam.
//!
//! Convoy never talks to a cloud API directly; every orchestration
//! component is generic over [`CloudProvider`]. Methods return
//! `impl Future + Send` so components can hold the provider behind an
//! `Arc` and spawn background work onto tokio.

use std::future::Future;

use convoy_state::{DeploySpec, HealthCheckSpec, NodeCapacity};

use crate::error::CloudResult;
use crate::types::*;

pub trait CloudProvider: Send + Sync + 'static {
    // ── Services and tasks ─────────────────────────────────────────

    /// Resolve (creating if needed) the execution role for a service.
    /// May fail with `RoleNotYetConsistent` right after creation.
    fn ensure_execution_role(
        &self,
        service_name: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send;

    /// Register a new task definition revision; returns its ref.
    fn register_task_definition(
        &self,
        service_name: &str,
        spec: &DeploySpec,
        role_ref: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send;

    fn service_exists(
        &self,
        cluster_name: &str,
        service_name: &str,
    ) -> impl Future<Output = CloudResult<bool>> + Send;

    fn create_service(&self, plan: &ServicePlan)
        -> impl Future<Output = CloudResult<()>> + Send;

    fn update_service(&self, plan: &ServicePlan)
        -> impl Future<Output = CloudResult<()>> + Send;

    fn describe_service(
        &self,
        cluster_name: &str,
        service_name: &str,
    ) -> impl Future<Output = CloudResult<ServiceDescription>> + Send;

    /// Change only the desired count of a running service.
    fn scale_service(
        &self,
        cluster_name: &str,
        service_name: &str,
        desired_count: u64,
    ) -> impl Future<Output = CloudResult<()>> + Send;

    /// Launch a one-off task; returns the task ref.
    fn run_task(
        &self,
        cluster_name: &str,
        task_def_ref: &str,
        started_by: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send;

    // ── Load balancing ─────────────────────────────────────────────

    fn create_target_group(
        &self,
        plan: &TargetGroupPlan,
    ) -> impl Future<Output = CloudResult<String>> + Send;

    /// Look up the target group already attached to a service.
    fn target_group_for_service(
        &self,
        service_name: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send;

    fn modify_target_group_attributes(
        &self,
        target_group_ref: &str,
        attributes: &TargetGroupAttributes,
    ) -> impl Future<Output = CloudResult<()>> + Send;

    fn update_health_check(
        &self,
        target_group_ref: &str,
        health_check: &HealthCheckSpec,
    ) -> impl Future<Output = CloudResult<()>> + Send;

    fn list_listeners(
        &self,
        load_balancer: &str,
    ) -> impl Future<Output = CloudResult<Vec<Listener>>> + Send;

    fn list_rules(
        &self,
        listener_ref: &str,
    ) -> impl Future<Output = CloudResult<Vec<RuleDescription>>> + Send;

    /// Create a rule; returns its ref.
    fn create_rule(
        &self,
        listener_ref: &str,
        priority: u64,
        conditions: &[RuleMatch],
        actions: &[RuleAction],
    ) -> impl Future<Output = CloudResult<String>> + Send;

    fn modify_rule(
        &self,
        rule_ref: &str,
        conditions: &[RuleMatch],
        actions: &[RuleAction],
    ) -> impl Future<Output = CloudResult<()>> + Send;

    fn delete_rule(&self, rule_ref: &str) -> impl Future<Output = CloudResult<()>> + Send;

    // ── Nodes and node groups ──────────────────────────────────────

    fn list_nodes(
        &self,
        cluster_name: &str,
    ) -> impl Future<Output = CloudResult<Vec<String>>> + Send;

    fn describe_node_resources(
        &self,
        cluster_name: &str,
        node_ids: &[String],
    ) -> impl Future<Output = CloudResult<Vec<NodeCapacity>>> + Send;

    fn node_group_for_cluster(
        &self,
        cluster_name: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send;

    fn node_group_limits(
        &self,
        node_group: &str,
    ) -> impl Future<Output = CloudResult<GroupLimits>> + Send;

    /// Set the node group's desired size. Fails with `AtCapacity`
    /// outside [min, max].
    fn resize_node_group(
        &self,
        node_group: &str,
        desired: u64,
    ) -> impl Future<Output = CloudResult<()>> + Send;

    fn cluster_for_node(
        &self,
        node_id: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send;

    fn node_task_count(
        &self,
        cluster_name: &str,
        node_id: &str,
    ) -> impl Future<Output = CloudResult<u64>> + Send;

    /// Put a node into draining so the scheduler migrates its tasks.
    fn drain_node(
        &self,
        cluster_name: &str,
        node_id: &str,
    ) -> impl Future<Output = CloudResult<()>> + Send;

    /// Tell the node group the termination hook may proceed.
    fn complete_lifecycle_action(
        &self,
        completion: &LifecycleCompletion,
    ) -> impl Future<Output = CloudResult<()>> + Send;
}
