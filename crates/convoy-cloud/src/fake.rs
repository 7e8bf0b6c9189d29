//! Scripted, call-recording provider double for orchestration tests.
//!
//! Responses are queued or keyed up front with the `script_*` and
//! `push_*` methods; every provider call is recorded as a
//! `"method:arg:arg"` string so tests can assert both what happened
//! and what didn't. All mutation happens under one mutex and every
//! future is immediately ready.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::{self, Future};
use std::sync::{Mutex, MutexGuard};

use convoy_state::{DeploySpec, HealthCheckSpec, NodeCapacity, NodeStatus};

use crate::error::{CloudError, CloudResult};
use crate::provider::CloudProvider;
use crate::types::*;

#[derive(Default)]
struct Inner {
    calls: Vec<String>,
    role_failures_remaining: u32,
    existing_services: HashSet<(String, String)>,
    descriptions: HashMap<(String, String), VecDeque<ServiceDescription>>,
    listeners: HashMap<String, Vec<Listener>>,
    rules: HashMap<String, Vec<RuleDescription>>,
    nodes: HashMap<String, Vec<NodeCapacity>>,
    groups: HashMap<String, GroupLimits>,
    group_for_cluster: HashMap<String, String>,
    cluster_for_node: HashMap<String, String>,
    node_task_counts: HashMap<String, VecDeque<u64>>,
    next_id: u64,
}

#[derive(Default)]
pub struct FakeCloud {
    inner: Mutex<Inner>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    // ── Scripting ──────────────────────────────────────────────────

    /// Make the next `n` `ensure_execution_role` calls fail with
    /// `RoleNotYetConsistent`.
    pub fn fail_role_times(&self, n: u32) {
        self.lock().role_failures_remaining = n;
    }

    pub fn script_service_exists(&self, cluster_name: &str, service_name: &str) {
        self.lock()
            .existing_services
            .insert((cluster_name.to_string(), service_name.to_string()));
    }

    /// Queue a `describe_service` response. The last queued response
    /// repeats once the queue drains.
    pub fn push_description(&self, description: ServiceDescription) {
        let key = (
            description.cluster_name.clone(),
            description.service_name.clone(),
        );
        self.lock()
            .descriptions
            .entry(key)
            .or_default()
            .push_back(description);
    }

    pub fn script_listener(
        &self,
        load_balancer: &str,
        listener_ref: &str,
        protocol: ListenerProtocol,
    ) {
        self.lock()
            .listeners
            .entry(load_balancer.to_string())
            .or_default()
            .push(Listener {
                listener_ref: listener_ref.to_string(),
                protocol,
            });
    }

    pub fn script_rule(&self, listener_ref: &str, rule: RuleDescription) {
        self.lock()
            .rules
            .entry(listener_ref.to_string())
            .or_default()
            .push(rule);
    }

    pub fn script_nodes(&self, cluster_name: &str, nodes: Vec<NodeCapacity>) {
        let mut inner = self.lock();
        for node in &nodes {
            inner
                .cluster_for_node
                .insert(node.node_id.clone(), cluster_name.to_string());
        }
        inner.nodes.insert(cluster_name.to_string(), nodes);
    }

    pub fn script_group(&self, cluster_name: &str, node_group: &str, limits: GroupLimits) {
        let mut inner = self.lock();
        inner
            .group_for_cluster
            .insert(cluster_name.to_string(), node_group.to_string());
        inner.groups.insert(node_group.to_string(), limits);
    }

    /// Queue successive `node_task_count` responses for one node.
    pub fn push_node_task_count(&self, node_id: &str, count: u64) {
        self.lock()
            .node_task_counts
            .entry(node_id.to_string())
            .or_default()
            .push_back(count);
    }

    // ── Inspection ─────────────────────────────────────────────────

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// How many recorded calls start with `prefix`.
    pub fn call_count(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Rules currently held for a listener.
    pub fn rules_for(&self, listener_ref: &str) -> Vec<RuleDescription> {
        self.lock()
            .rules
            .get(listener_ref)
            .cloned()
            .unwrap_or_default()
    }

    /// Current desired size of a node group.
    pub fn group_desired(&self, node_group: &str) -> Option<u64> {
        self.lock().groups.get(node_group).map(|g| g.desired)
    }

    fn fresh_id(inner: &mut Inner) -> u64 {
        inner.next_id += 1;
        inner.next_id
    }
}

impl CloudProvider for FakeCloud {
    fn ensure_execution_role(
        &self,
        service_name: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!("ensure_execution_role:{service_name}"));
            if inner.role_failures_remaining > 0 {
                inner.role_failures_remaining -= 1;
                Err(CloudError::RoleNotYetConsistent(service_name.to_string()))
            } else {
                Ok(format!("role/{service_name}"))
            }
        };
        future::ready(result)
    }

    fn register_task_definition(
        &self,
        service_name: &str,
        _spec: &DeploySpec,
        _role_ref: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        let result = {
            let mut inner = self.lock();
            let revision = Self::fresh_id(&mut inner);
            inner
                .calls
                .push(format!("register_task_definition:{service_name}"));
            Ok(format!("taskdef/{service_name}:{revision}"))
        };
        future::ready(result)
    }

    fn service_exists(
        &self,
        cluster_name: &str,
        service_name: &str,
    ) -> impl Future<Output = CloudResult<bool>> + Send {
        let result = {
            let mut inner = self.lock();
            inner
                .calls
                .push(format!("service_exists:{cluster_name}:{service_name}"));
            Ok(inner
                .existing_services
                .contains(&(cluster_name.to_string(), service_name.to_string())))
        };
        future::ready(result)
    }

    fn create_service(
        &self,
        plan: &ServicePlan,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!(
                "create_service:{}:{}:{}:{}",
                plan.cluster_name, plan.service_name, plan.task_def_ref, plan.desired_count
            ));
            inner
                .existing_services
                .insert((plan.cluster_name.clone(), plan.service_name.clone()));
            Ok(())
        };
        future::ready(result)
    }

    fn update_service(
        &self,
        plan: &ServicePlan,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!(
                "update_service:{}:{}:{}:{}",
                plan.cluster_name, plan.service_name, plan.task_def_ref, plan.desired_count
            ));
            Ok(())
        };
        future::ready(result)
    }

    fn describe_service(
        &self,
        cluster_name: &str,
        service_name: &str,
    ) -> impl Future<Output = CloudResult<ServiceDescription>> + Send {
        let result = {
            let mut inner = self.lock();
            inner
                .calls
                .push(format!("describe_service:{cluster_name}:{service_name}"));
            let key = (cluster_name.to_string(), service_name.to_string());
            match inner.descriptions.get_mut(&key) {
                Some(queue) => {
                    let next = if queue.len() > 1 {
                        queue.pop_front()
                    } else {
                        queue.front().cloned()
                    };
                    next.ok_or_else(|| CloudError::NotFound(service_name.to_string()))
                }
                None => Err(CloudError::NotFound(service_name.to_string())),
            }
        };
        future::ready(result)
    }

    fn scale_service(
        &self,
        cluster_name: &str,
        service_name: &str,
        desired_count: u64,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!(
                "scale_service:{cluster_name}:{service_name}:{desired_count}"
            ));
            Ok(())
        };
        future::ready(result)
    }

    fn run_task(
        &self,
        cluster_name: &str,
        task_def_ref: &str,
        started_by: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        let result = {
            let mut inner = self.lock();
            let id = Self::fresh_id(&mut inner);
            inner.calls.push(format!(
                "run_task:{cluster_name}:{task_def_ref}:{started_by}"
            ));
            Ok(format!("task/{id}"))
        };
        future::ready(result)
    }

    fn create_target_group(
        &self,
        plan: &TargetGroupPlan,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!(
                "create_target_group:{}:{}:{}",
                plan.service_name, plan.protocol, plan.port
            ));
            Ok(format!("tg/{}", plan.service_name))
        };
        future::ready(result)
    }

    fn target_group_for_service(
        &self,
        service_name: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        let result = {
            let mut inner = self.lock();
            inner
                .calls
                .push(format!("target_group_for_service:{service_name}"));
            Ok(format!("tg/{service_name}"))
        };
        future::ready(result)
    }

    fn modify_target_group_attributes(
        &self,
        target_group_ref: &str,
        attributes: &TargetGroupAttributes,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!(
                "modify_target_group_attributes:{target_group_ref}:sticky={}",
                attributes.stickiness_enabled
            ));
            Ok(())
        };
        future::ready(result)
    }

    fn update_health_check(
        &self,
        target_group_ref: &str,
        _health_check: &HealthCheckSpec,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        let result = {
            let mut inner = self.lock();
            inner
                .calls
                .push(format!("update_health_check:{target_group_ref}"));
            Ok(())
        };
        future::ready(result)
    }

    fn list_listeners(
        &self,
        load_balancer: &str,
    ) -> impl Future<Output = CloudResult<Vec<Listener>>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!("list_listeners:{load_balancer}"));
            Ok(inner
                .listeners
                .get(load_balancer)
                .cloned()
                .unwrap_or_default())
        };
        future::ready(result)
    }

    fn list_rules(
        &self,
        listener_ref: &str,
    ) -> impl Future<Output = CloudResult<Vec<RuleDescription>>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!("list_rules:{listener_ref}"));
            Ok(inner.rules.get(listener_ref).cloned().unwrap_or_default())
        };
        future::ready(result)
    }

    fn create_rule(
        &self,
        listener_ref: &str,
        priority: u64,
        conditions: &[RuleMatch],
        actions: &[RuleAction],
    ) -> impl Future<Output = CloudResult<String>> + Send {
        let result = {
            let mut inner = self.lock();
            let id = Self::fresh_id(&mut inner);
            let rule_ref = format!("rule/{id}");
            inner
                .calls
                .push(format!("create_rule:{listener_ref}:{priority}"));
            inner
                .rules
                .entry(listener_ref.to_string())
                .or_default()
                .push(RuleDescription {
                    rule_ref: rule_ref.clone(),
                    priority: Some(priority),
                    conditions: conditions.to_vec(),
                    actions: actions.to_vec(),
                });
            Ok(rule_ref)
        };
        future::ready(result)
    }

    fn modify_rule(
        &self,
        rule_ref: &str,
        conditions: &[RuleMatch],
        actions: &[RuleAction],
    ) -> impl Future<Output = CloudResult<()>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!("modify_rule:{rule_ref}"));
            let mut found = false;
            for rules in inner.rules.values_mut() {
                for rule in rules.iter_mut() {
                    if rule.rule_ref == rule_ref {
                        rule.conditions = conditions.to_vec();
                        rule.actions = actions.to_vec();
                        found = true;
                    }
                }
            }
            if found {
                Ok(())
            } else {
                Err(CloudError::NotFound(rule_ref.to_string()))
            }
        };
        future::ready(result)
    }

    fn delete_rule(&self, rule_ref: &str) -> impl Future<Output = CloudResult<()>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!("delete_rule:{rule_ref}"));
            for rules in inner.rules.values_mut() {
                rules.retain(|r| r.rule_ref != rule_ref);
            }
            Ok(())
        };
        future::ready(result)
    }

    fn list_nodes(
        &self,
        cluster_name: &str,
    ) -> impl Future<Output = CloudResult<Vec<String>>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!("list_nodes:{cluster_name}"));
            Ok(inner
                .nodes
                .get(cluster_name)
                .map(|nodes| nodes.iter().map(|n| n.node_id.clone()).collect())
                .unwrap_or_default())
        };
        future::ready(result)
    }

    fn describe_node_resources(
        &self,
        cluster_name: &str,
        node_ids: &[String],
    ) -> impl Future<Output = CloudResult<Vec<NodeCapacity>>> + Send {
        let result = {
            let mut inner = self.lock();
            inner
                .calls
                .push(format!("describe_node_resources:{cluster_name}"));
            Ok(inner
                .nodes
                .get(cluster_name)
                .map(|nodes| {
                    nodes
                        .iter()
                        .filter(|n| node_ids.contains(&n.node_id))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        };
        future::ready(result)
    }

    fn node_group_for_cluster(
        &self,
        cluster_name: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        let result = {
            let mut inner = self.lock();
            inner
                .calls
                .push(format!("node_group_for_cluster:{cluster_name}"));
            inner
                .group_for_cluster
                .get(cluster_name)
                .cloned()
                .ok_or_else(|| CloudError::NotFound(cluster_name.to_string()))
        };
        future::ready(result)
    }

    fn node_group_limits(
        &self,
        node_group: &str,
    ) -> impl Future<Output = CloudResult<GroupLimits>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!("node_group_limits:{node_group}"));
            inner
                .groups
                .get(node_group)
                .copied()
                .ok_or_else(|| CloudError::NotFound(node_group.to_string()))
        };
        future::ready(result)
    }

    fn resize_node_group(
        &self,
        node_group: &str,
        desired: u64,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        let result = {
            let mut inner = self.lock();
            inner
                .calls
                .push(format!("resize_node_group:{node_group}:{desired}"));
            match inner.groups.get_mut(node_group) {
                Some(limits) if desired < limits.min_size || desired > limits.max_size => {
                    Err(CloudError::AtCapacity(node_group.to_string()))
                }
                Some(limits) => {
                    limits.desired = desired;
                    Ok(())
                }
                None => Err(CloudError::NotFound(node_group.to_string())),
            }
        };
        future::ready(result)
    }

    fn cluster_for_node(
        &self,
        node_id: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!("cluster_for_node:{node_id}"));
            inner
                .cluster_for_node
                .get(node_id)
                .cloned()
                .ok_or_else(|| CloudError::NotFound(node_id.to_string()))
        };
        future::ready(result)
    }

    fn node_task_count(
        &self,
        cluster_name: &str,
        node_id: &str,
    ) -> impl Future<Output = CloudResult<u64>> + Send {
        let result = {
            let mut inner = self.lock();
            inner
                .calls
                .push(format!("node_task_count:{cluster_name}:{node_id}"));
            let queue = inner.node_task_counts.entry(node_id.to_string()).or_default();
            Ok(if queue.len() > 1 {
                queue.pop_front().unwrap_or_default()
            } else {
                queue.front().copied().unwrap_or_default()
            })
        };
        future::ready(result)
    }

    fn drain_node(
        &self,
        cluster_name: &str,
        node_id: &str,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        let result = {
            let mut inner = self.lock();
            inner
                .calls
                .push(format!("drain_node:{cluster_name}:{node_id}"));
            if let Some(nodes) = inner.nodes.get_mut(cluster_name) {
                for node in nodes.iter_mut() {
                    if node.node_id == node_id {
                        node.status = NodeStatus::Draining;
                    }
                }
            }
            Ok(())
        };
        future::ready(result)
    }

    fn complete_lifecycle_action(
        &self,
        completion: &LifecycleCompletion,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        let result = {
            let mut inner = self.lock();
            inner.calls.push(format!(
                "complete_lifecycle_action:{}:{}",
                completion.node_group, completion.node_id
            ));
            Ok(())
        };
        future::ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn role_failures_then_success() {
        let cloud = FakeCloud::new();
        cloud.fail_role_times(2);

        assert!(cloud.ensure_execution_role("web").await.is_err());
        assert!(cloud.ensure_execution_role("web").await.is_err());
        let role = cloud.ensure_execution_role("web").await.unwrap();
        assert_eq!(role, "role/web");
        assert_eq!(cloud.call_count("ensure_execution_role"), 3);
    }

    #[tokio::test]
    async fn description_queue_repeats_last() {
        let cloud = FakeCloud::new();
        cloud.push_description(ServiceDescription {
            cluster_name: "production".into(),
            service_name: "web".into(),
            running_count: 0,
            ..Default::default()
        });
        cloud.push_description(ServiceDescription {
            cluster_name: "production".into(),
            service_name: "web".into(),
            running_count: 2,
            ..Default::default()
        });

        let first = cloud.describe_service("production", "web").await.unwrap();
        assert_eq!(first.running_count, 0);
        for _ in 0..3 {
            let next = cloud.describe_service("production", "web").await.unwrap();
            assert_eq!(next.running_count, 2);
        }
    }

    #[tokio::test]
    async fn resize_respects_group_bounds() {
        let cloud = FakeCloud::new();
        cloud.script_group(
            "production",
            "production-workers",
            GroupLimits { min_size: 1, max_size: 3, desired: 2 },
        );

        cloud.resize_node_group("production-workers", 3).await.unwrap();
        assert_eq!(cloud.group_desired("production-workers"), Some(3));

        let err = cloud.resize_node_group("production-workers", 4).await.unwrap_err();
        assert!(matches!(err, CloudError::AtCapacity(_)));
        assert_eq!(cloud.group_desired("production-workers"), Some(3));
    }
}
