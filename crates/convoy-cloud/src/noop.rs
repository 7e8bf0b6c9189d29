//! Provider used when no cloud adapter is configured.
//!
//! Listing calls report an empty world so the daemon's resume paths
//! and sweeps run cleanly on a fresh install; everything else fails
//! with a clear error naming the missing adapter. Unlike the test
//! double it records nothing, so it is safe in a long-running
//! process.

use std::future::{self, Future};

use convoy_state::{DeploySpec, HealthCheckSpec, NodeCapacity};

use crate::error::{CloudError, CloudResult};
use crate::provider::CloudProvider;
use crate::types::*;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCloud;

fn unconfigured<T>(operation: &str) -> future::Ready<CloudResult<T>> {
    future::ready(Err(CloudError::Provider(format!(
        "no cloud adapter configured ({operation})"
    ))))
}

impl CloudProvider for NoopCloud {
    fn ensure_execution_role(
        &self,
        _service_name: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        unconfigured("ensure_execution_role")
    }

    fn register_task_definition(
        &self,
        _service_name: &str,
        _spec: &DeploySpec,
        _role_ref: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        unconfigured("register_task_definition")
    }

    fn service_exists(
        &self,
        _cluster_name: &str,
        _service_name: &str,
    ) -> impl Future<Output = CloudResult<bool>> + Send {
        unconfigured("service_exists")
    }

    fn create_service(
        &self,
        _plan: &ServicePlan,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        unconfigured("create_service")
    }

    fn update_service(
        &self,
        _plan: &ServicePlan,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        unconfigured("update_service")
    }

    fn describe_service(
        &self,
        _cluster_name: &str,
        _service_name: &str,
    ) -> impl Future<Output = CloudResult<ServiceDescription>> + Send {
        unconfigured("describe_service")
    }

    fn scale_service(
        &self,
        _cluster_name: &str,
        _service_name: &str,
        _desired_count: u64,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        unconfigured("scale_service")
    }

    fn run_task(
        &self,
        _cluster_name: &str,
        _task_def_ref: &str,
        _started_by: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        unconfigured("run_task")
    }

    fn create_target_group(
        &self,
        _plan: &TargetGroupPlan,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        unconfigured("create_target_group")
    }

    fn target_group_for_service(
        &self,
        _service_name: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        unconfigured("target_group_for_service")
    }

    fn modify_target_group_attributes(
        &self,
        _target_group_ref: &str,
        _attributes: &TargetGroupAttributes,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        unconfigured("modify_target_group_attributes")
    }

    fn update_health_check(
        &self,
        _target_group_ref: &str,
        _health_check: &HealthCheckSpec,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        unconfigured("update_health_check")
    }

    fn list_listeners(
        &self,
        _load_balancer: &str,
    ) -> impl Future<Output = CloudResult<Vec<Listener>>> + Send {
        future::ready(Ok(Vec::new()))
    }

    fn list_rules(
        &self,
        _listener_ref: &str,
    ) -> impl Future<Output = CloudResult<Vec<RuleDescription>>> + Send {
        future::ready(Ok(Vec::new()))
    }

    fn create_rule(
        &self,
        _listener_ref: &str,
        _priority: u64,
        _conditions: &[RuleMatch],
        _actions: &[RuleAction],
    ) -> impl Future<Output = CloudResult<String>> + Send {
        unconfigured("create_rule")
    }

    fn modify_rule(
        &self,
        _rule_ref: &str,
        _conditions: &[RuleMatch],
        _actions: &[RuleAction],
    ) -> impl Future<Output = CloudResult<()>> + Send {
        unconfigured("modify_rule")
    }

    fn delete_rule(&self, _rule_ref: &str) -> impl Future<Output = CloudResult<()>> + Send {
        unconfigured("delete_rule")
    }

    fn list_nodes(
        &self,
        _cluster_name: &str,
    ) -> impl Future<Output = CloudResult<Vec<String>>> + Send {
        future::ready(Ok(Vec::new()))
    }

    fn describe_node_resources(
        &self,
        _cluster_name: &str,
        _node_ids: &[String],
    ) -> impl Future<Output = CloudResult<Vec<NodeCapacity>>> + Send {
        future::ready(Ok(Vec::new()))
    }

    fn node_group_for_cluster(
        &self,
        _cluster_name: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        unconfigured("node_group_for_cluster")
    }

    fn node_group_limits(
        &self,
        _node_group: &str,
    ) -> impl Future<Output = CloudResult<GroupLimits>> + Send {
        unconfigured("node_group_limits")
    }

    fn resize_node_group(
        &self,
        _node_group: &str,
        _desired: u64,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        unconfigured("resize_node_group")
    }

    fn cluster_for_node(
        &self,
        _node_id: &str,
    ) -> impl Future<Output = CloudResult<String>> + Send {
        unconfigured("cluster_for_node")
    }

    fn node_task_count(
        &self,
        _cluster_name: &str,
        _node_id: &str,
    ) -> impl Future<Output = CloudResult<u64>> + Send {
        unconfigured("node_task_count")
    }

    fn drain_node(
        &self,
        _cluster_name: &str,
        _node_id: &str,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        unconfigured("drain_node")
    }

    fn complete_lifecycle_action(
        &self,
        _completion: &LifecycleCompletion,
    ) -> impl Future<Output = CloudResult<()>> + Send {
        unconfigured("complete_lifecycle_action")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_an_empty_world_and_refuses_operations() {
        let cloud = NoopCloud;
        assert!(cloud.list_nodes("production").await.unwrap().is_empty());
        assert!(cloud.list_listeners("lb-prod").await.unwrap().is_empty());

        let err = cloud.drain_node("production", "node-1").await.unwrap_err();
        assert!(matches!(err, CloudError::Provider(message)
            if message.contains("drain_node")));
    }
}
