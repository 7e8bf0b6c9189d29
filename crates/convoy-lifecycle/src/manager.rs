//! Node termination handling.
//!
//! A termination-lifecycle notification means the node group wants
//! to take a node away and is waiting on our hook. The node is
//! switched to draining so nothing new lands on it, the capacity
//! snapshot row follows, and a background wait polls the node's task
//! count until it hits zero or the bound elapses. Either way the
//! lifecycle action completes; a stuck workload must not block
//! termination indefinitely.

use std::sync::Arc;
use std::time::Duration;

use convoy_cloud::{CloudProvider, LifecycleCompletion, TerminationLifecycle};
use convoy_deploy::TaskRegistry;
use convoy_state::time::epoch_ms;
use convoy_state::{NodeStatus, StateStore};
use tracing::{debug, error, info};

use crate::error::LifecycleResult;

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Task-count polls before the drain wait gives up.
    pub drain_polls: u32,
    pub drain_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_polls: 80,
            drain_interval: Duration::from_secs(15),
        }
    }
}

pub struct LifecycleManager<C> {
    store: StateStore,
    cloud: Arc<C>,
    tasks: Arc<TaskRegistry>,
    config: LifecycleConfig,
}

impl<C: CloudProvider> LifecycleManager<C> {
    pub fn new(
        store: StateStore,
        cloud: Arc<C>,
        tasks: Arc<TaskRegistry>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            cloud,
            tasks,
            config,
        }
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// React to a termination notification: drain the node, mark its
    /// capacity row, and spawn the drain wait.
    pub async fn handle_termination(&self, event: &TerminationLifecycle) -> LifecycleResult<()> {
        let cluster_name = self.cloud.cluster_for_node(&event.node_id).await?;
        info!(
            node = %event.node_id,
            cluster = %cluster_name,
            "termination hook fired, draining node"
        );
        self.cloud.drain_node(&cluster_name, &event.node_id).await?;
        self.mark_draining(&cluster_name, &event.node_id)?;
        let completion = LifecycleCompletion {
            node_group: event.node_group.clone(),
            hook_ref: event.hook_ref.clone(),
            token: event.token.clone(),
            node_id: event.node_id.clone(),
        };
        self.spawn_wait(&cluster_name, completion);
        Ok(())
    }

    /// Crash recovery: nodes the provider already reports as draining
    /// get their snapshot row corrected and their wait re-spawned.
    /// The re-spawned completion carries no token; the provider
    /// resolves the pending hook itself.
    pub async fn resume(&self) -> LifecycleResult<usize> {
        let registry = self.store.registry()?;
        let mut clusters: Vec<&str> = registry
            .entries
            .iter()
            .map(|e| e.cluster_name.as_str())
            .collect();
        clusters.sort_unstable();
        clusters.dedup();

        let mut resumed = 0;
        for cluster_name in clusters {
            let node_ids = self.cloud.list_nodes(cluster_name).await?;
            let nodes = self
                .cloud
                .describe_node_resources(cluster_name, &node_ids)
                .await?;
            for node in nodes.iter().filter(|n| n.status == NodeStatus::Draining) {
                self.mark_draining(cluster_name, &node.node_id)?;
                let node_group = self.cloud.node_group_for_cluster(cluster_name).await?;
                info!(
                    node = %node.node_id,
                    cluster = %cluster_name,
                    "resuming drain wait for node found draining"
                );
                self.spawn_wait(
                    cluster_name,
                    LifecycleCompletion {
                        node_group,
                        hook_ref: String::new(),
                        token: String::new(),
                        node_id: node.node_id.clone(),
                    },
                );
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    /// Append a snapshot with the node's row switched to draining.
    /// Without a current snapshot, or with one that does not carry
    /// the node, the event path will patch it in later.
    fn mark_draining(&self, cluster_name: &str, node_id: &str) -> LifecycleResult<()> {
        let now = epoch_ms();
        if let Some(mut snapshot) = self.store.latest_capacity(now)?
            && snapshot.cluster_name == cluster_name
            && let Some(node) = snapshot.node_mut(node_id)
        {
            node.status = NodeStatus::Draining;
            self.store
                .put_capacity(snapshot, cluster_name, None, None, now)?;
        }
        Ok(())
    }

    fn spawn_wait(&self, cluster_name: &str, completion: LifecycleCompletion) {
        let name = format!("drain:{}", completion.node_id);
        let cloud = self.cloud.clone();
        let config = self.config.clone();
        let cluster_name = cluster_name.to_string();
        self.tasks.spawn(&name, async move {
            wait_for_drain(cloud, config, cluster_name, completion).await;
        });
    }
}

/// Poll the node's task count until it drains or the bound elapses,
/// then complete the lifecycle action either way. A describe failure
/// abandons the wait without completing; the hook's own timeout
/// takes over from there.
async fn wait_for_drain<C: CloudProvider>(
    cloud: Arc<C>,
    config: LifecycleConfig,
    cluster_name: String,
    completion: LifecycleCompletion,
) {
    let mut drained = false;
    for _ in 0..config.drain_polls {
        match cloud.node_task_count(&cluster_name, &completion.node_id).await {
            Ok(0) => {
                drained = true;
                break;
            }
            Ok(count) => {
                debug!(node = %completion.node_id, count, "node still running tasks");
            }
            Err(err) => {
                error!(node = %completion.node_id, %err, "drain wait could not read task count");
                return;
            }
        }
        tokio::time::sleep(config.drain_interval).await;
    }
    if !drained {
        error!(
            node = %completion.node_id,
            "drain wait timed out, completing lifecycle action anyway"
        );
    }
    match cloud.complete_lifecycle_action(&completion).await {
        Ok(()) => info!(node = %completion.node_id, drained, "lifecycle action completed"),
        Err(err) => {
            error!(node = %completion.node_id, %err, "could not complete lifecycle action");
        }
    }
}

#[cfg(test)]
mod tests {
    use convoy_cloud::fake::FakeCloud;
    use convoy_state::{CapacitySnapshot, NodeCapacity, ServiceRegistryEntry};

    use super::*;

    fn node(id: &str, status: NodeStatus) -> NodeCapacity {
        NodeCapacity {
            node_id: id.to_string(),
            availability_zone: "zone-a".to_string(),
            free_cpu: 512,
            free_memory: 1024,
            status,
        }
    }

    fn harness() -> (LifecycleManager<FakeCloud>, StateStore, Arc<FakeCloud>) {
        let store = StateStore::open_in_memory().unwrap();
        let cloud = Arc::new(FakeCloud::new());
        let tasks = Arc::new(TaskRegistry::new(16));
        let config = LifecycleConfig {
            drain_polls: 3,
            drain_interval: Duration::ZERO,
        };
        let manager = LifecycleManager::new(store.clone(), cloud.clone(), tasks, config);
        (manager, store, cloud)
    }

    fn termination(node_id: &str) -> TerminationLifecycle {
        TerminationLifecycle {
            node_id: node_id.to_string(),
            node_group: "production-workers".to_string(),
            hook_ref: "hook/terminate".to_string(),
            token: "tok-1".to_string(),
        }
    }

    #[tokio::test]
    async fn termination_drains_and_completes_once_tasks_exit() {
        let (manager, store, cloud) = harness();
        cloud.script_nodes("production", vec![node("node-1", NodeStatus::Active)]);
        store
            .put_capacity(
                CapacitySnapshot {
                    nodes: vec![node("node-1", NodeStatus::Active)],
                    ..CapacitySnapshot::default()
                },
                "production",
                None,
                None,
                epoch_ms(),
            )
            .unwrap();
        cloud.push_node_task_count("node-1", 2);
        cloud.push_node_task_count("node-1", 1);
        cloud.push_node_task_count("node-1", 0);

        manager
            .handle_termination(&termination("node-1"))
            .await
            .unwrap();

        let snapshot = store.latest_capacity(epoch_ms()).unwrap().unwrap();
        assert_eq!(snapshot.nodes[0].status, NodeStatus::Draining);
        assert!(
            cloud
                .calls()
                .contains(&"drain_node:production:node-1".to_string())
        );

        manager.tasks().wait_all().await;
        assert!(
            cloud
                .calls()
                .contains(&"complete_lifecycle_action:production-workers:node-1".to_string())
        );
    }

    #[tokio::test]
    async fn completion_fires_even_when_the_drain_times_out() {
        let (manager, _store, cloud) = harness();
        cloud.script_nodes("production", vec![node("node-1", NodeStatus::Active)]);
        cloud.push_node_task_count("node-1", 5);

        manager
            .handle_termination(&termination("node-1"))
            .await
            .unwrap();
        manager.tasks().wait_all().await;

        assert_eq!(cloud.call_count("node_task_count"), 3);
        assert_eq!(cloud.call_count("complete_lifecycle_action"), 1);
    }

    #[tokio::test]
    async fn resume_respawns_waits_for_draining_nodes() {
        let (manager, store, cloud) = harness();
        store
            .upsert_registry_entry(&ServiceRegistryEntry {
                service_name: "web".to_string(),
                cluster_name: "production".to_string(),
                ..ServiceRegistryEntry::default()
            })
            .unwrap();
        cloud.script_nodes(
            "production",
            vec![
                node("node-1", NodeStatus::Draining),
                node("node-2", NodeStatus::Active),
            ],
        );
        cloud.script_group(
            "production",
            "production-workers",
            convoy_cloud::GroupLimits {
                min_size: 1,
                max_size: 3,
                desired: 2,
            },
        );
        cloud.push_node_task_count("node-1", 0);

        let resumed = manager.resume().await.unwrap();
        assert_eq!(resumed, 1);

        manager.tasks().wait_all().await;
        assert!(
            cloud
                .calls()
                .contains(&"complete_lifecycle_action:production-workers:node-1".to_string())
        );
    }
}
