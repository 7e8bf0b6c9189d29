//! Notification intake.
//!
//! Inbound cloud notifications reach the daemon as newline-delimited
//! JSON on a byte stream. Node state changes go to the decision
//! engine, termination hooks to the lifecycle manager; payloads with
//! an unrecognized kind are rejected and logged, never silently
//! dropped.

use convoy_autoscale::DecisionEngine;
use convoy_cloud::{CloudEvent, CloudProvider};
use convoy_lifecycle::LifecycleManager;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, warn};

pub struct Intake<C> {
    engine: DecisionEngine<C>,
    lifecycle: LifecycleManager<C>,
}

impl<C: CloudProvider> Intake<C> {
    pub fn new(engine: DecisionEngine<C>, lifecycle: LifecycleManager<C>) -> Self {
        Self { engine, lifecycle }
    }

    /// Consume the stream until it closes. One bad line costs that
    /// line only.
    pub async fn run<R: AsyncBufRead + Unpin>(&self, reader: R) {
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            self.dispatch(&line).await;
        }
    }

    async fn dispatch(&self, raw: &str) {
        match CloudEvent::from_json(raw) {
            Ok(CloudEvent::NodeStateChange(change)) => {
                if let Err(err) = self.engine.process_node_event(&change).await {
                    error!(node = %change.node_id, %err, "node state change failed");
                }
            }
            Ok(CloudEvent::TerminationLifecycle(event)) => {
                if let Err(err) = self.lifecycle.handle_termination(&event).await {
                    error!(node = %event.node_id, %err, "termination handling failed");
                }
            }
            Err(err) => warn!(%err, "rejected notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use convoy_autoscale::AutoscaleConfig;
    use convoy_cloud::GroupLimits;
    use convoy_cloud::fake::FakeCloud;
    use convoy_deploy::TaskRegistry;
    use convoy_lifecycle::LifecycleConfig;
    use convoy_state::{NodeCapacity, NodeStatus, ServiceRegistryEntry, StateStore};
    use tokio::io::BufReader;

    use super::*;

    #[tokio::test]
    async fn routes_events_and_skips_garbage() {
        let store = StateStore::open_in_memory().unwrap();
        let cloud = Arc::new(FakeCloud::new());
        store
            .upsert_registry_entry(&ServiceRegistryEntry {
                service_name: "web".to_string(),
                cluster_name: "production".to_string(),
                cpu_reservation: 256,
                memory_reservation: 512,
                ..ServiceRegistryEntry::default()
            })
            .unwrap();
        cloud.script_group(
            "production",
            "production-workers",
            GroupLimits {
                min_size: 1,
                max_size: 3,
                desired: 2,
            },
        );
        cloud.script_nodes(
            "production",
            vec![NodeCapacity {
                node_id: "node-1".to_string(),
                availability_zone: "zone-a".to_string(),
                free_cpu: 1024,
                free_memory: 2048,
                status: NodeStatus::Active,
            }],
        );
        cloud.push_node_task_count("node-1", 0);

        let tasks = Arc::new(TaskRegistry::new(16));
        let engine = DecisionEngine::new(
            store.clone(),
            cloud.clone(),
            tasks.clone(),
            AutoscaleConfig {
                pending_interval: Duration::ZERO,
                ..AutoscaleConfig::default()
            },
        );
        let lifecycle = LifecycleManager::new(
            store,
            cloud.clone(),
            tasks.clone(),
            LifecycleConfig {
                drain_polls: 2,
                drain_interval: Duration::ZERO,
            },
        );
        let intake = Intake::new(engine, lifecycle);

        let feed = concat!(
            r#"{"kind":"node_state_change","cluster_name":"production","node_id":"node-1","availability_zone":"zone-a","status":"active","free_cpu":100,"free_memory":100,"registered_cpu":1024,"registered_memory":2048}"#,
            "\n",
            "not json at all\n",
            r#"{"kind":"billing_alert","amount":4}"#,
            "\n",
            r#"{"kind":"termination_lifecycle","node_id":"node-1","node_group":"production-workers","hook_ref":"hook/terminate","token":"tok-1"}"#,
            "\n",
        );
        intake.run(BufReader::new(feed.as_bytes())).await;
        tasks.wait_all().await;

        // no node fits 256/512 after the patch, so a node was added
        assert!(
            cloud
                .calls()
                .contains(&"resize_node_group:production-workers:3".to_string())
        );
        assert!(
            cloud
                .calls()
                .contains(&"drain_node:production:node-1".to_string())
        );
        assert!(
            cloud
                .calls()
                .contains(&"complete_lifecycle_action:production-workers:node-1".to_string())
        );
    }
}
