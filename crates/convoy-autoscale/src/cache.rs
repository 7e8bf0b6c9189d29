//! Cluster capacity cache.
//!
//! Snapshots live in the state store. A fresh snapshot wins; a stale
//! or missing one is rebuilt by listing every node's resources from
//! the provider. Event-driven updates patch a single node row and
//! append the patched snapshot as a new entry, never overwriting.

use std::sync::Arc;
use std::time::Duration;

use convoy_cloud::{CloudProvider, NodeStateChange};
use convoy_state::time::epoch_ms;
use convoy_state::{CapacitySnapshot, NodeCapacity, StateStore};
use tracing::debug;

use crate::error::AutoscaleResult;

pub struct CapacityCache<C> {
    store: StateStore,
    cloud: Arc<C>,
    ttl: Duration,
}

impl<C> Clone for CapacityCache<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cloud: self.cloud.clone(),
            ttl: self.ttl,
        }
    }
}

impl<C: CloudProvider> CapacityCache<C> {
    pub fn new(store: StateStore, cloud: Arc<C>, ttl: Duration) -> Self {
        Self { store, cloud, ttl }
    }

    /// Latest capacity snapshot for the cluster. With `with_cache`
    /// set, a stored snapshot younger than the TTL is returned as-is;
    /// otherwise the node list is rebuilt from the provider. Rebuilt
    /// snapshots are not persisted here; callers append them through
    /// [`StateStore::put_capacity`] alongside their decision.
    pub async fn cluster_info(
        &self,
        cluster_name: &str,
        with_cache: bool,
    ) -> AutoscaleResult<CapacitySnapshot> {
        let now = epoch_ms();
        if with_cache
            && let Some(snapshot) = self.store.latest_capacity(now)?
            && snapshot.cluster_name == cluster_name
            && snapshot.captured_at + self.ttl.as_millis() as u64 > now
        {
            return Ok(snapshot);
        }
        debug!(cluster = %cluster_name, "capacity cache miss, listing node resources");
        let node_ids = self.cloud.list_nodes(cluster_name).await?;
        let nodes = self
            .cloud
            .describe_node_resources(cluster_name, &node_ids)
            .await?;
        Ok(CapacitySnapshot {
            cluster_name: cluster_name.to_string(),
            captured_at: now,
            nodes,
            ..CapacitySnapshot::default()
        })
    }
}

/// Patch the affected node's row in place, appending the row if the
/// node is not in the snapshot yet.
pub fn apply_node_event(snapshot: &mut CapacitySnapshot, event: &NodeStateChange) {
    match snapshot.node_mut(&event.node_id) {
        Some(node) => {
            node.availability_zone = event.availability_zone.clone();
            node.free_cpu = event.free_cpu;
            node.free_memory = event.free_memory;
            node.status = event.status;
        }
        None => snapshot.nodes.push(NodeCapacity {
            node_id: event.node_id.clone(),
            availability_zone: event.availability_zone.clone(),
            free_cpu: event.free_cpu,
            free_memory: event.free_memory,
            status: event.status,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use convoy_cloud::fake::FakeCloud;
    use convoy_state::NodeStatus;

    use super::*;

    fn change(node_id: &str, free_cpu: i64, free_memory: i64) -> NodeStateChange {
        NodeStateChange {
            cluster_name: "production".to_string(),
            node_id: node_id.to_string(),
            availability_zone: "zone-a".to_string(),
            status: NodeStatus::Active,
            free_cpu,
            free_memory,
            registered_cpu: 1024,
            registered_memory: 2048,
        }
    }

    #[tokio::test]
    async fn fresh_snapshot_wins_over_the_provider() {
        let store = StateStore::open_in_memory().unwrap();
        let cloud = Arc::new(FakeCloud::new());
        let cache = CapacityCache::new(store.clone(), cloud.clone(), Duration::from_secs(240));

        let mut snapshot = CapacitySnapshot::default();
        apply_node_event(&mut snapshot, &change("node-1", 500, 900));
        store
            .put_capacity(snapshot, "production", None, None, epoch_ms())
            .unwrap();

        let cached = cache.cluster_info("production", true).await.unwrap();
        assert_eq!(cached.nodes.len(), 1);
        assert_eq!(cached.nodes[0].free_cpu, 500);
        assert_eq!(cloud.call_count("list_nodes"), 0);
    }

    #[tokio::test]
    async fn missing_snapshot_rebuilds_from_the_provider() {
        let store = StateStore::open_in_memory().unwrap();
        let cloud = Arc::new(FakeCloud::new());
        cloud.script_nodes(
            "production",
            vec![NodeCapacity {
                node_id: "node-1".to_string(),
                availability_zone: "zone-a".to_string(),
                free_cpu: 800,
                free_memory: 1600,
                status: NodeStatus::Active,
            }],
        );
        let cache = CapacityCache::new(store, cloud.clone(), Duration::from_secs(240));

        let rebuilt = cache.cluster_info("production", true).await.unwrap();
        assert_eq!(rebuilt.nodes.len(), 1);
        assert_eq!(rebuilt.nodes[0].free_memory, 1600);
        assert_eq!(cloud.call_count("describe_node_resources"), 1);
    }

    #[test]
    fn event_patch_updates_one_row_and_appends_unknown_nodes() {
        let mut snapshot = CapacitySnapshot::default();
        apply_node_event(&mut snapshot, &change("node-1", 500, 900));
        apply_node_event(&mut snapshot, &change("node-2", 300, 700));
        apply_node_event(&mut snapshot, &change("node-1", 100, 200));
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.nodes[0].free_cpu, 100);
        assert_eq!(snapshot.nodes[1].free_cpu, 300);
    }
}
