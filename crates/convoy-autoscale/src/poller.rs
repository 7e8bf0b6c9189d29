//! Leader-gated capacity poller.
//!
//! The event-driven engine misses tasks that were never placed, so a
//! periodic sweep describes every registered service and looks for
//! ones stuck with fewer running than desired tasks. A sustained
//! shortfall, or an explicit placement-failure event newer than the
//! previous sweep, forces a scale-up without consulting the fit
//! check. Only one process instance sweeps at a time: each cycle
//! starts with a conditional lock write that wins only when the
//! stored lock has expired. There is no release; self-expiry is the
//! sole recovery if a leader dies mid-sweep.

use std::collections::HashMap;
use std::sync::Arc;

use convoy_cloud::CloudProvider;
use convoy_state::time::epoch_ms;
use convoy_state::{ScalingDirection, StateStore};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::cache::CapacityCache;
use crate::config::AutoscaleConfig;
use crate::error::AutoscaleResult;

/// Shortfall counters stop accumulating one past the trigger so a
/// stuck service fires once per episode, not once per sweep.
const SHORTFALL_CAP_PAST_TRIGGER: u32 = 1;

/// Carry-over between sweeps: when the previous sweep ran and how
/// many consecutive sweeps each service has shown a shortfall.
pub struct SweepState {
    last_checked: u64,
    shortfall: HashMap<String, u32>,
}

impl SweepState {
    pub fn new() -> Self {
        Self {
            last_checked: epoch_ms().saturating_sub(60_000),
            shortfall: HashMap::new(),
        }
    }
}

impl Default for SweepState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CapacityPoller<C> {
    store: StateStore,
    cloud: Arc<C>,
    cache: CapacityCache<C>,
    config: AutoscaleConfig,
    holder_id: String,
}

impl<C: CloudProvider> CapacityPoller<C> {
    pub fn new(store: StateStore, cloud: Arc<C>, config: AutoscaleConfig) -> Self {
        let cache = CapacityCache::new(store.clone(), cloud.clone(), config.cache_ttl);
        let holder_id = format!("convoyd-{}", Uuid::new_v4());
        Self {
            store,
            cloud,
            cache,
            config,
            holder_id,
        }
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Poll loop: contend for the lock, sweep on success, sleep,
    /// repeat. Lock loss and sweep errors cost one cycle each.
    pub async fn run(&self) {
        info!(holder = %self.holder_id, "capacity poller started");
        let mut state = SweepState::new();
        loop {
            let ttl_ms = self.config.lock_ttl.as_millis() as u64;
            match self.store.try_acquire_leader(&self.holder_id, epoch_ms(), ttl_ms) {
                Ok(true) => {
                    if let Err(err) = self.sweep(&mut state).await {
                        error!(%err, "capacity sweep failed");
                    }
                }
                Ok(false) => debug!("another instance holds the poller lock"),
                Err(err) => error!(%err, "poller lock acquisition failed"),
            }
            tokio::time::sleep(self.config.sweep_interval).await;
        }
    }

    /// One pass over the registry. Exposed separately so tests drive
    /// sweeps without the loop or the lock.
    pub async fn sweep(&self, state: &mut SweepState) -> AutoscaleResult<()> {
        let now = epoch_ms();
        let registry = self.store.registry()?;
        for entry in &registry.entries {
            let description = self
                .cloud
                .describe_service(&entry.cluster_name, &entry.service_name)
                .await?;
            let key = format!("{}:{}", entry.cluster_name, entry.service_name);
            if description.desired_count <= description.running_count {
                state.shortfall.remove(&key);
                continue;
            }
            let count = state.shortfall.entry(key.clone()).or_insert(0);
            if *count < self.config.sustained_shortfall_polls + SHORTFALL_CAP_PAST_TRIGGER {
                *count += 1;
            }
            debug!(
                service = %entry.service_name,
                cluster = %entry.cluster_name,
                desired = description.desired_count,
                running = description.running_count,
                consecutive = *count,
                "service below desired count"
            );
            let placement_failed = description
                .events
                .iter()
                .any(|e| e.occurred_at > state.last_checked && e.is_placement_failure());
            let sustained = *count == self.config.sustained_shortfall_polls;
            if placement_failed || sustained {
                info!(
                    service = %entry.service_name,
                    cluster = %entry.cluster_name,
                    placement_failed,
                    sustained,
                    "unschedulable tasks detected, forcing a scale-up"
                );
                self.force_scale_up(&entry.cluster_name).await?;
                state.shortfall.insert(key, 0);
            }
        }
        state.last_checked = now;
        Ok(())
    }

    /// Add one node, bypassing the fit check, and record the action
    /// so the cooldown window sees it. A provider refusal (group at
    /// max) is logged, not surfaced; the recorded action still
    /// suppresses refires.
    async fn force_scale_up(&self, cluster_name: &str) -> AutoscaleResult<()> {
        let node_group = self.cloud.node_group_for_cluster(cluster_name).await?;
        let limits = self.cloud.node_group_limits(&node_group).await?;
        if let Err(err) = self
            .cloud
            .resize_node_group(&node_group, limits.desired + 1)
            .await
        {
            error!(cluster = %cluster_name, %err, "forced scale-up was refused");
        }
        let snapshot = self.cache.cluster_info(cluster_name, true).await?;
        self.store.put_capacity(
            snapshot,
            cluster_name,
            Some(ScalingDirection::Up),
            None,
            epoch_ms(),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use convoy_cloud::fake::FakeCloud;
    use convoy_cloud::{GroupLimits, ServiceDescription, ServiceEvent};
    use convoy_state::ServiceRegistryEntry;

    use super::*;

    fn harness() -> (CapacityPoller<FakeCloud>, StateStore, Arc<FakeCloud>) {
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
        let poller = CapacityPoller::new(store.clone(), cloud.clone(), AutoscaleConfig::default());
        (poller, store, cloud)
    }

    fn shortfall(events: Vec<ServiceEvent>) -> ServiceDescription {
        ServiceDescription {
            cluster_name: "production".to_string(),
            service_name: "web".to_string(),
            desired_count: 2,
            running_count: 1,
            pending_count: 0,
            deployments: Vec::new(),
            events,
        }
    }

    #[tokio::test]
    async fn placement_failure_event_forces_a_scale_up() {
        let (poller, store, cloud) = harness();
        cloud.push_description(shortfall(vec![ServiceEvent {
            occurred_at: epoch_ms(),
            message: "service web was unable to place a task".to_string(),
        }]));

        let mut state = SweepState::new();
        poller.sweep(&mut state).await.unwrap();

        assert!(
            cloud
                .calls()
                .contains(&"resize_node_group:production-workers:3".to_string())
        );
        let newest = store.latest_capacity(epoch_ms()).unwrap().unwrap();
        assert_eq!(newest.scaling.action, Some(ScalingDirection::Up));
    }

    #[tokio::test]
    async fn stale_placement_failures_are_ignored() {
        let (poller, _store, cloud) = harness();
        cloud.push_description(shortfall(vec![ServiceEvent {
            occurred_at: epoch_ms().saturating_sub(10 * 60 * 1000),
            message: "service web was unable to place a task".to_string(),
        }]));

        let mut state = SweepState::new();
        poller.sweep(&mut state).await.unwrap();
        assert_eq!(cloud.call_count("resize_node_group"), 0);
    }

    #[tokio::test]
    async fn sustained_shortfall_forces_a_scale_up_once() {
        let (poller, _store, cloud) = harness();
        cloud.push_description(shortfall(Vec::new()));

        let mut state = SweepState::new();
        for _ in 0..4 {
            poller.sweep(&mut state).await.unwrap();
        }
        assert_eq!(cloud.call_count("resize_node_group"), 0);

        poller.sweep(&mut state).await.unwrap();
        assert_eq!(cloud.call_count("resize_node_group"), 1);

        // counter was reset; the next sweep starts a new episode
        poller.sweep(&mut state).await.unwrap();
        assert_eq!(cloud.call_count("resize_node_group"), 1);
    }

    #[tokio::test]
    async fn services_at_desired_count_reset_the_counter() {
        let (poller, _store, cloud) = harness();
        let mut state = SweepState::new();

        // four shortfalls, one recovery, then shortfalls again
        for _ in 0..4 {
            cloud.push_description(shortfall(Vec::new()));
        }
        cloud.push_description(ServiceDescription {
            running_count: 2,
            ..shortfall(Vec::new())
        });
        cloud.push_description(shortfall(Vec::new()));

        for _ in 0..6 {
            poller.sweep(&mut state).await.unwrap();
        }
        assert_eq!(cloud.call_count("resize_node_group"), 0);
    }
}
