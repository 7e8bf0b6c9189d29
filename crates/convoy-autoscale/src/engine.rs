//! Event-driven scaling decisions.
//!
//! Each node state-change notification patches the capacity cache,
//! re-derives the cluster's largest container requirement from the
//! service registry, and decides whether the node group should grow
//! or shrink. Scale-ups apply immediately by default; scale-downs
//! (and graceful scale-ups) are recorded as pending and re-checked
//! by a bounded background loop that aborts when conditions flip
//! mid-wait.

use std::sync::Arc;

use convoy_cloud::{CloudProvider, NodeStateChange};
use convoy_deploy::TaskRegistry;
use convoy_state::time::epoch_ms;
use convoy_state::{ScalingDirection, ServiceRegistry, StateStore};
use tracing::{debug, error, info};

use crate::cache::{CapacityCache, apply_node_event};
use crate::config::{AutoscaleConfig, UpMode};
use crate::decision::{Requirement, zones_fit, zones_have_headroom};
use crate::error::{AutoscaleError, AutoscaleResult};

pub struct DecisionEngine<C> {
    store: StateStore,
    cloud: Arc<C>,
    cache: CapacityCache<C>,
    tasks: Arc<TaskRegistry>,
    config: AutoscaleConfig,
}

/// Largest cpu and memory reservation among the cluster's registered
/// services. Errors when nothing is registered to the cluster, since
/// a fit check without a requirement is meaningless.
pub(crate) fn requirement_for_cluster(
    registry: &ServiceRegistry,
    cluster_name: &str,
) -> AutoscaleResult<Requirement> {
    let mut requirement: Option<Requirement> = None;
    for entry in registry
        .entries
        .iter()
        .filter(|e| e.cluster_name == cluster_name)
    {
        let r = requirement.get_or_insert(Requirement { cpu: 0, memory: 0 });
        r.cpu = r.cpu.max(entry.cpu_reservation);
        r.memory = r.memory.max(entry.memory_reservation);
    }
    requirement.ok_or_else(|| AutoscaleError::UnknownCluster(cluster_name.to_string()))
}

fn direction_label(direction: ScalingDirection) -> &'static str {
    match direction {
        ScalingDirection::Up => "up",
        ScalingDirection::Down => "down",
    }
}

impl<C: CloudProvider> DecisionEngine<C> {
    pub fn new(
        store: StateStore,
        cloud: Arc<C>,
        tasks: Arc<TaskRegistry>,
        config: AutoscaleConfig,
    ) -> Self {
        let cache = CapacityCache::new(store.clone(), cloud.clone(), config.cache_ttl);
        Self {
            store,
            cloud,
            cache,
            tasks,
            config,
        }
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// Handle one node state-change notification: patch the cache,
    /// run the up/down decisions, append the patched snapshot with
    /// whatever was decided, and spawn the pending loop if a pending
    /// action was recorded.
    pub async fn process_node_event(&self, event: &NodeStateChange) -> AutoscaleResult<()> {
        let cluster_name = event.cluster_name.as_str();
        let requirement = requirement_for_cluster(&self.store.registry()?, cluster_name)?;
        let mut snapshot = self.cache.cluster_info(cluster_name, true).await?;
        apply_node_event(&mut snapshot, event);

        let node_group = self.cloud.node_group_for_cluster(cluster_name).await?;
        let limits = self.cloud.node_group_limits(&node_group).await?;
        let now = epoch_ms();

        let mut action = None;
        let mut pending = None;
        let mut fits_global = false;
        if self.config.scale_up_enabled {
            if limits.desired < limits.max_size {
                fits_global = zones_fit(requirement, &snapshot.nodes);
                if !fits_global && self.up_cooldown_clear(cluster_name, now)? {
                    match self.config.up_mode {
                        UpMode::Graceful => pending = Some(ScalingDirection::Up),
                        UpMode::Immediate => {
                            info!(
                                cluster = %cluster_name,
                                cpu = requirement.cpu,
                                memory = requirement.memory,
                                "largest container no longer fits, adding a node"
                            );
                            self.cloud
                                .resize_node_group(&node_group, limits.desired + 1)
                                .await?;
                            action = Some(ScalingDirection::Up);
                        }
                    }
                }
            }
        } else {
            fits_global = true;
        }

        if self.config.scale_down_enabled
            && limits.desired > limits.min_size
            && (fits_global || limits.desired == limits.max_size)
            && zones_have_headroom(
                requirement,
                &snapshot.nodes,
                event.registered_cpu,
                event.registered_memory,
                self.config.scale_up_enabled,
            )
        {
            let since = now.saturating_sub(self.config.down_cooldown.as_millis() as u64);
            let (last_action, already_pending) = self.store.scaling_activity(cluster_name, since)?;
            let deploy_running = self.store.is_deploy_running(now)?;
            if last_action.is_none() && already_pending.is_none() && !deploy_running {
                pending = Some(ScalingDirection::Down);
            } else {
                debug!(
                    cluster = %cluster_name,
                    ?last_action,
                    ?already_pending,
                    deploy_running,
                    "surplus capacity but scale-down is suppressed"
                );
            }
        }

        self.store
            .put_capacity(snapshot, cluster_name, action, pending, now)?;

        if let Some(direction) = pending {
            info!(cluster = %cluster_name, ?direction, "scaling pending, re-checking before applying");
            self.spawn_pending(
                cluster_name,
                direction,
                event.registered_cpu,
                event.registered_memory,
            );
        }
        Ok(())
    }

    fn up_cooldown_clear(&self, cluster_name: &str, now: u64) -> AutoscaleResult<bool> {
        let since = now.saturating_sub(self.config.up_cooldown.as_millis() as u64);
        let (last_action, _) = self.store.scaling_activity(cluster_name, since)?;
        if last_action.is_some() {
            debug!(cluster = %cluster_name, "scale-up warranted but inside the cooldown window");
        }
        Ok(last_action.is_none())
    }

    fn spawn_pending(
        &self,
        cluster_name: &str,
        direction: ScalingDirection,
        node_cpu: i64,
        node_memory: i64,
    ) {
        let name = format!("pending:{cluster_name}:{}", direction_label(direction));
        let store = self.store.clone();
        let cloud = self.cloud.clone();
        let cache = self.cache.clone();
        let config = self.config.clone();
        let cluster_name = cluster_name.to_string();
        self.tasks.spawn(&name, async move {
            let outcome = run_pending(
                &store,
                cloud,
                cache,
                &config,
                &cluster_name,
                direction,
                node_cpu,
                node_memory,
            )
            .await;
            if let Err(err) = outcome {
                error!(cluster = %cluster_name, ?direction, %err, "pending scaling operation failed");
            }
        });
    }
}

/// Bounded re-evaluation loop behind a pending action. Each poll
/// re-runs the triggering check against fresh state; the operation
/// aborts when the fit is restored (pending up), the surplus is gone,
/// or a deployment starts (pending down). Surviving every poll, the
/// resize applies and is recorded as cooldown history.
#[allow(clippy::too_many_arguments)]
async fn run_pending<C: CloudProvider>(
    store: &StateStore,
    cloud: Arc<C>,
    cache: CapacityCache<C>,
    config: &AutoscaleConfig,
    cluster_name: &str,
    direction: ScalingDirection,
    node_cpu: i64,
    node_memory: i64,
) -> AutoscaleResult<()> {
    let polls = match direction {
        ScalingDirection::Up => config.pending_up_polls,
        ScalingDirection::Down => config.pending_down_polls,
    };
    let mut snapshot = cache.cluster_info(cluster_name, true).await?;
    let mut abort = false;
    for _ in 0..polls {
        tokio::time::sleep(config.pending_interval).await;
        snapshot = cache.cluster_info(cluster_name, true).await?;
        let requirement = requirement_for_cluster(&store.registry()?, cluster_name)?;
        match direction {
            ScalingDirection::Down => {
                let headroom = zones_have_headroom(
                    requirement,
                    &snapshot.nodes,
                    node_cpu,
                    node_memory,
                    config.scale_up_enabled,
                );
                if !headroom || store.is_deploy_running(epoch_ms())? {
                    abort = true;
                }
            }
            ScalingDirection::Up => {
                if zones_fit(requirement, &snapshot.nodes) {
                    abort = true;
                }
            }
        }
        if abort {
            break;
        }
    }
    if abort {
        info!(cluster = %cluster_name, ?direction, "pending scaling aborted, conditions changed mid-wait");
        return Ok(());
    }

    let node_group = cloud.node_group_for_cluster(cluster_name).await?;
    let limits = cloud.node_group_limits(&node_group).await?;
    let desired = match direction {
        ScalingDirection::Up => limits.desired + 1,
        ScalingDirection::Down => limits.desired.saturating_sub(1),
    };
    info!(cluster = %cluster_name, ?direction, desired, "applying pending scaling operation");
    cloud.resize_node_group(&node_group, desired).await?;
    store.put_capacity(snapshot, cluster_name, Some(direction), None, epoch_ms())?;
    Ok(())
}
