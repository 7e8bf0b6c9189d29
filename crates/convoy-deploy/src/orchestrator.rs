//! Rolling deployment orchestration.
//!
//! `deploy` is synchronous request/response up to the point where the
//! new deployment record is written; the stability wait runs as a
//! background task and reports only by mutating the record and
//! emitting notifications. The orchestrator holds no in-process
//! locks: the state store's version-conditioned writes are the only
//! synchronization, so multiple instances can run concurrently.

use std::sync::Arc;
use std::time::Duration;

use convoy_cloud::{CloudError, CloudProvider, TargetGroupAttributes};
use convoy_routing::RuleAllocator;
use convoy_state::time::{day_bucket, epoch_ms, month_bucket};
use convoy_state::{
    DeploySpec, DeploymentRecord, DeploymentStatus, HistoryBucket, RuleCondition, ScalingState,
    ServiceRegistryEntry, StateError, StateStore,
};
use tracing::{debug, info, warn};

use crate::error::DeployError;
use crate::notify::Notifier;
use crate::plan::{container_limits, service_plan};
use crate::stability::StabilityWatch;
use crate::tasks::TaskRegistry;

/// Recent-history window scanned by `resume`.
const RESUME_SCAN_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Sleep between stability-wait polls. The wait's poll count is
    /// fixed by the grace-period bound; shrinking the interval only
    /// speeds the wait up.
    pub poll_interval: Duration,
    /// Bounded retry for the role-consistency transient.
    pub role_retries: u32,
    pub role_retry_delay: Duration,
    /// How many history records rollback scans for a success.
    pub rollback_window: usize,
    /// DNS domain for hostname rule conditions.
    pub domain: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            role_retries: 5,
            role_retry_delay: Duration::from_secs(2),
            rollback_window: 10,
            domain: String::new(),
        }
    }
}

/// What a successful submission returns to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployReceipt {
    pub service_name: String,
    pub cluster_name: String,
    pub task_def_ref: String,
    pub deployed_at: u64,
}

pub struct Orchestrator<C, N> {
    store: StateStore,
    cloud: Arc<C>,
    allocator: RuleAllocator<C>,
    notifier: Arc<N>,
    tasks: Arc<TaskRegistry>,
    config: DeployConfig,
}

impl<C: CloudProvider, N: Notifier> Orchestrator<C, N> {
    pub fn new(store: StateStore, cloud: Arc<C>, notifier: Arc<N>, config: DeployConfig) -> Self {
        let allocator = RuleAllocator::new(cloud.clone(), config.domain.clone());
        Self {
            store,
            cloud,
            allocator,
            notifier,
            tasks: Arc::new(TaskRegistry::default()),
            config,
        }
    }

    /// Background task registry, exposed so callers (and tests) can
    /// await in-flight waits.
    pub fn tasks(&self) -> Arc<TaskRegistry> {
        self.tasks.clone()
    }

    /// Submit a deployment. Returns as soon as the new record is
    /// written; the stability wait continues in the background.
    pub async fn deploy(
        &self,
        service_name: &str,
        spec: DeploySpec,
    ) -> Result<DeployReceipt, DeployError> {
        for container in &spec.containers {
            if container.memory.is_none() && container.memory_reservation.is_none() {
                return Err(DeployError::MissingMemoryBound(container.name.clone()));
            }
        }

        let previous = self.store.latest_deployment(service_name)?;
        let role_ref = self.ensure_role(service_name).await?;
        let task_def_ref = self
            .cloud
            .register_task_definition(service_name, &spec, &role_ref)
            .await?;
        debug!(service = %service_name, %task_def_ref, "task definition registered");

        // Manual scale-outs survive a redeploy.
        let desired_count = previous
            .as_ref()
            .map(|p| p.scaling.desired_count)
            .unwrap_or_default()
            .max(spec.desired_count);
        let limits = container_limits(&spec);
        let load_balancer = spec
            .load_balancer
            .clone()
            .unwrap_or_else(|| spec.cluster.clone());

        let exists = self
            .cloud
            .service_exists(&spec.cluster, service_name)
            .await?;
        if exists {
            self.update_live_service(service_name, &spec, previous.as_ref(), limits)
                .await?;
            let plan = service_plan(service_name, &spec, &task_def_ref, desired_count, None);
            self.cloud.update_service(&plan).await?;
        } else {
            info!(service = %service_name, cluster = %spec.cluster, "creating service");
            let target_group_ref = self
                .allocator
                .create_target_group(service_name, &spec)
                .await?;
            let listeners = self
                .allocator
                .allocate(service_name, &spec, &target_group_ref, &load_balancer)
                .await?;
            let plan = service_plan(
                service_name,
                &spec,
                &task_def_ref,
                desired_count,
                Some(target_group_ref),
            );
            self.cloud.create_service(&plan).await?;
            self.store.upsert_registry_entry(&ServiceRegistryEntry {
                service_name: service_name.to_string(),
                cluster_name: spec.cluster.clone(),
                listener_rules: listeners,
                cpu_reservation: limits.0,
                cpu_limit: limits.1,
                memory_reservation: limits.2,
                memory_limit: limits.3,
            })?;
        }

        // Abort the superseded record before writing the new one, so
        // at most one record per service is ever running.
        if let Some(prev) = &previous {
            if prev.status == DeploymentStatus::Running {
                self.store
                    .update_deployment(service_name, prev.submitted_at, |r| {
                        if r.status == DeploymentStatus::Running {
                            r.status = DeploymentStatus::Aborted;
                        }
                    })?;
            }
        }

        let mut submitted_at = epoch_ms();
        if let Some(prev) = &previous {
            if prev.submitted_at >= submitted_at {
                submitted_at = prev.submitted_at + 1;
            }
        }
        let record = DeploymentRecord {
            service_name: service_name.to_string(),
            submitted_at,
            day: day_bucket(submitted_at, 0),
            month: month_bucket(submitted_at, 0),
            status: DeploymentStatus::Running,
            failure_reason: None,
            task_def_ref: task_def_ref.clone(),
            deploy_spec: spec.clone(),
            scaling: ScalingState {
                desired_count,
            },
            manual_task_refs: Vec::new(),
            version: 1,
        };
        self.store.put_deployment(&record)?;

        self.spawn_stability_wait(record, previous.map(|p| p.status));

        Ok(DeployReceipt {
            service_name: service_name.to_string(),
            cluster_name: spec.cluster,
            task_def_ref,
            deployed_at: submitted_at,
        })
    }

    /// Re-submit a historical record's spec. Rollback-by-value, not a
    /// distinct code path.
    pub async fn redeploy(
        &self,
        service_name: &str,
        submitted_at: u64,
    ) -> Result<DeployReceipt, DeployError> {
        let past = self.store.get_deployment(service_name, submitted_at)?;
        info!(service = %service_name, submitted_at, "redeploying historical spec");
        self.deploy(service_name, past.deploy_spec).await
    }

    /// Manual scale-out: persists the desired count on the latest
    /// record so it survives the next redeploy.
    pub async fn scale(&self, service_name: &str, desired_count: u64) -> Result<(), DeployError> {
        let latest = self.latest(service_name)?;
        self.cloud
            .scale_service(&latest.deploy_spec.cluster, service_name, desired_count)
            .await?;
        self.store
            .set_desired_count(service_name, latest.submitted_at, desired_count)?;
        info!(service = %service_name, desired_count, "service scaled");
        Ok(())
    }

    /// Launch a one-off task against the service's current task
    /// definition; the returned ref is recorded on the deployment.
    pub async fn run_task(
        &self,
        service_name: &str,
        started_by: &str,
    ) -> Result<String, DeployError> {
        let latest = self.latest(service_name)?;
        let task_ref = self
            .cloud
            .run_task(&latest.deploy_spec.cluster, &latest.task_def_ref, started_by)
            .await?;
        self.store
            .append_manual_task_ref(service_name, latest.submitted_at, &task_ref)?;
        Ok(task_ref)
    }

    /// Status read path for one submission.
    pub fn deployment_status(
        &self,
        service_name: &str,
        submitted_at: u64,
    ) -> Result<DeploymentRecord, DeployError> {
        Ok(self.store.get_deployment(service_name, submitted_at)?)
    }

    pub fn deploy_history(
        &self,
        service_name: &str,
        limit: usize,
    ) -> Result<Vec<DeploymentRecord>, DeployError> {
        Ok(self.store.deployments_for_service(service_name, limit)?)
    }

    /// Crash recovery: re-spawn the stability wait for every record
    /// still running in the recent window.
    pub fn resume(&self) -> Result<usize, DeployError> {
        let recent = self
            .store
            .recent_deployments(HistoryBucket::Day, RESUME_SCAN_LIMIT, epoch_ms())?;
        let mut resumed = 0;
        for record in recent {
            if record.status != DeploymentStatus::Running {
                continue;
            }
            let previous_status = self
                .store
                .deployments_for_service(&record.service_name, 2)?
                .into_iter()
                .find(|r| r.submitted_at < record.submitted_at)
                .map(|r| r.status);
            warn!(
                service = %record.service_name,
                submitted_at = record.submitted_at,
                "resuming stability wait for running deployment"
            );
            self.spawn_stability_wait(record, previous_status);
            resumed += 1;
        }
        Ok(resumed)
    }

    fn spawn_stability_wait(
        &self,
        record: DeploymentRecord,
        previous_status: Option<DeploymentStatus>,
    ) {
        let watch = StabilityWatch::new(
            self.store.clone(),
            self.cloud.clone(),
            self.notifier.clone(),
            self.config.poll_interval,
            self.config.rollback_window,
        );
        let name = format!("stability:{}:{}", record.service_name, record.submitted_at);
        self.tasks
            .spawn(&name, async move { watch.run(record, previous_status).await });
    }

    async fn ensure_role(&self, service_name: &str) -> Result<String, DeployError> {
        let mut attempt = 0;
        loop {
            match self.cloud.ensure_execution_role(service_name).await {
                Ok(role_ref) => return Ok(role_ref),
                Err(CloudError::RoleNotYetConsistent(_))
                    if attempt + 1 < self.config.role_retries =>
                {
                    attempt += 1;
                    debug!(service = %service_name, attempt, "waiting for role consistency");
                    tokio::time::sleep(self.config.role_retry_delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Diff-based updates against the previous deploy: health check,
    /// target group attributes, listener rules, and registry resource
    /// limits. Only changed surfaces get calls.
    async fn update_live_service(
        &self,
        service_name: &str,
        spec: &DeploySpec,
        previous: Option<&DeploymentRecord>,
        limits: (i64, i64, i64, i64),
    ) -> Result<(), DeployError> {
        if self.store.registry()?.entry(service_name).is_none() {
            self.store.upsert_registry_entry(&ServiceRegistryEntry {
                service_name: service_name.to_string(),
                cluster_name: spec.cluster.clone(),
                listener_rules: Vec::new(),
                cpu_reservation: limits.0,
                cpu_limit: limits.1,
                memory_reservation: limits.2,
                memory_limit: limits.3,
            })?;
        }
        let Some(prev) = previous else {
            return Ok(());
        };
        let prev_spec = &prev.deploy_spec;

        let health_changed = prev_spec.health_check != spec.health_check;
        let attributes_changed = prev_spec.stickiness != spec.stickiness
            || prev_spec.deregistration_delay_secs != spec.deregistration_delay_secs;
        let rules_changed = rule_conditions_changed(prev_spec, spec);
        if health_changed || attributes_changed || rules_changed {
            let target_group_ref = self.cloud.target_group_for_service(service_name).await?;
            if health_changed {
                debug!(service = %service_name, "health check changed, updating target group");
                self.cloud
                    .update_health_check(&target_group_ref, &spec.health_check)
                    .await?;
            }
            if attributes_changed {
                debug!(service = %service_name, "target group attributes changed");
                self.cloud
                    .modify_target_group_attributes(
                        &target_group_ref,
                        &TargetGroupAttributes {
                            deregistration_delay_secs: spec.deregistration_delay_secs,
                            stickiness_enabled: spec.stickiness.enabled,
                            stickiness_duration_secs: spec.stickiness.duration_secs,
                        },
                    )
                    .await?;
            }
            if rules_changed {
                info!(service = %service_name, "rule conditions changed, recreating listener rules");
                let load_balancer = spec
                    .load_balancer
                    .clone()
                    .unwrap_or_else(|| spec.cluster.clone());
                self.allocator
                    .deallocate(&target_group_ref, &load_balancer)
                    .await?;
                let listeners = self
                    .allocator
                    .allocate(service_name, spec, &target_group_ref, &load_balancer)
                    .await?;
                self.store
                    .update_service_listeners(&spec.cluster, service_name, &listeners)?;
            }
        }

        if container_limits(prev_spec) != limits {
            debug!(service = %service_name, "container limits changed, updating registry");
            self.store.update_service_limits(
                &spec.cluster,
                service_name,
                limits.0,
                limits.1,
                limits.2,
                limits.3,
            )?;
        }
        Ok(())
    }

    fn latest(&self, service_name: &str) -> Result<DeploymentRecord, DeployError> {
        self.store
            .latest_deployment(service_name)?
            .ok_or_else(|| {
                DeployError::State(StateError::NotFound(format!(
                    "deployment history for {service_name}"
                )))
            })
    }
}

/// Order-insensitive comparison of the specs' rule conditions. A
/// change means the live listener rules must be rebuilt.
fn rule_conditions_changed(prev: &DeploySpec, next: &DeploySpec) -> bool {
    if prev.rule_conditions.len() != next.rule_conditions.len() {
        return true;
    }
    let key = |c: &RuleCondition| (c.path_pattern.clone(), c.hostname.clone());
    let mut prev_sorted = prev.rule_conditions.clone();
    let mut next_sorted = next.rule_conditions.clone();
    prev_sorted.sort_by_key(key);
    next_sorted.sort_by_key(key);
    prev_sorted != next_sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_cloud::fake::FakeCloud;
    use convoy_cloud::{ListenerProtocol, RuleMatch, ServiceDeployment, ServiceDescription};
    use convoy_state::ContainerSpec;

    use crate::notify::CapturingNotifier;

    struct Harness {
        orchestrator: Orchestrator<FakeCloud, CapturingNotifier>,
        cloud: Arc<FakeCloud>,
        notifier: Arc<CapturingNotifier>,
        store: StateStore,
    }

    fn harness() -> Harness {
        let store = StateStore::open_in_memory().unwrap();
        let cloud = Arc::new(FakeCloud::new());
        let notifier = Arc::new(CapturingNotifier::default());
        let config = DeployConfig {
            poll_interval: Duration::ZERO,
            role_retry_delay: Duration::ZERO,
            domain: "example.com".into(),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(store.clone(), cloud.clone(), notifier.clone(), config);
        Harness {
            orchestrator,
            cloud,
            notifier,
            store,
        }
    }

    fn web_spec() -> DeploySpec {
        DeploySpec {
            cluster: "production".into(),
            service_port: 8080,
            service_protocol: "http".into(),
            desired_count: 1,
            containers: vec![ContainerSpec {
                name: "web".into(),
                image: "registry/web".into(),
                memory: Some(512),
                cpu: Some(256),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    /// A description the stability wait accepts as settled.
    fn stable(task_def_ref: &str, running: u64) -> ServiceDescription {
        ServiceDescription {
            cluster_name: "production".into(),
            service_name: "web".into(),
            desired_count: running,
            running_count: running,
            pending_count: 0,
            deployments: vec![ServiceDeployment {
                task_def_ref: task_def_ref.into(),
                desired_count: running,
                running_count: running,
            }],
            events: Vec::new(),
        }
    }

    #[tokio::test]
    async fn first_deploy_creates_service_and_ends_success() {
        let h = harness();
        h.cloud.push_description(stable("taskdef/web:1", 1));

        let receipt = h.orchestrator.deploy("web", web_spec()).await.unwrap();
        assert_eq!(receipt.task_def_ref, "taskdef/web:1");
        assert_eq!(receipt.cluster_name, "production");
        assert_eq!(h.cloud.call_count("create_service"), 1);

        let entry = h.store.registry().unwrap().entry("web").cloned().unwrap();
        assert_eq!(entry.cluster_name, "production");
        assert_eq!(entry.memory_limit, 512);
        assert_eq!(entry.cpu_reservation, 256);

        h.orchestrator.tasks().wait_all().await;
        let record = h.store.latest_deployment("web").unwrap().unwrap();
        assert_eq!(record.status, DeploymentStatus::Success);
    }

    #[tokio::test]
    async fn missing_memory_bound_rejected_before_anything_persists() {
        let h = harness();
        let mut spec = web_spec();
        spec.containers[0].memory = None;

        let err = h.orchestrator.deploy("web", spec).await.unwrap_err();
        assert!(matches!(err, DeployError::MissingMemoryBound(name) if name == "web"));
        assert!(h.store.latest_deployment("web").unwrap().is_none());
        assert_eq!(h.cloud.calls().len(), 0);
    }

    #[tokio::test]
    async fn role_consistency_transient_is_retried() {
        let h = harness();
        h.cloud.fail_role_times(2);
        h.cloud.push_description(stable("taskdef/web:1", 1));

        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        assert_eq!(h.cloud.call_count("ensure_execution_role"), 3);
        h.orchestrator.tasks().wait_all().await;
    }

    #[tokio::test]
    async fn preempting_deploy_aborts_first_record() {
        let h = harness();
        // Both waits observe the second revision as the settled one.
        h.cloud.push_description(stable("taskdef/web:2", 1));

        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        h.orchestrator.tasks().wait_all().await;

        let history = h.orchestrator.deploy_history("web", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, DeploymentStatus::Success);
        assert_eq!(history[0].task_def_ref, "taskdef/web:2");
        assert_eq!(history[1].status, DeploymentStatus::Aborted);

        let latest = h.store.latest_deployment("web").unwrap().unwrap();
        assert_eq!(latest.task_def_ref, "taskdef/web:2");
    }

    #[tokio::test]
    async fn failed_deploy_rolls_back_to_newest_success() {
        let h = harness();
        h.cloud.push_description(stable("taskdef/web:1", 1));

        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        h.orchestrator.tasks().wait_all().await;

        // The service keeps reporting the old revision, so the second
        // deploy fails and rolls back.
        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        h.orchestrator.tasks().wait_all().await;

        let history = h.orchestrator.deploy_history("web", 10).unwrap();
        assert_eq!(history[0].status, DeploymentStatus::Failed);
        assert_eq!(
            history[0].failure_reason.as_deref(),
            Some("still running the previous task definition")
        );
        assert_eq!(history[1].status, DeploymentStatus::Success);

        assert!(h
            .cloud
            .calls()
            .contains(&"update_service:production:web:taskdef/web:1:1".to_string()));
        assert_eq!(h.notifier.failures().len(), 1);
    }

    #[tokio::test]
    async fn rollback_without_prior_success_is_terminal() {
        let h = harness();
        // One deployment, right task def, but zero tasks ever run.
        h.cloud.push_description(stable("taskdef/web:1", 0));

        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        h.orchestrator.tasks().wait_all().await;

        let record = h.store.latest_deployment("web").unwrap().unwrap();
        assert_eq!(record.status, DeploymentStatus::Failed);
        assert_eq!(record.failure_reason.as_deref(), Some("no tasks running"));
        // No success in history, so no rollback update was issued.
        assert_eq!(h.cloud.call_count("update_service"), 0);
        assert_eq!(h.notifier.failures().len(), 1);
    }

    #[tokio::test]
    async fn recovery_notification_after_previous_failure() {
        let h = harness();
        h.cloud.push_description(stable("taskdef/web:1", 0));
        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        h.orchestrator.tasks().wait_all().await;
        assert!(h.notifier.recoveries().is_empty());

        h.cloud.push_description(stable("taskdef/web:2", 1));
        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        h.orchestrator.tasks().wait_all().await;

        let recoveries = h.notifier.recoveries();
        assert_eq!(recoveries.len(), 1);
        assert!(recoveries[0].starts_with("web:"));
    }

    #[tokio::test]
    async fn manual_scale_survives_redeploy() {
        let h = harness();
        h.cloud.push_description(stable("taskdef/web:1", 1));
        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        h.orchestrator.tasks().wait_all().await;

        h.orchestrator.scale("web", 5).await.unwrap();
        assert!(h
            .cloud
            .calls()
            .contains(&"scale_service:production:web:5".to_string()));

        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        h.orchestrator.tasks().wait_all().await;
        assert!(h
            .cloud
            .calls()
            .contains(&"update_service:production:web:taskdef/web:2:5".to_string()));
    }

    #[tokio::test]
    async fn run_task_records_the_manual_ref() {
        let h = harness();
        h.cloud.push_description(stable("taskdef/web:1", 1));
        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        h.orchestrator.tasks().wait_all().await;

        let task_ref = h.orchestrator.run_task("web", "operator").await.unwrap();
        let record = h.store.latest_deployment("web").unwrap().unwrap();
        assert_eq!(record.manual_task_refs, vec![task_ref]);
    }

    #[tokio::test]
    async fn resume_respawns_waits_for_running_records() {
        let h = harness();
        let now = epoch_ms();
        let record = DeploymentRecord {
            service_name: "web".into(),
            submitted_at: now,
            day: day_bucket(now, 0),
            month: month_bucket(now, 0),
            status: DeploymentStatus::Running,
            failure_reason: None,
            task_def_ref: "taskdef/web:9".into(),
            deploy_spec: web_spec(),
            scaling: ScalingState { desired_count: 1 },
            manual_task_refs: Vec::new(),
            version: 1,
        };
        h.store.put_deployment(&record).unwrap();
        h.cloud.push_description(stable("taskdef/web:9", 1));

        let resumed = h.orchestrator.resume().unwrap();
        assert_eq!(resumed, 1);
        h.orchestrator.tasks().wait_all().await;

        let record = h.store.latest_deployment("web").unwrap().unwrap();
        assert_eq!(record.status, DeploymentStatus::Success);
    }

    #[tokio::test]
    async fn multiple_active_deployments_classified_as_failure() {
        let h = harness();
        let mut desc = stable("taskdef/web:1", 1);
        desc.deployments.push(ServiceDeployment {
            task_def_ref: "taskdef/web:0".into(),
            desired_count: 1,
            running_count: 1,
        });
        h.cloud.push_description(desc);

        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        h.orchestrator.tasks().wait_all().await;

        let record = h.store.latest_deployment("web").unwrap().unwrap();
        assert_eq!(record.status, DeploymentStatus::Failed);
        assert_eq!(
            record.failure_reason.as_deref(),
            Some("more than one deployment still active")
        );
    }

    #[tokio::test]
    async fn changed_health_check_updates_target_group() {
        let h = harness();
        h.cloud.push_description(stable("taskdef/web:1", 1));
        h.orchestrator.deploy("web", web_spec()).await.unwrap();
        h.orchestrator.tasks().wait_all().await;
        assert_eq!(h.cloud.call_count("update_health_check"), 0);

        let mut spec = web_spec();
        spec.health_check.path = Some("/healthz".into());
        h.orchestrator.deploy("web", spec).await.unwrap();
        h.orchestrator.tasks().wait_all().await;
        assert_eq!(h.cloud.call_count("update_health_check"), 1);
        // Conditions did not change, so the rules were left alone.
        assert_eq!(h.cloud.call_count("delete_rule"), 0);
    }

    #[tokio::test]
    async fn changed_rule_conditions_recreate_listener_rules() {
        let h = harness();
        h.cloud
            .script_listener("production", "listener/https", ListenerProtocol::Https);
        h.cloud.push_description(stable("taskdef/web:2", 1));

        let condition = |path: &str| RuleCondition {
            listeners: vec!["https".into()],
            path_pattern: Some(path.into()),
            ..Default::default()
        };
        let mut spec = web_spec();
        spec.rule_conditions = vec![condition("/v1")];
        h.orchestrator.deploy("web", spec).await.unwrap();

        let mut spec = web_spec();
        spec.rule_conditions = vec![condition("/v2")];
        h.orchestrator.deploy("web", spec).await.unwrap();
        h.orchestrator.tasks().wait_all().await;

        // The /v1 rule is gone; the listener carries only /v2.
        assert_eq!(h.cloud.call_count("delete_rule"), 1);
        let rules = h.cloud.rules_for("listener/https");
        assert_eq!(rules.len(), 1);
        assert_eq!(
            rules[0].conditions,
            vec![RuleMatch::PathPattern("/v2".into())]
        );

        let entry = h.store.registry().unwrap().entry("web").cloned().unwrap();
        assert_eq!(entry.listener_rules, vec!["listener/https".to_string()]);
    }

    #[test]
    fn reordered_rule_conditions_are_not_a_change() {
        let condition = |path: &str, host: &str| RuleCondition {
            listeners: vec!["https".into()],
            path_pattern: Some(path.into()),
            hostname: Some(host.into()),
            ..Default::default()
        };
        let mut a = web_spec();
        a.rule_conditions = vec![condition("/api", "api"), condition("/admin", "admin")];
        let mut b = web_spec();
        b.rule_conditions = vec![condition("/admin", "admin"), condition("/api", "api")];
        assert!(!rule_conditions_changed(&a, &b));

        b.rule_conditions[0].path_pattern = Some("/admin/*".into());
        assert!(rule_conditions_changed(&a, &b));
    }
}
