//! Post-deploy stability wait and rollback.
//!
//! Every deploy spawns one of these as a background task. It polls
//! the provider until the service settles or a bounded timeout
//! elapses, classifies the outcome, and finishes the deployment
//! record. A failed outcome triggers rollback to the newest prior
//! success. The final status write only ever transitions a record
//! that is still `Running`; a wait superseded by a newer deploy finds
//! its record already aborted and leaves it alone.

use std::sync::Arc;
use std::time::Duration;

use convoy_cloud::CloudProvider;
use convoy_state::{DeploymentRecord, DeploymentStatus, StateStore};
use tracing::{debug, error, info};

use crate::error::DeployError;
use crate::notify::Notifier;
use crate::plan::service_plan;

/// Reference poll cadence the wait bound is expressed in.
const REFERENCE_POLL_SECS: u64 = 15;

/// Wait bound in minutes: 15 without a grace period, otherwise
/// `(1 + ceil(grace / 10min)) * 10`.
fn wait_bound_minutes(grace_period_secs: Option<u64>) -> u64 {
    match grace_period_secs {
        Some(grace) if grace > 0 => (1 + grace.div_ceil(600)) * 10,
        _ => 15,
    }
}

fn stability_polls(grace_period_secs: Option<u64>) -> u64 {
    wait_bound_minutes(grace_period_secs) * 60 / REFERENCE_POLL_SECS
}

pub(crate) struct StabilityWatch<C, N> {
    store: StateStore,
    cloud: Arc<C>,
    notifier: Arc<N>,
    poll_interval: Duration,
    rollback_window: usize,
}

impl<C, N> Clone for StabilityWatch<C, N> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cloud: self.cloud.clone(),
            notifier: self.notifier.clone(),
            poll_interval: self.poll_interval,
            rollback_window: self.rollback_window,
        }
    }
}

impl<C: CloudProvider, N: Notifier> StabilityWatch<C, N> {
    pub(crate) fn new(
        store: StateStore,
        cloud: Arc<C>,
        notifier: Arc<N>,
        poll_interval: Duration,
        rollback_window: usize,
    ) -> Self {
        Self {
            store,
            cloud,
            notifier,
            poll_interval,
            rollback_window,
        }
    }

    /// Run the wait to completion. Errors are logged, never
    /// propagated; outcomes surface through the deployment record and
    /// the notifier.
    pub(crate) async fn run(
        &self,
        record: DeploymentRecord,
        previous_status: Option<DeploymentStatus>,
    ) {
        let cluster = record.deploy_spec.cluster.clone();
        let service = record.service_name.clone();
        let polls = stability_polls(record.deploy_spec.health_check.grace_period_secs);
        debug!(service = %service, polls, "stability wait started");

        let mut timed_out = true;
        for _ in 0..polls {
            match self.cloud.describe_service(&cluster, &service).await {
                Ok(desc)
                    if desc.deployments.len() == 1
                        && desc.deployments[0].task_def_ref == record.task_def_ref
                        && desc.running_count == desc.desired_count
                        && desc.running_count > 0 =>
                {
                    timed_out = false;
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(service = %service, %err, "describe failed during stability wait");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        let desc = match self.cloud.describe_service(&cluster, &service).await {
            Ok(desc) => desc,
            Err(err) => {
                error!(service = %service, %err, "could not describe service after wait");
                return;
            }
        };

        let failure = if desc.deployments.len() != 1 {
            Some("more than one deployment still active")
        } else if desc.deployments[0].task_def_ref != record.task_def_ref {
            Some("still running the previous task definition")
        } else if desc.running_count == 0 {
            Some("no tasks running")
        } else if timed_out {
            Some("deployment timed out")
        } else {
            None
        };

        match failure {
            Some(reason) => {
                info!(service = %service, reason, "deployment failed");
                self.finish(&record, DeploymentStatus::Failed, Some(reason));
                self.notifier.failure(&format!("{service}: {reason}"));
                if let Err(err) = self.rollback(&service).await {
                    error!(service = %service, %err, "rollback did not complete");
                }
            }
            None => {
                info!(service = %service, "deployment stable");
                self.finish(&record, DeploymentStatus::Success, None);
                if previous_status.is_some_and(|s| s != DeploymentStatus::Success) {
                    self.notifier
                        .recovery(&format!("{service}: deployed successfully"));
                }
            }
        }
    }

    /// Write the final status, unless a newer deploy already moved
    /// the record out of `Running`.
    fn finish(&self, record: &DeploymentRecord, status: DeploymentStatus, reason: Option<&str>) {
        let result =
            self.store
                .update_deployment(&record.service_name, record.submitted_at, |r| {
                    if r.status == DeploymentStatus::Running {
                        r.status = status;
                        r.failure_reason = reason.map(str::to_string);
                    } else {
                        debug!(
                            service = %r.service_name,
                            status = ?r.status,
                            "wait superseded, leaving record unchanged"
                        );
                    }
                });
        if let Err(err) = result {
            error!(service = %record.service_name, %err, "could not finish deployment record");
        }
    }

    /// Re-apply the newest successful deployment's task definition.
    /// Plain service update; target group and rules stay untouched.
    async fn rollback(&self, service_name: &str) -> Result<(), DeployError> {
        for past in self
            .store
            .deployments_for_service(service_name, self.rollback_window)?
        {
            if past.status == DeploymentStatus::Success {
                info!(
                    service = %service_name,
                    task_def = %past.task_def_ref,
                    "rolling back"
                );
                let plan = service_plan(
                    service_name,
                    &past.deploy_spec,
                    &past.task_def_ref,
                    past.scaling.desired_count,
                    None,
                );
                self.cloud.update_service(&plan).await?;
                return Ok(());
            }
        }
        Err(DeployError::NoStableVersion(service_name.to_string()))
    }
}
