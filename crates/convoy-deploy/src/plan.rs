//! Shared helpers for turning deploy specs into provider calls.

use convoy_cloud::ServicePlan;
use convoy_state::DeploySpec;

const DEFAULT_MINIMUM_HEALTHY_PERCENT: u64 = 100;
const DEFAULT_MAXIMUM_PERCENT: u64 = 200;

pub(crate) fn service_plan(
    service_name: &str,
    spec: &DeploySpec,
    task_def_ref: &str,
    desired_count: u64,
    target_group_ref: Option<String>,
) -> ServicePlan {
    ServicePlan {
        cluster_name: spec.cluster.clone(),
        service_name: service_name.to_string(),
        task_def_ref: task_def_ref.to_string(),
        desired_count,
        minimum_healthy_percent: spec
            .minimum_healthy_percent
            .unwrap_or(DEFAULT_MINIMUM_HEALTHY_PERCENT),
        maximum_percent: spec.maximum_percent.unwrap_or(DEFAULT_MAXIMUM_PERCENT),
        health_grace_secs: spec.health_check.grace_period_secs,
        target_group_ref,
        container_name: service_name.to_string(),
        container_port: spec.service_port,
    }
}

/// Aggregate container resource bounds: reservations fall back to the
/// hard limit when unset; limits always sum the hard bounds.
pub fn container_limits(spec: &DeploySpec) -> (i64, i64, i64, i64) {
    let mut cpu_reservation = 0;
    let mut cpu_limit = 0;
    let mut memory_reservation = 0;
    let mut memory_limit = 0;
    for container in &spec.containers {
        let cpu = container.cpu.unwrap_or_default();
        let memory = container.memory.unwrap_or_default();
        cpu_reservation += container.cpu_reservation.unwrap_or(cpu);
        cpu_limit += cpu;
        memory_reservation += container.memory_reservation.unwrap_or(memory);
        memory_limit += memory;
    }
    (cpu_reservation, cpu_limit, memory_reservation, memory_limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_state::ContainerSpec;

    #[test]
    fn limits_sum_across_containers_with_fallbacks() {
        let spec = DeploySpec {
            containers: vec![
                ContainerSpec {
                    name: "app".into(),
                    cpu: Some(512),
                    memory: Some(1024),
                    ..Default::default()
                },
                ContainerSpec {
                    name: "sidecar".into(),
                    cpu_reservation: Some(64),
                    cpu: Some(128),
                    memory_reservation: Some(128),
                    memory: Some(256),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(container_limits(&spec), (576, 640, 1152, 1280));
    }
}
