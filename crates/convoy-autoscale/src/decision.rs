//! Pure scaling decision functions.
//!
//! Both functions look at one cluster's node rows grouped by
//! availability zone. The requirement is the largest registered
//! container for the cluster, the bin that must always fit somewhere.

use std::collections::HashMap;

use convoy_state::{NodeCapacity, NodeStatus};

/// Largest container reservation registered to a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub cpu: i64,
    pub memory: i64,
}

/// Scale-up fit check. A zone fits when at least one non-draining
/// node there has strictly more free cpu and memory than the
/// requirement. Returns true only when every zone with registered
/// capacity fits; a zone holding nothing but draining nodes counts
/// as failing.
pub fn zones_fit(requirement: Requirement, nodes: &[NodeCapacity]) -> bool {
    let mut fits: HashMap<&str, bool> = HashMap::new();
    for node in nodes {
        let fit = node.status != NodeStatus::Draining
            && node.free_cpu > requirement.cpu
            && node.free_memory > requirement.memory;
        let zone = fits.entry(node.availability_zone.as_str()).or_insert(false);
        *zone = *zone || fit;
    }
    fits.values().all(|fit| *fit)
}

/// Scale-down surplus check. Free capacity is summed per zone over
/// non-draining nodes and compared against a bar.
///
/// With the largest-container scale-up strategy enabled the bar is
/// one full node's registered capacity plus the requirement plus
/// half the requirement as buffer, and every zone must clear it;
/// anything less and the scale-down would immediately trigger a
/// scale-up. With the strategy disabled the bar drops to one full
/// node's capacity and a single clearing zone suffices.
pub fn zones_have_headroom(
    requirement: Requirement,
    nodes: &[NodeCapacity],
    node_cpu: i64,
    node_memory: i64,
    largest_container_up: bool,
) -> bool {
    let (bar_cpu, bar_memory) = if largest_container_up {
        (
            // (x + 1).div_euclid(2) == x.div_ceil(2); div_ceil on signed
            // integers is unstable (int_roundings).
            node_cpu + requirement.cpu + (requirement.cpu + 1).div_euclid(2),
            node_memory + requirement.memory + (requirement.memory + 1).div_euclid(2),
        )
    } else {
        (node_cpu, node_memory)
    };
    let mut free: HashMap<&str, (i64, i64)> = HashMap::new();
    for node in nodes {
        if node.status == NodeStatus::Draining {
            continue;
        }
        let zone = free.entry(node.availability_zone.as_str()).or_insert((0, 0));
        zone.0 += node.free_cpu;
        zone.1 += node.free_memory;
    }
    if largest_container_up {
        free.values()
            .all(|&(cpu, memory)| cpu >= bar_cpu && memory >= bar_memory)
    } else {
        free.values()
            .any(|&(cpu, memory)| cpu >= bar_cpu && memory >= bar_memory)
    }
}
