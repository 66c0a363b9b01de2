use crate::parsing::{parse_cpu_to_millicores, parse_memory_to_bytes};
use crate::types::{
    ContainerResources, PodRequestTotals, PodUsageTotals, QuantityKind, ResourceKind,
    ResourceSample, WorkloadUnit,
};

/// Declared resources of one pod, summed over its containers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceRow {
    pub pod: String,
    pub requests: PodRequestTotals,
    pub limits: PodRequestTotals,
    pub usage: Option<PodUsageTotals>,
}

impl ResourceRow {
    /// Samples for every quantity declared by at least one container.
    pub fn samples(&self) -> Vec<ResourceSample> {
        let declared = [
            (ResourceKind::Cpu, QuantityKind::Request, self.requests.cpu_millicores.map(|mc| mc as f64 / 1000.0)),
            (ResourceKind::Cpu, QuantityKind::Limit, self.limits.cpu_millicores.map(|mc| mc as f64 / 1000.0)),
            (ResourceKind::Memory, QuantityKind::Request, self.requests.memory_bytes.map(|b| b as f64)),
            (ResourceKind::Memory, QuantityKind::Limit, self.limits.memory_bytes.map(|b| b as f64)),
        ];
        declared
            .into_iter()
            .filter_map(|(resource, quantity, value)| {
                value.map(|value| ResourceSample {
                    pod: self.pod.clone(),
                    resource,
                    quantity,
                    value,
                })
            })
            .collect()
    }
}

pub fn sum_declared(unit: &WorkloadUnit) -> ResourceRow {
    ResourceRow {
        pod: unit.name.clone(),
        requests: sum_quantities(&unit.resources, |c| (c.cpu_request.as_deref(), c.memory_request.as_deref())),
        limits: sum_quantities(&unit.resources, |c| (c.cpu_limit.as_deref(), c.memory_limit.as_deref())),
        usage: None,
    }
}

fn sum_quantities<F>(containers: &[ContainerResources], pick: F) -> PodRequestTotals
where
    F: Fn(&ContainerResources) -> (Option<&str>, Option<&str>),
{
    let mut totals = PodRequestTotals::default();
    for c in containers {
        let (cpu, mem) = pick(c);
        // huge declared quantities pin at i64::MAX
        if let Some(mc) = cpu.and_then(parse_cpu_to_millicores) {
            let total = totals.cpu_millicores.get_or_insert(0);
            *total = total.saturating_add(mc);
        }
        if let Some(bytes) = mem.and_then(parse_memory_to_bytes) {
            let total = totals.memory_bytes.get_or_insert(0);
            *total = total.saturating_add(bytes);
        }
    }
    totals
}
