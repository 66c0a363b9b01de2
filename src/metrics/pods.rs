use crate::types::{Phase, UnitHealth, WorkloadUnit};

/// Restart counts above this are reported as an issue.
pub const RESTART_THRESHOLD: i32 = 5;

/// Classifies one pod. Every rule is applied; issues are collected in rule
/// order (readiness, restarts, then conditions).
pub fn evaluate_unit(unit: &WorkloadUnit) -> UnitHealth {
    let mut issues = Vec::new();

    for c in &unit.containers {
        if !c.ready {
            issues.push(format!("Container {} is not ready", c.name));
        }
    }

    for c in &unit.containers {
        if c.restart_count > RESTART_THRESHOLD {
            issues.push(format!("Container {} has restarted {} times", c.name, c.restart_count));
        }
    }

    for cond in &unit.conditions {
        if cond.type_ != "PodScheduled" && cond.status != "True" {
            issues.push(format!(
                "Condition {} is {}: {}",
                cond.type_,
                cond.status,
                cond.message.as_deref().unwrap_or("")
            ));
        }
    }

    UnitHealth {
        name: unit.name.clone(),
        phase: unit.phase,
        issues,
    }
}

pub fn evaluate_units(units: &[WorkloadUnit]) -> Vec<UnitHealth> {
    units.iter().map(evaluate_unit).collect()
}
