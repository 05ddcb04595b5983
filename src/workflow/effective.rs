//! Status as seen by callers, for plans with or without a stored status.

use serde::{Serialize, Serializer};

use super::status::{Lifecycle, PlanStatus};
use super::types::Plan;

/// A plan's status together with where it came from.
///
/// `Inferred` values are derived from legacy approval flags and review
/// metadata. They are computed on every read and never written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveStatus {
    Explicit(PlanStatus),
    Inferred(PlanStatus),
}

impl EffectiveStatus {
    pub fn status(&self) -> PlanStatus {
        match self {
            EffectiveStatus::Explicit(status) | EffectiveStatus::Inferred(status) => *status,
        }
    }

    pub fn is_inferred(&self) -> bool {
        matches!(self, EffectiveStatus::Inferred(_))
    }
}

impl std::fmt::Display for EffectiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.status().as_str())
    }
}

impl Serialize for EffectiveStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.status().serialize(serializer)
    }
}

/// Derive a status from legacy fields, most advanced signal first.
fn infer(plan: &Plan) -> PlanStatus {
    let has_text = |value: &Option<String>| value.as_deref().is_some_and(|s| !s.trim().is_empty());

    if plan.tasks_approved {
        PlanStatus::TasksApproved
    } else if plan.phases_approved {
        PlanStatus::PhasesApproved
    } else if plan.approved {
        PlanStatus::Approved
    } else if plan.plan_review.verdict.is_some() || plan.plan_review.reviewed_at.is_some() {
        PlanStatus::Reviewed
    } else if has_text(&plan.goal) || has_text(&plan.context) {
        PlanStatus::Drafted
    } else {
        PlanStatus::Created
    }
}

impl Plan {
    /// The status transitions are validated against.
    pub fn effective_status(&self) -> EffectiveStatus {
        match self.status {
            Some(status) => EffectiveStatus::Explicit(status),
            None => EffectiveStatus::Inferred(infer(self)),
        }
    }
}
