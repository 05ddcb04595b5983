//! Status state machines for plans, phases and tasks.
//!
//! Each machine is a closed enum with an explicit successor table. A
//! transition is legal only when the target appears in the current status's
//! successor list; terminal statuses have no successors.

use serde::{Deserialize, Serialize};

/// Shared shape of the three status machines.
pub trait Lifecycle: Copy + Eq + std::fmt::Display + std::str::FromStr + 'static {
    /// Every status, in declaration order.
    fn all() -> &'static [Self];

    /// The single entry status.
    fn initial() -> Self;

    /// Statuses reachable from `self` in one step.
    fn successors(&self) -> &'static [Self];

    fn as_str(&self) -> &'static str;

    fn can_transition_to(&self, target: Self) -> bool {
        self.successors().contains(&target)
    }

    fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Membership check for untyped input (HTTP bodies, CLI args).
    fn is_valid(value: &str) -> bool {
        value.parse::<Self>().is_ok()
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} status: {value}")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}

fn parse_status<S: Lifecycle>(kind: &'static str, value: &str) -> Result<S, ParseStatusError> {
    S::all()
        .iter()
        .copied()
        .find(|status| status.as_str() == value)
        .ok_or_else(|| ParseStatusError {
            kind,
            value: value.to_string(),
        })
}

/// Authoritative status of a plan.
///
/// Plans pass through three stage gates (plan, phases, tasks) before
/// implementation. `Rejected` is the escalation exit from every gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Created,
    Drafted,
    Reviewed,
    Approved,
    PhasesGenerated,
    PhasesApproved,
    TasksGenerated,
    TasksApproved,
    Implementing,
    Complete,
    Archived,
    Rejected,
}

impl Lifecycle for PlanStatus {
    fn all() -> &'static [Self] {
        use PlanStatus::*;
        &[
            Created,
            Drafted,
            Reviewed,
            Approved,
            PhasesGenerated,
            PhasesApproved,
            TasksGenerated,
            TasksApproved,
            Implementing,
            Complete,
            Archived,
            Rejected,
        ]
    }

    fn initial() -> Self {
        PlanStatus::Created
    }

    fn successors(&self) -> &'static [Self] {
        use PlanStatus::*;
        match self {
            Created => &[Drafted, Rejected],
            Drafted => &[Reviewed, Rejected],
            Reviewed => &[Approved, Rejected],
            Approved => &[PhasesGenerated, Rejected],
            PhasesGenerated => &[PhasesApproved, Rejected],
            PhasesApproved => &[TasksGenerated, Rejected],
            TasksGenerated => &[TasksApproved, Rejected],
            TasksApproved => &[Implementing, Rejected],
            Implementing => &[Complete, Rejected],
            Complete => &[Archived],
            Archived | Rejected => &[],
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Created => "created",
            PlanStatus::Drafted => "drafted",
            PlanStatus::Reviewed => "reviewed",
            PlanStatus::Approved => "approved",
            PlanStatus::PhasesGenerated => "phases_generated",
            PlanStatus::PhasesApproved => "phases_approved",
            PlanStatus::TasksGenerated => "tasks_generated",
            PlanStatus::TasksApproved => "tasks_approved",
            PlanStatus::Implementing => "implementing",
            PlanStatus::Complete => "complete",
            PlanStatus::Archived => "archived",
            PlanStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        parse_status("plan", s)
    }
}

/// Execution status of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Created, waiting for its dependencies.
    #[default]
    Pending,
    /// Dependencies satisfied, may be started.
    Ready,
    /// Tasks in this phase are executing.
    Active,
    Complete,
    Failed,
    /// Held back; can return to pending or ready.
    Blocked,
}

impl Lifecycle for PhaseStatus {
    fn all() -> &'static [Self] {
        use PhaseStatus::*;
        &[Pending, Ready, Active, Complete, Failed, Blocked]
    }

    fn initial() -> Self {
        PhaseStatus::Pending
    }

    fn successors(&self) -> &'static [Self] {
        use PhaseStatus::*;
        match self {
            Pending => &[Ready, Blocked],
            Ready => &[Active, Blocked],
            Active => &[Complete, Failed],
            Blocked => &[Ready, Pending],
            Complete | Failed => &[],
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Ready => "ready",
            PhaseStatus::Active => "active",
            PhaseStatus::Complete => "complete",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PhaseStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        parse_status("phase", s)
    }
}

/// Execution status of a task.
///
/// `Pending -> InProgress` skips the approval gate; it is kept for callers
/// that dispatch tasks without per-task approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    PendingApproval,
    Approved,
    /// Sent back for edits; returns to pending.
    Rejected,
    InProgress,
    Completed,
    Failed,
}

impl Lifecycle for TaskStatus {
    fn all() -> &'static [Self] {
        use TaskStatus::*;
        &[
            Pending,
            PendingApproval,
            Approved,
            Rejected,
            InProgress,
            Completed,
            Failed,
        ]
    }

    fn initial() -> Self {
        TaskStatus::Pending
    }

    fn successors(&self) -> &'static [Self] {
        use TaskStatus::*;
        match self {
            Pending => &[PendingApproval, InProgress, Failed],
            PendingApproval => &[Approved, Rejected],
            Approved => &[InProgress],
            Rejected => &[Pending],
            InProgress => &[Completed, Failed],
            Completed | Failed => &[],
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::PendingApproval => "pending_approval",
            TaskStatus::Approved => "approved",
            TaskStatus::Rejected => "rejected",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        parse_status("task", s)
    }
}
