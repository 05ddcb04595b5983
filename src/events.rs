//! Workflow events published after successful writes.
//!
//! The manager hands every event to an [`EventSink`]. Transport is the
//! sink's concern; the default [`NoopSink`] drops everything and
//! [`ChannelSink`] forwards into a tokio channel for in-process consumers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::workflow::{PhaseStatus, PlanStatus, ReviewStage, ReviewVerdict, TaskStatus};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    ProjectCreated {
        project: String,
    },
    ProjectArchived {
        project: String,
    },
    ProjectDeleted {
        project: String,
    },
    PlanCreated {
        project: String,
        plan: String,
    },
    PlanTransitioned {
        project: String,
        plan: String,
        from: PlanStatus,
        to: PlanStatus,
    },
    PlanReviewed {
        project: String,
        plan: String,
        stage: ReviewStage,
        verdict: ReviewVerdict,
        iteration: u32,
    },
    PlanArchived {
        project: String,
        plan: String,
    },
    PlanDeleted {
        project: String,
        plan: String,
    },
    PhasesGenerated {
        project: String,
        plan: String,
        count: usize,
    },
    PhaseTransitioned {
        project: String,
        plan: String,
        phase: String,
        from: PhaseStatus,
        to: PhaseStatus,
    },
    PhaseApproved {
        project: String,
        plan: String,
        phase: String,
    },
    PhaseRejected {
        project: String,
        plan: String,
        phase: String,
        reason: String,
    },
    TasksGenerated {
        project: String,
        plan: String,
        count: usize,
    },
    TaskTransitioned {
        project: String,
        plan: String,
        task: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    TaskRejected {
        project: String,
        plan: String,
        task: String,
        reason: String,
    },
    TaskEscalated {
        project: String,
        plan: String,
        task: String,
        reason: String,
    },
    ChangeCreated {
        change: String,
    },
    ChangeTransitioned {
        change: String,
        from: PlanStatus,
        to: PlanStatus,
    },
    ChangeArchived {
        change: String,
    },
}

fn review_domain(stage: ReviewStage) -> &'static str {
    match stage {
        ReviewStage::Plan => "plan",
        ReviewStage::Phase => "phases",
        ReviewStage::Task => "tasks",
    }
}

impl EventKind {
    /// Dotted routing subject, `workflow.events.<domain>.<action>`.
    pub fn subject(&self) -> String {
        let (domain, action): (&str, String) = match self {
            EventKind::ProjectCreated { .. } => ("project", "created".into()),
            EventKind::ProjectArchived { .. } => ("project", "archived".into()),
            EventKind::ProjectDeleted { .. } => ("project", "deleted".into()),
            EventKind::PlanCreated { .. } => ("plan", "created".into()),
            EventKind::PlanTransitioned { to, .. } => ("plan", to.to_string()),
            EventKind::PlanReviewed { stage, verdict, .. } => {
                let action = match verdict {
                    ReviewVerdict::Approved => "review_complete",
                    ReviewVerdict::NeedsChanges => "revision_needed",
                };
                (review_domain(*stage), action.into())
            }
            EventKind::PlanArchived { .. } => ("plan", "archived".into()),
            EventKind::PlanDeleted { .. } => ("plan", "deleted".into()),
            EventKind::PhasesGenerated { .. } => ("phases", "generated".into()),
            EventKind::PhaseTransitioned { to, .. } => ("phase", to.to_string()),
            EventKind::PhaseApproved { .. } => ("phase", "approved".into()),
            EventKind::PhaseRejected { .. } => ("phase", "rejected".into()),
            EventKind::TasksGenerated { .. } => ("tasks", "generated".into()),
            EventKind::TaskTransitioned { to, .. } => ("task", to.to_string()),
            EventKind::TaskRejected { .. } => ("task", "rejected".into()),
            EventKind::TaskEscalated { .. } => ("task", "escalated".into()),
            EventKind::ChangeCreated { .. } => ("change", "created".into()),
            EventKind::ChangeTransitioned { to, .. } => ("change", to.to_string()),
            EventKind::ChangeArchived { .. } => ("change", "archived".into()),
        };
        format!("workflow.events.{}.{}", domain, action)
    }
}

/// An event with identity and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowEvent {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl WorkflowEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            kind,
        }
    }

    pub fn subject(&self) -> String {
        self.kind.subject()
    }
}

/// Receives events from the manager.
///
/// `publish` is called on the thread that performed the write, after the
/// entity lock is released. It must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: WorkflowEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: WorkflowEvent) {}
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: WorkflowEvent) {
        let subject = event.subject();
        if self.tx.send(event).is_err() {
            debug!(%subject, "event receiver dropped");
        }
    }
}
