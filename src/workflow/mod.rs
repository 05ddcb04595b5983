//! Workflow entities and the rules that govern them.
//!
//! This module holds the persisted entity types, their status state
//! machines, effective-status inference for legacy plans, and dependency
//! ordering. It performs no I/O; see [`crate::manager`] for that.

mod deps;
mod effective;
mod status;
mod types;

pub use deps::{pending_dependencies, Dependent, DependencyGraph};
pub use effective::EffectiveStatus;
pub use status::{Lifecycle, ParseStatusError, PhaseStatus, PlanStatus, TaskStatus};
pub use types::{
    AcceptanceCriterion, CallHistory, Capability, Finding, GitHubMetadata, IterationCalls,
    Phase, PhaseAgentConfig, Plan, PlanFiles, PlanRecord, Project, ProjectStatus, ReviewRecord,
    ReviewStage, ReviewVerdict, Scope, Severity, Task, TaskType, DEFAULT_PROJECT_SLUG,
    DEFAULT_PROJECT_TITLE,
};
