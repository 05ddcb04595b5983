//! Persisted workflow entities.
//!
//! Every entity is a serde document. Optional fields are skipped when empty
//! and default when missing, so documents written by older or newer versions
//! still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{PhaseStatus, PlanStatus, TaskStatus};

/// Slug of the project that plans land in when no project is named.
pub const DEFAULT_PROJECT_SLUG: &str = "default";

/// Title given to the auto-provisioned default project.
pub const DEFAULT_PROJECT_TITLE: &str = "Default Project";

/// Whether a project accepts changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Active,
    Archived,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Archived => write!(f, "archived"),
        }
    }
}

/// A container of plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Entity id, `project.{slug}`.
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Project {
    pub fn new(slug: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Self::id_for(slug),
            slug: slug.to_string(),
            title: title.to_string(),
            description: None,
            status: ProjectStatus::Active,
            created_at: now,
            updated_at: now,
            archived_at: None,
            created_by: None,
        }
    }

    pub fn id_for(slug: &str) -> String {
        format!("project.{}", slug)
    }

    pub fn is_archived(&self) -> bool {
        self.status == ProjectStatus::Archived
    }
}

/// Outcome of a review loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    NeedsChanges,
}

impl std::fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewVerdict::Approved => write!(f, "approved"),
            ReviewVerdict::NeedsChanges => write!(f, "needs_changes"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    #[default]
    Info,
}

/// A single reviewer finding against a standard or rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Finding {
    /// Identifier of the rule or standard the finding refers to.
    #[serde(default)]
    pub rule_id: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Phase or task the finding is about, when it is that specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

/// The three review gates a plan passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStage {
    Plan,
    Phase,
    Task,
}

impl std::fmt::Display for ReviewStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewStage::Plan => write!(f, "plan"),
            ReviewStage::Phase => write!(f, "phase"),
            ReviewStage::Task => write!(f, "task"),
        }
    }
}

/// Latest review result for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReviewRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ReviewVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
    /// Markdown rendering of `findings` for embedding in prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_findings: Option<String>,
    #[serde(default)]
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl ReviewRecord {
    /// True when no review has been recorded for this stage.
    pub fn is_empty(&self) -> bool {
        self.verdict.is_none() && self.reviewed_at.is_none() && self.iteration == 0
    }
}

/// Request ids issued during one review iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IterationCalls {
    pub iteration: u32,
    #[serde(default)]
    pub request_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ReviewVerdict>,
}

/// Per-stage drill-down from review iterations to the calls behind them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CallHistory {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan_review: Vec<IterationCalls>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phase_review: Vec<IterationCalls>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_review: Vec<IterationCalls>,
}

impl CallHistory {
    pub fn is_empty(&self) -> bool {
        self.plan_review.is_empty() && self.phase_review.is_empty() && self.task_review.is_empty()
    }

    pub fn stage(&self, stage: ReviewStage) -> &[IterationCalls] {
        match stage {
            ReviewStage::Plan => &self.plan_review,
            ReviewStage::Phase => &self.phase_review,
            ReviewStage::Task => &self.task_review,
        }
    }

    pub fn stage_mut(&mut self, stage: ReviewStage) -> &mut Vec<IterationCalls> {
        match stage {
            ReviewStage::Plan => &mut self.plan_review,
            ReviewStage::Phase => &mut self.phase_review,
            ReviewStage::Task => &mut self.task_review,
        }
    }
}

/// File and directory boundaries for a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Protected paths that must not be modified.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub do_not_touch: Vec<String>,
}

impl Scope {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty() && self.do_not_touch.is_empty()
    }
}

/// A unit of requested work inside a project.
///
/// `status` is authoritative when present. Documents written before it
/// existed carry only the legacy approval flags; their status is inferred on
/// read by [`Plan::effective_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Entity id, `plan.{project}.{slug}`.
    pub id: String,
    pub slug: String,
    pub title: String,
    /// Id of the owning project.
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PlanStatus>,

    #[serde(default)]
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phases_approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases_approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tasks_approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_approved_at: Option<DateTime<Utc>>,

    /// What is being built or fixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    /// Current state and why the work matters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Scope::is_empty")]
    pub scope: Scope,

    #[serde(default, skip_serializing_if = "ReviewRecord::is_empty")]
    pub plan_review: ReviewRecord,
    #[serde(default, skip_serializing_if = "ReviewRecord::is_empty")]
    pub phase_review: ReviewRecord,
    #[serde(default, skip_serializing_if = "ReviewRecord::is_empty")]
    pub task_review: ReviewRecord,
    #[serde(default, skip_serializing_if = "CallHistory::is_empty")]
    pub call_history: CallHistory,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(project_slug: &str, slug: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Self::id_for(project_slug, slug),
            slug: slug.to_string(),
            title: title.to_string(),
            project_id: Project::id_for(project_slug),
            status: Some(PlanStatus::Created),
            approved: false,
            approved_at: None,
            phases_approved: false,
            phases_approved_at: None,
            tasks_approved: false,
            tasks_approved_at: None,
            goal: None,
            context: None,
            description: None,
            scope: Scope::default(),
            plan_review: ReviewRecord::default(),
            phase_review: ReviewRecord::default(),
            task_review: ReviewRecord::default(),
            call_history: CallHistory::default(),
            last_error: None,
            last_error_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id_for(project_slug: &str, slug: &str) -> String {
        format!("plan.{}.{}", project_slug, slug)
    }

    pub fn review(&self, stage: ReviewStage) -> &ReviewRecord {
        match stage {
            ReviewStage::Plan => &self.plan_review,
            ReviewStage::Phase => &self.phase_review,
            ReviewStage::Task => &self.task_review,
        }
    }

    pub fn review_mut(&mut self, stage: ReviewStage) -> &mut ReviewRecord {
        match stage {
            ReviewStage::Plan => &mut self.plan_review,
            ReviewStage::Phase => &mut self.phase_review,
            ReviewStage::Task => &mut self.task_review,
        }
    }
}

/// Execution settings for the agents working a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PhaseAgentConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Upper bound on tasks of this phase running at once. 0 means unlimited.
    #[serde(default)]
    pub max_concurrent: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_strategy: Option<String>,
}

/// An ordered grouping of tasks within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Entity id, `phase.{plan}.{sequence}`.
    pub id: String,
    pub plan_id: String,
    /// 1-based position within the plan.
    pub sequence: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ids of phases that must complete before this one may start.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<PhaseAgentConfig>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Phase {
    pub fn new(plan: &Plan, sequence: u32, name: &str, description: &str) -> Self {
        Self {
            id: Self::id_for(&plan.slug, sequence),
            plan_id: plan.id.clone(),
            sequence,
            name: name.to_string(),
            description: description.to_string(),
            depends_on: Vec::new(),
            status: PhaseStatus::Pending,
            agent_config: None,
            requires_approval: false,
            approved: false,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn id_for(plan_slug: &str, sequence: u32) -> String {
        format!("phase.{}.{}", plan_slug, sequence)
    }
}

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Implement,
    Test,
    Document,
    Review,
    Refactor,
}

/// Agent capability needed to carry out a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Coding,
    Writing,
    Reviewing,
}

impl TaskType {
    pub fn capability(&self) -> Capability {
        match self {
            TaskType::Implement | TaskType::Test | TaskType::Refactor => Capability::Coding,
            TaskType::Document => Capability::Writing,
            TaskType::Review => Capability::Reviewing,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Implement => write!(f, "implement"),
            TaskType::Test => write!(f, "test"),
            TaskType::Document => write!(f, "document"),
            TaskType::Review => write!(f, "review"),
            TaskType::Refactor => write!(f, "refactor"),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "implement" => Ok(TaskType::Implement),
            "test" => Ok(TaskType::Test),
            "document" => Ok(TaskType::Document),
            "review" => Ok(TaskType::Review),
            "refactor" => Ok(TaskType::Refactor),
            other => Err(format!("unknown task type: {}", other)),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Coding => write!(f, "coding"),
            Capability::Writing => write!(f, "writing"),
            Capability::Reviewing => write!(f, "reviewing"),
        }
    }
}

/// Given/When/Then condition for task completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AcceptanceCriterion {
    pub given: String,
    pub when: String,
    pub then: String,
}

/// A unit of executable work within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Entity id, `task.{plan}.{sequence}`.
    pub id: String,
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_id: Option<String>,
    pub sequence: u32,
    pub description: String,
    #[serde(default, rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    /// Number of times the task has been sent back for rework.
    #[serde(default)]
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(plan: &Plan, sequence: u32, description: &str) -> Self {
        Self {
            id: Self::id_for(&plan.slug, sequence),
            plan_id: plan.id.clone(),
            phase_id: None,
            sequence,
            description: description.to_string(),
            task_type: TaskType::default(),
            acceptance_criteria: Vec::new(),
            files: Vec::new(),
            depends_on: Vec::new(),
            status: TaskStatus::Pending,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            escalation_reason: None,
            iteration: 0,
            last_error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn id_for(plan_slug: &str, sequence: u32) -> String {
        format!("task.{}.{}", plan_slug, sequence)
    }
}

/// Which markdown artifacts a change has on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlanFiles {
    #[serde(default)]
    pub has_proposal: bool,
    #[serde(default)]
    pub has_design: bool,
    #[serde(default)]
    pub has_spec: bool,
    #[serde(default)]
    pub has_tasks: bool,
}

/// Issue-tracker linkage for a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GitHubMetadata {
    #[serde(default)]
    pub epic_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Task id to issue number.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub task_issues: std::collections::BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}

/// Legacy change-proposal record stored under `changes/{slug}`.
///
/// Predates [`Plan`] and shares its status graph. New code should use plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default)]
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub files: PlanFiles,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_entities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GitHubMetadata>,
}

impl PlanRecord {
    pub fn new(slug: &str, title: &str, description: &str, author: &str) -> Self {
        let now = Utc::now();
        Self {
            slug: slug.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            status: PlanStatus::Created,
            author: author.to_string(),
            created_at: now,
            updated_at: now,
            files: PlanFiles::default(),
            related_entities: Vec::new(),
            github: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids() {
        assert_eq!(Project::id_for("demo"), "project.demo");
        assert_eq!(Plan::id_for("demo", "add-auth"), "plan.demo.add-auth");
        assert_eq!(Phase::id_for("add-auth", 2), "phase.add-auth.2");
        assert_eq!(Task::id_for("add-auth", 1), "task.add-auth.1");
    }

    #[test]
    fn test_new_plan_defaults() {
        let plan = Plan::new("demo", "add-auth", "Add authentication");
        assert_eq!(plan.status, Some(PlanStatus::Created));
        assert_eq!(plan.project_id, "project.demo");
        assert!(!plan.approved);
        assert_eq!(plan.created_at, plan.updated_at);
    }

    #[test]
    fn test_task_type_capability() {
        assert_eq!(TaskType::Implement.capability(), Capability::Coding);
        assert_eq!(TaskType::Test.capability(), Capability::Coding);
        assert_eq!(TaskType::Document.capability(), Capability::Writing);
        assert_eq!(TaskType::Review.capability(), Capability::Reviewing);
        assert_eq!(TaskType::Refactor.capability(), Capability::Coding);
    }

    #[test]
    fn test_task_type_parse() {
        assert_eq!("document".parse::<TaskType>(), Ok(TaskType::Document));
        assert!("deploy".parse::<TaskType>().is_err());
        assert_eq!(TaskType::Review.to_string(), "review");
    }

    #[test]
    fn test_plan_without_status_deserializes() {
        let json = r#"{
            "id": "plan.default.legacy",
            "slug": "legacy",
            "title": "Legacy",
            "project_id": "project.default",
            "approved": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "some_future_field": 42
        }"#;
        let plan: Plan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.status, None);
        assert!(plan.approved);
        assert!(plan.plan_review.is_empty());
    }

    #[test]
    fn test_plan_omits_absent_status() {
        let mut plan = Plan::new("default", "legacy", "Legacy");
        plan.status = None;
        let value = serde_json::to_value(&plan).unwrap();
        assert!(value.get("status").is_none());
        assert!(value.get("plan_review").is_none());
    }

    #[test]
    fn test_task_type_field_name() {
        let plan = Plan::new("demo", "add-auth", "Add authentication");
        let mut task = Task::new(&plan, 1, "Write login handler");
        task.task_type = TaskType::Document;
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["type"], "document");
        assert_eq!(value["status"], "pending");
    }

    #[test]
    fn test_phase_defaults_when_fields_missing() {
        let json = r#"{
            "id": "phase.add-auth.1",
            "plan_id": "plan.demo.add-auth",
            "sequence": 1,
            "name": "Foundation",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let phase: Phase = serde_json::from_str(json).unwrap();
        assert_eq!(phase.status, PhaseStatus::Pending);
        assert!(phase.depends_on.is_empty());
        assert!(phase.agent_config.is_none());
    }

    #[test]
    fn test_call_history_stage_access() {
        let mut history = CallHistory::default();
        history.stage_mut(ReviewStage::Phase).push(IterationCalls {
            iteration: 1,
            request_ids: vec!["req-1".to_string()],
            verdict: Some(ReviewVerdict::NeedsChanges),
        });
        assert_eq!(history.stage(ReviewStage::Phase).len(), 1);
        assert!(history.stage(ReviewStage::Plan).is_empty());
        assert!(!history.is_empty());
    }
}
