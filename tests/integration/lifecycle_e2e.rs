//! Full plan lifecycle tests.

use std::sync::Arc;

use stagegate::events::ChannelSink;
use stagegate::manager::{NewPhase, NewTask, ReviewSubmission};
use stagegate::workflow::{
    Lifecycle, PhaseStatus, PlanStatus, ReviewStage, ReviewVerdict, TaskStatus,
};
use stagegate::{Error, Manager};

use crate::fixtures::{complete_plan, demo_plan, token, TestWorkspace, GATES};

/// Test: the demo/add-auth walk
/// Given project demo and plan add-auth
/// When the plan skips a gate, then walks every gate and is archived
/// Then only the skip and the post-archive transition fail
#[test]
fn test_demo_add_auth_lifecycle() {
    let workspace = TestWorkspace::new();
    let manager = workspace.manager();
    let cancel = token();
    demo_plan(&manager);

    let err = manager
        .transition_plan(&cancel, "demo", "add-auth", PlanStatus::TasksGenerated)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    for status in GATES {
        let plan = manager
            .transition_plan(&cancel, "demo", "add-auth", status)
            .unwrap();
        assert_eq!(plan.status, Some(status));
    }

    let archived = manager.archive_plan(&cancel, "demo", "add-auth").unwrap();
    assert_eq!(archived.status, Some(PlanStatus::Archived));

    for status in PlanStatus::all() {
        let result = manager.transition_plan(&cancel, "demo", "add-auth", *status);
        assert!(result.is_err(), "archived plan moved to {}", status);
    }
    assert_eq!(
        manager
            .load_plan(&cancel, "demo", "add-auth")
            .unwrap()
            .status,
        Some(PlanStatus::Archived)
    );
}

/// Test: stage gates drive phases and tasks
/// Given an approved plan
/// When phases and tasks are generated, approved and executed
/// Then every entity ends complete and the plan can be archived
#[test]
fn test_gates_with_phases_and_tasks() {
    let manager = Manager::in_memory();
    let cancel = token();
    demo_plan(&manager);
    let (p, s) = ("demo", "add-auth");

    for (status, verdict) in [
        (PlanStatus::Drafted, None),
        (PlanStatus::Reviewed, Some(ReviewVerdict::Approved)),
        (PlanStatus::Approved, None),
    ] {
        if let Some(verdict) = verdict {
            manager
                .record_review(&cancel, p, s, ReviewSubmission::new(ReviewStage::Plan, verdict))
                .unwrap();
        }
        manager.transition_plan(&cancel, p, s, status).unwrap();
    }

    let schema = manager
        .create_phase(&cancel, p, s, NewPhase::new("Schema", "Users table"))
        .unwrap();
    let mut api = NewPhase::new("API", "Login endpoints");
    api.depends_on = vec![schema.id.clone()];
    let api = manager.create_phase(&cancel, p, s, api).unwrap();
    manager
        .transition_plan(&cancel, p, s, PlanStatus::PhasesGenerated)
        .unwrap();
    manager
        .transition_plan(&cancel, p, s, PlanStatus::PhasesApproved)
        .unwrap();

    let tasks = manager
        .generate_tasks_from_outline(&cancel, p, s, "1. Create users table\n2. Add login route")
        .unwrap();
    assert_eq!(tasks.len(), 2);
    manager
        .update_task(&cancel, p, s, &tasks[0].id, |t| {
            t.phase_id = Some(schema.id.clone())
        })
        .unwrap();
    manager
        .update_task(&cancel, p, s, &tasks[1].id, |t| t.phase_id = Some(api.id.clone()))
        .unwrap();
    manager
        .transition_plan(&cancel, p, s, PlanStatus::TasksGenerated)
        .unwrap();

    for task in &tasks {
        manager.submit_task(&cancel, p, s, &task.id).unwrap();
    }
    assert_eq!(manager.approve_all_tasks(&cancel, p, s, "lead").unwrap().len(), 2);
    manager
        .transition_plan(&cancel, p, s, PlanStatus::TasksApproved)
        .unwrap();
    manager
        .transition_plan(&cancel, p, s, PlanStatus::Implementing)
        .unwrap();

    for phase in manager.phase_execution_order(&cancel, p, s).unwrap() {
        manager
            .transition_phase(&cancel, p, s, &phase.id, PhaseStatus::Ready)
            .unwrap();
        manager
            .transition_phase(&cancel, p, s, &phase.id, PhaseStatus::Active)
            .unwrap();
        for task in manager.tasks_by_phase(&cancel, p, s, &phase.id).unwrap() {
            manager
                .transition_task(&cancel, p, s, &task.id, TaskStatus::InProgress)
                .unwrap();
            manager
                .transition_task(&cancel, p, s, &task.id, TaskStatus::Completed)
                .unwrap();
        }
        manager
            .transition_phase(&cancel, p, s, &phase.id, PhaseStatus::Complete)
            .unwrap();
    }

    manager
        .transition_plan(&cancel, p, s, PlanStatus::Complete)
        .unwrap();
    manager.archive_plan(&cancel, p, s).unwrap();

    // Phases and tasks travel with the plan into the archive.
    let phases = manager.load_phases(&cancel, p, s).unwrap();
    assert!(phases.iter().all(|ph| ph.status == PhaseStatus::Complete));
    let tasks = manager.load_tasks(&cancel, p, s).unwrap();
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Completed));

    let plan = manager.load_plan(&cancel, p, s).unwrap();
    assert_eq!(plan.plan_review.iteration, 1);
    assert!(plan.approved && plan.phases_approved && plan.tasks_approved);
}

/// Test: events follow successful writes only
#[test]
fn test_event_stream() {
    let (sink, mut rx) = ChannelSink::new();
    let manager = Manager::in_memory().with_events(Arc::new(sink));
    let cancel = token();
    demo_plan(&manager);

    let _ = manager.transition_plan(&cancel, "demo", "add-auth", PlanStatus::Complete);
    complete_plan(&manager, "add-auth");
    manager.archive_plan(&cancel, "demo", "add-auth").unwrap();

    let subjects: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|event| event.subject())
        .collect();
    assert_eq!(subjects.first().map(String::as_str), Some("workflow.events.project.created"));
    assert_eq!(subjects[1], "workflow.events.plan.created");
    assert_eq!(subjects[2], "workflow.events.plan.drafted");
    assert_eq!(subjects.last().map(String::as_str), Some("workflow.events.plan.archived"));
    assert_eq!(subjects.len(), 2 + GATES.len() + 1);
}

/// Test: escalation ends a plan
#[test]
fn test_rejected_plan_is_terminal() {
    let manager = Manager::in_memory();
    let cancel = token();
    demo_plan(&manager);

    manager
        .transition_plan(&cancel, "demo", "add-auth", PlanStatus::Rejected)
        .unwrap();
    assert!(matches!(
        manager.transition_plan(&cancel, "demo", "add-auth", PlanStatus::Drafted),
        Err(Error::InvalidTransition { .. })
    ));
    assert!(matches!(
        manager.record_review(
            &cancel,
            "demo",
            "add-auth",
            ReviewSubmission::new(ReviewStage::Plan, ReviewVerdict::Approved)
        ),
        Err(Error::Terminal { .. })
    ));
}

/// Test: a task rejected past its budget is escalated
#[test]
fn test_task_revision_loop_then_escalation() {
    let manager = Manager::in_memory();
    let cancel = token();
    demo_plan(&manager);
    let task = manager
        .create_task(&cancel, "demo", "add-auth", NewTask::new("Hash passwords"))
        .unwrap();

    for round in 1..=3 {
        manager.submit_task(&cancel, "demo", "add-auth", &task.id).unwrap();
        let rejected = manager
            .reject_task(&cancel, "demo", "add-auth", &task.id, "weak hashing")
            .unwrap();
        assert_eq!(rejected.iteration, round);
        manager
            .transition_task(&cancel, "demo", "add-auth", &task.id, TaskStatus::Pending)
            .unwrap();
    }

    let failed = manager
        .escalate_task(&cancel, "demo", "add-auth", &task.id, "three rejections")
        .unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.iteration, 3);
}
