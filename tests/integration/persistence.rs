//! On-disk persistence tests.

use std::fs;

use stagegate::manager::{Artifact, NewPhase};
use stagegate::workflow::{PlanStatus, ProjectStatus};
use stagegate::Error;

use crate::fixtures::{complete_plan, demo_plan, token, TestWorkspace};

/// Test: state survives a restart
/// Given a plan with phases written by one manager
/// When a new manager opens the same directory
/// Then it sees the same entities and statuses
#[test]
fn test_reopen_sees_same_state() {
    let workspace = TestWorkspace::new();
    let cancel = token();
    {
        let manager = workspace.manager();
        demo_plan(&manager);
        manager
            .transition_plan(&cancel, "demo", "add-auth", PlanStatus::Drafted)
            .unwrap();
        manager
            .create_phase(&cancel, "demo", "add-auth", NewPhase::new("Schema", ""))
            .unwrap();
    }

    let reopened = workspace.manager();
    let plan = reopened.load_plan(&cancel, "demo", "add-auth").unwrap();
    assert_eq!(plan.status, Some(PlanStatus::Drafted));
    assert_eq!(plan.title, "Add authentication");
    assert_eq!(
        reopened.load_phases(&cancel, "demo", "add-auth").unwrap().len(),
        1
    );

    // The graph is enforced against what is on disk, not in memory.
    assert!(reopened
        .transition_plan(&cancel, "demo", "add-auth", PlanStatus::Approved)
        .is_err());
}

/// Test: directory layout
#[test]
fn test_layout_on_disk() {
    let workspace = TestWorkspace::new();
    let manager = workspace.manager();
    demo_plan(&manager);
    let cancel = token();
    manager
        .create_phase(&cancel, "demo", "add-auth", NewPhase::new("Schema", ""))
        .unwrap();

    let project_dir = workspace.root.join("projects").join("demo");
    assert!(project_dir.join("project.json").is_file());
    let plan_dir = project_dir.join("plans").join("add-auth");
    assert!(plan_dir.join("plan.json").is_file());
    assert!(plan_dir.join("phases.json").is_file());

    let raw = fs::read_to_string(plan_dir.join("plan.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["status"], "created");
    assert_eq!(value["project_id"], "project.demo");
}

/// Test: a legacy plan document without a status
/// Given a plan.json written before statuses existed
/// When it is loaded
/// Then its status is inferred and never written back
#[test]
fn test_legacy_document_status_inferred() {
    let workspace = TestWorkspace::new();
    let manager = workspace.manager();
    demo_plan(&manager);
    let cancel = token();

    let path = workspace
        .root
        .join("projects/demo/plans/add-auth/plan.json");
    let mut value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let object = value.as_object_mut().unwrap();
    object.remove("status");
    object.insert("approved".into(), true.into());
    object.insert("phases_approved".into(), true.into());
    object.insert("future_field".into(), "ignored".into());
    fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();

    let plan = manager.load_plan(&cancel, "demo", "add-auth").unwrap();
    assert_eq!(plan.status, None);
    let effective = plan.effective_status();
    assert!(effective.is_inferred());
    assert_eq!(effective.status(), PlanStatus::PhasesApproved);

    manager
        .update_plan(&cancel, "demo", "add-auth", |p| {
            p.goal = Some("Log in".to_string())
        })
        .unwrap();
    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw.get("status").is_none());
}

/// Test: archive from non-terminal fails and changes nothing
#[test]
fn test_archive_before_complete_is_noop() {
    let workspace = TestWorkspace::new();
    let manager = workspace.manager();
    demo_plan(&manager);
    let cancel = token();

    let path = workspace
        .root
        .join("projects/demo/plans/add-auth/plan.json");
    let before = fs::read(&path).unwrap();
    assert!(matches!(
        manager.archive_plan(&cancel, "demo", "add-auth"),
        Err(Error::InvalidTransition { .. })
    ));
    assert_eq!(fs::read(&path).unwrap(), before);
    assert!(!workspace.root.join("projects/demo/archive/add-auth").exists());
}

/// Test: archive relocates the plan subtree
#[test]
fn test_archive_relocates_on_disk() {
    let workspace = TestWorkspace::new();
    let manager = workspace.manager();
    demo_plan(&manager);
    let cancel = token();
    manager
        .create_plan(&cancel, "demo", "keep", "Keep me")
        .unwrap();
    complete_plan(&manager, "add-auth");
    manager.archive_plan(&cancel, "demo", "add-auth").unwrap();

    let project_dir = workspace.root.join("projects").join("demo");
    assert!(!project_dir.join("plans/add-auth").exists());
    assert!(project_dir.join("archive/add-auth/plan.json").is_file());

    let reopened = workspace.manager();
    let active: Vec<String> = reopened
        .list_plans(&cancel, "demo")
        .unwrap()
        .items
        .into_iter()
        .map(|p| p.slug)
        .collect();
    assert_eq!(active, vec!["keep"]);
    let archived = reopened.list_archived_plans(&cancel, "demo").unwrap();
    assert_eq!(archived.items.len(), 1);
    assert_eq!(archived.items[0].status, Some(PlanStatus::Archived));
}

/// Test: delete semantics
#[test]
fn test_delete_missing_then_existing() {
    let workspace = TestWorkspace::new();
    let manager = workspace.manager();
    let cancel = token();

    assert!(manager
        .delete_project(&cancel, "demo")
        .unwrap_err()
        .is_not_found());

    demo_plan(&manager);
    manager.delete_plan(&cancel, "demo", "add-auth").unwrap();
    assert!(!manager.plan_exists(&cancel, "demo", "add-auth").unwrap());
    assert!(manager
        .delete_plan(&cancel, "demo", "add-auth")
        .unwrap_err()
        .is_not_found());

    manager.delete_project(&cancel, "demo").unwrap();
    assert!(!manager.project_exists(&cancel, "demo").unwrap());
    assert!(!workspace.root.join("projects/demo").exists());
}

/// Test: listing skips corrupt documents
#[test]
fn test_listing_reports_corrupt_entries() {
    let workspace = TestWorkspace::new();
    let manager = workspace.manager();
    demo_plan(&manager);
    let cancel = token();
    manager.create_plan(&cancel, "demo", "broken", "Broken").unwrap();

    fs::write(
        workspace.root.join("projects/demo/plans/broken/plan.json"),
        "{ not json",
    )
    .unwrap();

    let listing = manager.list_plans(&cancel, "demo").unwrap();
    assert_eq!(listing.items.len(), 1);
    assert_eq!(listing.errors.len(), 1);
    assert_eq!(listing.errors[0].name, "broken");
    assert!(matches!(listing.errors[0].error, Error::Codec { .. }));
    assert!(!listing.is_complete());
}

/// Test: archived projects refuse new plans
#[test]
fn test_archived_project_is_read_only() {
    let workspace = TestWorkspace::new();
    let manager = workspace.manager();
    demo_plan(&manager);
    let cancel = token();

    let project = manager.archive_project(&cancel, "demo").unwrap();
    assert_eq!(project.status, ProjectStatus::Archived);
    assert!(project.archived_at.is_some());
    assert!(matches!(
        manager.create_plan(&cancel, "demo", "late", "Too late"),
        Err(Error::Archived { .. })
    ));
    // Existing plans stay readable.
    assert!(manager.load_plan(&cancel, "demo", "add-auth").is_ok());
}

/// Test: legacy change directory on disk
#[test]
fn test_change_layout_and_archive() {
    let workspace = TestWorkspace::new();
    let manager = workspace.manager();
    let cancel = token();

    let record = manager
        .create_change(&cancel, "Add rate limiting", "alice")
        .unwrap();
    assert_eq!(record.slug, "add-rate-limiting");
    manager
        .write_artifact(&cancel, &record.slug, Artifact::Proposal, "# Proposal\n")
        .unwrap();

    let change_dir = workspace.root.join("changes/add-rate-limiting");
    assert!(change_dir.join("metadata.json").is_file());
    assert!(change_dir.join("specs").is_dir());
    assert_eq!(
        fs::read_to_string(change_dir.join("proposal.md")).unwrap(),
        "# Proposal\n"
    );

    fs::create_dir_all(change_dir.join("specs/limits")).unwrap();
    fs::write(change_dir.join("specs/limits/spec.md"), "limits").unwrap();

    for status in crate::fixtures::GATES {
        manager
            .update_change_status(&cancel, &record.slug, status)
            .unwrap();
    }
    manager.archive_change(&cancel, &record.slug).unwrap();

    assert!(!change_dir.exists());
    assert!(workspace.root.join("archive/add-rate-limiting/metadata.json").is_file());
    assert_eq!(
        fs::read_to_string(workspace.root.join("specs/limits/spec.md")).unwrap(),
        "limits"
    );
}
