//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Managers over a temporary workflow directory
//! - Walking a plan through its stage gates

use std::path::PathBuf;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use stagegate::workflow::PlanStatus;
use stagegate::Manager;

/// Every plan status from `created` to `complete`, in gate order.
pub const GATES: [PlanStatus; 9] = [
    PlanStatus::Drafted,
    PlanStatus::Reviewed,
    PlanStatus::Approved,
    PlanStatus::PhasesGenerated,
    PlanStatus::PhasesApproved,
    PlanStatus::TasksGenerated,
    PlanStatus::TasksApproved,
    PlanStatus::Implementing,
    PlanStatus::Complete,
];

/// A workflow store in a temporary directory.
pub struct TestWorkspace {
    /// Held so the directory lives as long as the workspace.
    pub temp_dir: TempDir,
    /// Root of the workflow store.
    pub root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join(".stagegate");
        Self { temp_dir, root }
    }

    /// A fresh manager over this workspace, as a new process would open it.
    pub fn manager(&self) -> Manager {
        Manager::open(&self.root)
    }
}

pub fn token() -> CancellationToken {
    CancellationToken::new()
}

/// Create project `demo` with plan `add-auth`.
pub fn demo_plan(manager: &Manager) {
    let cancel = token();
    manager
        .create_project(&cancel, "demo", "Demo")
        .expect("Failed to create project");
    manager
        .create_plan(&cancel, "demo", "add-auth", "Add authentication")
        .expect("Failed to create plan");
}

/// Transition `demo/add-auth` through every gate up to `complete`.
pub fn complete_plan(manager: &Manager, slug: &str) {
    let cancel = token();
    for status in GATES {
        manager
            .transition_plan(&cancel, "demo", slug, status)
            .unwrap_or_else(|e| panic!("transition to {} failed: {}", status, e));
    }
}
