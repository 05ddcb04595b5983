//! Canonical store layout.
//!
//! ```text
//! projects/{project}/project.json
//! projects/{project}/plans/{plan}/{plan,phases,tasks}.json
//! projects/{project}/archive/{plan}/...
//! changes/{change}/metadata.json
//! changes/{change}/specs/
//! changes/{change}/{proposal,design,spec,tasks}.md
//! archive/{change}/...
//! specs/{capability}/...
//! ```

use crate::store::StoreKey;

pub const PROJECT_FILE: &str = "project.json";
pub const PLAN_FILE: &str = "plan.json";
pub const PHASES_FILE: &str = "phases.json";
pub const TASKS_FILE: &str = "tasks.json";
pub const METADATA_FILE: &str = "metadata.json";

pub fn projects() -> StoreKey {
    StoreKey::root().join("projects")
}

pub fn project(project: &str) -> StoreKey {
    projects().join(project)
}

pub fn project_doc(project: &str) -> StoreKey {
    self::project(project).join(PROJECT_FILE)
}

pub fn plans(project: &str) -> StoreKey {
    self::project(project).join("plans")
}

pub fn plan(project: &str, plan: &str) -> StoreKey {
    plans(project).join(plan)
}

pub fn plan_archive(project: &str) -> StoreKey {
    self::project(project).join("archive")
}

pub fn archived_plan(project: &str, plan: &str) -> StoreKey {
    plan_archive(project).join(plan)
}

pub fn changes() -> StoreKey {
    StoreKey::root().join("changes")
}

pub fn change(slug: &str) -> StoreKey {
    changes().join(slug)
}

pub fn change_doc(slug: &str) -> StoreKey {
    change(slug).join(METADATA_FILE)
}

pub fn change_specs(slug: &str) -> StoreKey {
    change(slug).join("specs")
}

pub fn change_archive() -> StoreKey {
    StoreKey::root().join("archive")
}

pub fn specs() -> StoreKey {
    StoreKey::root().join("specs")
}
