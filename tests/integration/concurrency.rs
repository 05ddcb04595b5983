//! Concurrency correctness tests.
//!
//! These tests race many callers against one entity and check that the
//! store ends up in a state some serial order could have produced.

use std::sync::{Arc, Barrier};
use std::thread;

use futures::future::join_all;

use stagegate::manager::NewTask;
use stagegate::util::{blocking, with_manager};
use stagegate::workflow::DEFAULT_PROJECT_SLUG;
use stagegate::{Error, Manager};

use crate::fixtures::{demo_plan, token, TestWorkspace};

const RACERS: usize = 16;

/// Run `f` on `RACERS` threads released together.
fn race<T, F>(manager: &Manager, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(&Manager, usize) -> T + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(RACERS));
    let f = Arc::new(f);
    let handles: Vec<_> = (0..RACERS)
        .map(|i| {
            let manager = manager.clone();
            let barrier = Arc::clone(&barrier);
            let f = Arc::clone(&f);
            thread::spawn(move || {
                barrier.wait();
                f(&manager, i)
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("racer panicked"))
        .collect()
}

/// Test: racing creators
/// Given 16 threads creating the same project
/// When they run at once
/// Then exactly one succeeds and the rest see AlreadyExists
#[test]
fn test_concurrent_project_creates() {
    let workspace = TestWorkspace::new();
    let results = race(&workspace.manager(), |m, i| {
        m.create_project(&token(), "demo", &format!("Demo {}", i))
    });

    let created = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_already_exists()))
        .count();
    assert_eq!(created, 1);
    assert_eq!(duplicates, RACERS - 1);
}

/// Test: racing creators on disk without a shared lock registry
/// Given two independent managers over one directory
/// When both race to create the same plan
/// Then the create-only node still admits one winner
#[test]
fn test_create_only_without_shared_locks() {
    let workspace = TestWorkspace::new();
    demo_plan(&workspace.manager());

    let root = workspace.root.clone();
    let results = race(&workspace.manager(), move |_, i| {
        // Each racer opens its own manager, so no lock is shared.
        let manager = Manager::open(&root);
        manager.create_plan(&token(), "demo", "shared", &format!("Shared {}", i))
    });
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(Error::is_already_exists));
}

/// Test: racing updaters
/// Given 16 threads each appending to one plan
/// When they run at once
/// Then no update is lost
#[test]
fn test_concurrent_plan_updates_lose_nothing() {
    let workspace = TestWorkspace::new();
    let manager = workspace.manager();
    demo_plan(&manager);

    let results = race(&manager, |m, i| {
        m.update_plan(&token(), "demo", "add-auth", |plan| {
            plan.scope.include.push(format!("src/module_{}.rs", i));
        })
    });
    assert!(results.iter().all(|r| r.is_ok()));

    let plan = manager.load_plan(&token(), "demo", "add-auth").unwrap();
    assert_eq!(plan.scope.include.len(), RACERS);
}

/// Test: racing last-writer-wins field updates
#[test]
fn test_concurrent_title_updates_pick_one() {
    let manager = Manager::in_memory();
    demo_plan(&manager);

    let results = race(&manager, |m, i| {
        m.update_plan(&token(), "demo", "add-auth", |plan| {
            plan.title = format!("Title {}", i);
        })
    });
    assert!(results.iter().all(|r| r.is_ok()));

    let title = manager.load_plan(&token(), "demo", "add-auth").unwrap().title;
    let candidates: Vec<String> = (0..RACERS).map(|i| format!("Title {}", i)).collect();
    assert!(candidates.contains(&title));
}

/// Test: racing task creators get distinct ids
#[test]
fn test_concurrent_task_creates() {
    let manager = Manager::in_memory();
    demo_plan(&manager);

    let results = race(&manager, |m, i| {
        m.create_task(&token(), "demo", "add-auth", NewTask::new(format!("Task {}", i)))
    });
    let mut ids: Vec<String> = results.into_iter().map(|r| r.unwrap().id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), RACERS);

    let tasks = manager.load_tasks(&token(), "demo", "add-auth").unwrap();
    assert_eq!(tasks.len(), RACERS);
    let sequences: Vec<u32> = tasks.iter().map(|t| t.sequence).collect();
    assert_eq!(sequences, (1..=RACERS as u32).collect::<Vec<_>>());
}

/// Test: racing default-project provisioning
/// Given many async callers creating plans in the default project
/// When none has created the project first
/// Then the project exists once and every plan lands in it
#[tokio::test]
async fn test_default_project_provisioned_once() {
    let manager = Manager::in_memory();

    let creates = (0..RACERS).map(|i| {
        with_manager(&manager, move |m| {
            m.create_plan(
                &token(),
                DEFAULT_PROJECT_SLUG,
                &format!("plan-{}", i),
                "Quick fix",
            )
        })
    });
    let results = join_all(creates).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let listing = manager.list_projects(&token()).unwrap();
    assert_eq!(listing.items.len(), 1);
    assert_eq!(listing.items[0].slug, DEFAULT_PROJECT_SLUG);
    assert_eq!(
        manager
            .list_plans(&token(), DEFAULT_PROJECT_SLUG)
            .unwrap()
            .items
            .len(),
        RACERS
    );
}

/// Test: cancelled callers write nothing
#[tokio::test]
async fn test_cancelled_token_stops_writes() {
    let manager = Manager::in_memory();
    let cancel = token();
    cancel.cancel();

    let m = manager.clone();
    let result = blocking(move || m.create_project(&cancel, "demo", "Demo")).await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!manager.project_exists(&token(), "demo").unwrap());
}
