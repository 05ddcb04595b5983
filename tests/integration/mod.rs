//! Integration test suite for stagegate.
//!
//! These tests drive the public [`stagegate::Manager`] API end to end,
//! against both the in-memory store and a real directory on disk.
//!
//! # Test Categories
//!
//! - `lifecycle_e2e`: Full plan lifecycle through every stage gate
//! - `concurrency`: Racing creators and updaters across threads and tasks
//! - `persistence`: On-disk layout, reopening, archiving and deletion

mod fixtures;

mod concurrency;
mod lifecycle_e2e;
mod persistence;
