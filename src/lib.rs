//! Stage-gated workflow engine.
//!
//! A plan lives inside a project and is broken down into phases and tasks.
//! Each stage passes a review and approval gate before the next begins.
//! [`Manager`] owns every read and write; the [`store`] underneath is the
//! only source of truth.

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod locks;
pub mod log;
pub mod manager;
pub mod slug;
pub mod store;
pub mod util;
pub mod workflow;

pub use error::{EntityKind, Error, Result};
pub use manager::{Listing, ListingError, Manager};
