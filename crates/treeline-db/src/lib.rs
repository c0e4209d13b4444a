//! Local tree-head persistence for Treeline nodes.
//!
//! This crate provides:
//!
//! - [`TreeHeadDatabase`] — the contract the coordination layer consumes.
//! - [`TreeHeadDb`] — the implementation, with Fjall (disk) and pure
//!   in-memory backends.

mod error;
mod store;

pub use error::DbError;
pub use store::{TreeHeadDatabase, TreeHeadDb};
