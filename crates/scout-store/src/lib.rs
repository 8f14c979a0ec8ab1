//! # scout-store
//!
//! SQLite persistence for the Scout control plane: user preferences and
//! profiles, the approval queue, agent outputs, the activity log, and routing
//! decisions. One `SqliteStore` implements every persistence trait from
//! `scout_core::store`, and the `CoordinationStore` shared by every process
//! opening the same database.

mod approvals;
mod coord;
mod preferences;
mod records;
pub mod store;

pub use coord::OutboxMessage;
pub use store::SqliteStore;
