//! # scout-core
//!
//! Core types, traits, and primitives for the Scout agent control plane.
//! This crate defines the shared vocabulary used by every other crate in the
//! workspace: errors, agent outputs, activity events, and the seams to the
//! coordination store, persistence store, and task queue.

pub mod approval;
pub mod coord;
pub mod error;
pub mod event;
pub mod keys;
pub mod queue;
pub mod store;
pub mod types;

pub use approval::{ApprovalItem, ApprovalStatus, OutputRecord};
pub use coord::{CoordinationStore, MemoryCoordinationStore};
pub use error::{Result, ScoutError};
pub use event::{ActivityEvent, PublishedEvent, Severity};
pub use queue::{InFlightTask, TaskHandle, TaskQueue};
pub use store::{ActivityLog, ApprovalStore, OutputStore, PreferenceStore, RoutingLog};
pub use types::*;
