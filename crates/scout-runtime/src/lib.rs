//! # scout-runtime
//!
//! The execution half of the control plane: routing tasks onto the queue,
//! running capabilities through the agent execution contract, and the timed
//! work (expiry sweep, brake verification) that keeps state moving.
//!
//! ## Architecture
//!
//! ```text
//!   caller ──► Dispatcher ──► [brake] ──► [gate] ──► TaskQueue
//!                                                       │
//!                                                       ▼
//!                                                    Worker
//!                                                       │
//!                                                       ▼
//!                     AgentRunner ──► [brake] ──► [gate] ──► Capability
//!                          │
//!              ┌───────────┼────────────┐
//!              ▼           ▼            ▼
//!          outputs     activity      publish          (each isolated)
//!
//!   Scheduler ──► expiry sweep (cron) / brake verification (one-shot)
//! ```

pub mod agent;
pub mod context;
pub mod dispatcher;
pub mod queue;
pub mod scheduler;
pub mod worker;

pub use agent::{AgentContext, AgentRunner, Capability};
pub use context::{ContextCache, SharedContext};
pub use dispatcher::{DispatchReceipt, Dispatcher, TaskKind};
pub use queue::LocalTaskQueue;
pub use scheduler::{ScheduleKind, ScheduledJob, ScheduledTask, Scheduler, SchedulerHandle};
pub use worker::{CapabilityRegistry, Worker};
