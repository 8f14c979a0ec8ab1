//! # scout-config
//!
//! Configuration for the Scout control plane. Reads from `scout.toml` and
//! environment variables, in that precedence order, then validates.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::ScoutConfig;
pub use schema::{
    ApprovalConfig, AutonomyConfig, BrakeConfig, ConfigWarning, ContextConfig, FailMode,
    LoggingConfig, SchedulerConfig, StoreConfig, WarningSeverity, WorkerConfig, MAX_EXPIRY_HOURS,
    MAX_VERIFY_DELAY_SECS,
};
