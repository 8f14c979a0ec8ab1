//! # scout-autonomy
//!
//! The safety half of the control plane: the per-user emergency brake, the
//! tiered autonomy gate (L0-L3) that sits behind it, and the approval queue
//! where gated writes wait for a human.

pub mod approval;
pub mod brake;
pub mod gate;
pub mod level;

pub use approval::{ApprovalDecision, ApprovalQueue};
pub use brake::{BrakeController, BrakeSnapshot, BrakeState, VerificationScheduler};
pub use gate::{
    AutonomyGate, FixedCeiling, GateDecision, GateOutcome, NoCeiling, OrgPolicy,
    PreferenceTierResolver, TierResolver,
};
pub use level::AutonomyLevel;
