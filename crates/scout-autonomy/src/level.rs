use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Four autonomy tiers, each a strict superset of the one below:
///
/// - **L0 (Suggest)**: Reads run as suggestions only; writes are blocked.
/// - **L1 (Read-only)**: Reads execute; writes are blocked.
/// - **L2 (Supervised)**: Reads execute; writes wait in the approval queue.
/// - **L3 (Autonomous)**: Reads and writes execute.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum AutonomyLevel {
    Suggest = 0,
    #[default]
    ReadOnly = 1,
    Supervised = 2,
    Autonomous = 3,
}

impl AutonomyLevel {
    pub const ALL: [AutonomyLevel; 4] = [
        Self::Suggest,
        Self::ReadOnly,
        Self::Supervised,
        Self::Autonomous,
    ];

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Suggest,
            1 => Self::ReadOnly,
            2 => Self::Supervised,
            3 => Self::Autonomous,
            _ => Self::ReadOnly, // safe default
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// The lower of this level and an organization ceiling.
    pub fn capped_at(self, ceiling: Option<AutonomyLevel>) -> Self {
        match ceiling {
            Some(ceiling) => self.min(ceiling),
            None => self,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Suggest => "Agents only suggest; nothing runs on your behalf",
            Self::ReadOnly => "Agents research and read; writes are blocked",
            Self::Supervised => "Agents act freely on reads; writes wait for your approval",
            Self::Autonomous => "Agents act on reads and writes without asking",
        }
    }
}

/// Accepts `"2"` or `"L2"`/`"l2"`. Anything else falls back to L1.
impl FromStr for AutonomyLevel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix('L')
            .or_else(|| s.strip_prefix('l'))
            .unwrap_or(s);
        Ok(digits.parse::<u8>().map(Self::from_u8).unwrap_or_default())
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L{} ({})",
            *self as u8,
            match self {
                Self::Suggest => "Suggest",
                Self::ReadOnly => "Read-only",
                Self::Supervised => "Supervised",
                Self::Autonomous => "Autonomous",
            }
        )
    }
}
