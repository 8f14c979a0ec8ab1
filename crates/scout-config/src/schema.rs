use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Root configuration, maps to `scout.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub brake: BrakeConfig,
    pub approvals: ApprovalConfig,
    pub autonomy: AutonomyConfig,
    pub context: ContextConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Upper bound on `approvals.expiry_hours`.
pub const MAX_EXPIRY_HOURS: u64 = 24 * 365;

/// Upper bound on `brake.verify_delay_secs`.
pub const MAX_VERIFY_DELAY_SECS: u64 = 24 * 60 * 60;

// ── Brake ──────────────────────────────────────────────────────

/// How a brake check behaves when the coordination store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Treat the user as paused.
    Closed,
    /// Treat the user as running.
    Open,
}

impl FromStr for FailMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "closed" => Ok(Self::Closed),
            "open" => Ok(Self::Open),
            other => Err(format!("unknown fail mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrakeConfig {
    /// Seconds between activation and the completion check.
    pub verify_delay_secs: u64,
    pub fail_mode: FailMode,
}

impl Default for BrakeConfig {
    fn default() -> Self {
        Self {
            verify_delay_secs: 30,
            fail_mode: FailMode::Closed,
        }
    }
}

// ── Approvals ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Hours a queued item stays pending before the sweep expires it.
    pub expiry_hours: u64,
    /// Cron expression (with seconds field) for the expiry sweep.
    pub sweep_cron: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            expiry_hours: 48,
            sweep_cron: "0 0 */6 * * *".into(),
        }
    }
}

// ── Autonomy ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyConfig {
    /// Level for users without a stored preference: 0 = suggest, 1 = read-only,
    /// 2 = write with approval, 3 = autonomous.
    pub default_level: u8,
    /// Organization-wide ceiling; `None` outside enterprise deployments.
    pub org_ceiling: Option<u8>,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            default_level: 1,
            org_ceiling: None,
        }
    }
}

// ── Shared context ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub ttl_secs: u64,
    /// How many recent outputs are included in the shared context.
    pub recent_outputs: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            recent_outputs: 10,
        }
    }
}

// ── Scheduler / worker ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_secs: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            queue_capacity: 256,
        }
    }
}

// ── Store ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("scout.db"),
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
        };
        write!(f, "{}: {}: {}", tag, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({})", h)?;
        }
        Ok(())
    }
}

impl ScoutConfig {
    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Brake ───
        if self.brake.verify_delay_secs == 0 {
            warnings.push(ConfigWarning {
                field: "brake.verify_delay_secs".into(),
                message: "verification runs immediately; in-flight work will usually be reported stuck".into(),
                severity: WarningSeverity::Warning,
                hint: Some("30 seconds is typical".into()),
            });
        }
        if self.brake.verify_delay_secs > MAX_VERIFY_DELAY_SECS {
            warnings.push(ConfigWarning {
                field: "brake.verify_delay_secs".into(),
                message: format!(
                    "{} seconds exceeds the maximum of {}",
                    self.brake.verify_delay_secs, MAX_VERIFY_DELAY_SECS
                ),
                severity: WarningSeverity::Error,
                hint: Some("30 seconds is typical".into()),
            });
        }
        if self.brake.fail_mode == FailMode::Open {
            warnings.push(ConfigWarning {
                field: "brake.fail_mode".into(),
                message: "fail-open: agents keep running when brake state is unreadable".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Use \"closed\" unless availability matters more than safety".into()),
            });
        }

        // ── Approvals ───
        if self.approvals.expiry_hours == 0 {
            warnings.push(ConfigWarning {
                field: "approvals.expiry_hours".into(),
                message: "items would expire as soon as they are queued".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 48".into()),
            });
        }
        if self.approvals.expiry_hours > MAX_EXPIRY_HOURS {
            warnings.push(ConfigWarning {
                field: "approvals.expiry_hours".into(),
                message: format!(
                    "{} hours exceeds the maximum of {}",
                    self.approvals.expiry_hours, MAX_EXPIRY_HOURS
                ),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 48".into()),
            });
        }
        if let Err(e) = cron::Schedule::from_str(&self.approvals.sweep_cron) {
            warnings.push(ConfigWarning {
                field: "approvals.sweep_cron".into(),
                message: format!("invalid cron expression '{}': {}", self.approvals.sweep_cron, e),
                severity: WarningSeverity::Error,
                hint: Some("Cron expressions include a seconds field, e.g. \"0 0 */6 * * *\"".into()),
            });
        }

        // ── Autonomy ───
        if self.autonomy.default_level > 3 {
            warnings.push(ConfigWarning {
                field: "autonomy.default_level".into(),
                message: format!("level {} is invalid", self.autonomy.default_level),
                severity: WarningSeverity::Error,
                hint: Some("Valid levels: 0 (suggest), 1 (read-only), 2 (supervised), 3 (autonomous)".into()),
            });
        } else if self.autonomy.default_level == 3 {
            warnings.push(ConfigWarning {
                field: "autonomy.default_level".into(),
                message: "new users get fully autonomous writes".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Consider level 1 and let users opt in".into()),
            });
        }
        if let Some(ceiling) = self.autonomy.org_ceiling {
            if ceiling > 3 {
                warnings.push(ConfigWarning {
                    field: "autonomy.org_ceiling".into(),
                    message: format!("ceiling {} is invalid", ceiling),
                    severity: WarningSeverity::Error,
                    hint: Some("Valid ceilings: 0..=3".into()),
                });
            }
        }

        // ── Worker / scheduler ───
        if self.worker.concurrency == 0 {
            warnings.push(ConfigWarning {
                field: "worker.concurrency".into(),
                message: "no workers, dispatched tasks will never run".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 4".into()),
            });
        }
        if self.worker.queue_capacity == 0 {
            warnings.push(ConfigWarning {
                field: "worker.queue_capacity".into(),
                message: "queue capacity must be positive".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        if self.scheduler.tick_secs == 0 {
            warnings.push(ConfigWarning {
                field: "scheduler.tick_secs".into(),
                message: "tick interval must be positive".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 10".into()),
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
