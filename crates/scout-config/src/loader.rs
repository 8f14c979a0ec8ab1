use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::{FailMode, ScoutConfig};

/// Loads the Scout configuration: file, then environment overrides, then
/// validation.
pub struct ConfigLoader {
    config: ScoutConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > SCOUT_CONFIG env > ~/.scout/scout.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("SCOUT_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".scout")
            .join("scout.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> scout_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            ScoutConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => return Err(scout_core::ScoutError::Config(e)),
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Parse a TOML document into a config.
    pub fn parse(raw: &str, origin: &Path) -> scout_core::Result<ScoutConfig> {
        toml::from_str::<ScoutConfig>(raw).map_err(|e| {
            scout_core::ScoutError::Config(format!("failed to parse {}: {}", origin.display(), e))
        })
    }

    /// A snapshot of the loaded config.
    pub fn get(&self) -> ScoutConfig {
        self.config.clone()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (SCOUT_LOG_LEVEL, SCOUT_DB_PATH, etc.)
    fn apply_env_overrides(mut config: ScoutConfig) -> ScoutConfig {
        if let Ok(v) = std::env::var("SCOUT_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("SCOUT_DB_PATH") {
            config.store.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SCOUT_BRAKE_FAIL_MODE") {
            match v.parse::<FailMode>() {
                Ok(mode) => config.brake.fail_mode = mode,
                Err(e) => warn!(error = %e, "ignoring SCOUT_BRAKE_FAIL_MODE"),
            }
        }
        if let Ok(v) = std::env::var("SCOUT_DEFAULT_LEVEL") {
            if let Ok(level) = v.parse::<u8>() {
                config.autonomy.default_level = level;
            }
        }
        config
    }
}
