//! Configuration loading for Waypoint.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.waypoint/config.toml`)
//! 3. User config (`~/.waypoint/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! All configuration is optional. The engine runs with defaults when no
//! config exists.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::AuditContext;
use crate::error::{FailOpen, Result, WaypointError};

/// Main configuration struct for Waypoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Audit digest behavior.
    pub audit: AuditConfig,
    /// Progress ledger configuration.
    pub ledger: LedgerConfig,
    /// Structural limits enforced when a unit is registered.
    pub limits: LimitsConfig,
}

/// Audit digest configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuditConfig {
    /// Retry a deferred digest whenever a completed unit is read.
    pub retry_on_read: bool,
    /// Include the declared location in the digest payload.
    pub include_location: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retry_on_read: true,
            include_location: true,
        }
    }
}

impl AuditConfig {
    /// Payload options for the digest builder.
    pub fn context(&self) -> AuditContext {
        AuditContext {
            include_location: self.include_location,
        }
    }
}

/// Progress ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Append engine events to `<home>/ledger.jsonl`.
    pub enabled: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Structural limits for generated units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum phases per unit.
    pub max_phases: u32,
    /// Maximum steps per phase.
    pub max_steps_per_phase: u32,
    /// Maximum gates per step.
    pub max_gates_per_step: u32,
}

/// Smallest accepted value for any limit.
pub const MIN_LIMIT: u32 = 1;

impl LimitsConfig {
    /// Check if a limit value is valid.
    pub fn is_valid_limit(value: u32) -> bool {
        value >= MIN_LIMIT
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_phases: 8,
            max_steps_per_phase: 32,
            max_gates_per_step: 16,
        }
    }
}

impl Config {
    /// Load configuration with full precedence chain.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();
        config
    }

    /// Load user config from `~/.waypoint/config.toml`.
    fn load_user_config() -> Option<Config> {
        let home = waypoint_home()?;
        Self::load_from_file(&home.join("config.toml")).ok()
    }

    /// Load project config from the nearest `.waypoint/config.toml`.
    fn load_project_config(cwd: &Path) -> Option<Config> {
        let config_path = project_waypoint_dir(cwd).join("config.toml");
        Self::load_from_file(&config_path).ok()
    }

    /// Load config from a specific file path.
    fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| WaypointError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| WaypointError::config(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // WAYPOINT_AUDIT_RETRY
        if let Ok(val) = env::var("WAYPOINT_AUDIT_RETRY") {
            match parse_flag(&val) {
                Some(flag) => self.audit.retry_on_read = flag,
                None => eprintln!(
                    "Warning: Invalid WAYPOINT_AUDIT_RETRY value '{}'. \
                    Expected true/false. Using '{}'.",
                    val, self.audit.retry_on_read
                ),
            }
        }

        // WAYPOINT_AUDIT_INCLUDE_LOCATION
        if let Ok(val) = env::var("WAYPOINT_AUDIT_INCLUDE_LOCATION") {
            match parse_flag(&val) {
                Some(flag) => self.audit.include_location = flag,
                None => eprintln!(
                    "Warning: Invalid WAYPOINT_AUDIT_INCLUDE_LOCATION value '{}'. \
                    Expected true/false. Using '{}'.",
                    val, self.audit.include_location
                ),
            }
        }

        // WAYPOINT_LEDGER_ENABLED
        if let Ok(val) = env::var("WAYPOINT_LEDGER_ENABLED") {
            match parse_flag(&val) {
                Some(flag) => self.ledger.enabled = flag,
                None => eprintln!(
                    "Warning: Invalid WAYPOINT_LEDGER_ENABLED value '{}'. \
                    Expected true/false. Using '{}'.",
                    val, self.ledger.enabled
                ),
            }
        }

        apply_limit_override("WAYPOINT_MAX_PHASES", &mut self.limits.max_phases);
        apply_limit_override(
            "WAYPOINT_MAX_STEPS_PER_PHASE",
            &mut self.limits.max_steps_per_phase,
        );
        apply_limit_override(
            "WAYPOINT_MAX_GATES_PER_STEP",
            &mut self.limits.max_gates_per_step,
        );
    }

    /// Merge another config into this one.
    ///
    /// Values from `other` win when they differ from the defaults. A layer
    /// that explicitly restates a default cannot override a customized lower
    /// layer.
    fn merge(mut self, other: Config) -> Self {
        let default_audit = AuditConfig::default();
        if other.audit.retry_on_read != default_audit.retry_on_read {
            self.audit.retry_on_read = other.audit.retry_on_read;
        }
        if other.audit.include_location != default_audit.include_location {
            self.audit.include_location = other.audit.include_location;
        }

        if other.ledger.enabled != LedgerConfig::default().enabled {
            self.ledger.enabled = other.ledger.enabled;
        }

        let default_limits = LimitsConfig::default();
        if other.limits.max_phases != default_limits.max_phases {
            self.limits.max_phases = other.limits.max_phases;
        }
        if other.limits.max_steps_per_phase != default_limits.max_steps_per_phase {
            self.limits.max_steps_per_phase = other.limits.max_steps_per_phase;
        }
        if other.limits.max_gates_per_step != default_limits.max_gates_per_step {
            self.limits.max_gates_per_step = other.limits.max_gates_per_step;
        }

        self
    }

    /// Load config with fail-open behavior.
    pub fn load_fail_open() -> Self {
        let result: Result<Self> = Ok(Self::load());
        result.fail_open_default("loading config")
    }

    /// Save configuration to `.waypoint/config.toml` in the given directory.
    pub fn save_project(&self, cwd: &Path) -> Result<()> {
        let dir = cwd.join(".waypoint");
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| WaypointError::storage(&dir, e))?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| WaypointError::config(e.to_string()))?;
        crate::util::atomic_write(&dir.join("config.toml"), content.as_bytes())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn apply_limit_override(var: &str, slot: &mut u32) {
    let Ok(val) = env::var(var) else {
        return;
    };
    match val.parse::<u32>() {
        Ok(n) if LimitsConfig::is_valid_limit(n) => *slot = n,
        Ok(n) => eprintln!(
            "Warning: Invalid {} value '{}'. Must be >= {}. Using '{}'.",
            var, n, MIN_LIMIT, slot
        ),
        Err(_) => eprintln!(
            "Warning: Invalid {} value '{}'. Expected a positive integer. Using '{}'.",
            var, val, slot
        ),
    }
}

/// Get the Waypoint home directory.
///
/// Checks `WAYPOINT_HOME` first, then falls back to `~/.waypoint`. An empty
/// `WAYPOINT_HOME` is ignored.
pub fn waypoint_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("WAYPOINT_HOME") {
        if home.is_empty() {
            tracing::warn!("WAYPOINT_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("WAYPOINT_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".waypoint"));
    }

    let fallback = env::temp_dir().join("waypoint");
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback.display()
    );
    Some(fallback)
}

/// Find the project root: the nearest ancestor holding `.waypoint/`, or
/// `cwd` itself.
pub fn find_project_root(cwd: &Path) -> PathBuf {
    cwd.ancestors()
        .find(|ancestor| ancestor.join(".waypoint").is_dir())
        .unwrap_or(cwd)
        .to_path_buf()
}

/// Get the project `.waypoint/` directory.
pub fn project_waypoint_dir(cwd: &Path) -> PathBuf {
    find_project_root(cwd).join(".waypoint")
}

/// Get the unit store directory.
///
/// Returns `<waypoint_home>/units/`.
pub fn units_dir() -> Option<PathBuf> {
    waypoint_home().map(|h| h.join("units"))
}

/// Get the progress ledger path.
///
/// Returns `<waypoint_home>/ledger.jsonl`.
pub fn ledger_path() -> Option<PathBuf> {
    waypoint_home().map(|h| h.join("ledger.jsonl"))
}

/// Get the crash log path.
pub fn crash_log_path() -> Option<PathBuf> {
    waypoint_home().map(|h| h.join("crash.log"))
}
