//! Deployment config – reads/writes `~/.rover-drive/config.toml`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rover_kernel::LimiterConfig;
use rover_kinematics::GeometryConfig;
use rover_runtime::CoordinatorConfig;
use rover_types::{CommandSource, DriveError};

/// Everything the `rover-drive` binary needs to assemble a coordinator.
///
/// ```toml
/// [geometry]
/// type = "differential"
/// track_width = 0.5
/// max_wheel_speed = 1.5
///
/// [coordinator]
/// period_ms = 50
/// grace_cycles = 5
///
/// [[sources]]
/// source_id = "teleop"
/// priority = 5
/// max_staleness_ms = 250
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub geometry: GeometryConfig,

    #[serde(default)]
    pub limits: LimiterConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Registered once at startup, in this order.
    #[serde(default = "default_sources")]
    pub sources: Vec<CommandSource>,
}

fn default_sources() -> Vec<CommandSource> {
    vec![
        CommandSource::new("autonomy", 1, Duration::from_millis(500)),
        CommandSource::new("teleop", 5, Duration::from_millis(250)),
        CommandSource::new("estop_pad", 0, Duration::from_millis(150)).safety_override(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            geometry: GeometryConfig::default(),
            limits: LimiterConfig::default(),
            coordinator: CoordinatorConfig::default(),
            sources: default_sources(),
        }
    }
}

impl Config {
    /// Startup validation.  Any error here is fatal.
    ///
    /// # Errors
    ///
    /// [`DriveError::DuplicateSource`] when two sources share an id, otherwise
    /// [`DriveError::Config`] for the first invalid section.
    pub fn validate(&self) -> Result<(), DriveError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.source_id.as_str()) {
                return Err(DriveError::DuplicateSource(source.source_id.clone()));
            }
        }
        self.geometry.validate()?;
        self.limits.validate()?;
        self.coordinator.validate()
    }
}

/// Return the config path: `ROVER_DRIVE_CONFIG` if set, otherwise
/// `~/.rover-drive/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("ROVER_DRIVE_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover-drive").join("config.toml")
}

/// Load the config at `path`.  Returns `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, DriveError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        DriveError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| DriveError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Load the config, or write the defaults on first run.
///
/// The second value is `true` when the file was just created.  Environment
/// overrides apply either way; the file holds only the defaults.
pub fn load_or_create() -> Result<(Config, bool), DriveError> {
    load_or_create_at(&config_path())
}

pub(crate) fn load_or_create_at(path: &Path) -> Result<(Config, bool), DriveError> {
    if let Some(cfg) = load_from(path)? {
        return Ok((cfg, false));
    }
    let mut cfg = Config::default();
    save_to(&cfg, path)?;
    apply_env_overrides(&mut cfg);
    Ok((cfg, true))
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.
///
/// Unparseable values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_PERIOD_MS` | `coordinator.period_ms` |
/// | `ROVER_GRACE_CYCLES` | `coordinator.grace_cycles` |
/// | `ROVER_DEGRADED_DECAY` | `coordinator.degraded_decay` |
/// | `ROVER_MAX_DISPATCH_FAILURES` | `coordinator.max_dispatch_failures` |
/// | `ROVER_MAX_VELOCITY` | `limits.default.max_velocity` |
/// | `ROVER_MAX_ACCELERATION` | `limits.default.max_acceleration` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVER_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.coordinator.period_ms = ms;
    }
    if let Ok(v) = std::env::var("ROVER_GRACE_CYCLES")
        && let Ok(n) = v.parse::<u32>()
    {
        cfg.coordinator.grace_cycles = n;
    }
    if let Ok(v) = std::env::var("ROVER_DEGRADED_DECAY")
        && let Ok(decay) = v.parse::<f32>()
    {
        cfg.coordinator.degraded_decay = decay;
    }
    if let Ok(v) = std::env::var("ROVER_MAX_DISPATCH_FAILURES")
        && let Ok(n) = v.parse::<u32>()
    {
        cfg.coordinator.max_dispatch_failures = n;
    }
    if let Ok(v) = std::env::var("ROVER_MAX_VELOCITY")
        && let Ok(speed) = v.parse::<f32>()
    {
        cfg.limits.default.max_velocity = speed;
    }
    if let Ok(v) = std::env::var("ROVER_MAX_ACCELERATION")
        && let Ok(accel) = v.parse::<f32>()
    {
        cfg.limits.default.max_acceleration = accel;
    }
}

/// Save the config, creating the parent directory if necessary.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), DriveError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            DriveError::Config(format!("failed to create config directory: {e}"))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                DriveError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| DriveError::Config(format!("failed to serialize config: {e}")))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| {
                DriveError::Config(format!("failed to write config at {}: {e}", path.display()))
            })?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| {
        DriveError::Config(format!("failed to write config at {}: {e}", path.display()))
    })?;
    Ok(())
}
