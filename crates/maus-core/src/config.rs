use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub capability: CapabilityConfig,
    #[serde(default)]
    pub frame_clock: FrameClockConfig,
    #[serde(default)]
    pub conflict: ConflictConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path (socket and pid file)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Enable smoothing as soon as the daemon starts
    #[serde(default)]
    pub enable_on_start: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            enable_on_start: false,
        }
    }
}

/// Physical model and input mapping for the scroll engine.
///
/// The stiffness/damping/mass triple was tuned together; changing one
/// usually means rebalancing the other two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Spring constant. Higher snaps to the target faster
    #[serde(default = "default_stiffness")]
    pub stiffness: f64,
    /// Viscous friction. Higher slows down sooner, lower coasts longer
    #[serde(default = "default_damping")]
    pub damping: f64,
    /// Theoretical mass of the scrolling system
    #[serde(default = "default_mass")]
    pub mass: f64,
    /// Scales every injected impulse. Higher means a longer fling
    #[serde(default = "default_momentum_factor")]
    pub momentum_factor: f64,
    /// Velocity clamp in pixels per second
    #[serde(default = "default_max_velocity")]
    pub max_velocity: f64,
    /// Direction of emitted scroll events
    #[serde(default)]
    pub direction: ScrollDirection,
    /// Scroll distance per wheel tick
    #[serde(default = "default_scroll_distance_multiplier")]
    pub scroll_distance_multiplier: f64,
    /// Holding all of these modifiers lets wheel events through untouched
    #[serde(default = "default_passthrough_modifiers")]
    pub passthrough_modifiers: Vec<Modifier>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stiffness: default_stiffness(),
            damping: default_damping(),
            mass: default_mass(),
            momentum_factor: default_momentum_factor(),
            max_velocity: default_max_velocity(),
            direction: ScrollDirection::default(),
            scroll_distance_multiplier: default_scroll_distance_multiplier(),
            passthrough_modifiers: default_passthrough_modifiers(),
        }
    }
}

impl EngineConfig {
    /// Factor applied to a raw wheel delta before it is added to the target
    #[inline]
    pub fn impulse_scale(&self) -> f64 {
        self.scroll_distance_multiplier * self.momentum_factor
    }

    #[inline]
    pub fn direction_multiplier(&self) -> i64 {
        self.direction.multiplier()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    /// Emitted events follow the wheel (trackpad-like)
    #[default]
    Natural,
    /// Emitted events are inverted
    Reversed,
}

impl ScrollDirection {
    pub fn multiplier(self) -> i64 {
        match self {
            ScrollDirection::Natural => 1,
            ScrollDirection::Reversed => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Command,
    Option,
    Control,
    Shift,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Accessibility trust poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl CapabilityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameClockConfig {
    /// Tick rate used when no display link is available
    #[serde(default = "default_fallback_fps")]
    pub fallback_fps: u32,
}

impl Default for FrameClockConfig {
    fn default() -> Self {
        Self {
            fallback_fps: default_fallback_fps(),
        }
    }
}

impl FrameClockConfig {
    pub fn fallback_interval(&self) -> Duration {
        if self.fallback_fps == 0 {
            Duration::from_millis(16) // ~60fps fallback
        } else {
            Duration::from_secs_f64(1.0 / self.fallback_fps as f64)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Substrings identifying incompatible scroll utilities (case-insensitive)
    #[serde(default = "default_process_tokens")]
    pub process_tokens: Vec<String>,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            process_tokens: default_process_tokens(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("maus")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stiffness() -> f64 {
    80.0
}

fn default_damping() -> f64 {
    12.0
}

fn default_mass() -> f64 {
    1.0
}

fn default_momentum_factor() -> f64 {
    1.8
}

fn default_max_velocity() -> f64 {
    3000.0
}

fn default_scroll_distance_multiplier() -> f64 {
    1.5
}

fn default_passthrough_modifiers() -> Vec<Modifier> {
    vec![Modifier::Command]
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_fallback_fps() -> u32 {
    60
}

fn default_process_tokens() -> Vec<String> {
    vec!["mos".to_string()]
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from file or return defaults
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, defaults if it does not exist
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Reject values the physical model cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let engine = &self.engine;
        let positive = [
            ("engine.stiffness", engine.stiffness),
            ("engine.damping", engine.damping),
            ("engine.mass", engine.mass),
            ("engine.max_velocity", engine.max_velocity),
            ("engine.scroll_distance_multiplier", engine.scroll_distance_multiplier),
        ];
        for (key, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(crate::Error::Config(format!(
                    "{} must be a finite number greater than 0 (got {})",
                    key, value
                )));
            }
        }

        if !engine.momentum_factor.is_finite() || engine.momentum_factor < 0.0 {
            return Err(crate::Error::Config(format!(
                "engine.momentum_factor must be a finite number >= 0 (got {})",
                engine.momentum_factor
            )));
        }

        if self.capability.poll_interval_ms == 0 {
            return Err(crate::Error::Config(
                "capability.poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.frame_clock.fallback_fps == 0 {
            return Err(crate::Error::Config(
                "frame_clock.fallback_fps must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the configuration file path
    /// Always uses ~/.config/maus/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("maus")
            .join("config.toml")
    }

    /// Get the Unix socket path for IPC
    pub fn socket_path(&self) -> PathBuf {
        self.data_dir().join("maus.sock")
    }

    /// Get the daemon PID file path
    pub fn pid_path(&self) -> PathBuf {
        self.data_dir().join("daemon.pid")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_config() {
        let config = EngineConfig::default();
        assert_eq!(config.stiffness, 80.0);
        assert_eq!(config.damping, 12.0);
        assert_eq!(config.mass, 1.0);
        assert_eq!(config.momentum_factor, 1.8);
        assert_eq!(config.max_velocity, 3000.0);
        assert_eq!(config.scroll_distance_multiplier, 1.5);
        assert_eq!(config.direction_multiplier(), 1);
        assert_eq!(config.passthrough_modifiers, vec![Modifier::Command]);
    }

    #[test]
    fn test_impulse_scale() {
        let config = EngineConfig::default();
        assert!((config.impulse_scale() * 10.0 - 27.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [engine]
            damping = 20.0
            direction = "reversed"
            passthrough_modifiers = ["option", "shift"]
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.damping, 20.0);
        assert_eq!(config.engine.stiffness, 80.0);
        assert_eq!(config.engine.direction_multiplier(), -1);
        assert_eq!(
            config.engine.passthrough_modifiers,
            vec![Modifier::Option, Modifier::Shift]
        );
        assert_eq!(config.capability.poll_interval_ms, 1000);
        assert_eq!(config.conflict.process_tokens, vec!["mos".to_string()]);
        assert!(!config.general.enable_on_start);
    }

    #[test]
    fn test_validate_rejects_bad_physics() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.engine.mass = 0.0;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        config.engine.mass = 1.0;
        config.engine.stiffness = f64::NAN;
        assert!(config.validate().is_err());

        config.engine.stiffness = 80.0;
        config.engine.momentum_factor = -0.5;
        assert!(config.validate().is_err());

        config.engine.momentum_factor = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = AppConfig::default();
        config.capability.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.frame_clock.fallback_fps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.engine.stiffness = 120.0;
        config.general.enable_on_start = true;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.engine.stiffness, 120.0);
        assert!(loaded.general.enable_on_start);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.engine.damping, 12.0);
    }

    #[test]
    fn test_load_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\nmass = -1.0\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_fallback_interval() {
        let config = FrameClockConfig { fallback_fps: 120 };
        let interval = config.fallback_interval();
        assert!((interval.as_secs_f64() - 1.0 / 120.0).abs() < 1e-6);
    }

    #[test]
    fn test_socket_path_in_data_dir() {
        let mut config = AppConfig::default();
        config.general.data_dir = PathBuf::from("/tmp/maus-test");
        assert_eq!(config.socket_path(), PathBuf::from("/tmp/maus-test/maus.sock"));
        assert_eq!(config.pid_path(), PathBuf::from("/tmp/maus-test/daemon.pid"));
    }
}
