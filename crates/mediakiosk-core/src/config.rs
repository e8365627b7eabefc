//! Application configuration management.
//!
//! Handles loading, saving, and validating kiosk settings: polling intervals,
//! device watcher policy, player commands, network and streaming options.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, FileSystemError, Result};
use crate::streaming::StreamingService;

/// Screen geometry used to place external windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScreenSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Default for ScreenSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Device watcher policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatcherConfig {
    /// How often the partition table is re-read.
    pub poll_interval_ms: u64,
    /// Only report partitions that sit on a USB bus.
    pub usb_only: bool,
    /// Repeated adds of the same device inside this window are dropped.
    pub debounce_window_ms: u64,
    /// Mount-point lookups before an add is given up.
    pub mount_retry_attempts: u32,
    /// Delay before the first mount-point retry; doubles each attempt.
    pub mount_retry_delay_ms: u64,
    /// Report partitions already present at start-up as adds.
    pub report_existing: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            usb_only: true,
            debounce_window_ms: 2000,
            mount_retry_attempts: 3,
            mount_retry_delay_ms: 1000,
            report_existing: true,
        }
    }
}

impl WatcherConfig {
    /// Partition table polling interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Debounce window for repeated adds.
    #[must_use]
    pub const fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    /// Initial mount retry delay.
    #[must_use]
    pub const fn mount_retry_delay(&self) -> Duration {
        Duration::from_millis(self.mount_retry_delay_ms)
    }
}

/// USB screen settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UsbConfig {
    /// How often the UI drains device events.
    pub tick_interval_ms: u64,
    /// Device watcher policy.
    pub watcher: WatcherConfig,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            watcher: WatcherConfig::default(),
        }
    }
}

impl UsbConfig {
    /// Device event drain interval.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Playback timing settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Time each slideshow image stays on screen.
    pub slideshow_interval_ms: u64,
    /// Poll interval while waiting for a media duration.
    pub duration_probe_interval_ms: u64,
    /// How often the UI loop pumps the open playback session.
    pub pump_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            slideshow_interval_ms: 5000,
            duration_probe_interval_ms: 1000,
            pump_interval_ms: 100,
        }
    }
}

impl PlaybackConfig {
    /// Slideshow advance interval.
    #[must_use]
    pub const fn slideshow_interval(&self) -> Duration {
        Duration::from_millis(self.slideshow_interval_ms)
    }

    /// Duration probe interval.
    #[must_use]
    pub const fn duration_probe_interval(&self) -> Duration {
        Duration::from_millis(self.duration_probe_interval_ms)
    }

    /// Session pump interval.
    #[must_use]
    pub const fn pump_interval(&self) -> Duration {
        Duration::from_millis(self.pump_interval_ms)
    }
}

/// A program and its leading arguments; the media path is appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerCommand {
    /// Executable name or path.
    pub program: String,
    /// Arguments placed before the media path.
    #[serde(default)]
    pub args: Vec<String>,
}

impl PlayerCommand {
    /// Create a command from a program and arguments.
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }
}

/// External player commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlayersConfig {
    /// Audio player.
    pub audio: PlayerCommand,
    /// Video player.
    pub video: PlayerCommand,
    /// Image viewer.
    pub image: PlayerCommand,
    /// `ffprobe` binary used to read media durations.
    pub ffprobe: String,
}

impl Default for PlayersConfig {
    fn default() -> Self {
        Self {
            audio: PlayerCommand::new("mpv", &["--no-video", "--no-terminal"]),
            video: PlayerCommand::new("mpv", &["--fullscreen", "--no-terminal"]),
            image: PlayerCommand::new(
                "mpv",
                &["--fullscreen", "--no-terminal", "--image-display-duration=inf"],
            ),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

/// WiFi settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Wireless interface passed to `nmcli`.
    pub interface: String,
    /// Address used to check internet connectivity.
    pub probe_address: String,
    /// Connectivity probe timeout.
    pub probe_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".to_string(),
            probe_address: "8.8.8.8:53".to_string(),
            probe_timeout_ms: 2000,
        }
    }
}

/// Streaming screen settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Browser executable.
    pub browser: String,
    /// Offered services.
    pub services: Vec<StreamingService>,
    /// How often the browser process is checked for liveness.
    pub liveness_interval_ms: u64,
    /// Screen size used to size the browser window.
    pub screen: ScreenSize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            browser: "chromium-browser".to_string(),
            services: StreamingService::default_catalog(),
            liveness_interval_ms: 1000,
            screen: ScreenSize::default(),
        }
    }
}

impl StreamingConfig {
    /// Browser liveness check interval.
    #[must_use]
    pub const fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// USB screen settings.
    #[serde(default)]
    pub usb: UsbConfig,
    /// Playback timing settings.
    #[serde(default)]
    pub playback: PlaybackConfig,
    /// External player commands.
    #[serde(default)]
    pub players: PlayersConfig,
    /// WiFi settings.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Streaming settings.
    #[serde(default)]
    pub streaming: StreamingConfig,
}

impl AppConfig {
    /// Load configuration from disk, or create default if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read, parsed, or validated.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific file, creating it with defaults if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or validated.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            debug!("Config file not found, using defaults");
            let config = Self::default();
            if let Err(e) = config.save_to(config_path) {
                warn!("Failed to save default config: {}", e);
            }
            return Ok(config);
        }

        let content = fs::read_to_string(config_path).map_err(|e| {
            Error::FileSystem(FileSystemError::ReadFailed {
                path: config_path.to_path_buf(),
                reason: format!("Failed to read config file: {e}"),
            })
        })?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;
        config.validate()?;

        info!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::FileSystem(FileSystemError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    reason: format!("Failed to create config directory: {e}"),
                })
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, content).map_err(|e| {
            Error::FileSystem(FileSystemError::WriteFailed {
                path: config_path.to_path_buf(),
                reason: format!("Failed to write config file: {e}"),
            })
        })?;

        info!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// Check intervals and commands for values the kiosk cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("usb.tick_interval_ms", self.usb.tick_interval_ms),
            ("usb.watcher.poll_interval_ms", self.usb.watcher.poll_interval_ms),
            ("playback.slideshow_interval_ms", self.playback.slideshow_interval_ms),
            (
                "playback.duration_probe_interval_ms",
                self.playback.duration_probe_interval_ms,
            ),
            ("playback.pump_interval_ms", self.playback.pump_interval_ms),
            (
                "streaming.liveness_interval_ms",
                self.streaming.liveness_interval_ms,
            ),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Configuration(format!("{name} must be greater than 0")));
        }

        let players = [
            ("players.audio", &self.players.audio.program),
            ("players.video", &self.players.video.program),
            ("players.image", &self.players.image.program),
        ];
        if let Some((name, _)) = players.iter().find(|(_, program)| program.trim().is_empty()) {
            return Err(Error::Configuration(format!("{name} program cannot be empty")));
        }

        if self.streaming.browser.trim().is_empty() {
            return Err(Error::Configuration(
                "streaming.browser cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the path to the config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

/// Get the path to the config file.
fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("mediakiosk")
        .join("config.json")
}

/// Configuration manager that handles loading and caching config.
pub struct ConfigManager {
    config: AppConfig,
}

impl ConfigManager {
    /// Create a new config manager, loading config from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded.
    pub fn new() -> Result<Self> {
        Self::with_path(config_file_path())
    }

    /// Create a config manager backed by a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        let config = AppConfig::load_from(&path)?;
        Ok(Self { config })
    }

    /// Get a reference to the current configuration.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.usb.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.playback.slideshow_interval(), Duration::from_secs(5));
        assert_eq!(config.playback.duration_probe_interval(), Duration::from_secs(1));
        assert_eq!(config.network.interface, "wlan0");
        assert_eq!(config.streaming.services.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_creates_default_file() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("nested").join("config.json");

        let config = AppConfig::load_from(&path).expect("load defaults");

        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.playback.slideshow_interval_ms = 8000;
        config.network.interface = "wlp2s0".to_string();
        config.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("reload");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"playback":{"slideshow_interval_ms":3000}}"#;
        let config: AppConfig = serde_json::from_str(json).expect("Should deserialize");
        assert_eq!(config.playback.slideshow_interval_ms, 3000);
        assert_eq!(config.playback.duration_probe_interval_ms, 1000);
        assert_eq!(config.usb, UsbConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = AppConfig::default();
        config.usb.tick_interval_ms = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("usb.tick_interval_ms"));
    }

    #[test]
    fn test_validate_rejects_empty_player() {
        let mut config = AppConfig::default();
        config.players.video.program = "  ".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("players.video"));
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let result = AppConfig::load_from(&path);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_config_manager_with_path_loads_file() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.usb.watcher.debounce_window_ms = 500;
        config.save_to(&path).expect("save");

        let manager = ConfigManager::with_path(path).expect("manager");
        assert_eq!(manager.config().usb.watcher.debounce_window_ms, 500);
    }

    #[test]
    fn test_config_file_path_uses_correct_name() {
        let path = AppConfig::config_file_path();
        assert!(path.ends_with("mediakiosk/config.json"));
    }
}
