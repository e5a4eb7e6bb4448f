//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Missing sections or
//! fields fall back to their defaults.
//!
//! ```toml
//! [audio]
//! sample_rate = 44100
//! block_size = 4096
//!
//! [tuning]
//! mode = "note"
//! target_note_hz = 440.0
//!
//! [pipeline]
//! bypass = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::pipeline::{PipelineConfig, TuningMode};
use crate::tuning::DEFAULT_A4_HZ;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Device stream settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Stream sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per block.  Smaller blocks lower latency but give the pitch
    /// detector less to work with.
    pub block_size: usize,
    pub input_channels: u16,
    pub output_channels: u16,
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
    /// Output device name; `None` means the system default.
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 4096,
            input_channels: 1,
            output_channels: 1,
            input_device: None,
            output_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TuningConfig
// ---------------------------------------------------------------------------

fn default_a4_hz() -> f32 {
    DEFAULT_A4_HZ
}

/// Correction target.
///
/// Only the defaults of the whole section name a scale: a `[tuning]` table
/// that omits `scale_name` has none, so `mode = "note"` plus
/// `target_note_hz` is enough to select note mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    #[serde(default)]
    pub mode: TuningMode,
    /// Scale name such as `"C major"` or `"D dorian"`.
    #[serde(default)]
    pub scale_name: Option<String>,
    /// Fixed target frequency in Hz.
    #[serde(default)]
    pub target_note_hz: Option<f32>,
    /// Reference pitch of A4 in Hz.
    #[serde(default = "default_a4_hz")]
    pub a4_hz: f32,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            mode: TuningMode::Scale,
            scale_name: Some("C major".into()),
            target_note_hz: None,
            a4_hz: DEFAULT_A4_HZ,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineSettings
// ---------------------------------------------------------------------------

/// Queueing and diagnostics settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Blocks the capture queue holds before the oldest is dropped.
    pub capture_queue_blocks: usize,
    /// Blocks the playback queue holds before new ones are dropped.
    pub playback_queue_blocks: usize,
    /// Worker queue wait in milliseconds.
    pub worker_poll_ms: u64,
    /// Seconds between stats log lines; 0 disables them.
    pub stats_interval_secs: u64,
    /// Forward audio uncorrected (loopback test).
    pub bypass: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            capture_queue_blocks: 4,
            playback_queue_blocks: 4,
            worker_poll_ms: 100,
            stats_interval_secs: 5,
            bypass: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// `<platform config dir>/live-autotune/settings.toml`, or relative to the
/// working directory when the platform has no config dir.
pub fn settings_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("live-autotune")
        .join("settings.toml")
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use live_autotune::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub tuning: TuningConfig,
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&settings_file())
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&settings_file())
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The pipeline configuration these settings describe.  Not validated
    /// here; [`crate::pipeline::Pipeline::configure`] does that.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            sample_rate: self.audio.sample_rate,
            block_size: self.audio.block_size,
            mode: self.tuning.mode,
            scale_name: self.tuning.scale_name.clone(),
            target_note_hz: self.tuning.target_note_hz,
            a4_hz: self.tuning.a4_hz,
            input_channels: self.audio.input_channels,
            output_channels: self.audio.output_channels,
            input_device: self.audio.input_device.clone(),
            output_device: self.audio.output_device.clone(),
            capture_queue_blocks: self.pipeline.capture_queue_blocks,
            playback_queue_blocks: self.pipeline.playback_queue_blocks,
            worker_poll: Duration::from_millis(self.pipeline.worker_poll_ms),
            bypass: self.pipeline.bypass,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original, loaded);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.audio.sample_rate, 44_100);
        assert_eq!(cfg.audio.block_size, 4096);
        assert_eq!(cfg.audio.input_channels, 1);
        assert_eq!(cfg.tuning.mode, TuningMode::Scale);
        assert_eq!(cfg.tuning.scale_name.as_deref(), Some("C major"));
        assert!(cfg.tuning.target_note_hz.is_none());
        assert_eq!(cfg.tuning.a4_hz, 442.0);
        assert_eq!(cfg.pipeline.capture_queue_blocks, 4);
        assert_eq!(cfg.pipeline.worker_poll_ms, 100);
        assert!(!cfg.pipeline.bypass);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.audio.sample_rate = 48_000;
        cfg.audio.block_size = 2048;
        cfg.audio.input_device = Some("USB Mic".into());
        cfg.tuning.mode = TuningMode::Note;
        cfg.tuning.scale_name = None;
        cfg.tuning.target_note_hz = Some(440.0);
        cfg.pipeline.bypass = true;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_selects_note_mode() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [tuning]
            mode = "note"
            target_note_hz = 440.0
            "#,
        )
        .expect("parse");

        assert_eq!(cfg.audio, AudioConfig::default());
        assert_eq!(cfg.tuning.mode, TuningMode::Note);
        assert!(cfg.tuning.scale_name.is_none());
        assert_eq!(cfg.tuning.a4_hz, DEFAULT_A4_HZ);
    }

    #[test]
    fn pipeline_config_carries_every_field() {
        let mut cfg = AppConfig::default();
        cfg.audio.output_channels = 2;
        cfg.pipeline.worker_poll_ms = 25;
        cfg.pipeline.playback_queue_blocks = 6;

        let pc = cfg.pipeline_config();
        assert_eq!(pc.sample_rate, 44_100);
        assert_eq!(pc.block_size, 4096);
        assert_eq!(pc.output_channels, 2);
        assert_eq!(pc.playback_queue_blocks, 6);
        assert_eq!(pc.worker_poll, Duration::from_millis(25));
        assert_eq!(pc.scale_name.as_deref(), Some("C major"));
        assert_eq!(pc.a4_hz, DEFAULT_A4_HZ);
        assert!(!pc.bypass);
    }

    #[test]
    fn settings_file_lives_in_app_dir() {
        let path = settings_file();
        assert!(path.ends_with("live-autotune/settings.toml"));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[audio\nsample_rate = ").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }
}
