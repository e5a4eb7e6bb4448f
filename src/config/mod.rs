//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), one sub-config per section,
//! and TOML persistence via `AppConfig::load` / `AppConfig::save` at the
//! platform path returned by [`settings_file`].

pub mod settings;

pub use settings::{settings_file, AppConfig, AudioConfig, PipelineSettings, TuningConfig};
