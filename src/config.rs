//! Persistent application configuration
//!
//! Stores tone defaults, device selection, output locations, and engine
//! tuning in a JSON file at `<data_dir>/tonecap/config.json`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tonecap_core::{EngineConfig, WaveformKind};

fn default_sample_rate() -> u32 {
    tonecap_core::DEFAULT_SAMPLE_RATE
}

fn default_amplitude() -> f32 {
    tonecap_core::DEFAULT_AMPLITUDE
}

fn default_recordings_dir() -> PathBuf {
    PathBuf::from("recordings")
}

fn default_journal_file() -> PathBuf {
    PathBuf::from("recordings").join("sessions.jsonl")
}

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Sample rate in Hz for both directions
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Tone amplitude in `[0, 1]`
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
    /// Default waveform
    #[serde(default)]
    pub waveform: WaveformKind,
    /// Where captures are written
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: PathBuf,
    /// JSON-lines session journal
    #[serde(default = "default_journal_file")]
    pub journal_file: PathBuf,
    /// Input device name (None = host default)
    #[serde(default)]
    pub input_device: Option<String>,
    /// Output device name (None = host default)
    #[serde(default)]
    pub output_device: Option<String>,
    /// Session tuning
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            amplitude: default_amplitude(),
            waveform: WaveformKind::default(),
            recordings_dir: default_recordings_dir(),
            journal_file: default_journal_file(),
            input_device: None,
            output_device: None,
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Config file path: `<data_dir>/tonecap/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tonecap")
            .join("config.json")
    }

    /// Load config from the default path
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to parse config, using defaults"
                    );
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }
}
