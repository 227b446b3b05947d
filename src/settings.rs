use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Returns the path to the settings file: `~/.config/songsketch/settings.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("songsketch");
    path.push("settings.json");
    path
}

/// Metronome timing and click sound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeSettings {
    pub default_bpm: u32,
    /// How far ahead of the audio clock beats are queued
    pub schedule_ahead_secs: f64,
    /// How often the scheduler wakes up
    pub poll_interval_ms: u64,
    pub click_gain: f32,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            default_bpm: 120,
            schedule_ahead_secs: 0.1,
            poll_interval_ms: 25,
            click_gain: 0.3,
        }
    }
}

/// Tuner analysis parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchSettings {
    /// FFT length in samples
    pub window_size: usize,
    /// Weight of the previous spectrum in the running average
    pub smoothing: f32,
    /// Peaks quieter than this are ignored
    pub min_db: f32,
    pub min_hz: f32,
    pub max_hz: f32,
    pub frame_interval_ms: u64,
}

impl Default for PitchSettings {
    fn default() -> Self {
        Self {
            window_size: 2048,
            smoothing: 0.8,
            min_db: -50.0,
            min_hz: 80.0,
            max_hz: 1000.0,
            frame_interval_ms: 16,
        }
    }
}

/// Recorder chunking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// Interval between data-available chunks
    pub timeslice_ms: u64,
    /// Capture buffered between chunks before samples are dropped
    pub buffer_secs: u32,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            timeslice_ms: 100,
            buffer_secs: 2,
        }
    }
}

/// Persisted audio settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Input device name; the host default when unset
    pub input_device: Option<String>,
    pub metronome: MetronomeSettings,
    pub pitch: PitchSettings,
    pub recorder: RecorderSettings,
}

impl AudioSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        self.save_to(&settings_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = AudioSettings::default();
        settings.metronome.default_bpm = 96;
        settings.input_device = Some("USB Mic".into());
        settings.save_to(&path);

        assert_eq!(AudioSettings::load_from(&path), settings);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "metronome": { "default_bpm": 72 } }"#).unwrap();

        let settings = AudioSettings::load_from(&path);
        assert_eq!(settings.metronome.default_bpm, 72);
        assert_eq!(settings.metronome.poll_interval_ms, 25);
        assert_eq!(settings.pitch, PitchSettings::default());
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        assert_eq!(AudioSettings::load_from(&path), AudioSettings::default());
    }
}
