use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::sensing::{SamplingConfig, DEFAULT_FALLBACK_PRESENCE_PROBABILITY};

/// Device-local engine configuration. Parent study/break settings live in
/// the store, not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub camera_enabled: bool,
    pub fallback_presence_probability: f64,
    pub countdown_cues_enabled: bool,
    pub sample_timeout_ms: u64,
    pub camera_ready_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            camera_enabled: true,
            fallback_presence_probability: DEFAULT_FALLBACK_PRESENCE_PROBABILITY,
            countdown_cues_enabled: true,
            sample_timeout_ms: 800,
            camera_ready_timeout_secs: 10,
        }
    }
}

impl EngineSettings {
    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            sample_timeout: Duration::from_millis(self.sample_timeout_ms.max(1)),
            ready_timeout: Duration::from_secs(self.camera_ready_timeout_secs.max(1)),
            ..SamplingConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct UserSettings {
    #[serde(default)]
    engine: EngineSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("ignoring malformed settings in {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn engine(&self) -> EngineSettings {
        match self.data.read() {
            Ok(guard) => guard.engine.clone(),
            Err(poisoned) => poisoned.into_inner().engine.clone(),
        }
    }

    pub fn update_engine(&self, settings: EngineSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.engine = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

/// `FOCUSGUARD_DEBUG=1` makes the controller emit a heartbeat every tick.
pub fn debug_mode() -> bool {
    std::env::var("FOCUSGUARD_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.engine(), EngineSettings::default());
    }

    #[test]
    fn updates_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.engine();
        settings.camera_enabled = false;
        settings.fallback_presence_probability = 0.6;
        store.update_engine(settings.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.engine(), settings);
    }

    #[test]
    fn partial_and_malformed_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        fs::write(&path, r#"{"engine":{"camera_enabled":false}}"#).unwrap();
        let partial = SettingsStore::new(path.clone()).unwrap().engine();
        assert!(!partial.camera_enabled);
        assert!(partial.countdown_cues_enabled);

        fs::write(&path, "not json").unwrap();
        assert_eq!(
            SettingsStore::new(path).unwrap().engine(),
            EngineSettings::default()
        );
    }

    #[test]
    fn sampling_config_uses_configured_timeouts() {
        let settings = EngineSettings {
            sample_timeout_ms: 250,
            camera_ready_timeout_secs: 4,
            ..EngineSettings::default()
        };
        let sampling = settings.sampling();
        assert_eq!(sampling.sample_timeout, Duration::from_millis(250));
        assert_eq!(sampling.ready_timeout, Duration::from_secs(4));
        assert_eq!(sampling.interval, Duration::from_secs(1));
    }
}
