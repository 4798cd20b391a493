use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    /// When false, the obfuscator passes strings through unchanged (the
    /// string table file is still created).
    pub obfuscate_urls: bool,
    /// Percentage of eligible moments at which a question is actually asked.
    pub question_sampling_percentage: u8,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            obfuscate_urls: true,
            question_sampling_percentage: 25,
        }
    }
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
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> UserSettings {
        self.data.read().unwrap().clone()
    }

    pub fn update(&self, settings: UserSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            *guard = settings;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let settings = store.get();
        assert!(settings.obfuscate_urls);
        assert_eq!(settings.question_sampling_percentage, 25);
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        store
            .update(UserSettings {
                obfuscate_urls: false,
                question_sampling_percentage: 100,
            })
            .unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert!(!reloaded.get().obfuscate_urls);
        assert_eq!(reloaded.get().question_sampling_percentage, 100);
    }
}
