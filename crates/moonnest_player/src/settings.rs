//! 设置存储
//!
//! 只持久化一个值：默认音量（百分比）。

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::SettingsError;

/// 首次启动的默认音量百分比
pub const DEFAULT_VOLUME_PERCENT: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_volume: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_volume: DEFAULT_VOLUME_PERCENT,
        }
    }
}

impl Settings {
    /// 默认音量 (0.0 - 1.0)
    pub fn volume(&self) -> f32 {
        f32::from(self.default_volume.min(100)) / 100.0
    }
}

pub trait SettingsStore: Send {
    fn load(&self) -> Result<Settings, SettingsError>;
    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// JSON 文件存储
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            // 首次启动
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(e.into()),
        };

        let mut settings: Settings = serde_json::from_str(&text)?;
        settings.default_volume = settings.default_volume.min(100);
        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// 内存存储（不持久化）
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    inner: Arc<Mutex<Settings>>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(settings)),
        }
    }

    pub fn current(&self) -> Settings {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self.current())
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = *settings;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("settings.json"));

        let settings = store.load().unwrap();
        assert_eq!(settings.default_volume, 20);
        assert!((settings.volume() - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("nested/settings.json"));

        store.save(&Settings { default_volume: 65 }).unwrap();
        assert_eq!(store.load().unwrap().default_volume, 65);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"default_volume": 250}"#).unwrap();

        let settings = JsonSettingsStore::new(&path).load().unwrap();
        assert_eq!(settings.default_volume, 100);
    }

    #[test]
    fn test_corrupt_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        let result = JsonSettingsStore::new(&path).load();
        assert!(matches!(result, Err(SettingsError::Json(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySettingsStore::default();
        store.save(&Settings { default_volume: 0 }).unwrap();
        assert_eq!(store.load().unwrap().volume(), 0.0);
    }
}
