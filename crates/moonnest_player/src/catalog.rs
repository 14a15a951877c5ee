//! 声音目录
//!
//! 固定的 id -> 资源 -> 显示名 映射表，构建时确定。

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 资源文件扩展名
pub const RESOURCE_EXTENSION: &str = "mp3";

/// 声音标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SoundId(String);

impl SoundId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SoundId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SoundId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// 目录条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoundEntry {
    pub id: SoundId,
    pub resource_ref: String,
    pub display_name: String,
}

impl SoundEntry {
    pub fn new(id: &str, resource_ref: &str, display_name: &str) -> Self {
        Self {
            id: SoundId::new(id),
            resource_ref: resource_ref.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

/// 声音目录（有序）
#[derive(Debug, Clone)]
pub struct SoundCatalog {
    entries: Vec<SoundEntry>,
}

impl Default for SoundCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SoundCatalog {
    pub fn new(entries: Vec<SoundEntry>) -> Self {
        Self { entries }
    }

    /// 应用内置的声音列表
    pub fn builtin() -> Self {
        Self::new(vec![
            SoundEntry::new("rain", "rain", "Rain"),
            SoundEntry::new("white_noise", "white_noise", "White Noise"),
            SoundEntry::new("heartbeat", "heartbeat", "Heartbeat"),
            SoundEntry::new("ocean_waves", "ocean_waves", "Ocean Waves"),
            SoundEntry::new("car_ride", "car_ride", "Car Ride"),
            SoundEntry::new("washing_machine", "washing_machine", "Washing Machine"),
            SoundEntry::new("fireplace", "fireplace", "Fireplace"),
            SoundEntry::new("wind", "wind", "Wind"),
            SoundEntry::new("lullaby", "lullaby", "Lullaby"),
            SoundEntry::new("birds_chirping", "birds_chirping", "Birds Chirping"),
        ])
    }

    pub fn entries(&self) -> &[SoundEntry] {
        &self.entries
    }

    pub fn get(&self, id: &SoundId) -> Option<&SoundEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    pub fn contains(&self, id: &SoundId) -> bool {
        self.get(id).is_some()
    }

    /// 显示名，未知 id 直接返回 id 本身
    pub fn display_name(&self, id: &SoundId) -> String {
        self.get(id)
            .map(|e| e.display_name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

/// 将资源引用解析为资源目录下的文件路径
pub fn resource_path(resource_dir: &Path, resource_ref: &str) -> PathBuf {
    resource_dir.join(format!("{resource_ref}.{RESOURCE_EXTENSION}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order_and_lookup() {
        let catalog = SoundCatalog::builtin();
        assert_eq!(catalog.entries().len(), 10);
        assert_eq!(catalog.entries()[0].id.as_str(), "rain");

        let birds = catalog.get(&"birds_chirping".into()).unwrap();
        assert_eq!(birds.resource_ref, "birds_chirping");
        assert_eq!(birds.display_name, "Birds Chirping");
    }

    #[test]
    fn test_resources_resolve_to_id_named_mp3() {
        let catalog = SoundCatalog::builtin();
        for entry in catalog.entries() {
            assert_eq!(
                resource_path(Path::new("sounds"), &entry.resource_ref),
                Path::new("sounds").join(format!("{}.mp3", entry.id))
            );
        }
    }

    #[test]
    fn test_display_name_fallback() {
        let catalog = SoundCatalog::builtin();
        assert_eq!(catalog.display_name(&"white_noise".into()), "White Noise");
        assert_eq!(catalog.display_name(&"mystery".into()), "mystery");
        assert!(!catalog.contains(&"mystery".into()));
    }

    #[test]
    fn test_resource_path() {
        let path = resource_path(Path::new("/sounds"), "rain");
        assert_eq!(path, PathBuf::from("/sounds/rain.mp3"));
    }
}
