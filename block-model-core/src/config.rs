/// Pipeline configuration, loaded from an optional JSON file.
use constants::limits::{
    CACHE_FRESHNESS_MS, CACHE_MAX_PAYLOAD_BYTES, CACHE_RETENTION_MS, CHUNK_SIZE,
    EXPORT_COMPRESSION_LEVEL, EXPORT_MAX_TEXT_BYTES, GALLERY_CAP, GALLERY_NAME_MAX_LEN,
    LARGE_MODEL_THRESHOLD, SYNC_GENERATION_LIMIT,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
    pub gallery: GalleryConfig,
    pub export: ExportConfig,
    pub storage: StorageConfig,
}

impl PipelineConfig {
    /// Reads `path` if it exists, otherwise returns defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Cells per cooperative step for chunked generations.
    pub chunk_size: usize,
    /// Grids larger than this are chunked. Values above `SYNC_GENERATION_LIMIT`
    /// are capped to it.
    pub sync_threshold: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            sync_threshold: SYNC_GENERATION_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub min_cells: u64,
    pub max_payload_bytes: usize,
    pub freshness_ms: i64,
    pub retention_ms: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_cells: LARGE_MODEL_THRESHOLD,
            max_payload_bytes: CACHE_MAX_PAYLOAD_BYTES,
            freshness_ms: CACHE_FRESHNESS_MS,
            retention_ms: CACHE_RETENTION_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    pub cap: usize,
    pub name_max_len: usize,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            cap: GALLERY_CAP,
            name_max_len: GALLERY_NAME_MAX_LEN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub max_text_bytes: usize,
    pub compression_level: i64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_text_bytes: EXPORT_MAX_TEXT_BYTES,
            compression_level: EXPORT_COMPRESSION_LEVEL,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the file-backed store.
    pub dir: PathBuf,
    /// Total bytes the store may hold. `None` means unbounded.
    pub quota_bytes: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".block-model"),
            quota_bytes: Some(64 * 1024 * 1024),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"scheduler":{"chunk_size":2500},"gallery":{"cap":10}}"#)
                .unwrap();
        assert_eq!(config.scheduler.chunk_size, 2500);
        assert_eq!(config.scheduler.sync_threshold, SYNC_GENERATION_LIMIT);
        assert_eq!(config.gallery.cap, 10);
        assert_eq!(config.gallery.name_max_len, GALLERY_NAME_MAX_LEN);
        assert_eq!(config.cache.min_cells, LARGE_MODEL_THRESHOLD);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.export.max_text_bytes, EXPORT_MAX_TEXT_BYTES);
    }
}
