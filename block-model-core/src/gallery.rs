/// Bounded, newest-first collection of saved model configurations.
use crate::block::Block;
use crate::clock::Clock;
use crate::config::GalleryConfig;
use crate::error::{Notice, StorageError, ValidationError};
use crate::params::GridParameters;
use crate::pattern::ReproducibilitySeed;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use constants::limits::{GALLERY_QUOTA_RETRY_DENOMINATOR, GALLERY_QUOTA_RETRY_NUMERATOR};
use constants::pattern::get_pattern_name;
use constants::storage_keys::GALLERY_KEY;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Opaque viewer state (camera, filters, ...). Owned and interpreted by the
/// viewer; the gallery only stores it.
pub type ViewerSnapshot = serde_json::Value;

/// Scalar summary shown next to a saved model. Never the block array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub block_count: u64,
    pub solid_blocks: u64,
    pub volume: f64,
    pub pattern_name: String,
}

impl ModelSummary {
    pub fn of(params: &GridParameters, blocks: &[Block]) -> Self {
        let solid_blocks = blocks.iter().filter(|b| !b.is_air()).count() as u64;
        Self {
            block_count: blocks.len() as u64,
            solid_blocks,
            volume: params.cell_volume() * blocks.len() as f64,
            pattern_name: get_pattern_name(params.pattern().as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryModel {
    pub id: Uuid,
    pub name: String,
    pub date: DateTime<Utc>,
    pub params: GridParameters,
    pub stats: ModelSummary,
    #[serde(
        rename = "visualizationState",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub viewer_state: Option<ViewerSnapshot>,
    #[serde(rename = "randomSeed", default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<ReproducibilitySeed>,
}

#[derive(Debug)]
pub struct GallerySave {
    pub model: GalleryModel,
    /// Set when the gallery could not be written in full.
    pub notice: Option<Notice>,
}

pub struct GalleryStore {
    config: GalleryConfig,
    clock: Arc<dyn Clock>,
}

impl GalleryStore {
    pub fn new(config: GalleryConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Saved models, newest first. An unreadable gallery reads as empty.
    pub fn list(&self, store: &dyn KeyValueStore) -> Vec<GalleryModel> {
        let raw = match store.get(GALLERY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log::warn!("Could not read gallery: {}", e);
                return Vec::new();
            }
        };

        let entries: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap_or_else(|e| {
            log::warn!("Discarding unreadable gallery: {}", e);
            Vec::new()
        });

        // A bad entry is skipped on its own so the rest of the gallery survives.
        let mut models: Vec<GalleryModel> = entries
            .into_iter()
            .enumerate()
            .filter_map(|(n, entry)| match serde_json::from_value(entry) {
                Ok(model) => Some(model),
                Err(e) => {
                    log::warn!("Skipping unreadable gallery entry {}: {}", n, e);
                    None
                }
            })
            .collect();
        models.sort_by(|a, b| b.date.cmp(&a.date));
        models
    }

    pub fn save(
        &self,
        store: &mut dyn KeyValueStore,
        name: &str,
        params: &GridParameters,
        stats: ModelSummary,
        viewer_state: Option<ViewerSnapshot>,
        seed: Option<ReproducibilitySeed>,
    ) -> Result<GallerySave, ValidationError> {
        let name = self.validate_name(name)?;

        let model = GalleryModel {
            id: Uuid::new_v4(),
            name,
            date: self.clock.now(),
            params: *params,
            stats,
            viewer_state,
            seed: seed.map(|s| ReproducibilitySeed {
                from_gallery: false,
                ..s
            }),
        };

        let mut models = self.list(store);
        models.insert(0, model.clone());
        let notice = self.persist(store, models);

        log::info!("Saved '{}' to gallery as {}", model.name, model.id);
        Ok(GallerySave { model, notice })
    }

    pub fn load(&self, store: &dyn KeyValueStore, id: Uuid) -> Option<GalleryModel> {
        self.list(store).into_iter().find(|m| m.id == id)
    }

    /// Removes `id`. Unknown ids are ignored.
    pub fn delete(&self, store: &mut dyn KeyValueStore, id: Uuid) -> Option<Notice> {
        let mut models = self.list(store);
        let before = models.len();
        models.retain(|m| m.id != id);
        if models.len() == before {
            return None;
        }
        self.persist(store, models)
    }

    fn validate_name(&self, name: &str) -> Result<String, ValidationError> {
        let name = name.trim();
        let len = name.chars().count();
        if len == 0 {
            return Err(ValidationError::EmptyName);
        }
        if len > self.config.name_max_len {
            return Err(ValidationError::NameTooLong {
                len,
                max: self.config.name_max_len,
            });
        }
        Ok(name.to_string())
    }

    /// Sorts newest first and keeps at most `cap` entries. On quota exhaustion
    /// retries once with 80% of the cap.
    fn persist(&self, store: &mut dyn KeyValueStore, mut models: Vec<GalleryModel>) -> Option<Notice> {
        models.sort_by(|a, b| b.date.cmp(&a.date));
        models.truncate(self.config.cap);

        match write_models(store, &models) {
            Ok(()) => return None,
            Err(e) if e.is_quota() => {
                let reduced = self.config.cap * GALLERY_QUOTA_RETRY_NUMERATOR
                    / GALLERY_QUOTA_RETRY_DENOMINATOR;
                log::warn!("Gallery quota exceeded, retrying with {} entries", reduced);
                models.truncate(reduced);
                if write_models(store, &models).is_ok() {
                    return None;
                }
            }
            Err(e) => log::warn!("Gallery write failed: {}", e),
        }

        log::warn!("Gallery could not be saved, storage exhausted");
        Some(Notice::StorageExhausted { what: "gallery" })
    }
}

fn write_models(store: &mut dyn KeyValueStore, models: &[GalleryModel]) -> Result<(), StorageError> {
    let json = serde_json::to_string(models)?;
    store.set(GALLERY_KEY, &json)
}
