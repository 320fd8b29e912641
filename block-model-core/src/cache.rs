/// Content-keyed persistent cache for materialized block models.
use crate::block::Block;
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::{NotCachedReason, StorageError};
use crate::params::GridParameters;
use crate::pattern::ReproducibilitySeed;
use crate::storage::KeyValueStore;
use constants::coordinate_system::COORDINATE_CONVENTION_VERSION;
use constants::storage_keys::{CACHE_PREFIX, CONVENTION_KEY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stored payload: `{ blocks, timestamp }` with the timestamp in epoch millis.
/// Seeded patterns also record the seed that produced the blocks.
#[derive(Deserialize)]
struct CacheEntry {
    blocks: Vec<Block>,
    timestamp: i64,
    #[serde(default)]
    seed: Option<ReproducibilitySeed>,
}

#[derive(Serialize)]
struct CacheEntryRef<'a> {
    blocks: &'a [Block],
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<&'a ReproducibilitySeed>,
}

/// A fresh cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedModel {
    pub blocks: Vec<Block>,
    pub seed: Option<ReproducibilitySeed>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheWrite {
    Stored { bytes: usize },
    /// Model is below the caching threshold; nothing was attempted.
    Skipped,
    NotCached(NotCachedReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub corrupt: usize,
    pub kept: usize,
}

pub struct CacheStore {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// `origin.x_origin.y_origin.z_size.x_size.y_size.z_count.x_count.y_count.z_pattern`
    /// under the cache namespace. Field-for-field equal parameters give equal keys.
    pub fn key_for(params: &GridParameters) -> String {
        let o = params.origin();
        let s = params.cell_size();
        let c = params.counts();
        format!(
            "{}{}_{}_{}_{}_{}_{}_{}_{}_{}_{}",
            CACHE_PREFIX,
            o.x,
            o.y,
            o.z,
            s.x,
            s.y,
            s.z,
            c.x,
            c.y,
            c.z,
            params.pattern()
        )
    }

    pub fn should_cache(&self, params: &GridParameters) -> bool {
        params.total_cells() >= self.config.min_cells
    }

    /// Returns a fresh entry for `params`. Stale or unreadable entries are
    /// removed and reported as a miss.
    pub fn read(
        &self,
        store: &mut dyn KeyValueStore,
        params: &GridParameters,
    ) -> Option<CachedModel> {
        if !self.should_cache(params) {
            return None;
        }

        let key = Self::key_for(params);
        let raw = match store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Dropping corrupt cache entry {}: {}", key, e);
                self.remove_quietly(store, &key);
                return None;
            }
        };

        let age = self.clock.now_ms() - entry.timestamp;
        if age > self.config.freshness_ms {
            log::debug!("Cache entry {} is stale ({} ms old)", key, age);
            self.remove_quietly(store, &key);
            return None;
        }

        log::info!("Cache hit: {} blocks for {}", entry.blocks.len(), key);
        Some(CachedModel {
            blocks: entry.blocks,
            seed: entry.seed,
        })
    }

    /// Persists `blocks` for `params`. Never fails: every problem degrades to
    /// `CacheWrite::NotCached`.
    pub fn write(
        &self,
        store: &mut dyn KeyValueStore,
        params: &GridParameters,
        blocks: &[Block],
        seed: Option<&ReproducibilitySeed>,
    ) -> CacheWrite {
        if !self.should_cache(params) {
            return CacheWrite::Skipped;
        }

        let key = Self::key_for(params);
        let payload = match serde_json::to_string(&CacheEntryRef {
            blocks,
            timestamp: self.clock.now_ms(),
            seed,
        }) {
            Ok(payload) => payload,
            Err(e) => return CacheWrite::NotCached(NotCachedReason::Backend(e.to_string())),
        };

        if payload.len() > self.config.max_payload_bytes {
            log::info!(
                "Not caching {}: {} bytes exceeds the {} byte budget",
                key,
                payload.len(),
                self.config.max_payload_bytes
            );
            return CacheWrite::NotCached(NotCachedReason::OverBudget {
                bytes: payload.len(),
                max: self.config.max_payload_bytes,
            });
        }

        match store.set(&key, &payload) {
            Ok(()) => {}
            Err(e) if e.is_quota() => {
                log::warn!("Cache quota exceeded, sweeping before retry");
                self.sweep(store);
                if let Err(e) = store.set(&key, &payload) {
                    log::warn!("Cache write for {} failed after sweep: {}", key, e);
                    return CacheWrite::NotCached(if e.is_quota() {
                        NotCachedReason::QuotaExhausted
                    } else {
                        NotCachedReason::Backend(e.to_string())
                    });
                }
            }
            Err(e) => {
                log::warn!("Cache write for {} failed: {}", key, e);
                return CacheWrite::NotCached(NotCachedReason::Backend(e.to_string()));
            }
        }

        log::debug!("Cached {} blocks under {} ({} bytes)", blocks.len(), key, payload.len());
        CacheWrite::Stored {
            bytes: payload.len(),
        }
    }

    /// Removes entries past the retention window and any that fail to parse.
    pub fn sweep(&self, store: &mut dyn KeyValueStore) -> SweepReport {
        let mut report = SweepReport::default();
        let keys = match store.keys_with_prefix(CACHE_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("Cache sweep could not list entries: {}", e);
                return report;
            }
        };

        let now = self.clock.now_ms();
        for key in keys {
            let timestamp = store
                .get(&key)
                .ok()
                .flatten()
                .and_then(|raw| serde_json::from_str::<CacheEntry>(&raw).ok())
                .map(|entry| entry.timestamp);

            match timestamp {
                Some(timestamp) if now - timestamp > self.config.retention_ms => {
                    report.expired += 1;
                    self.remove_quietly(store, &key);
                }
                Some(_) => report.kept += 1,
                None => {
                    report.corrupt += 1;
                    self.remove_quietly(store, &key);
                }
            }
        }

        if report.expired + report.corrupt > 0 {
            log::info!(
                "Cache sweep removed {} expired and {} corrupt entries",
                report.expired,
                report.corrupt
            );
        }
        report
    }

    /// Drops every cache entry. Returns how many were removed.
    pub fn clear_all(&self, store: &mut dyn KeyValueStore) -> Result<usize, StorageError> {
        let keys = store.keys_with_prefix(CACHE_PREFIX)?;
        for key in &keys {
            store.remove(key)?;
        }
        log::info!("Cleared {} cache entries", keys.len());
        Ok(keys.len())
    }

    /// Clears the cache once if it was written under another coordinate
    /// convention, then records the current one. Returns whether it cleared.
    pub fn migrate_convention(&self, store: &mut dyn KeyValueStore) -> Result<bool, StorageError> {
        let current = COORDINATE_CONVENTION_VERSION.to_string();
        if store.get(CONVENTION_KEY)?.as_deref() == Some(current.as_str()) {
            return Ok(false);
        }

        log::info!("Coordinate convention changed, invalidating cached models");
        self.clear_all(store)?;
        store.set(CONVENTION_KEY, &current)?;
        Ok(true)
    }

    fn remove_quietly(&self, store: &mut dyn KeyValueStore, key: &str) {
        if let Err(e) = store.remove(key) {
            log::warn!("Failed to remove cache entry {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::grid::CoordinateGridBuilder;
    use crate::params::{CellCounts, PatternId, Vec3};
    use crate::storage::MemoryStore;
    use constants::limits::{CACHE_FRESHNESS_MS, CACHE_RETENTION_MS};

    const T0: i64 = 1_700_000_000_000;

    fn params(counts: CellCounts) -> GridParameters {
        GridParameters::new(
            Vec3::new(0.0, -2.5, 10.0),
            Vec3::new(1.0, 1.0, 0.5),
            counts,
            PatternId::parse("porphyry"),
        )
        .unwrap()
    }

    fn cache(clock: &Arc<ManualClock>) -> CacheStore {
        CacheStore::new(CacheConfig::default(), clock.clone())
    }

    #[test]
    fn key_is_underscore_joined_fields() {
        assert_eq!(
            CacheStore::key_for(&params(CellCounts::new(10, 20, 30))),
            "blockModelCache_0_-2.5_10_1_1_0.5_10_20_30_porphyry"
        );
    }

    #[test]
    fn caching_threshold() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache(&clock);
        assert!(cache.should_cache(&params(CellCounts::new(60, 100, 10))));
        assert!(!cache.should_cache(&params(CellCounts::new(40, 100, 10))));

        let mut store = MemoryStore::new();
        let small = params(CellCounts::new(40, 100, 10));
        assert_eq!(cache.write(&mut store, &small, &[], None), CacheWrite::Skipped);
        assert!(store.is_empty());
    }

    #[test]
    fn round_trip_within_freshness_window() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache(&clock);
        let mut store = MemoryStore::new();
        let p = params(CellCounts::new(50, 50, 20));
        let blocks = CoordinateGridBuilder::new(&p).build();

        assert!(matches!(cache.write(&mut store, &p, &blocks, None), CacheWrite::Stored { .. }));
        clock.advance(CACHE_FRESHNESS_MS);
        assert_eq!(
            cache.read(&mut store, &p),
            Some(CachedModel { blocks, seed: None })
        );
    }

    #[test]
    fn stale_entries_miss_and_are_removed() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache(&clock);
        let mut store = MemoryStore::new();
        let p = params(CellCounts::new(50, 50, 20));
        cache.write(&mut store, &p, &CoordinateGridBuilder::new(&p).build(), None);

        clock.advance(CACHE_FRESHNESS_MS + 1);
        assert_eq!(cache.read(&mut store, &p), None);
        assert!(store.is_empty());
    }

    #[test]
    fn over_budget_payload_is_not_cached() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = CacheStore::new(
            CacheConfig {
                max_payload_bytes: 1024,
                ..CacheConfig::default()
            },
            clock,
        );
        let mut store = MemoryStore::new();
        let p = params(CellCounts::new(50, 50, 20));
        let outcome = cache.write(&mut store, &p, &CoordinateGridBuilder::new(&p).build(), None);
        assert!(matches!(
            outcome,
            CacheWrite::NotCached(NotCachedReason::OverBudget { max: 1024, .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_removes_expired_and_corrupt() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache(&clock);
        let mut store = MemoryStore::new();

        let old = params(CellCounts::new(50, 50, 20));
        cache.write(&mut store, &old, &[], None);
        clock.advance(CACHE_RETENTION_MS);
        let recent = params(CellCounts::new(50, 50, 21));
        cache.write(&mut store, &recent, &[], None);
        store.set("blockModelCache_garbage", "{not json").unwrap();
        store.set("blockModelStats", "{not json either").unwrap();

        clock.advance(1);
        let report = cache.sweep(&mut store);
        assert_eq!(
            report,
            SweepReport {
                expired: 1,
                corrupt: 1,
                kept: 1
            }
        );
        assert_eq!(
            store.keys_with_prefix(CACHE_PREFIX).unwrap(),
            vec![CacheStore::key_for(&recent)]
        );
        assert!(store.get("blockModelStats").unwrap().is_some());
    }

    #[test]
    fn quota_exhaustion_sweeps_then_retries_once() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache(&clock);
        let mut store = MemoryStore::new();

        let old = params(CellCounts::new(50, 50, 20));
        let p = params(CellCounts::new(50, 50, 21));
        let blocks = CoordinateGridBuilder::new(&p).build()[..10].to_vec();
        cache.write(&mut store, &old, &blocks, None);
        clock.advance(CACHE_RETENTION_MS + 1);

        // Room for one entry only: the write must evict the expired one.
        store.set_quota(Some(store.used_bytes() + 64));
        assert!(matches!(cache.write(&mut store, &p, &blocks, None), CacheWrite::Stored { .. }));
        assert_eq!(
            store.keys_with_prefix(CACHE_PREFIX).unwrap(),
            vec![CacheStore::key_for(&p)]
        );

        // Nothing left to evict: the retry also fails and degrades.
        let bigger = CoordinateGridBuilder::new(&p).build()[..100].to_vec();
        let other = params(CellCounts::new(50, 50, 22));
        assert_eq!(
            cache.write(&mut store, &other, &bigger, None),
            CacheWrite::NotCached(NotCachedReason::QuotaExhausted)
        );
    }

    #[test]
    fn convention_migration_runs_once() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = cache(&clock);
        let mut store = MemoryStore::new();
        let p = params(CellCounts::new(50, 50, 20));
        cache.write(&mut store, &p, &[], None);

        assert!(cache.migrate_convention(&mut store).unwrap());
        assert!(store.keys_with_prefix(CACHE_PREFIX).unwrap().is_empty());

        cache.write(&mut store, &p, &[], None);
        assert!(!cache.migrate_convention(&mut store).unwrap());
        assert_eq!(store.keys_with_prefix(CACHE_PREFIX).unwrap().len(), 1);
    }
}
