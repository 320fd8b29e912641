/// Usage statistics, persisted after every change.
use crate::clock::Clock;
use crate::error::Notice;
use crate::params::GridParameters;
use crate::storage::KeyValueStore;
use constants::storage_keys::STATS_KEY;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsRecord {
    pub total_models: u64,
    pub total_exports: u64,
    /// Epoch millis of the first and most recent generation.
    pub first_generation: Option<i64>,
    pub last_generation: Option<i64>,
    pub pattern_usage: BTreeMap<String, u64>,
    pub view_modes: BTreeSet<String>,
    pub tools_used: BTreeSet<String>,
    pub largest_model: u64,
    pub average_model_size: f64,
    /// Cumulative generated volume in cubic metres.
    pub total_volume: f64,
}

impl StatsRecord {
    /// Most used pattern, ties broken by name.
    pub fn favourite_pattern(&self) -> Option<(&str, u64)> {
        self.pattern_usage
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, count)| (name.as_str(), *count))
    }
}

pub struct StatisticsTracker {
    record: StatsRecord,
    /// Models generated since this tracker was loaded. Not persisted.
    session_models: u64,
    clock: Arc<dyn Clock>,
}

impl StatisticsTracker {
    /// Loads the stored record, starting from zero when it is absent or
    /// unreadable.
    pub fn load(store: &dyn KeyValueStore, clock: Arc<dyn Clock>) -> Self {
        let record = match store.get(STATS_KEY) {
            Ok(Some(raw)) => parse_record(&raw).unwrap_or_else(|e| {
                log::warn!("Discarding unreadable statistics: {}", e);
                StatsRecord::default()
            }),
            Ok(None) => StatsRecord::default(),
            Err(e) => {
                log::warn!("Could not read statistics: {}", e);
                StatsRecord::default()
            }
        };

        Self {
            record,
            session_models: 0,
            clock,
        }
    }

    pub fn record(&self) -> &StatsRecord {
        &self.record
    }

    pub fn session_models(&self) -> u64 {
        self.session_models
    }

    pub fn record_generation(
        &mut self,
        store: &mut dyn KeyValueStore,
        params: &GridParameters,
        block_count: u64,
    ) -> Option<Notice> {
        let now = self.clock.now_ms();
        let r = &mut self.record;

        r.total_models += 1;
        self.session_models += 1;
        r.first_generation.get_or_insert(now);
        r.last_generation = Some(now);
        *r.pattern_usage
            .entry(params.pattern().as_str().to_string())
            .or_insert(0) += 1;
        r.largest_model = r.largest_model.max(block_count);

        let n = r.total_models as f64;
        r.average_model_size = (r.average_model_size * (n - 1.0) + block_count as f64) / n;
        r.total_volume += params.cell_volume() * block_count as f64;

        self.persist(store)
    }

    pub fn record_export(&mut self, store: &mut dyn KeyValueStore) -> Option<Notice> {
        self.record.total_exports += 1;
        self.persist(store)
    }

    pub fn record_view_mode(&mut self, store: &mut dyn KeyValueStore, mode: &str) -> Option<Notice> {
        if !self.record.view_modes.insert(mode.to_string()) {
            return None;
        }
        self.persist(store)
    }

    pub fn record_tool_use(&mut self, store: &mut dyn KeyValueStore, tool: &str) -> Option<Notice> {
        if !self.record.tools_used.insert(tool.to_string()) {
            return None;
        }
        self.persist(store)
    }

    /// Writes the record. On failure the in-memory record stays authoritative
    /// for the rest of the session.
    fn persist(&self, store: &mut dyn KeyValueStore) -> Option<Notice> {
        let result = serde_json::to_string(&self.record)
            .map_err(Into::into)
            .and_then(|json| store.set(STATS_KEY, &json));

        match result {
            Ok(()) => None,
            Err(e) => {
                log::warn!("Statistics kept in memory only: {}", e);
                Some(Notice::StorageExhausted { what: "statistics" })
            }
        }
    }
}

/// Only a JSON object is a record. Arrays would otherwise fill the fields by
/// position.
fn parse_record(raw: &str) -> Result<StatsRecord, serde_json::Error> {
    match serde_json::from_str::<serde_json::Value>(raw)? {
        value @ serde_json::Value::Object(_) => serde_json::from_value(value),
        other => Err(serde::de::Error::custom(format!(
            "expected an object, found {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::params::{CellCounts, PatternId, Vec3};
    use crate::storage::MemoryStore;

    fn params(pattern: &str, size: f64) -> GridParameters {
        GridParameters::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(size, size, size),
            CellCounts::new(10, 10, 10),
            PatternId::parse(pattern),
        )
        .unwrap()
    }

    fn tracker(store: &MemoryStore) -> (Arc<ManualClock>, StatisticsTracker) {
        let clock = Arc::new(ManualClock::new(1_000));
        let tracker = StatisticsTracker::load(store, clock.clone());
        (clock, tracker)
    }

    #[test]
    fn running_average_and_aggregates() {
        let mut store = MemoryStore::new();
        let (clock, mut stats) = tracker(&store);

        stats.record_generation(&mut store, &params("vein", 2.0), 100);
        clock.advance(500);
        stats.record_generation(&mut store, &params("vein", 1.0), 300);
        clock.advance(500);
        stats.record_generation(&mut store, &params("skarn", 1.0), 200);

        let r = stats.record();
        assert_eq!(r.total_models, 3);
        assert_eq!(r.average_model_size, 200.0);
        assert_eq!(r.largest_model, 300);
        assert_eq!(r.total_volume, 8.0 * 100.0 + 300.0 + 200.0);
        assert_eq!(r.first_generation, Some(1_000));
        assert_eq!(r.last_generation, Some(2_000));
        assert_eq!(r.favourite_pattern(), Some(("vein", 2)));
        assert_eq!(stats.session_models(), 3);
    }

    #[test]
    fn persists_and_reloads() {
        let mut store = MemoryStore::new();
        let (_, mut stats) = tracker(&store);
        stats.record_generation(&mut store, &params("layered", 1.0), 1000);
        stats.record_export(&mut store);
        stats.record_view_mode(&mut store, "wireframe");
        stats.record_tool_use(&mut store, "slice");

        let (_, reloaded) = tracker(&store);
        assert_eq!(reloaded.record(), stats.record());
        assert_eq!(reloaded.session_models(), 0);
    }

    #[test]
    fn set_semantics_for_modes_and_tools() {
        let mut store = MemoryStore::new();
        let (_, mut stats) = tracker(&store);
        stats.record_view_mode(&mut store, "solid");
        stats.record_view_mode(&mut store, "solid");
        stats.record_tool_use(&mut store, "measure");
        stats.record_tool_use(&mut store, "measure");
        assert_eq!(stats.record().view_modes.len(), 1);
        assert_eq!(stats.record().tools_used.len(), 1);
    }

    #[test]
    fn quota_failure_keeps_memory_state() {
        let mut store = MemoryStore::with_quota(4);
        let (_, mut stats) = tracker(&store);
        let notice = stats.record_export(&mut store);
        assert_eq!(notice, Some(Notice::StorageExhausted { what: "statistics" }));
        assert_eq!(stats.record().total_exports, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_record_starts_fresh() {
        for raw in ["[1,2,3]", "42", "\"stats\"", "{not json", "{\"total_models\":\"many\"}"] {
            let mut store = MemoryStore::new();
            store.set(STATS_KEY, raw).unwrap();
            let (_, stats) = tracker(&store);
            assert_eq!(stats.record(), &StatsRecord::default(), "payload {raw}");
        }
    }

    #[test]
    fn partial_record_keeps_known_fields() {
        let mut store = MemoryStore::new();
        store
            .set(STATS_KEY, r#"{"total_models":4,"total_exports":1}"#)
            .unwrap();
        let (_, stats) = tracker(&store);
        assert_eq!(stats.record().total_models, 4);
        assert_eq!(stats.record().total_exports, 1);
        assert!(stats.record().pattern_usage.is_empty());
    }
}
