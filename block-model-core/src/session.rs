//! Top-level controller owning every piece of mutable pipeline state.
//!
//! A `Session` holds the storage backend, the cache, statistics and gallery
//! stores, the export pipeline, the pattern engine, the current model and the
//! reproducibility seed slot. Hosts construct one with [`SessionBuilder`] and
//! drive generation through [`GenerationJob`]s:
//!
//! ```text
//! begin_generation ──> GenerationJob ──step()──> ... ──> complete_generation
//!        │                  (cache hit: already complete)        │
//!        └─ issues request token                                 └─ pattern engine,
//!                                                                   cache write, stats
//! ```
//!
//! Every `begin_generation` issues a new request token. Only the job holding
//! the latest token can commit, so overlapping requests resolve to the most
//! recent one instead of racing on the current model.

use crate::block::Block;
use crate::cache::{CacheStore, CacheWrite, CachedModel};
use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::error::{ExportError, GenerationError, Notice, StorageError};
use crate::export::{Archiver, ExportArtifact, ExportPipeline};
use crate::gallery::{GalleryModel, GallerySave, GalleryStore, ModelSummary, ViewerSnapshot};
use crate::params::GridParameters;
use crate::pattern::{PatternEngine, ReproducibilitySeed, StratifiedPatternEngine};
use crate::scheduler::{ChunkedGeneration, Progress, Step};
use crate::stats::{StatisticsTracker, StatsRecord};
use crate::storage::KeyValueStore;
use std::sync::Arc;
use uuid::Uuid;

/// The model currently on display.
#[derive(Debug, Clone)]
pub struct CurrentModel {
    pub params: GridParameters,
    pub blocks: Vec<Block>,
    /// Seed that produced `blocks`, kept until the next generation begins.
    pub seed: Option<ReproducibilitySeed>,
    pub from_cache: bool,
}

enum JobState {
    Generating(ChunkedGeneration),
    Cached(CachedModel),
}

/// One in-flight generation request. Not cancellable: a job either completes
/// or is superseded by a newer request.
pub struct GenerationJob {
    token: u64,
    params: GridParameters,
    seed: Option<ReproducibilitySeed>,
    state: JobState,
}

impl GenerationJob {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn params(&self) -> &GridParameters {
        &self.params
    }

    pub fn is_cache_hit(&self) -> bool {
        matches!(self.state, JobState::Cached(_))
    }

    pub fn progress(&self) -> Progress {
        match &self.state {
            JobState::Generating(generation) => generation.progress(),
            JobState::Cached(hit) => Progress {
                percent: 100,
                processed: hit.blocks.len() as u64,
                total: hit.blocks.len() as u64,
            },
        }
    }

    pub fn is_complete(&self) -> bool {
        match &self.state {
            JobState::Generating(generation) => generation.is_complete(),
            JobState::Cached(_) => true,
        }
    }

    /// Advances by one scheduler chunk. The host yields between calls.
    pub fn step(&mut self) -> Step {
        if let JobState::Generating(generation) = &mut self.state {
            return generation.step();
        }
        Step::Complete(self.progress())
    }
}

#[derive(Debug)]
pub struct GenerationOutcome {
    pub block_count: usize,
    pub from_cache: bool,
    /// `None` for cache hits, which are not written back.
    pub cache: Option<CacheWrite>,
    pub notices: Vec<Notice>,
}

#[derive(Debug)]
pub struct ExportOutcome {
    pub artifact: ExportArtifact,
    pub notices: Vec<Notice>,
}

/// Gallery entry restored for replay, plus the generation that rebuilds it.
pub struct Replay {
    pub job: GenerationJob,
    pub model: GalleryModel,
}

impl Replay {
    /// Viewer state to restore once the replayed generation completes.
    pub fn viewer_state(&self) -> Option<&ViewerSnapshot> {
        self.model.viewer_state.as_ref()
    }
}

pub struct SessionBuilder {
    store: Box<dyn KeyValueStore>,
    config: PipelineConfig,
    engine: Box<dyn PatternEngine>,
    archiver: Option<Box<dyn Archiver>>,
    clock: Arc<dyn Clock>,
}

impl SessionBuilder {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            config: PipelineConfig::default(),
            engine: Box::new(StratifiedPatternEngine),
            archiver: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn engine(mut self, engine: impl PatternEngine + 'static) -> Self {
        self.engine = Box::new(engine);
        self
    }

    /// Overrides the default zip archiver.
    pub fn archiver(mut self, archiver: impl Archiver + 'static) -> Self {
        self.archiver = Some(Box::new(archiver));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs startup maintenance (convention migration, cache sweep) and loads
    /// statistics.
    pub fn open(self) -> Session {
        let Self {
            mut store,
            config,
            engine,
            archiver,
            clock,
        } = self;

        let cache = CacheStore::new(config.cache.clone(), clock.clone());
        if let Err(e) = cache.migrate_convention(store.as_mut()) {
            log::warn!("Coordinate convention check failed: {}", e);
        }
        cache.sweep(store.as_mut());

        let stats = StatisticsTracker::load(store.as_ref(), clock.clone());
        let gallery = GalleryStore::new(config.gallery.clone(), clock.clone());
        let exporter = match archiver {
            Some(archiver) => ExportPipeline::new(config.export.clone(), archiver, clock.clone()),
            None => ExportPipeline::with_zip(config.export.clone(), clock.clone()),
        };

        log::info!(
            "Session opened ({} models generated so far)",
            stats.record().total_models
        );

        Session {
            store,
            config,
            clock,
            engine,
            cache,
            stats,
            gallery,
            exporter,
            current: None,
            pending_seed: None,
            latest_token: 0,
        }
    }
}

pub struct Session {
    store: Box<dyn KeyValueStore>,
    config: PipelineConfig,
    clock: Arc<dyn Clock>,
    engine: Box<dyn PatternEngine>,
    cache: CacheStore,
    stats: StatisticsTracker,
    gallery: GalleryStore,
    exporter: ExportPipeline,
    current: Option<CurrentModel>,
    /// Seed restored from the gallery, consumed by the next generation.
    pending_seed: Option<ReproducibilitySeed>,
    latest_token: u64,
}

impl Session {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn current(&self) -> Option<&CurrentModel> {
        self.current.as_ref()
    }

    pub fn stats(&self) -> &StatsRecord {
        self.stats.record()
    }

    pub fn session_models(&self) -> u64 {
        self.stats.session_models()
    }

    /// Starts a generation for `params`, superseding any job still in flight.
    /// Fresh cache hits come back already complete.
    pub fn begin_generation(&mut self, params: GridParameters) -> GenerationJob {
        self.latest_token += 1;
        let token = self.latest_token;

        let pending = self.pending_seed.take();
        let seed = params
            .pattern()
            .is_seeded()
            .then(|| pending.unwrap_or_else(|| ReproducibilitySeed::capture(self.clock.as_ref())));
        let replaying = seed.is_some_and(|s| s.from_gallery);

        // A replay must reproduce its own seed, not whatever the cache holds.
        let hit = if replaying {
            None
        } else {
            self.cache.read(self.store.as_mut(), &params)
        };

        let (seed, state) = match hit {
            Some(hit) => {
                let cached_seed = hit.seed.map(|s| ReproducibilitySeed {
                    from_gallery: false,
                    ..s
                });
                (cached_seed.or(seed), JobState::Cached(hit))
            }
            None => (
                seed,
                JobState::Generating(ChunkedGeneration::new(&params, &self.config.scheduler)),
            ),
        };

        log::info!(
            "Generation {} started: {} cells, pattern {}{}",
            token,
            params.total_cells(),
            params.pattern(),
            if matches!(state, JobState::Cached(_)) {
                " (cached)"
            } else {
                ""
            }
        );

        GenerationJob {
            token,
            params,
            seed,
            state,
        }
    }

    /// Finishes `job`: runs any remaining chunks, applies the pattern engine,
    /// caches and records statistics, then makes it the current model. Nothing
    /// is committed if the job was superseded or the pattern engine fails.
    pub fn complete_generation(
        &mut self,
        mut job: GenerationJob,
    ) -> Result<GenerationOutcome, GenerationError> {
        if job.token != self.latest_token {
            log::info!("Discarding superseded generation {}", job.token);
            return Err(GenerationError::Superseded {
                token: job.token,
                latest: self.latest_token,
            });
        }

        while !job.step().is_complete() {}

        let mut notices = Vec::new();
        let (blocks, from_cache, cache) = match job.state {
            JobState::Cached(hit) => (hit.blocks, true, None),
            JobState::Generating(generation) => {
                let mut blocks = generation.into_blocks();
                self.engine
                    .apply(&job.params, &mut blocks, job.seed.as_ref())?;

                let write = self
                    .cache
                    .write(self.store.as_mut(), &job.params, &blocks, job.seed.as_ref());
                if let CacheWrite::NotCached(reason) = &write {
                    notices.push(Notice::NotCached {
                        reason: reason.clone(),
                    });
                }
                (blocks, false, Some(write))
            }
        };

        notices.extend(self.stats.record_generation(
            self.store.as_mut(),
            &job.params,
            blocks.len() as u64,
        ));

        let block_count = blocks.len();
        self.current = Some(CurrentModel {
            params: job.params,
            blocks,
            seed: job.seed,
            from_cache,
        });

        for notice in &notices {
            log::warn!("{}", notice);
        }
        log::info!("Generation {} complete: {} blocks", job.token, block_count);

        Ok(GenerationOutcome {
            block_count,
            from_cache,
            cache,
            notices,
        })
    }

    /// Begins and completes a generation in one call, reporting progress after
    /// every chunk.
    pub fn generate(
        &mut self,
        params: GridParameters,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<GenerationOutcome, GenerationError> {
        let mut job = self.begin_generation(params);
        loop {
            let step = job.step();
            on_progress(step.progress());
            if step.is_complete() {
                break;
            }
        }
        self.complete_generation(job)
    }

    /// Exports the current model. Every export that produces an artifact,
    /// archived or fallen back, counts once in the statistics.
    pub fn export_current(&mut self) -> Result<ExportOutcome, ExportError> {
        let blocks = self
            .current
            .as_ref()
            .map_or(&[][..], |model| model.blocks.as_slice());
        let artifact = self.exporter.export(blocks)?;

        let mut notices = Vec::new();
        if let Some(reason) = &artifact.fallback_reason {
            notices.push(Notice::ExportFellBack {
                reason: reason.clone(),
            });
        }
        notices.extend(self.stats.record_export(self.store.as_mut()));

        Ok(ExportOutcome { artifact, notices })
    }

    pub fn gallery(&self) -> Vec<GalleryModel> {
        self.gallery.list(self.store.as_ref())
    }

    /// Saves the current model's parameters, summary and seed under `name`.
    pub fn save_to_gallery(
        &mut self,
        name: &str,
        viewer_state: Option<ViewerSnapshot>,
    ) -> Result<GallerySave, GenerationError> {
        let current = self.current.as_ref().ok_or(GenerationError::NoCurrentModel)?;
        let summary = ModelSummary::of(&current.params, &current.blocks);
        let saved = self.gallery.save(
            self.store.as_mut(),
            name,
            &current.params,
            summary,
            viewer_state,
            current.seed,
        )?;
        if let Some(notice) = &saved.notice {
            log::warn!("{}", notice);
        }
        Ok(saved)
    }

    /// Starts regenerating gallery model `id` with its stored seed. The caller
    /// completes the job and then restores `Replay::viewer_state`.
    pub fn replay_from_gallery(&mut self, id: Uuid) -> Result<Replay, GenerationError> {
        let model = self
            .gallery
            .load(self.store.as_ref(), id)
            .ok_or_else(|| GenerationError::UnknownGalleryModel(id.to_string()))?;

        self.pending_seed = model.seed.map(ReproducibilitySeed::for_replay);
        let job = self.begin_generation(model.params);
        Ok(Replay { job, model })
    }

    pub fn delete_from_gallery(&mut self, id: Uuid) -> Option<Notice> {
        self.gallery.delete(self.store.as_mut(), id)
    }

    pub fn record_view_mode(&mut self, mode: &str) -> Option<Notice> {
        self.stats.record_view_mode(self.store.as_mut(), mode)
    }

    pub fn record_tool_use(&mut self, tool: &str) -> Option<Notice> {
        self.stats.record_tool_use(self.store.as_mut(), tool)
    }

    pub fn clear_cache(&mut self) -> Result<usize, StorageError> {
        self.cache.clear_all(self.store.as_mut())
    }

    /// Forgets the current model and any pending seed, and invalidates jobs
    /// still in flight. Persisted data is untouched.
    pub fn reset(&mut self) {
        self.current = None;
        self.pending_seed = None;
        self.latest_token += 1;
    }
}
