/// Cooperative, chunked generation of the coordinate grid.
///
/// A `ChunkedGeneration` is an explicit state machine: each call to
/// [`ChunkedGeneration::step`] appends one chunk of cells and hands control
/// back to whoever is driving it (a frame loop, a CLI progress loop, a test).
/// Chunk `n` is always fully appended before chunk `n + 1` starts, so the
/// output never depends on the chunk size.
use crate::block::Block;
use crate::config::SchedulerConfig;
use crate::grid::CoordinateGridBuilder;
use crate::params::GridParameters;
use constants::limits::SYNC_GENERATION_LIMIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// `floor(processed / total * 100)`.
    pub percent: u8,
    pub processed: u64,
    pub total: u64,
}

impl Progress {
    fn new(processed: u64, total: u64) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (processed * 100 / total) as u8
        };
        Self {
            percent,
            processed,
            total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More cells remain; the driver should yield before stepping again.
    Yield(Progress),
    Complete(Progress),
}

impl Step {
    pub fn progress(&self) -> Progress {
        match *self {
            Step::Yield(p) | Step::Complete(p) => p,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Step::Complete(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Whole grid in a single step.
    Synchronous,
    Chunked { chunk_size: u64 },
}

impl GenerationMode {
    /// Small grids run in one pass; anything over the limit is always chunked.
    /// The configured threshold can lower the limit but never raise it.
    pub fn for_total(total: u64, config: &SchedulerConfig) -> Self {
        if total > config.sync_threshold.min(SYNC_GENERATION_LIMIT) {
            GenerationMode::Chunked {
                chunk_size: config.chunk_size.max(1) as u64,
            }
        } else {
            GenerationMode::Synchronous
        }
    }
}

pub struct ChunkedGeneration {
    grid: CoordinateGridBuilder,
    mode: GenerationMode,
    next: u64,
    blocks: Vec<Block>,
}

impl ChunkedGeneration {
    pub fn new(params: &GridParameters, config: &SchedulerConfig) -> Self {
        let mode = GenerationMode::for_total(params.total_cells(), config);
        Self::with_mode(params, mode)
    }

    pub fn with_mode(params: &GridParameters, mode: GenerationMode) -> Self {
        let grid = CoordinateGridBuilder::new(params);
        let mode = match mode {
            GenerationMode::Chunked { chunk_size } => GenerationMode::Chunked {
                chunk_size: chunk_size.max(1),
            },
            GenerationMode::Synchronous => GenerationMode::Synchronous,
        };
        log::debug!("Scheduling {} cells in {:?} mode", grid.total(), mode);
        Self {
            grid,
            mode,
            next: 0,
            blocks: Vec::new(),
        }
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    pub fn progress(&self) -> Progress {
        Progress::new(self.next, self.grid.total())
    }

    pub fn is_complete(&self) -> bool {
        self.next >= self.grid.total()
    }

    /// Appends the next chunk. Stepping a finished generation is a no-op that
    /// reports `Complete` again.
    pub fn step(&mut self) -> Step {
        let total = self.grid.total();
        let end = match self.mode {
            GenerationMode::Synchronous => total,
            GenerationMode::Chunked { chunk_size } => (self.next + chunk_size).min(total),
        };

        self.grid.extend_range(self.next..end, &mut self.blocks);
        self.next = end;

        let progress = self.progress();
        if self.is_complete() {
            Step::Complete(progress)
        } else {
            Step::Yield(progress)
        }
    }

    /// Drives the generation to the end without yielding, reporting progress
    /// after every chunk.
    pub fn run_to_completion(mut self, mut on_progress: impl FnMut(Progress)) -> Vec<Block> {
        loop {
            let step = self.step();
            on_progress(step.progress());
            if step.is_complete() {
                return self.into_blocks();
            }
        }
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{CellCounts, PatternId, Vec3};

    fn params(counts: CellCounts) -> GridParameters {
        GridParameters::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 2.0, 2.0),
            counts,
            PatternId::default(),
        )
        .unwrap()
    }

    #[test]
    fn small_grids_complete_in_one_step() {
        let mut generation =
            ChunkedGeneration::new(&params(CellCounts::new(10, 10, 10)), &SchedulerConfig::default());
        assert_eq!(generation.mode(), GenerationMode::Synchronous);
        let step = generation.step();
        assert_eq!(
            step,
            Step::Complete(Progress {
                percent: 100,
                processed: 1000,
                total: 1000
            })
        );
        assert_eq!(generation.into_blocks().len(), 1000);
    }

    #[test]
    fn large_grids_are_always_chunked() {
        let config = SchedulerConfig {
            chunk_size: 0,
            ..SchedulerConfig::default()
        };
        let generation = ChunkedGeneration::new(&params(CellCounts::new(100, 100, 51)), &config);
        assert_eq!(generation.mode(), GenerationMode::Chunked { chunk_size: 1 });

        let generation = ChunkedGeneration::new(
            &params(CellCounts::new(100, 100, 51)),
            &SchedulerConfig::default(),
        );
        assert_eq!(
            generation.mode(),
            GenerationMode::Chunked {
                chunk_size: 10_000
            }
        );
    }

    #[test]
    fn raised_threshold_cannot_disable_chunking() {
        let config = SchedulerConfig {
            chunk_size: 10_000,
            sync_threshold: 10_000_000,
        };
        let generation = ChunkedGeneration::new(&params(CellCounts::new(100, 100, 100)), &config);
        assert_eq!(
            generation.mode(),
            GenerationMode::Chunked {
                chunk_size: 10_000
            }
        );

        let generation = ChunkedGeneration::new(&params(CellCounts::new(100, 100, 50)), &config);
        assert_eq!(generation.mode(), GenerationMode::Synchronous);
    }

    #[test]
    fn reports_floor_percentages_after_every_chunk() {
        let mut generation = ChunkedGeneration::with_mode(
            &params(CellCounts::new(3, 1, 1)),
            GenerationMode::Chunked { chunk_size: 1 },
        );
        let mut seen = Vec::new();
        loop {
            let step = generation.step();
            seen.push(step.progress().percent);
            if step.is_complete() {
                break;
            }
        }
        assert_eq!(seen, vec![33, 66, 100]);
        assert!(generation.step().is_complete());
        assert_eq!(generation.into_blocks().len(), 3);
    }

    #[test]
    fn chunked_matches_single_pass() {
        let p = params(CellCounts::new(7, 5, 3));
        let single = CoordinateGridBuilder::new(&p).build();
        for chunk_size in [1, 2, 10, 104, 105, 1000] {
            let chunked = ChunkedGeneration::with_mode(&p, GenerationMode::Chunked { chunk_size })
                .run_to_completion(|_| {});
            assert_eq!(chunked, single, "chunk size {chunk_size}");
        }
    }
}
