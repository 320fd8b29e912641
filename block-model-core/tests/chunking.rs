//! Properties of the cooperative scheduler: chunking never changes the output.

use block_model_core::config::SchedulerConfig;
use block_model_core::grid::CoordinateGridBuilder;
use block_model_core::params::{CellCounts, GridParameters, PatternId, Vec3};
use block_model_core::scheduler::{ChunkedGeneration, GenerationMode};
use proptest::prelude::*;

fn params(nx: u32, ny: u32, nz: u32, size: f64, origin: f64) -> GridParameters {
    GridParameters::new(
        Vec3::new(origin, -origin, origin * 2.0),
        Vec3::new(size, size * 2.0, size / 2.0),
        CellCounts::new(nx, ny, nz),
        PatternId::parse("uniform"),
    )
    .unwrap()
}

proptest! {
    #[test]
    fn chunked_output_matches_one_pass(
        nx in 1u32..16,
        ny in 1u32..16,
        nz in 1u32..16,
        chunk_size in 1u64..700,
        size in 0.5f64..50.0,
        origin in -1000.0f64..1000.0,
    ) {
        let grid = params(nx, ny, nz, size, origin);
        let one_pass = CoordinateGridBuilder::new(&grid).build();
        let chunked = ChunkedGeneration::with_mode(&grid, GenerationMode::Chunked { chunk_size })
            .run_to_completion(|_| {});
        prop_assert_eq!(chunked, one_pass);
    }

    #[test]
    fn length_is_product_of_counts(nx in 1u32..40, ny in 1u32..40, nz in 1u32..40) {
        let grid = params(nx, ny, nz, 1.0, 0.0);
        let blocks = ChunkedGeneration::new(&grid, &SchedulerConfig::default())
            .run_to_completion(|_| {});
        prop_assert_eq!(blocks.len() as u64, u64::from(nx) * u64::from(ny) * u64::from(nz));
    }

    #[test]
    fn progress_is_monotonic_and_ends_at_100(
        nx in 1u32..20,
        ny in 1u32..20,
        nz in 1u32..20,
        chunk_size in 1u64..300,
    ) {
        let grid = params(nx, ny, nz, 1.0, 0.0);
        let mut last = 0u8;
        let mut steps = 0u64;
        ChunkedGeneration::with_mode(&grid, GenerationMode::Chunked { chunk_size })
            .run_to_completion(|p| {
                assert!(p.percent >= last);
                last = p.percent;
                steps += 1;
            });
        prop_assert_eq!(last, 100);
        prop_assert_eq!(steps, grid.total_cells().div_ceil(chunk_size));
    }
}

#[test]
fn large_grids_are_always_chunked() {
    let config = SchedulerConfig {
        chunk_size: 10_000,
        sync_threshold: 500_000,
    };
    let above = params(100, 100, 51, 1.0, 0.0);
    assert_eq!(
        ChunkedGeneration::new(&above, &config).mode(),
        GenerationMode::Chunked { chunk_size: 10_000 }
    );

    let at_limit = params(100, 100, 50, 1.0, 0.0);
    assert_eq!(
        ChunkedGeneration::new(&at_limit, &config).mode(),
        GenerationMode::Synchronous
    );
}
