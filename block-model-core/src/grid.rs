/// Coordinate grid construction: maps linear cell numbers to lattice indices
/// and cell-centre positions.
use crate::block::{Block, CellIndex};
use crate::params::GridParameters;
use constants::coordinate_system::cell_centre_3d;
use std::ops::Range;

/// Produces block skeletons in `(i, j, k)` lexicographic order with `k`
/// varying fastest. The same cell number always yields the same block,
/// however the range is split up.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateGridBuilder {
    origin: [f64; 3],
    cell_size: [f64; 3],
    count_y: u64,
    count_z: u64,
    total: u64,
}

impl CoordinateGridBuilder {
    pub fn new(params: &GridParameters) -> Self {
        let counts = params.counts();
        Self {
            origin: params.origin().to_array(),
            cell_size: params.cell_size().to_array(),
            count_y: counts.y as u64,
            count_z: counts.z as u64,
            total: params.total_cells(),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Lattice index of linear cell number `n`.
    pub fn index_of(&self, n: u64) -> CellIndex {
        let layer = self.count_y * self.count_z;
        let i = n / layer;
        let remainder = n % layer;
        CellIndex {
            i: i as u32,
            j: (remainder / self.count_z) as u32,
            k: (remainder % self.count_z) as u32,
        }
    }

    pub fn block_at(&self, n: u64) -> Block {
        let index = self.index_of(n);
        let position = cell_centre_3d(self.origin, self.cell_size, [index.i, index.j, index.k]);
        Block::skeleton(position, index)
    }

    /// Appends cells `range` to `out`. The range is clamped to the grid.
    pub fn extend_range(&self, range: Range<u64>, out: &mut Vec<Block>) {
        let end = range.end.min(self.total);
        let start = range.start.min(end);
        out.reserve((end - start) as usize);
        out.extend((start..end).map(|n| self.block_at(n)));
    }

    /// Whole grid in one pass.
    pub fn build(&self) -> Vec<Block> {
        let mut blocks = Vec::new();
        self.extend_range(0..self.total, &mut blocks);
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{CellCounts, PatternId, Vec3};

    fn params(origin: Vec3, size: Vec3, counts: CellCounts) -> GridParameters {
        GridParameters::new(origin, size, counts, PatternId::default()).unwrap()
    }

    #[test]
    fn two_by_two_by_two_cube() {
        let grid = CoordinateGridBuilder::new(&params(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
            CellCounts::new(2, 2, 2),
        ));
        let blocks = grid.build();
        assert_eq!(blocks.len(), 8);

        let first = &blocks[0];
        assert_eq!(first.index, CellIndex { i: 0, j: 0, k: 0 });
        assert_eq!(first.position, [0.5, 0.5, -0.5]);

        let last = &blocks[7];
        assert_eq!(last.index, CellIndex { i: 1, j: 1, k: 1 });
        assert_eq!(last.position, [1.5, 1.5, -1.5]);
        assert!(blocks.iter().all(|b| b.material.is_none()));
    }

    #[test]
    fn k_varies_fastest() {
        let grid = CoordinateGridBuilder::new(&params(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
            CellCounts::new(2, 3, 4),
        ));
        let indices: Vec<_> = grid.build().iter().map(|b| b.index).collect();
        assert_eq!(indices[1], CellIndex { i: 0, j: 0, k: 1 });
        assert_eq!(indices[4], CellIndex { i: 0, j: 1, k: 0 });
        assert_eq!(indices[12], CellIndex { i: 1, j: 0, k: 0 });
        assert_eq!(indices[23], CellIndex { i: 1, j: 2, k: 3 });
    }

    #[test]
    fn offsets_and_anisotropic_cells() {
        let grid = CoordinateGridBuilder::new(&params(
            Vec3::new(100.0, -50.0, 20.0),
            Vec3::new(10.0, 5.0, 2.0),
            CellCounts::new(3, 3, 3),
        ));
        let block = grid.block_at(grid.total() - 1);
        assert_eq!(block.index, CellIndex { i: 2, j: 2, k: 2 });
        assert_eq!(block.position, [125.0, -37.5, 15.0]);
    }

    #[test]
    fn ranges_are_clamped() {
        let grid = CoordinateGridBuilder::new(&params(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
            CellCounts::new(2, 2, 2),
        ));
        let mut out = Vec::new();
        grid.extend_range(6..100, &mut out);
        assert_eq!(out.len(), 2);
        grid.extend_range(100..200, &mut out);
        assert_eq!(out.len(), 2);
    }
}
