use cgmath::Vector3;
use itertools::iproduct;
use strum::IntoEnumIterator;

use crate::world::chunk_data::VoxelGrid;
use crate::world::location::LocalLocation;
use crate::world::voxel_data::{Block, RampDirection};

/// Which extra checks a neighbor column has to pass before it receives a ramp.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RampRules {
    /// Reject the neighbor if the column behind it drops by another step
    pub check_slope_continuation: bool,
    /// Diagonal ramps need both orthogonal neighbors to show the same drop
    pub check_diagonal_orthogonals: bool,
}

impl RampRules {
    pub const STRICT: RampRules = RampRules {
        check_slope_continuation: true,
        check_diagonal_orthogonals: true,
    };

    pub const LEGACY: RampRules = RampRules {
        check_slope_continuation: false,
        check_diagonal_orthogonals: false,
    };
}

impl Default for RampRules {
    fn default() -> Self {
        Self::STRICT
    }
}

/// Smooths single-step height differences of a freshly generated grid into ramps.
pub struct RampPostProcessor {
    rules: RampRules,
}

impl RampPostProcessor {
    pub fn new(rules: RampRules) -> Self {
        Self { rules }
    }

    /// Runs the pass in place and returns how many ramps were placed.
    ///
    /// Columns are visited x-major. A column that already received a ramp is neither a source nor a target again.
    /// Heights are read from the grid as it is being modified.
    pub fn apply(&self, grid: &mut VoxelGrid) -> usize {
        let dimensions = grid.dimensions();
        let mut ramp_targets = RampTargets::new(dimensions.width, dimensions.depth);
        let mut placed = 0;

        for (x, z) in iproduct!(0..dimensions.width as i32, 0..dimensions.depth as i32) {
            if ramp_targets.contains(x, z) {
                continue;
            }

            let Some(top) = grid.top_height(x, z) else {
                continue;
            };

            let Some(direction) = RampDirection::iter().find(|&direction| self.qualifies(grid, &ramp_targets, x, z, top, direction)) else {
                continue;
            };

            let (dx, dz) = direction.offset();
            let material = grid.get_block(LocalLocation::new_unchecked(Vector3::new(x, top as i32, z))).ty;
            grid.set_block(
                LocalLocation::new_unchecked(Vector3::new(x + dx, top as i32, z + dz)),
                Block::ramp(material, direction),
            );

            ramp_targets.insert(x + dx, z + dz);
            placed += 1;
        }

        placed
    }

    fn qualifies(&self, grid: &VoxelGrid, ramp_targets: &RampTargets, x: i32, z: i32, top: usize, direction: RampDirection) -> bool {
        let (dx, dz) = direction.offset();
        let (nx, nz) = (x + dx, z + dz);

        let Some(neighbor_top) = grid.top_height(nx, nz) else {
            return false;
        };

        if ramp_targets.contains(nx, nz) || neighbor_top + 1 != top {
            return false;
        }

        let slot_is_air = grid
            .try_get_block(LocalLocation::new(Vector3::new(nx, top as i32, nz)))
            .is_some_and(Block::is_air);
        if !slot_is_air {
            return false;
        }

        if self.rules.check_slope_continuation {
            let beyond = grid.top_height(nx + dx, nz + dz);
            if beyond.is_some_and(|beyond| beyond + 1 == neighbor_top) {
                return false;
            }
        }

        if direction.is_diagonal() && self.rules.check_diagonal_orthogonals {
            let drops = |x, z| grid.top_height(x, z).is_some_and(|h| h + 1 == top);
            if !drops(nx, z) || !drops(x, nz) {
                return false;
            }
        }

        true
    }
}

/// Columns that already hold a ramp voxel
struct RampTargets {
    width: usize,
    columns: Vec<bool>,
}

impl RampTargets {
    fn new(width: usize, depth: usize) -> Self {
        Self {
            width,
            columns: vec![false; width * depth],
        }
    }

    fn contains(&self, x: i32, z: i32) -> bool {
        self.columns[x as usize + self.width * z as usize]
    }

    fn insert(&mut self, x: i32, z: i32) {
        self.columns[x as usize + self.width * z as usize] = true;
    }
}
