use crate::world::chunk_data::ChunkDimensions;
use crate::world::worldgen::{TerrainGenerator, TerrainPreset};

pub const DEFAULT_CHUNK_DIMENSIONS: ChunkDimensions = ChunkDimensions::new(16, 64, 16);
pub const DEFAULT_PORT: u16 = 42069;

/// Everything that determines the content of a world.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamConfig {
    pub seed: u32,
    pub chunk_dimensions: ChunkDimensions,
    pub preset: TerrainPreset,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            chunk_dimensions: DEFAULT_CHUNK_DIMENSIONS,
            preset: TerrainPreset::GENTLE,
        }
    }
}

impl StreamConfig {
    pub fn generator(&self) -> TerrainGenerator {
        TerrainGenerator::new(self.seed, self.chunk_dimensions, self.preset)
    }
}
