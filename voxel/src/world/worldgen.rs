use cgmath::Vector3;
use fastrand::Rng;
use itertools::iproduct;
use log::debug;
use noise::{Fbm, MultiFractal, NoiseFn, OpenSimplex, Perlin};

use crate::world::chunk::Chunk;
use crate::world::chunk_data::{ChunkDimensions, VoxelGrid};
use crate::world::location::{ChunkLocation, LocalLocation};
use crate::world::ramps::{RampPostProcessor, RampRules};
use crate::world::voxel_data::{Block, BlockType};

/// Noise parameters of a terrain style.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TerrainPreset {
    pub base_frequency: f64,
    pub base_octaves: usize,
    pub base_weight: f64,
    pub detail_frequency: f64,
    pub detail_weight: f64,
    /// Exponent of the curve that flattens lowlands
    pub smoothing_power: f64,
    /// Share of the chunk height every column reaches
    pub height_base: f64,
    /// Share of the chunk height the noise spreads columns over
    pub height_span: f64,
    pub cave_frequency: f64,
    pub cave_vertical_stretch: f64,
    pub cave_threshold: f64,
    pub ore_chance: f64,
    pub ramp_rules: RampRules,
}

impl TerrainPreset {
    pub const GENTLE: TerrainPreset = TerrainPreset {
        base_frequency: 0.015,
        base_octaves: 2,
        base_weight: 0.2,
        detail_frequency: 0.08,
        detail_weight: 0.05,
        smoothing_power: 1.1,
        height_base: 0.5,
        height_span: 0.2,
        cave_frequency: 0.12,
        cave_vertical_stretch: 2.0,
        cave_threshold: 0.4,
        ore_chance: 0.02,
        ramp_rules: RampRules::STRICT,
    };

    pub const RUGGED: TerrainPreset = TerrainPreset {
        base_frequency: 0.02,
        base_octaves: 4,
        base_weight: 0.6,
        detail_frequency: 0.1,
        detail_weight: 0.12,
        smoothing_power: 1.4,
        height_base: 0.3,
        height_span: 0.55,
        cave_frequency: 0.09,
        cave_vertical_stretch: 1.5,
        cave_threshold: 0.5,
        ore_chance: 0.03,
        ramp_rules: RampRules::LEGACY,
    };

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "gentle" => Some(Self::GENTLE),
            "rugged" => Some(Self::RUGGED),
            _ => None,
        }
    }
}

impl Default for TerrainPreset {
    fn default() -> Self {
        Self::GENTLE
    }
}

struct NoiseLayer {
    pub weight: f64,
    pub scale: f64,
}

trait LayeredNoiseGenerator {
    fn get_layered(&self, layers: &[NoiseLayer], point: [f64; 2]) -> f64;
}

impl<N: NoiseFn<f64, 2>> LayeredNoiseGenerator for N {
    fn get_layered(&self, layers: &[NoiseLayer], point: [f64; 2]) -> f64 {
        layers
            .iter()
            .map(|layer| layer.weight * self.get([point[0] * layer.scale, point[1] * layer.scale]))
            .sum()
    }
}

pub struct TerrainGenerator {
    world_seed: u32,
    dimensions: ChunkDimensions,
    preset: TerrainPreset,
    base: Fbm<Perlin>,
    detail: OpenSimplex,
    caves: OpenSimplex,
}

impl TerrainGenerator {
    pub fn new(world_seed: u32, dimensions: ChunkDimensions, preset: TerrainPreset) -> Self {
        let base = Fbm::<Perlin>::new(world_seed)
            .set_octaves(preset.base_octaves)
            .set_frequency(preset.base_frequency);

        Self {
            world_seed,
            dimensions,
            preset,
            base,
            detail: OpenSimplex::new(world_seed.wrapping_add(12345)),
            caves: OpenSimplex::new(world_seed.wrapping_add(54321)),
        }
    }

    pub fn dimensions(&self) -> ChunkDimensions {
        self.dimensions
    }

    pub fn preset(&self) -> &TerrainPreset {
        &self.preset
    }

    /// Seed of the ore stream of a chunk. Mixing in the location keeps chunks independent of generation order.
    pub fn chunk_seed(&self, location: ChunkLocation) -> u64 {
        let packed = ((location.x as u32 as u64) << 32) | location.z as u32 as u64;

        splitmix64(splitmix64(self.world_seed as u64) ^ packed)
    }

    /// Terrain of a chunk with ramps applied.
    pub fn generate_chunk(&self, location: ChunkLocation) -> Chunk {
        let mut rng = Rng::with_seed(self.chunk_seed(location));
        let mut data = self.generate_terrain(location, &mut rng);

        let ramps = RampPostProcessor::new(self.preset.ramp_rules).apply(&mut data);
        debug!("Generated chunk {:?} with {} ramps", location, ramps);

        Chunk::new(location, data)
    }

    /// Raw terrain without the ramp pass. Ore placement draws from `rng` in column order.
    pub fn generate_terrain(&self, location: ChunkLocation, rng: &mut Rng) -> VoxelGrid {
        let dimensions = self.dimensions;
        let mut grid = VoxelGrid::new_filled_with(dimensions, Block::AIR);
        let (origin_x, origin_z) = location.to_world_voxel(dimensions.width, dimensions.depth);

        iproduct!(0..dimensions.width, 0..dimensions.depth).for_each(|(x, z)| {
            let world_x = origin_x + x as i64;
            let world_z = origin_z + z as i64;
            let terrain_height = self.terrain_height(world_x, world_z);

            for y in 0..dimensions.height.min(terrain_height + 1) {
                if y + 3 < terrain_height && self.is_cave(world_x, y, world_z) {
                    continue;
                }

                let ty = if y == terrain_height {
                    BlockType::Grass
                } else if y + 2 >= terrain_height {
                    BlockType::Dirt
                } else if rng.f64() < self.preset.ore_chance {
                    BlockType::Ore
                } else {
                    BlockType::Stone
                };

                let location = LocalLocation::new_unchecked(Vector3::new(x as i32, y as i32, z as i32));
                grid.set_block(location, Block::new(ty));
            }
        });

        grid
    }

    /// y of the grass voxel of a world column, always within `1..height`
    pub fn terrain_height(&self, world_x: i64, world_z: i64) -> usize {
        let preset = &self.preset;
        let point = [world_x as f64, world_z as f64];

        let detail = NoiseLayer {
            weight: preset.detail_weight,
            scale: preset.detail_frequency,
        };
        let combined = self.base.get(point) * preset.base_weight + self.detail.get_layered(&[detail], point);
        let smoothed = (combined * 0.5 + 0.5)
            .clamp(0.0, 1.0)
            .powf(preset.smoothing_power)
            * 2.0
            - 1.0;

        let height = self.dimensions.height as f64;
        let column = ((smoothed + 1.0) * 0.5 * (height * preset.height_span)) as i64 + (height * preset.height_base) as i64;

        column.clamp(1, (self.dimensions.height as i64 - 1).max(1)) as usize
    }

    fn is_cave(&self, world_x: i64, y: usize, world_z: i64) -> bool {
        let frequency = self.preset.cave_frequency;
        let density = self.caves.get([
            world_x as f64 * frequency,
            y as f64 * self.preset.cave_vertical_stretch * frequency,
            world_z as f64 * frequency,
        ]);

        density > self.preset.cave_threshold
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}
