use std::fmt::{Debug, Formatter};

use cgmath::Vector3;

use crate::error::ProtocolError;
use crate::world::location::{LocalLocation, OutsideBounds, WithinBounds};
use crate::world::voxel_data::Block;

/// Size of a voxel grid in voxels.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChunkDimensions {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl ChunkDimensions {
    pub const fn new(width: usize, height: usize, depth: usize) -> Self {
        Self { width, height, depth }
    }

    pub const fn volume(&self) -> usize {
        self.width * self.height * self.depth
    }

    pub const fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    pub fn contains(&self, location: Vector3<i32>) -> bool {
        (0..self.width as i32).contains(&location.x)
            && (0..self.height as i32).contains(&location.y)
            && (0..self.depth as i32).contains(&location.z)
    }

    pub fn index(&self, location: LocalLocation<WithinBounds>) -> usize {
        location.x as usize + self.width * (location.y as usize + self.height * location.z as usize)
    }
}

/// Dense voxel storage of a single chunk, indexed `x + width * (y + height * z)`.
#[derive(Clone, PartialEq, Eq)]
pub struct VoxelGrid {
    dimensions: ChunkDimensions,
    voxels: Box<[Block]>,
}

impl Debug for VoxelGrid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "VoxelGrid({}x{}x{})", self.dimensions.width, self.dimensions.height, self.dimensions.depth)
    }
}

impl VoxelGrid {
    pub fn new_filled_with(dimensions: ChunkDimensions, block: Block) -> Self {
        Self {
            dimensions,
            voxels: vec![block; dimensions.volume()].into_boxed_slice(),
        }
    }

    pub fn dimensions(&self) -> ChunkDimensions {
        self.dimensions
    }

    /// Voxels in grid index order
    pub fn blocks(&self) -> &[Block] {
        &self.voxels
    }

    pub fn get_block(&self, location: LocalLocation<WithinBounds>) -> &Block {
        &self.voxels[self.dimensions.index(location)]
    }

    pub fn set_block(&mut self, location: LocalLocation<WithinBounds>, block: Block) {
        let index = self.dimensions.index(location);
        self.voxels[index] = block;
    }

    pub fn try_get_block(&self, location: LocalLocation<OutsideBounds>) -> Option<&Block> {
        Some(self.get_block(location.try_into_checked(self.dimensions)?))
    }

    /// y of the highest non-air voxel in the column, `None` for an empty or out-of-grid column
    pub fn top_height(&self, x: i32, z: i32) -> Option<usize> {
        if !self.dimensions.contains(Vector3::new(x, 0, z)) {
            return None;
        }

        (0..self.dimensions.height as i32)
            .rev()
            .find(|&y| !self.get_block(LocalLocation::new_unchecked(Vector3::new(x, y, z))).is_air())
            .map(|y| y as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LocalLocation<WithinBounds>, &Block)> {
        LocalLocation::iter(self.dimensions).zip(self.voxels.iter())
    }

    /// Two bytes per voxel in grid index order, see [Block::to_wire].
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        self.voxels
            .iter()
            .flat_map(|block| block.to_wire())
            .collect()
    }

    pub fn from_wire_bytes(dimensions: ChunkDimensions, payload: &[u8]) -> Result<Self, ProtocolError> {
        if dimensions.is_empty() {
            return Err(ProtocolError::EmptyDimensions(dimensions));
        }

        let expected = dimensions.volume() * 2;
        if payload.len() != expected {
            return Err(ProtocolError::PayloadLength {
                expected,
                actual: payload.len(),
            });
        }

        let voxels = payload
            .chunks_exact(2)
            .map(|pair| Block::from_wire([pair[0], pair[1]]))
            .collect::<Result<Box<[Block]>, _>>()?;

        Ok(Self { dimensions, voxels })
    }
}
