use crate::error::ProtocolError;
use crate::world::chunk_data::{ChunkDimensions, VoxelGrid};
use crate::world::location::ChunkLocation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub location: ChunkLocation,
    pub data: VoxelGrid,
}

impl Chunk {
    pub fn new(location: ChunkLocation, data: VoxelGrid) -> Self {
        Self { location, data }
    }

    pub fn from_wire_bytes(location: ChunkLocation, dimensions: ChunkDimensions, payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self::new(location, VoxelGrid::from_wire_bytes(dimensions, payload)?))
    }

    pub fn dimensions(&self) -> ChunkDimensions {
        self.data.dimensions()
    }
}
