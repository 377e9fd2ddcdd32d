use cgmath::prelude::*;
use cgmath::{Vector2, Vector3};

use crate::world::chunk::Chunk;
use crate::world::chunk_data::VoxelGrid;
use crate::world::mesh::Vertex;
use crate::world::meshing::templates::{TemplateVertex, CUBE, RAMPS};
use crate::world::voxel_data::BlockType;

pub mod templates;

/// Size of one material tile in the 4x1 texture atlas
pub const ATLAS_TILE_SIZE: Vector2<f32> = Vector2::new(0.25, 1.0);

pub fn atlas_offset(ty: BlockType) -> Option<Vector2<f32>> {
    let u = match ty {
        BlockType::Air => return None,
        BlockType::Grass => 0.0,
        BlockType::Stone => 0.25,
        BlockType::Dirt => 0.5,
        BlockType::Ore => 0.75,
    };

    Some(Vector2::new(u, 0.0))
}

/// Turns voxel grids into triangle lists, three vertices per triangle, no shared indices.
/// Every non-air voxel emits its full shape, faces between solid neighbors are kept.
pub struct MeshBuilder;

impl MeshBuilder {
    /// Mesh in grid-local coordinates, voxel centers at integer positions
    pub fn build(grid: &VoxelGrid) -> Vec<Vertex> {
        Self::build_with_offset(grid, Vector3::zero())
    }

    /// Mesh of a chunk moved to its place in the world
    pub fn build_chunk_mesh(chunk: &Chunk, chunk_size: usize) -> Vec<Vertex> {
        Self::build_with_offset(&chunk.data, chunk.location.to_world_position(chunk_size))
    }

    fn build_with_offset(grid: &VoxelGrid, offset: Vector3<f32>) -> Vec<Vertex> {
        let mut vertices = Vec::new();

        for (location, block) in grid.iter() {
            let Some(atlas_offset) = atlas_offset(block.ty) else {
                continue;
            };

            let template: &[TemplateVertex] = match block.ramp {
                Some(direction) => &RAMPS[direction],
                None => &CUBE,
            };

            let center = offset + location.to_f32();
            vertices.extend(
                template
                    .iter()
                    .map(|vertex| Vertex::new(center + vertex.position, atlas_offset + vertex.uv.mul_element_wise(ATLAS_TILE_SIZE))),
            );
        }

        vertices
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Vector2, Vector3};
    use test_case::test_case;

    use crate::world::chunk::Chunk;
    use crate::world::chunk_data::{ChunkDimensions, VoxelGrid};
    use crate::world::location::{ChunkLocation, LocalLocation};
    use crate::world::meshing::{atlas_offset, MeshBuilder};
    use crate::world::voxel_data::{Block, BlockType, RampDirection};

    fn single_voxel(block: Block) -> VoxelGrid {
        let mut grid = VoxelGrid::new_filled_with(ChunkDimensions::new(2, 2, 2), Block::AIR);
        grid.set_block(LocalLocation::new_unchecked(Vector3::new(1, 0, 1)), block);
        grid
    }

    #[test]
    fn test_air_emits_nothing() {
        let grid = VoxelGrid::new_filled_with(ChunkDimensions::new(4, 4, 4), Block::AIR);

        assert!(MeshBuilder::build(&grid).is_empty());
    }

    #[test]
    fn test_single_cube() {
        let vertices = MeshBuilder::build(&single_voxel(Block::new(BlockType::Grass)));

        assert_eq!(vertices.len(), 36);
        for vertex in &vertices {
            let position = vertex.position();
            assert!((0.5..=1.5).contains(&position.x));
            assert!((-0.5..=0.5).contains(&position.y));
            assert!((0.5..=1.5).contains(&position.z));
            assert!((0.0..=0.25).contains(&vertex.tex_coords[0]));
        }
    }

    #[test_case(RampDirection::North, 24 ; "cardinal wedge")]
    #[test_case(RampDirection::SouthWest, 18 ; "diagonal corner")]
    fn test_ramp_vertex_count(direction: RampDirection, expected: usize) {
        let vertices = MeshBuilder::build(&single_voxel(Block::ramp(BlockType::Dirt, direction)));

        assert_eq!(vertices.len(), expected);
        assert!(vertices.iter().all(|v| (0.5..=0.75).contains(&v.tex_coords[0])));
    }

    #[test]
    fn test_no_culling_between_neighbors() {
        let grid = VoxelGrid::new_filled_with(ChunkDimensions::new(2, 1, 1), Block::new(BlockType::Stone));

        assert_eq!(MeshBuilder::build(&grid).len(), 72);
    }

    #[test]
    fn test_chunk_mesh_is_translated() {
        let chunk = Chunk::new(ChunkLocation::new(1, -2), single_voxel(Block::new(BlockType::Ore)));
        let vertices = MeshBuilder::build_chunk_mesh(&chunk, 16);

        assert_eq!(vertices.len(), 36);
        for vertex in &vertices {
            let position = vertex.position();
            assert!((16.5..=17.5).contains(&position.x));
            assert!((-31.5..=-30.5).contains(&position.z));
            assert!((0.75..=1.0).contains(&vertex.tex_coords[0]));
        }
    }

    #[test]
    fn test_atlas_offsets() {
        assert_eq!(atlas_offset(BlockType::Air), None);
        assert_eq!(atlas_offset(BlockType::Grass), Some(Vector2::new(0.0, 0.0)));
        assert_eq!(atlas_offset(BlockType::Stone), Some(Vector2::new(0.25, 0.0)));
        assert_eq!(atlas_offset(BlockType::Dirt), Some(Vector2::new(0.5, 0.0)));
        assert_eq!(atlas_offset(BlockType::Ore), Some(Vector2::new(0.75, 0.0)));
    }
}
