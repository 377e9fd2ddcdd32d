pub mod chunk;
pub mod chunk_data;
pub mod chunk_loader;
pub mod chunk_store;
pub mod location;
pub mod mesh;
pub mod meshing;
pub mod ramps;
pub mod voxel_data;
pub mod worldgen;
