use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use itertools::{iproduct, Itertools};
use lazy_static::lazy_static;
use voxel_stream::config::DEFAULT_CHUNK_DIMENSIONS;
use voxel_stream::world::chunk::Chunk;
use voxel_stream::world::location::ChunkLocation;
use voxel_stream::world::meshing::MeshBuilder;
use voxel_stream::world::worldgen::{TerrainGenerator, TerrainPreset};

lazy_static! {
    static ref POSITIONS: Vec<ChunkLocation> = iproduct!(-2..2, -2..2)
        .map(|(x, z)| ChunkLocation::new(x, z))
        .collect();
    static ref GENTLE: TerrainGenerator = TerrainGenerator::new(0, DEFAULT_CHUNK_DIMENSIONS, TerrainPreset::GENTLE);
    static ref RUGGED: TerrainGenerator = TerrainGenerator::new(0, DEFAULT_CHUNK_DIMENSIONS, TerrainPreset::RUGGED);
}

fn gen_chunks(generator: &TerrainGenerator) -> Vec<Chunk> {
    POSITIONS
        .iter()
        .map(|&pos| generator.generate_chunk(pos))
        .collect_vec()
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("generate gentle chunks", |b| b.iter(|| gen_chunks(black_box(&GENTLE))));
    c.bench_function("generate rugged chunks", |b| b.iter(|| gen_chunks(black_box(&RUGGED))));

    let chunks = gen_chunks(&GENTLE);
    c.bench_function("mesh chunks", |b| {
        b.iter(|| {
            chunks
                .iter()
                .map(|chunk| MeshBuilder::build_chunk_mesh(black_box(chunk), 16).len())
                .sum::<usize>()
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
