use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use log::{debug, info};
use rayon::prelude::*;

use crate::error::ProtocolError;
use crate::world::chunk::Chunk;
use crate::world::chunk_data::ChunkDimensions;
use crate::world::location::ChunkLocation;
use crate::world::worldgen::TerrainGenerator;

#[derive(Default)]
struct StoreState {
    chunks: HashMap<ChunkLocation, Arc<Chunk>>,
    /// Locations some thread is generating right now
    generating: HashSet<ChunkLocation>,
}

/// Authoritative set of resident chunks, shared between server connections.
///
/// Every operation goes through one mutex that is only held for map bookkeeping.
/// Terrain generation runs outside of it, other threads asking for the same location wait on `generated`.
pub struct ChunkStore {
    generator: TerrainGenerator,
    state: Mutex<StoreState>,
    generated: Condvar,
    generation_count: AtomicUsize,
}

impl ChunkStore {
    pub fn new(generator: TerrainGenerator) -> Self {
        Self {
            generator,
            state: Mutex::new(StoreState::default()),
            generated: Condvar::new(),
            generation_count: AtomicUsize::new(0),
        }
    }

    pub fn generator(&self) -> &TerrainGenerator {
        &self.generator
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the chunk resident, generating it if no other thread has.
    pub fn ensure_generated(&self, location: ChunkLocation) -> Arc<Chunk> {
        let mut state = self.lock();
        loop {
            if let Some(chunk) = state.chunks.get(&location) {
                return Arc::clone(chunk);
            }

            if state.generating.insert(location) {
                break;
            }

            state = self
                .generated
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(state);

        let claim = GenerationClaim { store: self, location };
        let chunk = Arc::new(self.generator.generate_chunk(location));
        self.generation_count.fetch_add(1, Ordering::Relaxed);

        let chunk = {
            let mut state = self.lock();
            Arc::clone(state.chunks.entry(location).or_insert(chunk))
        };
        drop(claim);

        chunk
    }

    pub fn get(&self, location: ChunkLocation) -> Option<Arc<Chunk>> {
        self.lock().chunks.get(&location).cloned()
    }

    pub fn contains(&self, location: ChunkLocation) -> bool {
        self.lock().chunks.contains_key(&location)
    }

    /// Inserts a chunk decoded from wire bytes. Returns whether it was inserted, a resident chunk is kept.
    pub fn load_from_bytes(&self, location: ChunkLocation, dimensions: ChunkDimensions, payload: &[u8]) -> Result<bool, ProtocolError> {
        if self.contains(location) {
            return Ok(false);
        }

        let chunk = Arc::new(Chunk::from_wire_bytes(location, dimensions, payload)?);

        let mut state = self.lock();
        if state.chunks.contains_key(&location) {
            return Ok(false);
        }
        state.chunks.insert(location, chunk);

        Ok(true)
    }

    /// Wire bytes of a resident chunk, empty if it is not resident.
    pub fn serialize(&self, location: ChunkLocation) -> Vec<u8> {
        self.get(location)
            .map(|chunk| chunk.data.to_wire_bytes())
            .unwrap_or_default()
    }

    pub fn unload(&self, location: ChunkLocation) -> bool {
        self.lock().chunks.remove(&location).is_some()
    }

    /// Drops every chunk farther than `distance` from `center` and returns how many were dropped.
    pub fn unload_outside(&self, center: ChunkLocation, distance: i32) -> usize {
        let mut state = self.lock();
        let before = state.chunks.len();
        state
            .chunks
            .retain(|location, _| location.chebyshev_distance(center) <= distance.max(0) as u32);

        before - state.chunks.len()
    }

    pub fn count(&self) -> usize {
        self.lock().chunks.len()
    }

    /// Number of chunks generated by this store over its lifetime
    pub fn generation_count(&self) -> usize {
        self.generation_count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            chunks: self.lock().chunks.clone(),
        }
    }

    /// Generates the neighborhood around `center` in parallel.
    pub fn ensure_area(&self, center: ChunkLocation, radius: i32) {
        let locations = center.neighborhood(radius).collect_vec();
        let before = self.generation_count();

        locations.par_iter().for_each(|&location| {
            self.ensure_generated(location);
        });

        info!(
            "Pregenerated {} chunks around {:?} ({} new)",
            locations.len(),
            center,
            self.generation_count() - before
        );
    }
}

/// Removes the in-progress mark and wakes waiters, even if generation unwinds.
struct GenerationClaim<'a> {
    store: &'a ChunkStore,
    location: ChunkLocation,
}

impl Drop for GenerationClaim<'_> {
    fn drop(&mut self) {
        self.store.lock().generating.remove(&self.location);
        self.store.generated.notify_all();
        debug!("Finished generating chunk {:?}", self.location);
    }
}

/// Point-in-time view of the resident chunks. Chunks unloaded afterwards stay alive until the snapshot is dropped.
#[derive(Clone, Default)]
pub struct StoreSnapshot {
    chunks: HashMap<ChunkLocation, Arc<Chunk>>,
}

impl StoreSnapshot {
    pub fn get(&self, location: ChunkLocation) -> Option<&Chunk> {
        self.chunks.get(&location).map(Arc::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use crate::error::ProtocolError;
    use crate::world::chunk_data::ChunkDimensions;
    use crate::world::chunk_store::ChunkStore;
    use crate::world::location::ChunkLocation;
    use crate::world::worldgen::{TerrainGenerator, TerrainPreset};

    const DIMENSIONS: ChunkDimensions = ChunkDimensions::new(16, 64, 16);

    fn store() -> ChunkStore {
        ChunkStore::new(TerrainGenerator::new(9, DIMENSIONS, TerrainPreset::GENTLE))
    }

    #[test]
    fn test_ensure_generated_is_idempotent() {
        let store = store();
        let location = ChunkLocation::new(1, 2);

        let first = store.ensure_generated(location);
        let second = store.ensure_generated(location);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.count(), 1);
        assert_eq!(store.generation_count(), 1);
    }

    #[test]
    fn test_concurrent_requests_generate_once() {
        let store = Arc::new(store());
        let barrier = Arc::new(Barrier::new(8));
        let location = ChunkLocation::new(-4, 0);

        let handles = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.ensure_generated(location)
                })
            })
            .collect::<Vec<_>>();

        let chunks = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(store.generation_count(), 1);
        assert!(chunks.iter().all(|chunk| Arc::ptr_eq(chunk, &chunks[0])));
    }

    #[test]
    fn test_serialize_matches_chunk() {
        let store = store();
        let location = ChunkLocation::new(0, 0);

        assert!(store.serialize(location).is_empty());

        let chunk = store.ensure_generated(location);
        let bytes = store.serialize(location);

        assert_eq!(bytes.len(), DIMENSIONS.volume() * 2);
        assert_eq!(bytes, chunk.data.to_wire_bytes());
    }

    #[test]
    fn test_load_from_bytes() {
        let source = store();
        let location = ChunkLocation::new(3, 3);
        let bytes = source.ensure_generated(location).data.to_wire_bytes();

        let target = store();
        assert_eq!(target.load_from_bytes(location, DIMENSIONS, &bytes), Ok(true));
        assert_eq!(target.load_from_bytes(location, DIMENSIONS, &bytes), Ok(false));
        assert_eq!(target.generation_count(), 0);
        assert_eq!(target.get(location), source.get(location));

        assert_eq!(
            target.load_from_bytes(ChunkLocation::new(0, 0), DIMENSIONS, &bytes[1..]),
            Err(ProtocolError::PayloadLength {
                expected: bytes.len(),
                actual: bytes.len() - 1
            })
        );
        assert_eq!(target.count(), 1);
    }

    #[test]
    fn test_unload() {
        let store = store();
        store.ensure_area(ChunkLocation::new(0, 0), 2);
        assert_eq!(store.count(), 25);

        assert!(store.unload(ChunkLocation::new(2, 2)));
        assert!(!store.unload(ChunkLocation::new(2, 2)));
        assert_eq!(store.unload_outside(ChunkLocation::new(0, 0), 1), 15);
        assert_eq!(store.count(), 9);
        assert!(store.get(ChunkLocation::new(0, 0)).is_some());
    }

    #[test]
    fn test_snapshot_outlives_unload() {
        let store = store();
        let location = ChunkLocation::new(5, 5);
        store.ensure_generated(location);

        let snapshot = store.snapshot();
        store.unload(location);

        assert_eq!(store.count(), 0);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(location).map(|chunk| chunk.location), Some(location));
        assert!(snapshot.iter().all(|chunk| chunk.dimensions() == DIMENSIONS));
    }
}
