use std::marker::PhantomData;
use std::ops::{Add, Deref, Sub};

use cgmath::Vector3;
use itertools::iproduct;

use crate::world::chunk_data::ChunkDimensions;

/// The location of a specific chunk column in the world.
/// Each ChunkLocation unit spans one `chunk_size` along x and z when rendering.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ChunkLocation {
    pub x: i32,
    pub z: i32,
}

impl ChunkLocation {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The chunk containing a world-space position, using floor division so negative positions map to negative chunks.
    pub fn from_world_position(position: Vector3<f32>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size as f32;

        Self::new((position.x / chunk_size).floor() as i32, (position.z / chunk_size).floor() as i32)
    }

    pub fn to_world_position(self, chunk_size: usize) -> Vector3<f32> {
        let chunk_size = chunk_size as f32;

        Vector3::new(self.x as f32 * chunk_size, 0.0, self.z as f32 * chunk_size)
    }

    /// World-space x and z of the chunk's first voxel column
    pub fn to_world_voxel(self, width: usize, depth: usize) -> (i64, i64) {
        (self.x as i64 * width as i64, self.z as i64 * depth as i64)
    }

    /// Chunk coordinates wrap around like their wire encoding, so the distance is measured the short way.
    pub fn chebyshev_distance(self, other: ChunkLocation) -> u32 {
        let offset = self - other;

        offset.x.unsigned_abs().max(offset.z.unsigned_abs())
    }

    /// Every location of the square neighborhood with the given radius, nearest rings first.
    pub fn neighborhood(self, radius: i32) -> impl Iterator<Item = ChunkLocation> {
        let radius = radius.max(0);

        (0..=radius).flat_map(move |ring| {
            iproduct!(-ring..=ring, -ring..=ring)
                .filter(move |&(dz, dx)| dx.abs() == ring || dz.abs() == ring)
                .map(move |(dz, dx)| self + ChunkLocation::new(dx, dz))
        })
    }
}

impl Add for ChunkLocation {
    type Output = ChunkLocation;

    fn add(self, rhs: Self) -> Self::Output {
        ChunkLocation::new(self.x.wrapping_add(rhs.x), self.z.wrapping_add(rhs.z))
    }
}

impl Sub for ChunkLocation {
    type Output = ChunkLocation;

    fn sub(self, rhs: Self) -> Self::Output {
        ChunkLocation::new(self.x.wrapping_sub(rhs.x), self.z.wrapping_sub(rhs.z))
    }
}

/// A local location inside of a specific chunk's voxel grid.
/// The generic type `State` signals whether it is confirmed that the location is within the grid boundaries.
/// It can be either one of [WithinBounds] or [OutsideBounds].
/// When creating a new location, State=OutsideBounds is assumed. To get a State=WithinBounds the method [LocalLocation::try_into_checked] can be called.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LocalLocation<State = OutsideBounds> {
    location: Vector3<i32>,
    phantom: PhantomData<State>,
}

/// Marker type for [LocalLocation]
/// It is known for the local location to be within the grid boundaries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WithinBounds;

/// Marker type for [LocalLocation]
/// It is unknown whether the local location is within the grid boundaries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OutsideBounds;

impl LocalLocation {
    /// Iterates all locations of a grid in index order: x fastest, z slowest.
    pub fn iter(dimensions: ChunkDimensions) -> impl Iterator<Item = LocalLocation<WithinBounds>> {
        iproduct!(0..dimensions.depth as i32, 0..dimensions.height as i32, 0..dimensions.width as i32)
            .map(|(z, y, x)| LocalLocation::new_unchecked(Vector3::new(x, y, z)))
    }
}

impl LocalLocation<OutsideBounds> {
    pub fn new(location: Vector3<i32>) -> Self {
        Self {
            location,
            phantom: PhantomData,
        }
    }

    pub fn try_into_checked(self, dimensions: ChunkDimensions) -> Option<LocalLocation<WithinBounds>> {
        dimensions
            .contains(self.location)
            .then(|| LocalLocation::new_unchecked(self.location))
    }
}

impl LocalLocation<WithinBounds> {
    pub fn new_unchecked(location: Vector3<i32>) -> Self {
        LocalLocation {
            location,
            phantom: PhantomData,
        }
    }
}

impl<T> LocalLocation<T> {
    pub fn to_f32(self) -> Vector3<f32> {
        Vector3::new(self.location.x as f32, self.location.y as f32, self.location.z as f32)
    }
}

impl<T, A: Into<Vector3<i32>>> Add<A> for LocalLocation<T> {
    type Output = LocalLocation<OutsideBounds>;

    fn add(self, rhs: A) -> Self::Output {
        LocalLocation::new(self.location + rhs.into())
    }
}

impl<T> Deref for LocalLocation<T> {
    type Target = Vector3<i32>;

    fn deref(&self) -> &Self::Target {
        &self.location
    }
}
