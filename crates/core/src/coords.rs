//! Coordinate spaces: world blocks, chunk keys and chunk-local positions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chunk width and depth (X and Z axes) in blocks.
pub const CHUNK_SIZE: i32 = 16;

/// Chunk height (Y axis) in blocks.
pub const CHUNK_HEIGHT: i32 = 128;

/// Chunk coordinate (X, Z) in chunk space; the unit of streaming and caching.
/// Implements Ord for deterministic iteration in BTreeMap/BTreeSet (sorts by x, then z).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChunkKey {
    /// Chunk X coordinate.
    pub x: i32,
    /// Chunk Z coordinate.
    pub z: i32,
}

impl ChunkKey {
    /// Create a key from chunk coordinates.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the given (possibly fractional) world position.
    pub fn containing(x: f64, z: f64) -> Self {
        Self::new(
            (x.floor() as i32).div_euclid(CHUNK_SIZE),
            (z.floor() as i32).div_euclid(CHUNK_SIZE),
        )
    }

    /// Squared Euclidean distance to another key, in chunks.
    pub fn distance_sq(self, other: ChunkKey) -> i64 {
        let dx = i64::from(self.x - other.x);
        let dz = i64::from(self.z - other.z);
        dx * dx + dz * dz
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Chunk-local block position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalPos {
    /// X offset inside the chunk (0-15).
    pub x: usize,
    /// Height (0-127).
    pub y: usize,
    /// Z offset inside the chunk (0-15).
    pub z: usize,
}

impl LocalPos {
    /// Linear index into column-major chunk storage (Y fastest, then Z, then X).
    pub fn index(self) -> usize {
        debug_assert!(self.x < CHUNK_SIZE as usize);
        debug_assert!(self.y < CHUNK_HEIGHT as usize);
        debug_assert!(self.z < CHUNK_SIZE as usize);
        (self.x * CHUNK_SIZE as usize + self.z) * CHUNK_HEIGHT as usize + self.y
    }
}

/// Absolute block coordinate in world space.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockPos {
    /// World X coordinate.
    pub x: i32,
    /// World Y coordinate (height).
    pub y: i32,
    /// World Z coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Create a block position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Split into the owning chunk and the position inside it.
    ///
    /// Returns `None` for positions outside the vertical range of a chunk.
    pub fn split(self) -> Option<(ChunkKey, LocalPos)> {
        if !(0..CHUNK_HEIGHT).contains(&self.y) {
            return None;
        }
        Some((self.chunk(), self.local()))
    }

    /// Owning chunk, ignoring the vertical range.
    pub fn chunk(self) -> ChunkKey {
        ChunkKey::new(self.x.div_euclid(CHUNK_SIZE), self.z.div_euclid(CHUNK_SIZE))
    }

    fn local(self) -> LocalPos {
        LocalPos {
            x: self.x.rem_euclid(CHUNK_SIZE) as usize,
            y: self.y as usize,
            z: self.z.rem_euclid(CHUNK_SIZE) as usize,
        }
    }

    /// This position moved by the given deltas, or `None` past the edge of the
    /// coordinate space.
    pub fn translate(self, dx: i32, dy: i32, dz: i32) -> Option<Self> {
        Some(Self::new(
            self.x.checked_add(dx)?,
            self.y.checked_add(dy)?,
            self.z.checked_add(dz)?,
        ))
    }

    /// Neighbouring block across `face`, or `None` past the edge of the coordinate space.
    pub fn offset(self, face: Face) -> Option<Self> {
        let (dx, dy, dz) = face.offset();
        self.translate(dx, dy, dz)
    }

    /// Entity anchor for this block in 1/32-block units: horizontally centred,
    /// vertically on the block floor.
    ///
    /// `None` when the block lies too far out for fixed point.
    pub fn centroid_fixed(self) -> Option<(i32, i32, i32)> {
        let fixed = |v: i32, half: i32| -> Option<i32> { v.checked_mul(32)?.checked_add(half) };
        Some((fixed(self.x, 16)?, fixed(self.y, 0)?, fixed(self.z, 16)?))
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// The six cardinal block faces in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Face {
    /// -Y
    Bottom = 0,
    /// +Y
    Top = 1,
    /// -Z
    North = 2,
    /// +Z
    South = 3,
    /// -X
    West = 4,
    /// +X
    East = 5,
}

impl Face {
    /// Unit offset towards the neighbour on this face.
    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            Face::Bottom => (0, -1, 0),
            Face::Top => (0, 1, 0),
            Face::North => (0, 0, -1),
            Face::South => (0, 0, 1),
            Face::West => (-1, 0, 0),
            Face::East => (1, 0, 0),
        }
    }
}

impl TryFrom<u8> for Face {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Face::Bottom),
            1 => Ok(Face::Top),
            2 => Ok(Face::North),
            3 => Ok(Face::South),
            4 => Ok(Face::West),
            5 => Ok(Face::East),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_handles_negative_coordinates() {
        let (chunk, local) = BlockPos::new(-1, 64, -17).split().unwrap();
        assert_eq!(chunk, ChunkKey::new(-1, -2));
        assert_eq!((local.x, local.y, local.z), (15, 64, 15));
    }

    #[test]
    fn split_rejects_out_of_range_height() {
        assert!(BlockPos::new(0, -1, 0).split().is_none());
        assert!(BlockPos::new(0, CHUNK_HEIGHT, 0).split().is_none());
    }

    #[test]
    fn containing_floors_fractional_positions() {
        assert_eq!(ChunkKey::containing(15.9, 0.0), ChunkKey::new(0, 0));
        assert_eq!(ChunkKey::containing(16.0, -0.5), ChunkKey::new(1, -1));
    }

    #[test]
    fn face_offsets_cover_all_axes() {
        let origin = BlockPos::new(0, 64, 0);
        assert_eq!(origin.offset(Face::Bottom), Some(BlockPos::new(0, 63, 0)));
        assert_eq!(origin.offset(Face::Top), Some(BlockPos::new(0, 65, 0)));
        assert_eq!(origin.offset(Face::North), Some(BlockPos::new(0, 64, -1)));
        assert_eq!(origin.offset(Face::South), Some(BlockPos::new(0, 64, 1)));
        assert_eq!(origin.offset(Face::West), Some(BlockPos::new(-1, 64, 0)));
        assert_eq!(origin.offset(Face::East), Some(BlockPos::new(1, 64, 0)));
    }

    #[test]
    fn offset_past_the_coordinate_edge_is_none() {
        assert_eq!(BlockPos::new(i32::MAX, 64, 0).offset(Face::East), None);
        assert_eq!(BlockPos::new(0, 64, i32::MIN).offset(Face::North), None);
        assert_eq!(
            BlockPos::new(i32::MAX, 64, 0).offset(Face::West),
            Some(BlockPos::new(i32::MAX - 1, 64, 0))
        );
    }

    #[test]
    fn centroid_is_centred_on_the_block_floor() {
        assert_eq!(BlockPos::new(0, 50, 0).centroid_fixed(), Some((16, 1600, 16)));
        assert_eq!(BlockPos::new(-1, 0, 2).centroid_fixed(), Some((-16, 0, 80)));
        assert_eq!(BlockPos::new(i32::MAX, 64, 0).centroid_fixed(), None);
    }

    #[test]
    fn face_from_wire_value() {
        assert_eq!(Face::try_from(5), Ok(Face::East));
        assert_eq!(Face::try_from(255), Err(255));
    }

    #[test]
    fn local_index_is_dense() {
        let last = LocalPos {
            x: 15,
            y: CHUNK_HEIGHT as usize - 1,
            z: 15,
        };
        assert_eq!(last.index(), (16 * 16 * CHUNK_HEIGHT) as usize - 1);
    }

    #[test]
    fn distance_is_squared_euclidean() {
        assert_eq!(ChunkKey::new(0, 0).distance_sq(ChunkKey::new(3, -4)), 25);
    }
}
