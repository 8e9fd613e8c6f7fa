//! Terrain as seen by the allocator: which regions exist yet, and what block
//! sits at a given position once a region is loaded.

use futures_util::{
    future::{self, BoxFuture, Shared},
    FutureExt,
};
use hashbrown::{hash_map::Entry, HashMap};
use parking_lot::{Mutex, RwLock};
use rand::{prelude::*, rngs::SmallRng};
use std::{fmt, sync::Arc};
use tracing::{debug, trace};
use vek::*;

/// Side length, in blocks, of a square terrain chunk.
pub const CHUNK_SIZE: i32 = 32;

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
#[repr(u8)]
pub enum BlockKind {
    Air = 0x00, // Air counts as a fluid
    Water = 0x01,
    // 0x02 <= x < 0x10 are reserved for other fluids
    Rock = 0x10,
    Grass = 0x20,
    Earth = 0x30,
    Sand = 0x31,
}

impl BlockKind {
    /// Gases and liquids. A plot can be placed over these.
    #[inline]
    pub const fn is_fluid(&self) -> bool { *self as u8 & 0xF0 == 0x00 }

    #[inline]
    pub const fn is_filled(&self) -> bool { !self.is_fluid() }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{:?}", self) }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerrainError {
    /// The load was dropped or its worker panicked before finishing.
    Cancelled,
    /// The generator refused to produce the chunk.
    Generation(String),
    /// The chunk lies beyond the edge of the world.
    OutOfBounds(Vec2<i32>),
}

impl fmt::Display for TerrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "terrain load was cancelled"),
            Self::Generation(msg) => write!(f, "terrain generation failed: {}", msg),
            Self::OutOfBounds(key) => write!(f, "chunk {:?} is outside of the world", key),
        }
    }
}

impl std::error::Error for TerrainError {}

/// A loaded piece of terrain.
pub trait RegionContent: Send + Sync {
    /// The block at `wpos`, or `None` if `wpos` is not part of this region.
    fn block(&self, wpos: Vec3<i32>) -> Option<BlockKind>;
}

/// The terrain of one world.
pub trait Terrain: Send + Sync {
    /// Whether the region containing `wpos` has been generated already.
    fn is_generated(&self, wpos: Vec2<i32>) -> bool;

    /// Load (generating if necessary) the region containing `wpos`.
    fn load_region(
        &self,
        wpos: Vec2<i32>,
    ) -> BoxFuture<'static, Result<Arc<dyn RegionContent>, TerrainError>>;
}

pub fn chunk_key(wpos: Vec2<i32>) -> Vec2<i32> { wpos.map(|e| e.div_euclid(CHUNK_SIZE)) }

/// A column-based chunk: every column is `ground` up to its height, water up
/// to the sea level and air above that.
#[derive(Clone, Debug)]
pub struct TerrainChunk {
    key: Vec2<i32>,
    heights: Vec<i32>,
    ground: BlockKind,
    sea_level: i32,
}

impl TerrainChunk {
    pub fn new(key: Vec2<i32>, height: i32, ground: BlockKind, sea_level: i32) -> Self {
        Self::from_fn(key, ground, sea_level, |_| height)
    }

    /// Build a chunk with a per-column height, `height_at` receives the
    /// world position of the column.
    pub fn from_fn(
        key: Vec2<i32>,
        ground: BlockKind,
        sea_level: i32,
        mut height_at: impl FnMut(Vec2<i32>) -> i32,
    ) -> Self {
        let base = key * CHUNK_SIZE;
        let heights = (0..CHUNK_SIZE)
            .flat_map(|y| (0..CHUNK_SIZE).map(move |x| Vec2::new(x, y)))
            .map(|rpos| height_at(base + rpos))
            .collect();
        Self {
            key,
            heights,
            ground,
            sea_level,
        }
    }

    pub fn key(&self) -> Vec2<i32> { self.key }

    fn column(&self, wpos: Vec2<i32>) -> Option<i32> {
        if chunk_key(wpos) != self.key {
            return None;
        }
        let rpos = wpos - self.key * CHUNK_SIZE;
        self.heights.get((rpos.y * CHUNK_SIZE + rpos.x) as usize).copied()
    }
}

impl RegionContent for TerrainChunk {
    fn block(&self, wpos: Vec3<i32>) -> Option<BlockKind> {
        let height = self.column(wpos.xy())?;
        Some(if wpos.z <= height {
            self.ground
        } else if wpos.z <= self.sea_level {
            BlockKind::Water
        } else {
            BlockKind::Air
        })
    }
}

/// Produces chunks on demand. Runs on a blocking worker thread.
pub trait ChunkGen: Send + Sync {
    fn generate(&self, key: Vec2<i32>) -> Result<TerrainChunk, TerrainError>;
}

impl<G: ChunkGen + ?Sized> ChunkGen for Box<G> {
    fn generate(&self, key: Vec2<i32>) -> Result<TerrainChunk, TerrainError> {
        (**self).generate(key)
    }
}

/// Featureless terrain of a single height.
pub struct FlatGen {
    pub height: i32,
    pub ground: BlockKind,
    pub sea_level: i32,
}

impl ChunkGen for FlatGen {
    fn generate(&self, key: Vec2<i32>) -> Result<TerrainChunk, TerrainError> {
        Ok(TerrainChunk::new(
            key,
            self.height,
            self.ground,
            self.sea_level,
        ))
    }
}

/// Open ocean dotted with the occasional island chunk, bounded to a square
/// of `radius` chunks around the origin.
pub struct IslandGen {
    pub seed: u32,
    pub sea_level: i32,
    pub radius: i32,
}

impl ChunkGen for IslandGen {
    fn generate(&self, key: Vec2<i32>) -> Result<TerrainChunk, TerrainError> {
        if key.map(i32::abs).reduce_max() > self.radius {
            return Err(TerrainError::OutOfBounds(key));
        }

        let (x, y) = key.map(|e| e.to_le_bytes()).into_tuple();
        let s = self.seed.to_le_bytes();
        let mut rng = SmallRng::from_seed([
            x[0], x[1], x[2], x[3], y[0], y[1], y[2], y[3], s[0], s[1], s[2], s[3], x[0], x[1],
            x[2], x[3], y[0], y[1], y[2], y[3], s[0], s[1], s[2], s[3], x[0], x[1], x[2], x[3],
            y[0], y[1], y[2], y[3],
        ]);

        Ok(if rng.gen::<u8>() < 32 {
            let peak = self.sea_level + rng.gen_range(1..24);
            TerrainChunk::new(key, peak, BlockKind::Grass, self.sea_level)
        } else {
            let floor = self.sea_level - rng.gen_range(4..40);
            TerrainChunk::new(key, floor, BlockKind::Sand, self.sea_level)
        })
    }
}

type ChunkLoad = Shared<BoxFuture<'static, Result<Arc<TerrainChunk>, TerrainError>>>;

/// In-memory terrain backed by a [`ChunkGen`].
///
/// Chunks are generated lazily on a blocking worker when first loaded.
/// Concurrent loads of the same chunk share a single generation.
#[derive(Clone)]
pub struct ChunkStore {
    chunks: Arc<RwLock<HashMap<Vec2<i32>, Arc<TerrainChunk>>>>,
    pending: Arc<Mutex<HashMap<Vec2<i32>, ChunkLoad>>>,
    gen: Arc<dyn ChunkGen>,
}

impl ChunkStore {
    pub fn new(gen: impl ChunkGen + 'static) -> Self {
        Self {
            chunks: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            gen: Arc::new(gen),
        }
    }

    /// Synchronously generate the chunks in the square of `radius` chunks
    /// around `key`. Already generated chunks are left alone.
    pub fn pregenerate(&self, key: Vec2<i32>, radius: i32) -> Result<(), TerrainError> {
        for y in -radius..=radius {
            for x in -radius..=radius {
                let key = key + Vec2::new(x, y);
                if self.chunks.read().contains_key(&key) {
                    continue;
                }
                let chunk = self.gen.generate(key)?;
                self.insert(chunk);
            }
        }
        Ok(())
    }

    /// Insert a chunk unless one with the same key exists already.
    pub fn insert(&self, chunk: TerrainChunk) -> Arc<TerrainChunk> {
        Arc::clone(
            self.chunks
                .write()
                .entry(chunk.key())
                .or_insert_with(|| Arc::new(chunk)),
        )
    }

    pub fn get(&self, key: Vec2<i32>) -> Option<Arc<TerrainChunk>> {
        self.chunks.read().get(&key).cloned()
    }

    pub fn len(&self) -> usize { self.chunks.read().len() }

    pub fn is_empty(&self) -> bool { self.chunks.read().is_empty() }

    pub fn load_chunk(
        &self,
        key: Vec2<i32>,
    ) -> BoxFuture<'static, Result<Arc<TerrainChunk>, TerrainError>> {
        if let Some(chunk) = self.get(key) {
            return future::ready(Ok(chunk)).boxed();
        }

        let mut pending = self.pending.lock();
        // Re-check under the pending lock, a load may have finished meanwhile
        if let Some(chunk) = self.get(key) {
            return future::ready(Ok(chunk)).boxed();
        }
        let load = match pending.entry(key) {
            Entry::Occupied(o) => {
                trace!(?key, "joining pending chunk load");
                o.get().clone()
            },
            Entry::Vacant(v) => {
                debug!(?key, "generating chunk");
                let gen = Arc::clone(&self.gen);
                let store = self.clone();
                let load = async move {
                    let res = match tokio::task::spawn_blocking(move || gen.generate(key)).await {
                        Ok(res) => res.map(|chunk| store.insert(chunk)),
                        Err(_) => Err(TerrainError::Cancelled),
                    };
                    store.pending.lock().remove(&key);
                    res
                }
                .boxed()
                .shared();
                v.insert(load.clone());
                load
            },
        };
        load.boxed()
    }
}

impl Terrain for ChunkStore {
    fn is_generated(&self, wpos: Vec2<i32>) -> bool {
        self.chunks.read().contains_key(&chunk_key(wpos))
    }

    fn load_region(
        &self,
        wpos: Vec2<i32>,
    ) -> BoxFuture<'static, Result<Arc<dyn RegionContent>, TerrainError>> {
        self.load_chunk(chunk_key(wpos))
            .map(|res| res.map(|chunk| chunk as Arc<dyn RegionContent>))
            .boxed()
    }
}
