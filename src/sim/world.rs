//! Deterministic chunk streaming
//!
//! The world is an infinite grid of 16x16-tile chunks. A chunk's content is a
//! pure function of its coordinate and the world seed, so every peer builds
//! the same terrain without transmitting it.
//!
//! World-format contract: each tile draws from three independent PCG32
//! streams seeded by `stream_seed(world_seed, salt, x, y)`:
//! - tile stream at the tile's global coordinate (grass, decor, props, jitter)
//! - patch stream at `floor(g / 6)` (flower patches)
//! - biome stream at `floor(g / 32)` (forest vs. open land)

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::obstacles::{Obstacle, ObstacleId, ObstacleIndex, ObstacleKind, TreeVariant};
use crate::consts::{CHUNK_SIZE, CHUNK_TILES, LOAD_RADIUS, TILE_SIZE};

const SALT_TILE: u64 = 0x7469_6c65;
const SALT_PATCH: u64 = 0x7061_7463;
const SALT_BIOME: u64 = 0x6269_6f6d;

const PATCH_SCALE: i32 = 6;
const BIOME_SCALE: i32 = 32;

const SMALL_ROCK_CHANCE: f32 = 0.03;
const PAVING_CHANCE: f32 = 0.02;
const FLOWER_PATCH_DENSITY: f32 = 0.12;
const FLOWER_CHANCE: f32 = 0.35;
const FOREST_CHANCE: f32 = 0.35;
const PROP_JITTER: f32 = 15.0;

/// Integer chunk coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
}

impl ChunkCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// World position of the chunk's top-left corner
    pub fn origin(self) -> Vec2 {
        Vec2::new(self.x as f32, self.y as f32) * CHUNK_SIZE
    }

    pub fn chebyshev(self, other: ChunkCoord) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

/// Chunk containing a world position (floor division on both axes)
pub fn chunk_coord(pos: Vec2) -> ChunkCoord {
    ChunkCoord::new(
        (pos.x / CHUNK_SIZE).floor() as i32,
        (pos.y / CHUNK_SIZE).floor() as i32,
    )
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed for the stream identified by `salt` at integer coordinate (x, y)
pub fn stream_seed(world_seed: u64, salt: u64, x: i32, y: i32) -> u64 {
    let h = splitmix64(world_seed ^ salt.rotate_left(17));
    let h = splitmix64(h ^ x as u32 as u64);
    splitmix64(h ^ (y as u32 as u64).rotate_left(32))
}

fn stream(world_seed: u64, salt: u64, x: i32, y: i32) -> Pcg32 {
    Pcg32::seed_from_u64(stream_seed(world_seed, salt, x, y))
}

/// Ground decoration on a floor tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloorDecor {
    None,
    SmallRock(u8),
    Paving(u8),
    Flowers(u8),
}

/// One floor tile, for the renderer to bake into the chunk surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorTile {
    pub grass: u8,
    pub decor: FloorDecor,
}

/// A prop to be turned into an obstacle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropSpec {
    pub kind: ObstacleKind,
    /// Visual top-left in world units
    pub pos: Vec2,
}

/// Everything generated for one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkContent {
    pub coord: ChunkCoord,
    /// Row-major, `CHUNK_TILES * CHUNK_TILES`
    pub floor: Vec<FloorTile>,
    /// In tile order
    pub props: Vec<PropSpec>,
}

/// Generate a chunk's content
pub fn generate_chunk(world_seed: u64, coord: ChunkCoord) -> ChunkContent {
    let tiles = (CHUNK_TILES * CHUNK_TILES) as usize;
    let mut floor = Vec::with_capacity(tiles);
    let mut props = Vec::new();

    for ty in 0..CHUNK_TILES {
        for tx in 0..CHUNK_TILES {
            let gx = coord.x * CHUNK_TILES + tx;
            let gy = coord.y * CHUNK_TILES + ty;
            let mut rng = stream(world_seed, SALT_TILE, gx, gy);

            let in_patch = stream(
                world_seed,
                SALT_PATCH,
                gx.div_euclid(PATCH_SCALE),
                gy.div_euclid(PATCH_SCALE),
            )
            .random::<f32>()
                < FLOWER_PATCH_DENSITY;
            let forest = stream(
                world_seed,
                SALT_BIOME,
                gx.div_euclid(BIOME_SCALE),
                gy.div_euclid(BIOME_SCALE),
            )
            .random::<f32>()
                < FOREST_CHANCE;

            let grass = rng.random_range(0..4u8);
            let variant = rng.random_range(0..4u8);
            let roll: f32 = rng.random();
            let decor = if roll < SMALL_ROCK_CHANCE {
                FloorDecor::SmallRock(variant)
            } else if roll < SMALL_ROCK_CHANCE + PAVING_CHANCE {
                FloorDecor::Paving(variant)
            } else if in_patch && rng.random::<f32>() < FLOWER_CHANCE {
                FloorDecor::Flowers(variant)
            } else {
                FloorDecor::None
            };
            floor.push(FloorTile { grass, decor });

            let (tree_threshold, rock_threshold) = if forest { (0.22, 0.25) } else { (0.012, 0.03) };
            let roll: f32 = rng.random();
            let kind = if roll < tree_threshold {
                let v: f32 = rng.random();
                Some(ObstacleKind::Tree(if v < 0.4 {
                    TreeVariant::Big
                } else if v < 0.7 {
                    TreeVariant::Medium
                } else {
                    TreeVariant::Small
                }))
            } else if roll < rock_threshold {
                Some(ObstacleKind::Rock)
            } else {
                None
            };

            if let Some(kind) = kind {
                let jitter = Vec2::new(
                    rng.random_range(-PROP_JITTER..=PROP_JITTER),
                    rng.random_range(-PROP_JITTER..=PROP_JITTER),
                );
                let pos = Vec2::new(gx as f32, gy as f32) * TILE_SIZE + jitter;
                props.push(PropSpec { kind, pos });
            }
        }
    }

    ChunkContent { coord, floor, props }
}

/// A loaded chunk: its floor plus the obstacles it owns
#[derive(Debug, Clone)]
pub struct Chunk {
    pub coord: ChunkCoord,
    pub floor: Vec<FloorTile>,
    pub obstacles: Vec<ObstacleId>,
}

/// Chunks added and removed by one streamer update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDelta {
    pub loaded: Vec<ChunkCoord>,
    pub unloaded: Vec<ChunkCoord>,
}

/// Loads and unloads chunks around the player
#[derive(Debug, Clone)]
pub struct WorldStreamer {
    seed: u64,
    radius: i32,
    chunks: BTreeMap<ChunkCoord, Chunk>,
    center: Option<ChunkCoord>,
}

impl WorldStreamer {
    pub fn new(seed: u64) -> Self {
        Self::with_radius(seed, LOAD_RADIUS)
    }

    pub fn with_radius(seed: u64, radius: i32) -> Self {
        Self {
            seed,
            radius: radius.max(0),
            chunks: BTreeMap::new(),
            center: None,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn radius(&self) -> i32 {
        self.radius
    }

    pub fn is_loaded(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord)
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    /// Active chunks in coordinate order
    pub fn active_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    pub fn active_count(&self) -> usize {
        self.chunks.len()
    }

    /// Chunks within the load radius of `center`
    pub fn target_set(&self, center: ChunkCoord) -> BTreeSet<ChunkCoord> {
        let r = self.radius;
        (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| ChunkCoord::new(center.x + dx, center.y + dy)))
            .collect()
    }

    /// Bring the loaded set in line with the player's position
    ///
    /// Does nothing while the player stays inside the same chunk.
    pub fn update(&mut self, player_pos: Vec2, index: &mut ObstacleIndex) -> StreamDelta {
        let center = chunk_coord(player_pos);
        if self.center == Some(center) {
            return StreamDelta::default();
        }
        self.center = Some(center);

        let target = self.target_set(center);
        let mut delta = StreamDelta::default();

        let stale: Vec<ChunkCoord> = self
            .chunks
            .keys()
            .filter(|c| !target.contains(c))
            .copied()
            .collect();
        for coord in stale {
            self.unload_chunk(coord, index);
            delta.unloaded.push(coord);
        }
        for coord in target {
            if self.load_chunk(coord, index) {
                delta.loaded.push(coord);
            }
        }
        delta
    }

    /// Generate a chunk and register its obstacles; false if already active
    pub fn load_chunk(&mut self, coord: ChunkCoord, index: &mut ObstacleIndex) -> bool {
        if self.chunks.contains_key(&coord) {
            return false;
        }
        let content = generate_chunk(self.seed, coord);
        let mut obstacles = Vec::with_capacity(content.props.len());
        for prop in &content.props {
            let id = index.next_id();
            index.insert(Obstacle::new(id, prop.kind, coord, prop.pos));
            obstacles.push(id);
        }
        log::debug!(
            "Loaded chunk ({}, {}) with {} obstacles",
            coord.x,
            coord.y,
            obstacles.len()
        );
        self.chunks.insert(
            coord,
            Chunk {
                coord,
                floor: content.floor,
                obstacles,
            },
        );
        true
    }

    /// Drop a chunk and every obstacle it owns; false if not active
    pub fn unload_chunk(&mut self, coord: ChunkCoord, index: &mut ObstacleIndex) -> bool {
        let Some(chunk) = self.chunks.remove(&coord) else {
            return false;
        };
        for id in &chunk.obstacles {
            index.remove(*id);
        }
        log::debug!(
            "Unloaded chunk ({}, {}) with {} obstacles",
            coord.x,
            coord.y,
            chunk.obstacles.len()
        );
        true
    }

    /// Unload everything
    pub fn reset(&mut self, index: &mut ObstacleIndex) {
        let coords: Vec<ChunkCoord> = self.chunks.keys().copied().collect();
        for coord in coords {
            self.unload_chunk(coord, index);
        }
        self.center = None;
    }
}
