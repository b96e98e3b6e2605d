//! Simulation module
//!
//! All gameplay logic lives here. This module is pure and synchronous:
//! - No I/O and no suspension points
//! - Seeded RNG only (per run and per chunk stream)
//! - Stable iteration order (spawn order, peer-id order, obstacle id order)
//! - No dependency on networking; outbound mutations go through `GameState::outbox`

pub mod combat;
pub mod entity;
pub mod geometry;
pub mod hitshape;
pub mod motion;
pub mod obstacles;
pub mod state;
pub mod steering;
pub mod tick;
pub mod world;

pub use combat::{ActiveAttack, HitStop, WeaponConfig};
pub use entity::{Body, Collidable, RenderItem, RenderKind, Renderable, Status};
pub use geometry::{Rect, Shape, overlaps};
pub use hitshape::{HitShape, HitShapeError, HitShapeLibrary};
pub use motion::{Solids, apply_knockback, move_body};
pub use obstacles::{Obstacle, ObstacleIndex, ObstacleKind};
pub use state::{
    Authority, CharacterKind, CosmeticEffect, Enemy, EnemyKind, GameState, Player,
    RemotePlayer, ReplicatedAction, SimConfig,
};
pub use steering::{WorldContext, steer};
pub use tick::{TickInput, tick};
pub use world::{ChunkCoord, WorldStreamer, chunk_coord, generate_chunk};
