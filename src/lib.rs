//! Survivor core - simulation heart of a top-down survival game
//!
//! Core modules:
//! - `sim`: Pure, single-threaded simulation (collision, steering, world streaming, combat)
//! - `net`: Host-authoritative replication over line-delimited JSON
//! - `session`: Per-frame driver that glues replication to the tick
//! - `settings`: Runtime configuration

pub mod net;
pub mod session;
pub mod settings;
pub mod sim;

pub use session::Session;
pub use settings::Settings;

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    /// Upper bound on a frame's dt (seconds); larger hitches are clamped
    pub const MAX_DT: f32 = 1.0 / 15.0;
    /// Per-frame velocities are authored against a 60 fps basis
    pub const FRAMERATE_BASIS: f32 = 60.0;

    /// World tiling
    pub const TILE_SIZE: f32 = 64.0;
    /// Tiles per chunk side
    pub const CHUNK_TILES: i32 = 16;
    /// Chunk side in world units (16 * 64)
    pub const CHUNK_SIZE: f32 = 1024.0;
    /// Chebyshev radius of loaded chunks around the player
    pub const LOAD_RADIUS: i32 = 3;

    /// Maximum distance covered by one motion sub-step
    pub const STEP_DISTANCE: f32 = 16.0;
    /// Knockback below this magnitude is cleared
    pub const KNOCKBACK_EPSILON: f32 = 0.1;
    /// Per-frame knockback decay (player / enemy)
    pub const PLAYER_KNOCKBACK_DECAY: f32 = 0.8;
    pub const ENEMY_KNOCKBACK_DECAY: f32 = 0.85;

    /// Player movement
    pub const DASH_SPEED: f32 = 15.0;
    pub const DASH_DURATION_MS: f64 = 150.0;
    pub const DASH_COOLDOWN_MS: f64 = 600.0;
    pub const DASH_COST: f32 = 40.0;
    pub const MAX_STAMINA: f32 = 100.0;
    pub const STAMINA_REGEN: f32 = 30.0;
    pub const PLAYER_HURT_MS: f64 = 300.0;
    pub const PLAYER_HIT_KNOCKBACK: f32 = 15.0;
    /// Death animation, then a pause before the run resets
    pub const PLAYER_DEATH_MS: f64 = 600.0;
    pub const PLAYER_RESPAWN_DELAY_MS: f64 = 1500.0;
    /// Attack regions stay live this long after a swing
    pub const ATTACK_ACTIVE_MS: f64 = 150.0;

    /// Enemy timing
    pub const ENEMY_ATTACK_COOLDOWN_MS: f64 = 1500.0;
    pub const ENEMY_ATTACK_LOCK_MS: f64 = 200.0;
    pub const ENEMY_HURT_MS: f64 = 400.0;
    pub const ENEMY_DEATH_MS: f64 = 600.0;
    /// Beyond this distance from the player enemies only process knockback
    pub const ENEMY_FREEZE_DISTANCE: f32 = 3000.0;
    /// Beyond this distance enemies are despawned
    pub const ENEMY_DESPAWN_DISTANCE: f32 = 5000.0;

    /// Difficulty ramp
    pub const INITIAL_SPAWN_COOLDOWN_MS: f64 = 2000.0;
    pub const MIN_SPAWN_COOLDOWN_MS: f64 = 500.0;
    pub const DIFFICULTY_RAMP_RATE: f32 = 0.05;
    pub const DIFFICULTY_INTERVAL_MS: f64 = 30_000.0;
    pub const MAX_ENEMIES: usize = 300;

    /// Hit-stop signal duration after a landed hit
    pub const HIT_STOP_MS: f64 = 60.0;

    /// Remote proxies snap instead of interpolating past this distance
    pub const REMOTE_SNAP_DISTANCE: f32 = 200.0;
    pub const REMOTE_LERP_RATE: f32 = 10.0;

    /// Coordinator defaults
    pub const DEFAULT_PORT: u16 = 5555;
    pub const SNAPSHOT_HZ: u32 = 30;
}

/// Unit direction for an angle in degrees (screen space, +y down)
#[inline]
pub fn angle_to_dir(degrees: f32) -> Vec2 {
    let rad = degrees.to_radians();
    Vec2::new(rad.cos(), rad.sin())
}

/// Angle in degrees of a direction vector
#[inline]
pub fn dir_to_angle(dir: Vec2) -> f32 {
    dir.y.atan2(dir.x).to_degrees()
}

/// Clamp a raw frame delta to `[0, MAX_DT]`; non-finite deltas become zero
#[inline]
pub fn clamp_dt(dt: f32) -> f32 {
    if dt.is_finite() {
        dt.clamp(0.0, consts::MAX_DT)
    } else {
        0.0
    }
}

/// Scale a per-frame quantity authored at 60 fps to an arbitrary dt
#[inline]
pub fn frame_scale(dt: f32) -> f32 {
    dt * consts::FRAMERATE_BASIS
}
