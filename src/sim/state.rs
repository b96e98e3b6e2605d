//! Game state and core simulation types
//!
//! Everything the tick mutates lives in `GameState`. Iteration order is
//! stable: enemies in spawn order, remote players in peer-id order,
//! obstacles in id order.

use std::collections::BTreeMap;

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::combat::{ActiveAttack, HitStop, WeaponConfig, knockback_from};
use super::entity::{Body, Collidable, RenderItem, RenderKind, Renderable, Status};
use super::geometry::Rect;
use super::hitshape::HitShapeLibrary;
use super::obstacles::ObstacleIndex;
use super::steering::{AttackClock, SteeringParams, SteeringState};
use super::world::WorldStreamer;
use crate::consts::*;

/// Enemy kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyKind {
    Orc,
    OrcCaptain,
}

/// Base stats before difficulty scaling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemyStats {
    pub health: f32,
    pub speed: f32,
    pub damage: f32,
    pub chase_range: f32,
    pub attack_range: f32,
    pub visual_size: Vec2,
}

impl EnemyKind {
    pub fn id(self) -> &'static str {
        match self {
            EnemyKind::Orc => "orc",
            EnemyKind::OrcCaptain => "orc_captain",
        }
    }

    /// Unknown ids fall back to the basic orc
    pub fn from_id(id: &str) -> Self {
        match id {
            "orc_captain" => EnemyKind::OrcCaptain,
            "orc" => EnemyKind::Orc,
            other => {
                log::warn!("Unknown enemy kind '{}', using orc", other);
                EnemyKind::Orc
            }
        }
    }

    pub fn stats(self) -> EnemyStats {
        match self {
            EnemyKind::Orc => EnemyStats {
                health: 3.0,
                speed: 2.5,
                damage: 10.0,
                chase_range: 2500.0,
                attack_range: 80.0,
                visual_size: Vec2::new(80.0, 80.0),
            },
            EnemyKind::OrcCaptain => EnemyStats {
                health: 60.0,
                speed: 1.8,
                damage: 25.0,
                chase_range: 3000.0,
                attack_range: 120.0,
                visual_size: Vec2::new(180.0, 180.0),
            },
        }
    }
}

/// Playable characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterKind {
    #[default]
    Adventurer,
    Female,
}

impl CharacterKind {
    pub fn id(self) -> &'static str {
        match self {
            CharacterKind::Adventurer => "adventurer",
            CharacterKind::Female => "female",
        }
    }

    /// Unknown ids fall back to the adventurer
    pub fn from_id(id: &str) -> Self {
        match id {
            "female" => CharacterKind::Female,
            _ => CharacterKind::Adventurer,
        }
    }

    pub fn max_health(self) -> f32 {
        match self {
            CharacterKind::Adventurer => 100.0,
            CharacterKind::Female => 80.0,
        }
    }

    pub fn speed(self) -> f32 {
        match self {
            CharacterKind::Adventurer => 5.0,
            CharacterKind::Female => 6.0,
        }
    }

    /// (visual size, hitbox size, hitbox offset below visual center)
    pub fn frame(self) -> (Vec2, Vec2, f32) {
        match self {
            CharacterKind::Adventurer => (Vec2::new(96.0, 96.0), Vec2::new(56.0, 52.0), 12.0),
            CharacterKind::Female => (Vec2::new(64.0, 64.0), Vec2::new(44.0, 38.0), 6.0),
        }
    }
}

/// The local player
#[derive(Debug, Clone)]
pub struct Player {
    pub body: Body,
    pub character: CharacterKind,
    pub health: f32,
    pub max_health: f32,
    pub speed: f32,
    pub status: Status,
    /// Last non-zero movement direction
    pub facing: Vec2,
    pub stamina: f32,
    /// Dash start time while dashing
    pub dash_started_ms: Option<f64>,
    pub dash_dir: Vec2,
    pub last_dash_ms: Option<f64>,
    pub hurt_until_ms: Option<f64>,
    pub died_at_ms: Option<f64>,
    pub weapon: WeaponConfig,
    pub weapon_clock: AttackClock,
    pub attack: ActiveAttack,
}

impl Player {
    /// New player with its hitbox centered on `center`
    pub fn new(character: CharacterKind, center: Vec2) -> Self {
        let (visual, hitbox, offset) = character.frame();
        let mut body = Body::new(Vec2::ZERO, visual, hitbox, offset);
        body.set_center(center);
        let weapon = WeaponConfig::sword();
        let weapon_clock = AttackClock::new(weapon.cooldown_ms);
        Self {
            body,
            character,
            health: character.max_health(),
            max_health: character.max_health(),
            speed: character.speed(),
            status: Status::Idle,
            facing: Vec2::Y,
            stamina: MAX_STAMINA,
            dash_started_ms: None,
            dash_dir: Vec2::ZERO,
            last_dash_ms: None,
            hurt_until_ms: None,
            died_at_ms: None,
            weapon,
            weapon_clock,
            attack: ActiveAttack::default(),
        }
    }

    pub fn center(&self) -> Vec2 {
        self.body.center()
    }

    pub fn is_dead(&self) -> bool {
        self.died_at_ms.is_some()
    }

    pub fn is_dashing(&self) -> bool {
        self.dash_started_ms.is_some()
    }

    pub fn is_hurt(&self, now_ms: f64) -> bool {
        self.hurt_until_ms.is_some_and(|until| now_ms < until)
    }

    /// Apply a hit from `source`; ignored while dead or hurt-locked
    ///
    /// Returns true if the damage was taken.
    pub fn take_damage(&mut self, amount: f32, source: Vec2, now_ms: f64) -> bool {
        if self.is_dead() || self.is_hurt(now_ms) {
            return false;
        }
        self.health -= amount;
        self.hurt_until_ms = Some(now_ms + PLAYER_HURT_MS);
        self.status = Status::Hurt;
        let kb = knockback_from(source, self.center(), PLAYER_HIT_KNOCKBACK);
        if kb != Vec2::ZERO {
            self.body.knockback = kb;
        }
        if self.health <= 0.0 {
            self.died_at_ms = Some(now_ms);
            self.status = Status::Dead;
            log::info!("Player died");
        }
        true
    }

    /// Back to full health at `center`
    pub fn respawn(&mut self, center: Vec2) {
        let character = self.character;
        *self = Player::new(character, center);
    }
}

impl Collidable for Player {
    fn hitbox(&self) -> Rect {
        self.body.hitbox
    }
}

impl Renderable for Player {
    fn render_item(&self) -> RenderItem {
        RenderItem {
            kind: RenderKind::Player {
                character: self.character.id().to_string(),
            },
            position: self.body.pos,
            hitbox: self.body.hitbox,
            status: Some(self.status),
            polygon: None,
        }
    }
}

/// A hostile agent
#[derive(Debug, Clone)]
pub struct Enemy {
    /// Network-unique id
    pub uid: String,
    pub kind: EnemyKind,
    pub body: Body,
    pub health: f32,
    pub speed: f32,
    pub damage: f32,
    pub difficulty: f32,
    pub status: Status,
    pub params: SteeringParams,
    pub steering: SteeringState,
    pub hurt_until_ms: Option<f64>,
    pub attack_until_ms: Option<f64>,
    pub died_at_ms: Option<f64>,
}

impl Enemy {
    /// New enemy with its visual top-left at `pos`, stats scaled by `difficulty`
    pub fn new(uid: impl Into<String>, kind: EnemyKind, pos: Vec2, difficulty: f32) -> Self {
        let stats = kind.stats();
        let hitbox = Vec2::new(stats.visual_size.x * 0.4, 20.0);
        let body = Body::new(pos, stats.visual_size, hitbox, 15.0);
        let steering = SteeringState::new(body.center(), ENEMY_ATTACK_COOLDOWN_MS);
        Self {
            uid: uid.into(),
            kind,
            body,
            health: stats.health * difficulty,
            speed: stats.speed * (1.0 + (difficulty - 1.0) * 0.3),
            damage: stats.damage * difficulty,
            difficulty,
            status: Status::Idle,
            params: SteeringParams {
                chase_range: stats.chase_range,
                attack_range: stats.attack_range,
            },
            steering,
            hurt_until_ms: None,
            attack_until_ms: None,
            died_at_ms: None,
        }
    }

    pub fn center(&self) -> Vec2 {
        self.body.center()
    }

    pub fn is_dead(&self) -> bool {
        self.died_at_ms.is_some()
    }

    /// Enter death processing; false if already dead
    pub fn kill(&mut self, now_ms: f64) -> bool {
        if self.is_dead() {
            return false;
        }
        self.health = self.health.min(0.0);
        self.status = Status::Dead;
        self.died_at_ms = Some(now_ms);
        true
    }

    /// Has the death window elapsed?
    pub fn death_finished(&self, now_ms: f64) -> bool {
        self.died_at_ms.is_some_and(|t| now_ms - t >= ENEMY_DEATH_MS)
    }

    /// Expire hurt/attack locks and report whether one is still held
    pub fn refresh_locks(&mut self, now_ms: f64) -> bool {
        if self.hurt_until_ms.is_some_and(|t| now_ms >= t) {
            self.hurt_until_ms = None;
        }
        if self.attack_until_ms.is_some_and(|t| now_ms >= t) {
            self.attack_until_ms = None;
        }
        if self.hurt_until_ms.is_some() {
            self.status = Status::Hurt;
            true
        } else if self.attack_until_ms.is_some() {
            self.status = Status::Attack;
            true
        } else {
            false
        }
    }

    /// World-space hit polygon (hit-shape entry, else hitbox corners)
    pub fn hit_polygon(&self, shapes: &HitShapeLibrary) -> Vec<Vec2> {
        shapes.world_points(self.kind.id(), &self.body.visual_rect(), &self.body.hitbox)
    }
}

impl Collidable for Enemy {
    fn hitbox(&self) -> Rect {
        self.body.hitbox
    }

    fn blocks_movement(&self) -> bool {
        !self.is_dead()
    }
}

/// Interpolated proxy for another peer's player
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub peer: String,
    pub character: CharacterKind,
    /// Rendered position
    pub pos: Vec2,
    /// Latest position from the network
    pub target: Vec2,
    pub status: Status,
}

impl RemotePlayer {
    pub fn new(peer: impl Into<String>, character: CharacterKind, pos: Vec2) -> Self {
        Self {
            peer: peer.into(),
            character,
            pos,
            target: pos,
            status: Status::Idle,
        }
    }

    pub fn set_target(&mut self, pos: Vec2, status: Status, character: CharacterKind) {
        self.target = pos;
        self.status = status;
        if character != self.character {
            log::debug!("Peer {} switched to {}", self.peer, character.id());
            self.character = character;
        }
    }

    /// Ease toward the target, snapping across large jumps
    pub fn update(&mut self, dt: f32) {
        if self.pos.distance(self.target) > REMOTE_SNAP_DISTANCE {
            self.pos = self.target;
        } else {
            self.pos += (self.target - self.pos) * (REMOTE_LERP_RATE * dt).min(1.0);
        }
    }
}

impl Renderable for RemotePlayer {
    fn render_item(&self) -> RenderItem {
        let (visual, hitbox, _) = self.character.frame();
        RenderItem {
            kind: RenderKind::RemotePlayer {
                peer: self.peer.clone(),
                character: self.character.id().to_string(),
            },
            position: self.pos - visual * 0.5,
            hitbox: Rect::from_center(self.pos, hitbox),
            status: Some(self.status),
            polygon: None,
        }
    }
}

/// Difficulty ramp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Difficulty {
    pub multiplier: f32,
    pub last_step_ms: f64,
    pub spawn_cooldown_ms: f64,
}

impl Difficulty {
    pub fn new(now_ms: f64) -> Self {
        Self {
            multiplier: 1.0,
            last_step_ms: now_ms,
            spawn_cooldown_ms: INITIAL_SPAWN_COOLDOWN_MS,
        }
    }

    /// Step the multiplier once per interval; true when it stepped
    pub fn update(&mut self, now_ms: f64) -> bool {
        if now_ms - self.last_step_ms <= DIFFICULTY_INTERVAL_MS {
            return false;
        }
        self.multiplier += DIFFICULTY_RAMP_RATE;
        self.last_step_ms = now_ms;
        self.spawn_cooldown_ms =
            (INITIAL_SPAWN_COOLDOWN_MS / self.multiplier as f64).max(MIN_SPAWN_COOLDOWN_MS);
        log::info!(
            "Difficulty increased to {:.2}, spawn cooldown {:.0}ms",
            self.multiplier,
            self.spawn_cooldown_ms
        );
        true
    }
}

/// Who this peer is on the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    /// Authoritative for spawns/kills (always true offline)
    pub is_host: bool,
    pub peer_id: Option<String>,
}

impl Default for Authority {
    fn default() -> Self {
        Self {
            is_host: true,
            peer_id: None,
        }
    }
}

impl Authority {
    /// Prefix for enemy uids minted by this peer
    pub fn uid_prefix(&self) -> &str {
        self.peer_id.as_deref().unwrap_or("local")
    }
}

/// A simulation mutation other peers need to hear about
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicatedAction {
    Attack {
        weapon: String,
        angles: Vec<f32>,
    },
    SpawnEnemy {
        uid: String,
        kind: EnemyKind,
        pos: Vec2,
        difficulty: f32,
    },
    KillEnemy {
        uid: String,
    },
}

/// A remote peer's attack, to be drawn
#[derive(Debug, Clone, PartialEq)]
pub struct CosmeticEffect {
    pub peer: String,
    pub weapon: String,
    pub angles: Vec<f32>,
    pub origin: Vec2,
}

/// Construction parameters for a run
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub seed: u64,
    pub load_radius: i32,
    pub character: CharacterKind,
    pub max_enemies: usize,
    pub hit_stop_ms: f64,
    pub hit_shapes: HitShapeLibrary,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            load_radius: LOAD_RADIUS,
            character: CharacterKind::Adventurer,
            max_enemies: MAX_ENEMIES,
            hit_stop_ms: HIT_STOP_MS,
            hit_shapes: HitShapeLibrary::default(),
        }
    }
}

/// Complete simulation state
#[derive(Debug, Clone)]
pub struct GameState {
    pub seed: u64,
    /// Simulation clock (advanced by the tick only)
    pub clock_ms: f64,
    pub survival_start_ms: f64,
    pub rng: Pcg32,
    pub player: Player,
    /// Spawn order
    pub enemies: Vec<Enemy>,
    /// Keyed by peer id
    pub remote_players: BTreeMap<String, RemotePlayer>,
    pub obstacles: ObstacleIndex,
    pub world: WorldStreamer,
    pub hit_shapes: HitShapeLibrary,
    pub difficulty: Difficulty,
    pub last_spawn_ms: f64,
    pub hit_stop: HitStop,
    pub hit_stop_ms: f64,
    pub max_enemies: usize,
    pub authority: Authority,
    /// Outbound mutations, drained by the replication layer
    pub outbox: Vec<ReplicatedAction>,
    /// Remote attack effects, drained by the renderer
    pub effects: Vec<CosmeticEffect>,
    next_uid: u64,
}

impl GameState {
    pub fn new(config: SimConfig) -> Self {
        let mut state = Self {
            seed: config.seed,
            clock_ms: 0.0,
            survival_start_ms: 0.0,
            rng: Pcg32::seed_from_u64(config.seed),
            player: Player::new(config.character, Vec2::ZERO),
            enemies: Vec::new(),
            remote_players: BTreeMap::new(),
            obstacles: ObstacleIndex::new(),
            world: WorldStreamer::with_radius(config.seed, config.load_radius),
            hit_shapes: config.hit_shapes,
            difficulty: Difficulty::new(0.0),
            last_spawn_ms: 0.0,
            hit_stop: HitStop::default(),
            hit_stop_ms: config.hit_stop_ms,
            max_enemies: config.max_enemies,
            authority: Authority::default(),
            outbox: Vec::new(),
            effects: Vec::new(),
            next_uid: 0,
        };
        let center = state.player.center();
        state.world.update(center, &mut state.obstacles);
        state
    }

    /// Mint a globally unique enemy uid
    pub fn next_enemy_uid(&mut self) -> String {
        self.next_uid += 1;
        format!("{}-{}", self.authority.uid_prefix(), self.next_uid)
    }

    pub fn enemy(&self, uid: &str) -> Option<&Enemy> {
        self.enemies.iter().find(|e| e.uid == uid)
    }

    /// Add an enemy unless one with this uid already exists
    pub fn spawn_enemy(&mut self, uid: &str, kind: EnemyKind, pos: Vec2, difficulty: f32) -> bool {
        if self.enemy(uid).is_some() {
            log::trace!("Ignoring duplicate spawn of {}", uid);
            return false;
        }
        self.enemies.push(Enemy::new(uid, kind, pos, difficulty));
        true
    }

    /// Force an enemy into death processing; no-op if absent or already dead
    pub fn kill_enemy(&mut self, uid: &str) -> bool {
        let now = self.clock_ms;
        self.enemies
            .iter_mut()
            .find(|e| e.uid == uid)
            .is_some_and(|e| e.kill(now))
    }

    /// Create or update the proxy for `peer`
    pub fn upsert_remote(&mut self, peer: &str, pos: Vec2, status: Status, character: CharacterKind) {
        match self.remote_players.get_mut(peer) {
            Some(rp) => rp.set_target(pos, status, character),
            None => {
                log::info!("Peer {} joined", peer);
                let mut rp = RemotePlayer::new(peer, character, pos);
                rp.status = status;
                self.remote_players.insert(peer.to_string(), rp);
            }
        }
    }

    /// Drop proxies for peers no longer present
    pub fn retain_remotes(&mut self, present: impl Fn(&str) -> bool) {
        self.remote_players.retain(|peer, _| {
            let keep = present(peer);
            if !keep {
                log::info!("Peer {} left", peer);
            }
            keep
        });
    }

    /// Start over after the player's death
    pub fn reset_run(&mut self) {
        let now = self.clock_ms;
        self.player.respawn(Vec2::ZERO);
        self.enemies.clear();
        self.difficulty = Difficulty::new(now);
        self.survival_start_ms = now;
        self.last_spawn_ms = now;
        log::info!("Run reset");
    }

    pub fn survival_ms(&self) -> f64 {
        self.clock_ms - self.survival_start_ms
    }

    pub fn drain_outbox(&mut self) -> Vec<ReplicatedAction> {
        std::mem::take(&mut self.outbox)
    }

    pub fn drain_effects(&mut self) -> Vec<CosmeticEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Everything the renderer should draw this frame
    pub fn render_items(&self) -> Vec<RenderItem> {
        let mut items = Vec::with_capacity(1 + self.enemies.len() + self.obstacles.len());
        items.extend(self.obstacles.iter().map(|o| o.render_item()));
        items.extend(self.enemies.iter().map(|e| RenderItem {
            kind: RenderKind::Enemy {
                uid: e.uid.clone(),
                kind: e.kind.id().to_string(),
            },
            position: e.body.pos,
            hitbox: e.body.hitbox,
            status: Some(e.status),
            polygon: Some(e.hit_polygon(&self.hit_shapes)),
        }));
        items.extend(self.remote_players.values().map(|r| r.render_item()));
        items.push(self.player.render_item());
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GameState {
        GameState::new(SimConfig {
            load_radius: 0,
            ..SimConfig::default()
        })
    }

    #[test]
    fn test_spawn_is_idempotent() {
        let mut s = state();
        assert!(s.spawn_enemy("x", EnemyKind::Orc, Vec2::new(100.0, 0.0), 1.0));
        assert!(!s.spawn_enemy("x", EnemyKind::Orc, Vec2::new(100.0, 0.0), 1.0));
        assert_eq!(s.enemies.iter().filter(|e| e.uid == "x").count(), 1);
    }

    #[test]
    fn test_kill_missing_or_dead_is_noop() {
        let mut s = state();
        assert!(!s.kill_enemy("ghost"));
        assert!(s.enemies.is_empty());

        s.spawn_enemy("x", EnemyKind::Orc, Vec2::ZERO, 1.0);
        assert!(s.kill_enemy("x"));
        assert!(!s.kill_enemy("x"));
        assert_eq!(s.enemy("x").map(|e| e.status), Some(Status::Dead));
    }

    #[test]
    fn test_stats_scale_with_difficulty() {
        let e = Enemy::new("a", EnemyKind::Orc, Vec2::ZERO, 2.0);
        assert_eq!(e.health, 6.0);
        assert_eq!(e.damage, 20.0);
        assert!((e.speed - 2.5 * 1.3).abs() < 1e-6);
        assert_eq!(e.body.hitbox.size(), Vec2::new(32.0, 20.0));
    }

    #[test]
    fn test_unknown_kinds_fall_back() {
        assert_eq!(EnemyKind::from_id("dragon"), EnemyKind::Orc);
        assert_eq!(CharacterKind::from_id("wizard"), CharacterKind::Adventurer);
        assert_eq!(CharacterKind::from_id("female").max_health(), 80.0);
    }

    #[test]
    fn test_player_damage_and_hurt_lock() {
        let mut p = Player::new(CharacterKind::Adventurer, Vec2::ZERO);
        assert!(p.take_damage(10.0, Vec2::new(-50.0, 0.0), 0.0));
        assert_eq!(p.health, 90.0);
        assert!(p.body.knockback.x > 0.0);
        // Still hurt-locked
        assert!(!p.take_damage(10.0, Vec2::ZERO, 100.0));
        assert!(p.take_damage(95.0, Vec2::ZERO, 400.0));
        assert!(p.is_dead());
        assert!(!p.take_damage(10.0, Vec2::ZERO, 2000.0));
    }

    #[test]
    fn test_difficulty_ramp() {
        let mut d = Difficulty::new(0.0);
        assert!(!d.update(30_000.0));
        assert!(d.update(30_001.0));
        assert!((d.multiplier - 1.05).abs() < 1e-6);
        assert!((d.spawn_cooldown_ms - 2000.0 / 1.05f32 as f64).abs() < 1e-3);
    }

    #[test]
    fn test_remote_proxy_interpolates_and_snaps() {
        let mut rp = RemotePlayer::new("002", CharacterKind::Female, Vec2::ZERO);
        rp.set_target(Vec2::new(100.0, 0.0), Status::Walk, CharacterKind::Female);
        rp.update(0.05);
        assert!((rp.pos.x - 50.0).abs() < 1e-4);
        rp.set_target(Vec2::new(1000.0, 0.0), Status::Walk, CharacterKind::Adventurer);
        rp.update(0.05);
        assert_eq!(rp.pos, Vec2::new(1000.0, 0.0));
        assert_eq!(rp.character, CharacterKind::Adventurer);
    }

    #[test]
    fn test_uids_carry_peer_prefix() {
        let mut s = state();
        assert_eq!(s.next_enemy_uid(), "local-1");
        s.authority.peer_id = Some("003".to_string());
        assert_eq!(s.next_enemy_uid(), "003-2");
    }
}
