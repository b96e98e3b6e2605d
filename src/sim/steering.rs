//! Enemy steering: target pick, seek, separation, avoidance, unsticking
//!
//! Produces a unit (or zero) direction per agent per tick. The caller scales
//! it by speed and hands it to the motion resolver.

use glam::Vec2;
use rand::Rng;
use rand::seq::index;

use super::geometry::Rect;
use super::obstacles::ObstacleIndex;

/// Neighbours examined per agent for separation
pub const SEPARATION_SAMPLES: usize = 16;
pub const SEPARATION_RADIUS: f32 = 50.0;
pub const SEPARATION_WEIGHT: f32 = 2.0;

/// Squared per-tick displacement below which an agent counts as not moving
const STUCK_EPSILON_SQ: f32 = 0.2;
/// Seconds of no progress before the nudge kicks in
const STUCK_GRACE: f32 = 0.4;
const STUCK_NUDGE: f32 = 3.0;

const SENSOR_SIZE: f32 = 200.0;
const SENSOR_RANGE: f32 = 110.0;
const LOOK_AHEAD: f32 = 40.0;

/// Read-only view of the world an agent steers in
#[derive(Debug, Clone, Copy)]
pub struct WorldContext<'a> {
    /// Local player hitbox center (None once the local player is gone)
    pub player: Option<Vec2>,
    /// Remote player proxy positions, in peer-id order
    pub remote_players: &'a [Vec2],
    pub obstacles: &'a ObstacleIndex,
    /// Simulation clock
    pub now_ms: f64,
}

/// Who an agent is going after
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Local,
    /// Index into `WorldContext::remote_players`
    Remote(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub kind: TargetKind,
    pub pos: Vec2,
    pub dist_sq: f32,
}

/// Nearest player (local or remote) by squared distance
///
/// Ties go to the local player, then to the earlier remote.
pub fn select_target(from: Vec2, ctx: &WorldContext<'_>) -> Option<Target> {
    let local = ctx.player.map(|pos| Target {
        kind: TargetKind::Local,
        pos,
        dist_sq: from.distance_squared(pos),
    });
    ctx.remote_players
        .iter()
        .enumerate()
        .map(|(i, &pos)| Target {
            kind: TargetKind::Remote(i),
            pos,
            dist_sq: from.distance_squared(pos),
        })
        .fold(local, |best, t| match best {
            Some(b) if b.dist_sq <= t.dist_sq => Some(b),
            _ => Some(t),
        })
}

/// Per-agent attack cooldown
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackClock {
    pub cooldown_ms: f64,
    pub last_ms: Option<f64>,
}

impl AttackClock {
    pub fn new(cooldown_ms: f64) -> Self {
        Self {
            cooldown_ms,
            last_ms: None,
        }
    }

    pub fn ready(&self, now_ms: f64) -> bool {
        self.last_ms.is_none_or(|last| now_ms - last >= self.cooldown_ms)
    }

    /// Fire if the cooldown has elapsed
    pub fn try_fire(&mut self, now_ms: f64) -> bool {
        if self.ready(now_ms) {
            self.last_ms = Some(now_ms);
            true
        } else {
            false
        }
    }
}

/// Tuning for one agent kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringParams {
    pub chase_range: f32,
    pub attack_range: f32,
}

/// Memory an agent carries between ticks
#[derive(Debug, Clone, PartialEq)]
pub struct SteeringState {
    pub attack: AttackClock,
    pub last_pos: Vec2,
    pub stuck_timer: f32,
    /// Persistent random direction while stuck (zero otherwise)
    pub stuck_boost: Vec2,
}

impl SteeringState {
    pub fn new(pos: Vec2, attack_cooldown_ms: f64) -> Self {
        Self {
            attack: AttackClock::new(attack_cooldown_ms),
            last_pos: pos,
            stuck_timer: 0.0,
            stuck_boost: Vec2::ZERO,
        }
    }
}

/// The agent being steered
#[derive(Debug, Clone, Copy)]
pub struct Agent<'a> {
    /// Hitbox center
    pub pos: Vec2,
    pub hitbox: Rect,
    pub params: SteeringParams,
    /// Positions of all same-kind agents (including this one)
    pub flock: &'a [Vec2],
    /// This agent's slot in `flock`
    pub slot: usize,
}

/// One tick of steering
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SteeringOutput {
    /// Unit vector or zero
    pub direction: Vec2,
    /// Set when the attack trigger fired this tick
    pub attack: Option<TargetKind>,
    pub avoiding: bool,
}

/// Average push away from sampled close neighbours
///
/// Only a bounded random subset of the flock is examined, so a close
/// neighbour can be missed in a dense swarm. Coincident agents push along a
/// random direction instead of producing a zero vector.
pub fn separation<R: Rng + ?Sized>(
    slot: usize,
    flock: &[Vec2],
    radius: f32,
    rng: &mut R,
) -> Vec2 {
    let Some(&me) = flock.get(slot) else {
        return Vec2::ZERO;
    };
    let amount = flock.len().min(SEPARATION_SAMPLES);
    let mut sum = Vec2::ZERO;
    let mut count = 0;

    for i in index::sample(rng, flock.len(), amount).iter() {
        if i == slot {
            continue;
        }
        let diff = me - flock[i];
        let dist = diff.length();
        if dist >= radius {
            continue;
        }
        let away = if dist > 0.0 {
            diff / dist
        } else {
            random_unit(rng)
        };
        sum += away * ((radius - dist) / radius);
        count += 1;
    }

    if count == 0 {
        return Vec2::ZERO;
    }
    (sum / count as f32).normalize_or_zero()
}

fn random_unit<R: Rng + ?Sized>(rng: &mut R) -> Vec2 {
    Vec2::from_angle(rng.random_range(0.0..std::f32::consts::TAU))
}

/// Curve-around vector for the nearest blocking obstacle, if any
pub fn avoidance(pos: Vec2, hitbox: &Rect, direction: Vec2, obstacles: &ObstacleIndex) -> Option<Vec2> {
    if direction == Vec2::ZERO {
        return None;
    }
    let sensor = Rect::from_center(pos, Vec2::splat(SENSOR_SIZE));
    let nearest = obstacles
        .query_near(&sensor)
        .into_iter()
        .filter(|o| o.hitbox.overlaps(&sensor))
        .map(|o| (o.visual_rect().center().distance(pos), o))
        .filter(|(d, _)| *d < SENSOR_RANGE)
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, o)| o)?;

    let ahead = hitbox.translated(direction * LOOK_AHEAD);
    if !ahead.overlaps(&nearest.hitbox) {
        return None;
    }

    let push = (pos - nearest.visual_rect().center()).try_normalize()?;
    let mut tangent = push.perp();
    if tangent.dot(direction) < 0.0 {
        tangent = -tangent;
    }
    Some(push * 0.4 + tangent * 0.8)
}

/// Compute this tick's direction for a free (not locked, not dead) agent
pub fn steer<R: Rng + ?Sized>(
    agent: &Agent<'_>,
    ctx: &WorldContext<'_>,
    state: &mut SteeringState,
    dt: f32,
    rng: &mut R,
) -> SteeringOutput {
    let mut out = SteeringOutput::default();

    let mut seek = Vec2::ZERO;
    if let Some(target) = select_target(agent.pos, ctx) {
        let chase = agent.params.chase_range;
        let strike = agent.params.attack_range * 0.8;
        if target.dist_sq < chase * chase {
            if target.dist_sq > strike * strike {
                seek = (target.pos - agent.pos).normalize_or_zero();
            } else if state.attack.try_fire(ctx.now_ms) {
                out.attack = Some(target.kind);
            }
        }
    }

    let separation = separation(agent.slot, agent.flock, SEPARATION_RADIUS, rng);

    // Stuck: intent but no displacement since last tick
    if agent.pos.distance_squared(state.last_pos) < STUCK_EPSILON_SQ && seek != Vec2::ZERO {
        state.stuck_timer += dt;
    } else {
        state.stuck_timer = 0.0;
        state.stuck_boost = Vec2::ZERO;
    }
    state.last_pos = agent.pos;

    let mut avoid = Vec2::ZERO;
    if state.stuck_timer > STUCK_GRACE {
        if state.stuck_boost == Vec2::ZERO {
            state.stuck_boost = random_unit(rng);
        }
        avoid = state.stuck_boost * STUCK_NUDGE;
    }
    if let Some(v) = avoidance(agent.pos, &agent.hitbox, seek, ctx.obstacles) {
        avoid = v;
    }

    let mut dir = seek + separation * SEPARATION_WEIGHT;
    if avoid != Vec2::ZERO {
        out.avoiding = true;
        dir = seek * 0.4 + avoid * 4.0;
    }
    out.direction = dir.normalize_or_zero();
    out
}
