//! Motion resolver: sub-stepped, axis-separated movement against solids
//!
//! Velocities are split into sub-steps no longer than `STEP_DISTANCE`. Each
//! sub-step moves X then Y; each axis move is swept, so the hitbox stops at
//! the first solid edge it would cross rather than the one it lands in.

use glam::Vec2;

use super::entity::Body;
use super::geometry::Rect;
use super::obstacles::ObstacleIndex;
use crate::consts::{KNOCKBACK_EPSILON, STEP_DISTANCE};
use crate::frame_scale;

/// A source of solid hitboxes for collision response
pub trait Solids {
    /// Append hitboxes of solids that may touch `region`
    fn candidates(&self, region: &Rect, out: &mut Vec<Rect>);
}

impl Solids for ObstacleIndex {
    fn candidates(&self, region: &Rect, out: &mut Vec<Rect>) {
        self.hitboxes_near(region, out);
    }
}

impl Solids for [Rect] {
    fn candidates(&self, region: &Rect, out: &mut Vec<Rect>) {
        out.extend(self.iter().filter(|r| r.overlaps(region)).copied());
    }
}

/// Obstacles plus a handful of extra solid bodies (e.g. live enemies)
pub struct WithBodies<'a> {
    pub obstacles: &'a ObstacleIndex,
    pub bodies: &'a [Rect],
}

impl Solids for WithBodies<'_> {
    fn candidates(&self, region: &Rect, out: &mut Vec<Rect>) {
        self.obstacles.candidates(region, out);
        self.bodies.candidates(region, out);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// Move a body by `velocity` (world units this frame)
///
/// Returns true if any solid stopped the body. Zero or non-finite velocity
/// is a no-op.
pub fn move_body<S: Solids + ?Sized>(body: &mut Body, velocity: Vec2, solids: &S) -> bool {
    if !velocity.is_finite() {
        log::trace!("Ignoring non-finite velocity {:?}", velocity);
        return false;
    }
    let magnitude = velocity.length();
    if magnitude == 0.0 {
        return false;
    }

    let steps = (magnitude / STEP_DISTANCE).ceil().max(1.0) as u32;
    let step = velocity / steps as f32;
    let mut scratch = Vec::new();
    let mut collided = false;

    for _ in 0..steps {
        collided |= sweep_axis(&mut body.hitbox, step.x, Axis::X, solids, &mut scratch);
        collided |= sweep_axis(&mut body.hitbox, step.y, Axis::Y, solids, &mut scratch);
    }

    body.sync_pos_with_hitbox();
    collided
}

/// Move along one axis, clamping to the nearest solid edge on the side of approach
fn sweep_axis<S: Solids + ?Sized>(
    hitbox: &mut Rect,
    delta: f32,
    axis: Axis,
    solids: &S,
    scratch: &mut Vec<Rect>,
) -> bool {
    if delta == 0.0 {
        return false;
    }
    let offset = match axis {
        Axis::X => Vec2::new(delta, 0.0),
        Axis::Y => Vec2::new(0.0, delta),
    };
    let start = *hitbox;
    let moved = start.translated(offset);
    let swept = start.union(&moved);

    scratch.clear();
    solids.candidates(&swept, scratch);

    let mut result = moved;
    let mut hit = false;
    for solid in scratch.iter().filter(|s| s.overlaps(&swept)) {
        hit = true;
        match (axis, delta > 0.0) {
            (Axis::X, true) if solid.min.x < result.max.x => result.set_right(solid.min.x),
            (Axis::X, false) if solid.max.x > result.min.x => result.set_left(solid.max.x),
            (Axis::Y, true) if solid.min.y < result.max.y => result.set_bottom(solid.min.y),
            (Axis::Y, false) if solid.max.y > result.min.y => result.set_top(solid.max.y),
            _ => {}
        }
    }

    *hitbox = result;
    hit
}

/// Resolve and decay knockback for one frame
///
/// Knockback is applied through the same collision path as steering and
/// decays geometrically; once negligible it is cleared.
pub fn apply_knockback<S: Solids + ?Sized>(body: &mut Body, decay: f32, dt: f32, solids: &S) {
    if body.knockback.length() > KNOCKBACK_EPSILON {
        let scale = frame_scale(dt);
        let velocity = body.knockback * scale;
        move_body(body, velocity, solids);
        body.knockback *= decay.powf(scale);
    } else {
        body.knockback = Vec2::ZERO;
    }
}
