//! Shared entity building blocks: status tags, physical bodies and the
//! capabilities concrete entity kinds implement.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::geometry::Rect;
use super::obstacles::ObstacleKind;

/// Mutually exclusive entity status
///
/// `Attack` and `Hurt` are time-boxed locks; `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Idle,
    Walk,
    Attack,
    Hurt,
    Dead,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Walk => "walk",
            Status::Attack => "attack",
            Status::Hurt => "hurt",
            Status::Dead => "dead",
        }
    }

    /// Parse a wire status; directional suffixes ("walk_left") are ignored
    pub fn from_wire(s: &str) -> Self {
        let base = s.split('_').next().unwrap_or(s);
        match base {
            "walk" | "run" => Status::Walk,
            "attack" => Status::Attack,
            "hurt" => Status::Hurt,
            "dead" | "death" => Status::Dead,
            _ => Status::Idle,
        }
    }

    /// Does this status suppress steering input?
    pub fn is_locked(&self) -> bool {
        matches!(self, Status::Attack | Status::Hurt | Status::Dead)
    }
}

/// Physical body: visual frame, collision hitbox and knockback
///
/// The hitbox center sits at the visual center shifted down by
/// `hitbox_offset_y` (feet alignment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Visual top-left
    pub pos: Vec2,
    pub visual_size: Vec2,
    pub hitbox: Rect,
    pub hitbox_offset_y: f32,
    pub knockback: Vec2,
}

impl Body {
    pub fn new(pos: Vec2, visual_size: Vec2, hitbox_size: Vec2, hitbox_offset_y: f32) -> Self {
        let mut body = Self {
            pos,
            visual_size,
            hitbox: Rect::from_center(Vec2::ZERO, hitbox_size),
            hitbox_offset_y,
            knockback: Vec2::ZERO,
        };
        body.sync_hitbox_with_pos();
        body
    }

    pub fn visual_rect(&self) -> Rect {
        Rect::new(self.pos.x, self.pos.y, self.visual_size.x, self.visual_size.y)
    }

    /// Center of the collision hitbox
    pub fn center(&self) -> Vec2 {
        self.hitbox.center()
    }

    /// Place the hitbox from the visual position
    pub fn sync_hitbox_with_pos(&mut self) {
        let center = self.pos + self.visual_size * 0.5 + Vec2::new(0.0, self.hitbox_offset_y);
        self.hitbox.set_center(center);
    }

    /// Place the visual frame from the hitbox
    pub fn sync_pos_with_hitbox(&mut self) {
        self.pos = self.hitbox.center() - self.visual_size * 0.5 - Vec2::new(0.0, self.hitbox_offset_y);
    }

    /// Teleport so the hitbox is centered on `center`
    pub fn set_center(&mut self, center: Vec2) {
        self.hitbox.set_center(center);
        self.sync_pos_with_hitbox();
    }
}

/// Anything with a physical hitbox
pub trait Collidable {
    fn hitbox(&self) -> Rect;

    /// Whether other bodies are stopped by this one
    fn blocks_movement(&self) -> bool {
        true
    }
}

/// What the renderer should draw
#[derive(Debug, Clone, PartialEq)]
pub enum RenderKind {
    Player { character: String },
    RemotePlayer { peer: String, character: String },
    Enemy { uid: String, kind: String },
    Obstacle(ObstacleKind),
}

/// Render-facing view of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    pub kind: RenderKind,
    /// Visual top-left
    pub position: Vec2,
    pub hitbox: Rect,
    pub status: Option<Status>,
    /// World-space polygon hit region (debug overlay)
    pub polygon: Option<Vec<Vec2>>,
}

/// Anything the renderer draws
pub trait Renderable {
    fn render_item(&self) -> RenderItem;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_sync_roundtrip() {
        let mut body = Body::new(Vec2::new(100.0, 50.0), Vec2::new(64.0, 72.0), Vec2::new(26.0, 20.0), 15.0);
        assert_eq!(body.center(), Vec2::new(132.0, 101.0));
        body.hitbox.translate(Vec2::new(10.0, -4.0));
        body.sync_pos_with_hitbox();
        assert_eq!(body.pos, Vec2::new(110.0, 46.0));
    }

    #[test]
    fn test_status_from_wire() {
        assert_eq!(Status::from_wire("run_down"), Status::Walk);
        assert_eq!(Status::from_wire("idle_left"), Status::Idle);
        assert_eq!(Status::from_wire("death"), Status::Dead);
        assert_eq!(Status::from_wire("bogus"), Status::Idle);
        assert!(Status::Hurt.is_locked());
        assert!(!Status::Walk.is_locked());
    }
}
