//! Melee combat: attack regions, hit tests and hit-stop

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::geometry::{Rect, Shape, overlaps};
use crate::angle_to_dir;
use crate::consts::ATTACK_ACTIVE_MS;

/// Melee weapon tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponConfig {
    pub id: String,
    pub damage: f32,
    pub cooldown_ms: f64,
    pub range: f32,
    pub knockback: f32,
}

impl WeaponConfig {
    pub fn sword() -> Self {
        Self {
            id: "sword".to_string(),
            damage: 20.0,
            cooldown_ms: 900.0,
            range: 110.0,
            knockback: 12.0,
        }
    }
}

impl Default for WeaponConfig {
    fn default() -> Self {
        Self::sword()
    }
}

/// Square strike regions, one per aim angle (degrees)
///
/// Each region has side `range * 0.8` and sits `range * 0.4` ahead of the
/// origin along its angle.
pub fn attack_regions(origin: Vec2, angles: &[f32], range: f32) -> Vec<Rect> {
    let side = range * 0.8;
    angles
        .iter()
        .map(|&a| Rect::from_center(origin + angle_to_dir(a) * range * 0.4, Vec2::splat(side)))
        .collect()
}

/// Strike regions that stay live for a short window after a swing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveAttack {
    pub regions: Vec<Rect>,
    pub started_ms: f64,
}

impl ActiveAttack {
    pub fn new(regions: Vec<Rect>, now_ms: f64) -> Self {
        Self {
            regions,
            started_ms: now_ms,
        }
    }

    pub fn is_live(&self, now_ms: f64) -> bool {
        !self.regions.is_empty() && now_ms - self.started_ms <= ATTACK_ACTIVE_MS
    }
}

/// Does any region overlap the target's world hit polygon?
pub fn region_hits(regions: &[Rect], target: &[Vec2]) -> bool {
    let target = Shape::Polygon(target.to_vec());
    regions.iter().any(|r| overlaps(&Shape::Rect(*r), &target))
}

/// Knockback vector pushing `target` away from `source`
///
/// Zero when the two coincide.
pub fn knockback_from(source: Vec2, target: Vec2, strength: f32) -> Vec2 {
    (target - source).normalize_or_zero() * strength
}

/// Brief freeze-frame signal raised when a hit lands
///
/// Consumers (camera, renderer) read it; the simulation itself keeps running.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HitStop {
    until_ms: Option<f64>,
}

impl HitStop {
    pub fn is_active(&self, now_ms: f64) -> bool {
        self.until_ms.is_some_and(|until| now_ms < until)
    }

    /// Start a hit-stop unless one is already running
    pub fn raise(&mut self, now_ms: f64, duration_ms: f64) -> bool {
        if self.is_active(now_ms) {
            return false;
        }
        self.until_ms = Some(now_ms + duration_ms);
        true
    }

    pub fn expire(&mut self, now_ms: f64) {
        if !self.is_active(now_ms) {
            self.until_ms = None;
        }
    }
}
