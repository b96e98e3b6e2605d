//! Polygon hit regions loaded from collision data
//!
//! The data file maps entity-kind ids to points authored against a reference
//! frame size:
//!
//! ```json
//! { "orc": { "points": [[12, 40], [52, 40], [52, 70], [12, 70]], "ref_size": [64, 72] } }
//! ```
//!
//! Variants share a base shape through prefix matching (`orc_captain` uses
//! `orc` unless it has its own entry).

use std::collections::BTreeMap;
use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::geometry::Rect;

/// Errors reading collision data
#[derive(Debug, Error)]
pub enum HitShapeError {
    #[error("failed to read collision data: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed collision data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A polygon hit region in model space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitShape {
    pub points: Vec<[f32; 2]>,
    /// Frame size the points were authored against (None = unscaled)
    #[serde(default)]
    pub ref_size: Option<[f32; 2]>,
}

impl HitShape {
    /// Re-project into world space for a frame at its current size
    ///
    /// `point * (frame_size / ref_size) + frame_origin`
    pub fn to_world(&self, frame: &Rect) -> Vec<Vec2> {
        let scale = match self.ref_size {
            Some([w, h]) if w > 0.0 && h > 0.0 => frame.size() / Vec2::new(w, h),
            _ => Vec2::ONE,
        };
        self.points
            .iter()
            .map(|&[x, y]| Vec2::new(x, y) * scale + frame.min)
            .collect()
    }
}

/// Kind id → hit shape table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HitShapeLibrary {
    shapes: BTreeMap<String, HitShape>,
}

impl HitShapeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, HitShapeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, HitShapeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load collision data, falling back to an empty table
    ///
    /// An empty table means every entity uses its rectangular hitbox.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(lib) => {
                log::info!("Loaded {} hit shapes from {}", lib.len(), path.display());
                lib
            }
            Err(HitShapeError::Io(e)) => {
                log::info!("No collision data at {} ({}), using hitboxes", path.display(), e);
                Self::default()
            }
            Err(e) => {
                log::warn!("{} ({}), using hitboxes", e, path.display());
                Self::default()
            }
        }
    }

    pub fn insert(&mut self, kind: impl Into<String>, shape: HitShape) {
        self.shapes.insert(kind.into(), shape);
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Exact match first, then the longest key the id starts with
    pub fn lookup(&self, kind: &str) -> Option<&HitShape> {
        if let Some(shape) = self.shapes.get(kind) {
            return Some(shape);
        }
        self.shapes
            .iter()
            .filter(|(key, _)| kind.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, shape)| shape)
    }

    /// World-space hit region for an entity
    ///
    /// Falls back to the hitbox corners when the kind has no entry.
    pub fn world_points(&self, kind: &str, frame: &Rect, hitbox: &Rect) -> Vec<Vec2> {
        match self.lookup(kind) {
            Some(shape) if !shape.points.is_empty() => shape.to_world(frame),
            _ => hitbox.corners().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = r#"{
        "orc": { "points": [[0, 0], [10, 0], [10, 10], [0, 10]], "ref_size": [20, 20] },
        "orc_shaman": { "points": [[1, 1], [2, 1], [2, 2]] }
    }"#;

    #[test]
    fn test_prefix_matching() {
        let lib = HitShapeLibrary::from_json(DATA).unwrap();
        assert_eq!(lib.len(), 2);
        // Exact
        assert!(lib.lookup("orc_shaman").is_some_and(|s| s.points.len() == 3));
        // Variant falls back to base shape
        assert!(lib.lookup("orc_captain").is_some_and(|s| s.points.len() == 4));
        // Longest prefix wins
        assert!(lib.lookup("orc_shaman_elder").is_some_and(|s| s.points.len() == 3));
        assert!(lib.lookup("goblin").is_none());
    }

    #[test]
    fn test_scaled_world_points() {
        let lib = HitShapeLibrary::from_json(DATA).unwrap();
        // Frame is twice the reference size, at (100, 50)
        let frame = Rect::new(100.0, 50.0, 40.0, 40.0);
        let hitbox = Rect::new(110.0, 80.0, 16.0, 8.0);
        let pts = lib.world_points("orc", &frame, &hitbox);
        assert_eq!(pts[0], Vec2::new(100.0, 50.0));
        assert_eq!(pts[2], Vec2::new(120.0, 70.0));
    }

    #[test]
    fn test_missing_kind_falls_back_to_hitbox() {
        let lib = HitShapeLibrary::new();
        let frame = Rect::new(0.0, 0.0, 40.0, 40.0);
        let hitbox = Rect::new(10.0, 30.0, 20.0, 10.0);
        assert_eq!(lib.world_points("adventurer", &frame, &hitbox), hitbox.corners().to_vec());
    }

    #[test]
    fn test_malformed_data_is_an_error() {
        assert!(matches!(
            HitShapeLibrary::from_json("{ not json"),
            Err(HitShapeError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let lib = HitShapeLibrary::load_or_default(Path::new("/nonexistent/collisions.json"));
        assert!(lib.is_empty());
    }
}
