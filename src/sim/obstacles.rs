//! Spatially partitioned obstacle set
//!
//! Obstacles are bucketed into a uniform grid so "what is near this box"
//! touches only the cells the box covers. Chunks own their obstacles; the
//! world streamer inserts on load and removes on unload.

use std::collections::{BTreeMap, HashMap};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::entity::{Collidable, RenderItem, RenderKind, Renderable};
use super::geometry::Rect;
use super::world::ChunkCoord;

/// Grid cell side in world units (a quarter chunk)
pub const CELL_SIZE: f32 = 256.0;

/// Stable obstacle id (unique for the lifetime of an index)
pub type ObstacleId = u64;

/// Tree size variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeVariant {
    Big,
    Medium,
    Small,
}

impl TreeVariant {
    /// Visual frame size
    pub fn visual_size(self) -> Vec2 {
        match self {
            TreeVariant::Big => Vec2::new(160.0, 160.0),
            TreeVariant::Medium => Vec2::new(96.0, 160.0),
            TreeVariant::Small => Vec2::new(96.0, 128.0),
        }
    }

    /// Trunk hitbox size
    pub fn hitbox_size(self) -> Vec2 {
        match self {
            TreeVariant::Big => Vec2::new(60.0, 40.0),
            TreeVariant::Medium => Vec2::new(40.0, 30.0),
            TreeVariant::Small => Vec2::new(30.0, 25.0),
        }
    }

    /// Vertical hitbox offset from the visual bottom (negative = up)
    pub fn hitbox_offset(self) -> f32 {
        match self {
            TreeVariant::Big => -10.0,
            TreeVariant::Medium => -8.0,
            TreeVariant::Small => -5.0,
        }
    }
}

/// Obstacle kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObstacleKind {
    Tree(TreeVariant),
    Rock,
}

/// A static prop that blocks movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: ObstacleId,
    pub kind: ObstacleKind,
    /// Owning chunk
    pub chunk: ChunkCoord,
    /// Visual top-left
    pub pos: Vec2,
    pub visual_size: Vec2,
    pub hitbox: Rect,
}

impl Obstacle {
    /// Build an obstacle of `kind` with its visual top-left at `pos`
    pub fn new(id: ObstacleId, kind: ObstacleKind, chunk: ChunkCoord, pos: Vec2) -> Self {
        let (visual_size, hitbox) = match kind {
            ObstacleKind::Tree(variant) => {
                let size = variant.visual_size();
                let hb = variant.hitbox_size();
                // Anchor the trunk at the visual mid-bottom
                let mid_bottom = pos + Vec2::new(size.x * 0.5, size.y + variant.hitbox_offset());
                let hitbox = Rect::new(mid_bottom.x - hb.x * 0.5, mid_bottom.y - hb.y, hb.x, hb.y);
                (size, hitbox)
            }
            ObstacleKind::Rock => {
                let size = Vec2::splat(crate::consts::TILE_SIZE);
                let center = pos + size * 0.5 + Vec2::new(0.0, 5.0);
                (size, Rect::from_center(center, Vec2::splat(50.0)))
            }
        };
        Self {
            id,
            kind,
            chunk,
            pos,
            visual_size,
            hitbox,
        }
    }

    pub fn visual_rect(&self) -> Rect {
        Rect::new(self.pos.x, self.pos.y, self.visual_size.x, self.visual_size.y)
    }
}

impl Collidable for Obstacle {
    fn hitbox(&self) -> Rect {
        self.hitbox
    }
}

impl Renderable for Obstacle {
    fn render_item(&self) -> RenderItem {
        RenderItem {
            kind: RenderKind::Obstacle(self.kind),
            position: self.pos,
            hitbox: self.hitbox,
            status: None,
            polygon: None,
        }
    }
}

type CellKey = (i32, i32);

fn cell_of(v: f32) -> i32 {
    (v / CELL_SIZE).floor() as i32
}

fn cell_range(rect: &Rect) -> (CellKey, CellKey) {
    (
        (cell_of(rect.min.x), cell_of(rect.min.y)),
        (cell_of(rect.max.x), cell_of(rect.max.y)),
    )
}

/// Grid-bucketed obstacle storage
#[derive(Debug, Clone, Default)]
pub struct ObstacleIndex {
    obstacles: BTreeMap<ObstacleId, Obstacle>,
    cells: HashMap<CellKey, Vec<ObstacleId>>,
    next_id: ObstacleId,
}

impl ObstacleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for an obstacle about to be inserted
    pub fn next_id(&mut self) -> ObstacleId {
        self.next_id += 1;
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn get(&self, id: ObstacleId) -> Option<&Obstacle> {
        self.obstacles.get(&id)
    }

    /// All obstacles in id order
    pub fn iter(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.values()
    }

    pub fn insert(&mut self, obstacle: Obstacle) {
        let ((x0, y0), (x1, y1)) = cell_range(&obstacle.hitbox);
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                self.cells.entry((cx, cy)).or_default().push(obstacle.id);
            }
        }
        self.obstacles.insert(obstacle.id, obstacle);
    }

    pub fn remove(&mut self, id: ObstacleId) -> Option<Obstacle> {
        let obstacle = self.obstacles.remove(&id)?;
        let ((x0, y0), (x1, y1)) = cell_range(&obstacle.hitbox);
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                if let Some(bucket) = self.cells.get_mut(&(cx, cy)) {
                    bucket.retain(|&o| o != id);
                    if bucket.is_empty() {
                        self.cells.remove(&(cx, cy));
                    }
                }
            }
        }
        Some(obstacle)
    }

    pub fn clear(&mut self) {
        self.obstacles.clear();
        self.cells.clear();
    }

    /// Obstacles whose cells intersect `region`, in id order
    ///
    /// This is a broad phase: callers still run the exact overlap test.
    pub fn query_near(&self, region: &Rect) -> Vec<&Obstacle> {
        let ((x0, y0), (x1, y1)) = cell_range(region);
        let mut ids: Vec<ObstacleId> = Vec::new();
        for cx in x0..=x1 {
            for cy in y0..=y1 {
                if let Some(bucket) = self.cells.get(&(cx, cy)) {
                    ids.extend_from_slice(bucket);
                }
            }
        }
        ids.sort_unstable();
        ids.dedup();
        ids.iter().filter_map(|id| self.obstacles.get(id)).collect()
    }

    /// Hitboxes of obstacles near `region` (appended to `out`)
    pub fn hitboxes_near(&self, region: &Rect, out: &mut Vec<Rect>) {
        out.extend(self.query_near(region).into_iter().map(|o| o.hitbox));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rock_at(index: &mut ObstacleIndex, x: f32, y: f32) -> ObstacleId {
        let id = index.next_id();
        index.insert(Obstacle::new(id, ObstacleKind::Rock, ChunkCoord::new(0, 0), Vec2::new(x, y)));
        id
    }

    #[test]
    fn test_query_near_is_local() {
        let mut index = ObstacleIndex::new();
        let near = rock_at(&mut index, 10.0, 10.0);
        let _far = rock_at(&mut index, 5000.0, 5000.0);

        let hits = index.query_near(&Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, near);
    }

    #[test]
    fn test_spanning_obstacle_reported_once() {
        let mut index = ObstacleIndex::new();
        // Straddles the x = 256 cell boundary
        let id = rock_at(&mut index, 230.0, 10.0);
        let hits = index.query_near(&Rect::new(0.0, 0.0, 600.0, 100.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
    }

    #[test]
    fn test_remove_clears_cells() {
        let mut index = ObstacleIndex::new();
        let id = rock_at(&mut index, -300.0, -300.0);
        assert!(index.remove(id).is_some());
        assert!(index.is_empty());
        assert!(index.query_near(&Rect::new(-400.0, -400.0, 200.0, 200.0)).is_empty());
        assert!(index.remove(id).is_none());
    }

    #[test]
    fn test_tree_hitbox_anchored_at_trunk() {
        let o = Obstacle::new(
            1,
            ObstacleKind::Tree(TreeVariant::Big),
            ChunkCoord::new(0, 0),
            Vec2::ZERO,
        );
        assert_eq!(o.hitbox.max.y, 150.0);
        assert_eq!(o.hitbox.center().x, 80.0);
        assert_eq!(o.hitbox.size(), Vec2::new(60.0, 40.0));
    }
}
