//! Geometry kernel: axis-aligned boxes, polygons and SAT overlap
//!
//! Overlap is strict everywhere: shapes that only share an edge or a corner
//! do not overlap. The AABB test and the SAT test agree on axis-aligned
//! input, which is what lets the coarse test act as a rejection pre-pass.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// An axis-aligned box stored by its extremes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    /// Box from top-left corner and size
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            min: Vec2::new(x, y),
            max: Vec2::new(x + w, y + h),
        }
    }

    /// Box of the given size centered on `center`
    pub fn from_center(center: Vec2, size: Vec2) -> Self {
        let half = size * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.min += delta;
        self.max += delta;
    }

    pub fn translated(&self, delta: Vec2) -> Self {
        let mut r = *self;
        r.translate(delta);
        r
    }

    /// Grow (or shrink, if negative) by `amount` on every side
    pub fn inflate(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(amount),
            max: self.max + Vec2::splat(amount),
        }
    }

    /// Move horizontally so the right edge sits at `x`, keeping width
    pub fn set_right(&mut self, x: f32) {
        let w = self.width();
        self.max.x = x;
        self.min.x = x - w;
    }

    /// Move horizontally so the left edge sits at `x`, keeping width
    pub fn set_left(&mut self, x: f32) {
        let w = self.width();
        self.min.x = x;
        self.max.x = x + w;
    }

    /// Move vertically so the bottom edge sits at `y`, keeping height
    pub fn set_bottom(&mut self, y: f32) {
        let h = self.height();
        self.max.y = y;
        self.min.y = y - h;
    }

    /// Move vertically so the top edge sits at `y`, keeping height
    pub fn set_top(&mut self, y: f32) {
        let h = self.height();
        self.min.y = y;
        self.max.y = y + h;
    }

    /// Recenter without changing size
    pub fn set_center(&mut self, center: Vec2) {
        let half = self.size() * 0.5;
        self.min = center - half;
        self.max = center + half;
    }

    /// Strict AABB overlap (touching edges do not count)
    #[inline]
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }

    /// Smallest box containing both
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Corners in winding order: top-left, top-right, bottom-right, bottom-left
    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }

    /// Bounding box of a point set (None if empty)
    pub fn bounding(points: &[Vec2]) -> Option<Rect> {
        let first = *points.first()?;
        let mut r = Rect {
            min: first,
            max: first,
        };
        for p in &points[1..] {
            r.min = r.min.min(*p);
            r.max = r.max.max(*p);
        }
        Some(r)
    }
}

/// A collision shape
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Rect(Rect),
    /// Ordered (convex) polygon in world space
    Polygon(Vec<Vec2>),
}

impl Shape {
    /// Vertices of the shape (a box converts to its 4 corners)
    pub fn points(&self) -> Vec<Vec2> {
        match self {
            Shape::Rect(r) => r.corners().to_vec(),
            Shape::Polygon(pts) => pts.clone(),
        }
    }

    pub fn bounds(&self) -> Option<Rect> {
        match self {
            Shape::Rect(r) => Some(*r),
            Shape::Polygon(pts) => Rect::bounding(pts),
        }
    }
}

impl From<Rect> for Shape {
    fn from(r: Rect) -> Self {
        Shape::Rect(r)
    }
}

/// Do two shapes overlap?
///
/// Box/box pairs use the AABB test directly. Anything involving a polygon
/// first rejects on bounding boxes, then runs the full SAT test.
pub fn overlaps(a: &Shape, b: &Shape) -> bool {
    if let (Shape::Rect(ra), Shape::Rect(rb)) = (a, b) {
        return ra.overlaps(rb);
    }
    match (a.bounds(), b.bounds()) {
        (Some(ba), Some(bb)) if ba.overlaps(&bb) => {}
        _ => return false,
    }
    sat_overlaps(&a.points(), &b.points())
}

/// Separating Axis Theorem test on two convex point sets
///
/// Empty inputs never overlap.
pub fn sat_overlaps(poly_a: &[Vec2], poly_b: &[Vec2]) -> bool {
    if poly_a.is_empty() || poly_b.is_empty() {
        return false;
    }
    for axis in edge_axes(poly_a).chain(edge_axes(poly_b)) {
        let (a_min, a_max) = project(poly_a, axis);
        let (b_min, b_max) = project(poly_b, axis);
        if !(a_min < b_max && b_min < a_max) {
            return false; // separating axis
        }
    }
    true
}

/// Outward edge normals of a polygon, one per non-degenerate edge
///
/// Zero-length edges are skipped. Axis-aligned normals snap to unit axes so
/// their projections are exact.
pub fn edge_axes(points: &[Vec2]) -> impl Iterator<Item = Vec2> + '_ {
    let n = points.len();
    (0..n).filter_map(move |i| {
        let edge = points[(i + 1) % n] - points[i];
        let normal = Vec2::new(-edge.y, edge.x);
        if normal.x == 0.0 && normal.y == 0.0 {
            None
        } else if normal.x == 0.0 {
            Some(Vec2::new(0.0, normal.y.signum()))
        } else if normal.y == 0.0 {
            Some(Vec2::new(normal.x.signum(), 0.0))
        } else {
            normal.try_normalize()
        }
    })
}

/// Project points onto an axis, returning the (min, max) interval
pub fn project(points: &[Vec2], axis: Vec2) -> (f32, f32) {
    points
        .iter()
        .map(|p| axis.dot(*p))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), d| {
            (lo.min(d), hi.max(d))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn diamond(center: Vec2, r: f32) -> Vec<Vec2> {
        vec![
            center + Vec2::new(0.0, -r),
            center + Vec2::new(r, 0.0),
            center + Vec2::new(0.0, r),
            center + Vec2::new(-r, 0.0),
        ]
    }

    #[test]
    fn test_rect_overlap_is_strict() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let touching = Rect::new(10.0, 0.0, 10.0, 10.0);
        let inside = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert!(!a.overlaps(&touching));
        assert!(a.overlaps(&inside));
    }

    #[test]
    fn test_sat_diamond_corner_gap() {
        // Diamond whose tip points at the box corner but does not reach it
        let square = Rect::new(0.0, 0.0, 10.0, 10.0);
        let d = diamond(Vec2::new(16.0, 16.0), 7.0);
        // Bounding boxes overlap, but the diagonal edge separates them
        assert!(Rect::bounding(&d).is_some_and(|b| b.overlaps(&square)));
        assert!(!overlaps(&Shape::Rect(square), &Shape::Polygon(d)));

        let d = diamond(Vec2::new(12.0, 12.0), 7.0);
        assert!(overlaps(&Shape::Rect(square), &Shape::Polygon(d)));
    }

    #[test]
    fn test_degenerate_edges_are_skipped() {
        // Duplicate vertex produces a zero-length edge
        let poly = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(0.0, 10.0),
        ];
        assert_eq!(edge_axes(&poly).count(), 4);
        assert!(edge_axes(&poly).all(|a| a.is_finite()));
        let other = Rect::new(5.0, 5.0, 2.0, 2.0);
        assert!(sat_overlaps(&poly, &other.corners()));
    }

    #[test]
    fn test_empty_polygon_never_overlaps() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(!overlaps(&Shape::Polygon(Vec::new()), &Shape::Rect(r)));
        assert!(!sat_overlaps(&[], &r.corners()));
    }

    #[test]
    fn test_project_interval() {
        let r = Rect::new(2.0, 3.0, 4.0, 5.0);
        assert_eq!(project(&r.corners(), Vec2::X), (2.0, 6.0));
        assert_eq!(project(&r.corners(), Vec2::Y), (3.0, 8.0));
    }

    fn arb_rect() -> impl Strategy<Value = Rect> {
        (-200i32..200, -200i32..200, 1i32..120, 1i32..120)
            .prop_map(|(x, y, w, h)| Rect::new(x as f32, y as f32, w as f32, h as f32))
    }

    proptest! {
        #[test]
        fn sat_agrees_with_aabb(a in arb_rect(), b in arb_rect()) {
            let sat = sat_overlaps(&a.corners(), &b.corners());
            prop_assert_eq!(sat, a.overlaps(&b));
        }

        #[test]
        fn overlap_is_symmetric(a in arb_rect(), b in arb_rect(), cx in -200.0f32..200.0, cy in -200.0f32..200.0) {
            let poly = Shape::Polygon(diamond(Vec2::new(cx, cy), 40.0));
            prop_assert_eq!(overlaps(&Shape::Rect(a), &poly), overlaps(&poly, &Shape::Rect(a)));
            prop_assert_eq!(overlaps(&Shape::Rect(a), &Shape::Rect(b)), overlaps(&Shape::Rect(b), &Shape::Rect(a)));
        }
    }
}
