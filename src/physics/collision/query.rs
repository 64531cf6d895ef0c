//! Intersection queries for points vs. colliders.

use super::{Collider, ColliderShape};
use crate::math::{self as m, Transform, Vec2};

/// How close a point needs to be to a line collider to count as touching it.
pub const LINE_TOLERANCE: f64 = 0.1;

/// Even-odd test for a point inside a polygon given in world space.
pub fn point_in_polygon(point: Vec2, polygon: &[Vec2]) -> bool {
    let mut inside = false;
    let mut j = polygon.len().wrapping_sub(1);
    for (i, pi) in polygon.iter().enumerate() {
        let pj = polygon[j];
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Whether a point is within `tolerance` of the segment from `start` to `end`.
pub fn point_near_segment(point: Vec2, start: Vec2, end: Vec2, tolerance: f64) -> bool {
    let edge = end - start;
    let len_sq = edge.mag_sq();
    let t = if len_sq > 0.0 {
        m::clamp01((point - start).dot(edge) / len_sq)
    } else {
        0.0
    };
    m::distance(start + edge * t, point) <= tolerance
}

/// Check whether or not a point intersects with a collider.
pub fn point_collider_bool(point: Vec2, tr: &Transform, coll: &Collider) -> bool {
    match &coll.shape {
        ColliderShape::Circle { .. } => {
            let r = coll.active_radius() * tr.scale.x.abs();
            m::distance(point, coll.world_center(tr)) < r
        }
        ColliderShape::Polygon { .. } | ColliderShape::Rect { .. } => {
            point_in_polygon(point, &coll.transformed_points(tr))
        }
        ColliderShape::Line { start, end } => {
            point_near_segment(point, tr.apply(*start), tr.apply(*end), LINE_TOLERANCE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_odd_polygon() {
        let tri = [Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0), Vec2::new(0.0, 4.0)];
        assert!(point_in_polygon(Vec2::new(1.0, 1.0), &tri));
        assert!(!point_in_polygon(Vec2::new(3.0, 3.0), &tri));
        assert!(!point_in_polygon(Vec2::new(-1.0, 1.0), &tri));
    }

    #[test]
    fn points_vs_colliders() {
        let tr = Transform::from_position([10.0, 0.0]);
        let circle = Collider::new_circle_with_offset(1.0, Vec2::new(0.0, 2.0)).unwrap();
        assert!(point_collider_bool(Vec2::new(10.0, 2.5), &tr, &circle));
        assert!(!point_collider_bool(Vec2::new(10.0, 0.5), &tr, &circle));

        let rect = Collider::new_rect(2.0, 4.0).unwrap();
        let rotated = tr.with_rotation(90.0);
        assert!(point_collider_bool(Vec2::new(11.5, 0.0), &rotated, &rect));
        assert!(!point_collider_bool(Vec2::new(10.0, 1.5), &rotated, &rect));

        let line = Collider::new_line(Vec2::zero(), Vec2::new(0.0, 1.0)).unwrap();
        assert!(point_collider_bool(Vec2::new(10.05, 0.5), &tr, &line));
        assert!(!point_collider_bool(Vec2::new(10.2, 0.5), &tr, &line));
    }
}
