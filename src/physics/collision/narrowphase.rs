//! Exact shape-pair tests.
//!
//! Every test is written from the point of view of the first shape:
//! the resulting normal points from the second shape toward the first.

use super::collider::{signed_area_2, ShapeKind};
use super::query::point_in_polygon;
use super::{CollisionData, ShapeRef};
use crate::math::{self as m, Vec2};

use itertools::Itertools;

const EPSILON: f64 = 1e-9;

/// Test two shapes for collision, taking the motion of the last step into account.
pub fn test(a: &ShapeRef, b: &ShapeRef) -> CollisionData {
    use ShapeKind::*;
    match (a.collider.kind(), b.collider.kind()) {
        (Circle, Circle) => circle_circle(a, b),
        (Circle, Polygon) => circle_polygon(a, b),
        (Polygon, Circle) => circle_polygon(b, a).flipped(),
        (Polygon, Polygon) => polygon_polygon(a, b),
        (Line, Polygon) => line_polygon(a, b),
        (Polygon, Line) => line_polygon(b, a).flipped(),
        (Line, Circle) => line_circle(a, b),
        (Circle, Line) => line_circle(b, a).flipped(),
        (Line, Line) if line_precedes(a, b) => line_line(a, b),
        (Line, Line) => line_line(b, a).flipped(),
    }
}

fn hit(a: &ShapeRef, b: &ShapeRef, points: Vec<Vec2>, normal: Vec2, toi: f64) -> CollisionData {
    CollisionData::hit(a.key, b.key, points, normal, toi)
}

/// Motion of `a` relative to `b` during the last step.
#[inline]
fn relative_displacement(a: &ShapeRef, b: &ShapeRef) -> Vec2 {
    a.displacement - b.displacement
}

/// Outward edge normals of a polygon, normalized, in edge order.
fn outward_normals(points: &[Vec2]) -> Vec<Vec2> {
    let ccw = signed_area_2(points) >= 0.0;
    edges(points)
        .map(|(p1, p2)| {
            let edge = p2 - p1;
            let n = if ccw {
                m::right_normal(edge)
            } else {
                m::left_normal(edge)
            };
            m::normalize_or_zero(n)
        })
        .collect()
}

fn edges(points: &[Vec2]) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
    points.iter().copied().circular_tuple_windows()
}

/// Whether the point `p` projects onto the segment from `p1` to `p2`.
#[inline]
fn projects_onto_segment(p: Vec2, p1: Vec2, p2: Vec2) -> bool {
    let edge = p2 - p1;
    let len_sq = edge.mag_sq();
    if len_sq < EPSILON {
        return false;
    }
    let t = (p - p1).dot(edge) / len_sq;
    (-EPSILON..=1.0 + EPSILON).contains(&t)
}

fn closest_point_on_segment(p: Vec2, p1: Vec2, p2: Vec2) -> Vec2 {
    let edge = p2 - p1;
    let len_sq = edge.mag_sq();
    if len_sq < EPSILON {
        return p1;
    }
    let t = m::clamp01((p - p1).dot(edge) / len_sq);
    p1 + edge * t
}

/// Intersection of two segments as parameters along each, if they cross.
fn segment_intersection(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> Option<(f64, f64)> {
    let da = a2 - a1;
    let db = b2 - b1;
    let den = m::cross(da, db);
    if den.abs() < EPSILON {
        return None;
    }
    let offset = b1 - a1;
    let ua = m::cross(offset, db) / den;
    let ub = m::cross(offset, da) / den;
    let range = -EPSILON..=1.0 + EPSILON;
    (range.contains(&ua) && range.contains(&ub)).then_some((ua, ub))
}

/// Time of impact along a normal, given the current overlap
/// and how far the shapes approached each other along it during the step.
#[inline]
fn toi_from_overlap(overlap: f64, approach: f64) -> f64 {
    if approach > EPSILON {
        m::clamp01(1.0 - overlap / approach)
    } else {
        0.0
    }
}

//
// CIRCLE <-> CIRCLE
//

fn circle_circle(a: &ShapeRef, b: &ShapeRef) -> CollisionData {
    let (Some(ra), Some(rb)) = (
        a.collider.world_radius(&a.transform),
        b.collider.world_radius(&b.transform),
    ) else {
        return CollisionData::empty();
    };
    let ca = a.center();
    let cb = b.center();
    let r_sum = ra + rb;

    let diff = ca - cb;
    let dist = diff.mag();
    let rel_disp = relative_displacement(a, b);
    if dist > r_sum || rel_disp.dot(diff) > 0.0 {
        // apart, or already separating
        return CollisionData::empty();
    }

    let normal = if dist < EPSILON {
        Vec2::unit_x()
    } else {
        diff / dist
    };

    // sweep the relative motion: solve |start + t * rel_disp| = r_sum
    let start = diff - rel_disp;
    let toi = if start.mag() <= r_sum {
        0.0
    } else {
        let qa = rel_disp.mag_sq();
        let qb = 2.0 * start.dot(rel_disp);
        let qc = start.mag_sq() - r_sum * r_sum;
        let disc = qb * qb - 4.0 * qa * qc;
        if qa < EPSILON || disc < 0.0 {
            0.0
        } else {
            (-qb - disc.sqrt()) / (2.0 * qa)
        }
    };

    hit(a, b, vec![cb + normal * rb], normal, toi).inside(dist <= (ra - rb).abs())
}

//
// CIRCLE <-> POLYGON
//

fn circle_polygon(circle: &ShapeRef, poly: &ShapeRef) -> CollisionData {
    let Some(r) = circle.collider.world_radius(&circle.transform) else {
        return CollisionData::empty();
    };
    let center = circle.center();
    let rel_disp = relative_displacement(circle, poly);
    let start = center - rel_disp;
    let points = poly.points();
    let normals = outward_normals(&points);

    let contained = point_in_polygon(center, &points);

    // earliest edge the circle swept into contact with during the step
    let mut swept: Option<(f64, Vec2, Vec2)> = None;
    for ((p1, p2), n) in edges(&points).zip(&normals) {
        let dist_now = (center - p1).dot(*n);
        let dist_start = (start - p1).dot(*n);
        if dist_start < r || dist_now >= r {
            continue;
        }
        let toi = (dist_start - r) / (dist_start - dist_now);
        let foot = start + rel_disp * toi - *n * r;
        if projects_onto_segment(foot, p1, p2) && swept.map_or(true, |(t, ..)| toi < t) {
            swept = Some((toi, foot, *n));
        }
    }
    if let Some((toi, foot, n)) = swept {
        return hit(circle, poly, vec![foot], n, toi).inside(contained);
    }

    // already touching an edge at the start of the step
    for ((p1, p2), n) in edges(&points).zip(&normals) {
        let dist_now = (center - p1).dot(*n);
        if !(0.0..r).contains(&dist_now) {
            continue;
        }
        let foot = center - *n * dist_now;
        if projects_onto_segment(foot, p1, p2) {
            return hit(circle, poly, vec![foot], *n, 0.0);
        }
    }

    // corners
    if !contained {
        for v in &points {
            let to_center = center - *v;
            let dist = to_center.mag();
            if dist < r {
                let approach = -rel_disp.dot(to_center / dist.max(EPSILON));
                let toi = toi_from_overlap(r - dist, approach);
                return hit(circle, poly, vec![*v], to_center, toi);
            }
        }
        return CollisionData::empty();
    }

    // center contained: push out through the nearest edge
    let nearest = edges(&points)
        .zip(&normals)
        .map(|((p1, _), n)| ((p1 - center).dot(*n), *n))
        .min_by(|(d1, _), (d2, _)| d1.total_cmp(d2));
    match nearest {
        Some((depth, n)) => {
            hit(circle, poly, vec![center + n * depth], n, 0.0).inside(true)
        }
        None => CollisionData::empty(),
    }
}

//
// POLYGON <-> POLYGON
//

fn aabb(points: &[Vec2]) -> (Vec2, Vec2) {
    points.iter().fold(
        (
            Vec2::broadcast(f64::INFINITY),
            Vec2::broadcast(f64::NEG_INFINITY),
        ),
        |(min, max), p| (min.min_by_component(*p), max.max_by_component(*p)),
    )
}

fn project(points: &[Vec2], axis: Vec2) -> (f64, f64) {
    points
        .iter()
        .map(|p| p.dot(axis))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
            (lo.min(d), hi.max(d))
        })
}

/// Separating axis test between two convex point sets.
/// Returns the axis of minimum overlap, oriented from `b` toward `a`,
/// and the overlap along it.
fn separating_axis(pa: &[Vec2], pb: &[Vec2]) -> Option<(Vec2, f64)> {
    let (min_a, max_a) = aabb(pa);
    let (min_b, max_b) = aabb(pb);
    if max_a.x < min_b.x || max_b.x < min_a.x || max_a.y < min_b.y || max_b.y < min_a.y {
        return None;
    }

    let axes = edges(pa)
        .chain(edges(pb))
        .map(|(p1, p2)| m::normalize_or_zero(m::left_normal(p2 - p1)))
        .filter(|axis| axis.mag_sq() > 0.5);

    let mut best: Option<(Vec2, f64)> = None;
    for axis in axes {
        let (lo_a, hi_a) = project(pa, axis);
        let (lo_b, hi_b) = project(pb, axis);
        // distance needed to push a out of b in either direction along the axis
        let overlap = (hi_a - lo_b).min(hi_b - lo_a);
        if overlap < 0.0 {
            return None;
        }
        if best.map_or(true, |(_, o)| overlap < o) {
            best = Some((axis, overlap));
        }
    }

    let (axis, overlap) = best?;
    let centroid = |ps: &[Vec2]| ps.iter().fold(Vec2::zero(), |acc, p| acc + *p) / ps.len() as f64;
    let axis = if (centroid(pa) - centroid(pb)).dot(axis) < 0.0 {
        -axis
    } else {
        axis
    };
    Some((axis, overlap))
}

fn push_unique(points: &mut Vec<Vec2>, p: Vec2) {
    if points.iter().all(|q| (*q - p).mag_sq() > EPSILON) {
        points.push(p);
    }
}

fn polygon_polygon(a: &ShapeRef, b: &ShapeRef) -> CollisionData {
    let pa = a.points();
    let pb = b.points();
    let Some((normal, overlap)) = separating_axis(&pa, &pb) else {
        return CollisionData::empty();
    };

    let a_in_b: Vec<Vec2> = pa.iter().copied().filter(|p| point_in_polygon(*p, &pb)).collect();
    let b_in_a: Vec<Vec2> = pb.iter().copied().filter(|p| point_in_polygon(*p, &pa)).collect();
    let is_inside = a_in_b.len() == pa.len() || b_in_a.len() == pb.len();

    let mut contacts = Vec::new();
    for p in a_in_b.into_iter().chain(b_in_a) {
        push_unique(&mut contacts, p);
    }
    if contacts.is_empty() {
        // edges touching or crossing without any vertex inside: use the deepest vertex of a
        let deepest = pa
            .iter()
            .copied()
            .min_by(|p, q| p.dot(normal).total_cmp(&q.dot(normal)));
        contacts.extend(deepest);
    }

    let approach = -relative_displacement(a, b).dot(normal);
    hit(a, b, contacts, normal, toi_from_overlap(overlap, approach)).inside(is_inside)
}

//
// LINE <-> POLYGON
//

fn line_polygon(line: &ShapeRef, poly: &ShapeRef) -> CollisionData {
    let seg = line.points();
    let (s, e) = (seg[0], seg[1]);
    let points = poly.points();
    let normals = outward_normals(&points);

    // both endpoints in front of the same edge
    let same_side = edges(&points)
        .zip(&normals)
        .any(|((p1, _), n)| (s - p1).dot(*n) > 0.0 && (e - p1).dot(*n) > 0.0);
    if same_side {
        return CollisionData::empty();
    }

    // the whole polygon on one side of the line
    let line_normal = m::left_normal(e - s);
    let sides = points.iter().map(|p| (*p - s).dot(line_normal));
    let (lo, hi) = sides.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
        (lo.min(d), hi.max(d))
    });
    if lo > 0.0 || hi < 0.0 {
        return CollisionData::empty();
    }

    let Some((normal, overlap)) = separating_axis(&seg, &points) else {
        return CollisionData::empty();
    };

    let mut contacts = Vec::new();
    for (p1, p2) in edges(&points) {
        if let Some((ua, _)) = segment_intersection(s, e, p1, p2) {
            push_unique(&mut contacts, s + (e - s) * ua);
        }
    }
    let s_inside = point_in_polygon(s, &points);
    let e_inside = point_in_polygon(e, &points);
    if s_inside {
        push_unique(&mut contacts, s);
    }
    if e_inside {
        push_unique(&mut contacts, e);
    }

    let approach = -relative_displacement(line, poly).dot(normal);
    hit(line, poly, contacts, normal, toi_from_overlap(overlap, approach))
        .inside(s_inside && e_inside)
}

//
// LINE <-> CIRCLE
//

fn line_circle(line: &ShapeRef, circle: &ShapeRef) -> CollisionData {
    let Some(r) = circle.collider.world_radius(&circle.transform) else {
        return CollisionData::empty();
    };
    let c = circle.center();
    let seg = line.points();
    let (s, e) = (seg[0], seg[1]);

    let closest = closest_point_on_segment(c, s, e);
    let to_line = closest - c;
    let dist = to_line.mag();
    if dist > r {
        return CollisionData::empty();
    }
    let normal = if dist < EPSILON {
        m::normalize_or_zero(m::left_normal(e - s))
    } else {
        to_line / dist
    };

    // solve |s + t * d - c| = r for the crossing points
    let d = e - s;
    let f = s - c;
    let qa = d.mag_sq();
    let qb = 2.0 * f.dot(d);
    let qc = f.mag_sq() - r * r;
    let disc = qb * qb - 4.0 * qa * qc;
    let mut contacts = Vec::new();
    if disc >= 0.0 && qa > EPSILON {
        let root = disc.sqrt();
        for t in [(-qb - root) / (2.0 * qa), (-qb + root) / (2.0 * qa)] {
            if (0.0..=1.0).contains(&t) {
                push_unique(&mut contacts, s + d * t);
            }
        }
    }
    let is_inside = (s - c).mag() < r && (e - c).mag() < r;
    if contacts.is_empty() && !is_inside {
        contacts.push(closest);
    }

    let approach = -relative_displacement(line, circle).dot(normal);
    hit(line, circle, contacts, normal, toi_from_overlap(r - dist, approach)).inside(is_inside)
}

//
// LINE <-> LINE
//

/// A fixed order on lines, so that a pair tested either way round
/// gives mirrored results.
fn line_precedes(a: &ShapeRef, b: &ShapeRef) -> bool {
    let coords = |s: &ShapeRef| -> Vec<f64> {
        s.points().iter().flat_map(|p| [p.x, p.y]).collect()
    };
    coords(a)
        .iter()
        .zip(&coords(b))
        .map(|(x, y)| x.total_cmp(y))
        .find(|ord| ord.is_ne())
        .map_or(true, |ord| ord.is_lt())
}

fn line_line(a: &ShapeRef, b: &ShapeRef) -> CollisionData {
    let pa = a.points();
    let pb = b.points();
    let Some((ua, _)) = segment_intersection(pa[0], pa[1], pb[0], pb[1]) else {
        return CollisionData::empty();
    };
    let point = pa[0] + (pa[1] - pa[0]) * ua;

    // push apart along whichever line's normal best separates the midpoints
    // as they were before the step
    let mid_a = (pa[0] + pa[1]) * 0.5;
    let mid_b = (pb[0] + pb[1]) * 0.5;
    let offset = match (mid_a - a.displacement) - (mid_b - b.displacement) {
        o if o.mag_sq() > EPSILON => o,
        _ => mid_a - mid_b,
    };
    let normal_a = m::normalize_or_zero(m::left_normal(pa[1] - pa[0]));
    let normal_b = m::normalize_or_zero(m::left_normal(pb[1] - pb[0]));
    let mut normal = if offset.dot(normal_a).abs() >= offset.dot(normal_b).abs() {
        normal_a
    } else {
        normal_b
    };
    if offset.dot(normal) < 0.0 {
        normal = -normal;
    }

    hit(a, b, vec![point], normal, 0.0)
}
