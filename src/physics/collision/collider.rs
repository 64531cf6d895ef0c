use crate::math::{self as m, Transform, Vec2};
use std::sync::OnceLock;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("Shape parameter `{0}` must be finite")]
    NotFinite(&'static str),
    #[error("Shape parameter `{0}` must be positive")]
    NotPositive(&'static str),
    #[error("A polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("A polygon must enclose a nonzero area")]
    ZeroArea,
    #[error("A line must have distinct endpoints")]
    DegenerateLine,
}

/// The physical shape of a collider, in object-local space.
#[derive(Clone, Debug, PartialEq)]
pub enum ColliderShape {
    Circle {
        r: f64,
        offset: Vec2,
    },
    Polygon {
        points: Vec<Vec2>,
    },
    /// An axis-aligned box centered on the object origin.
    /// The corner points are kept in sync with the size so that
    /// rects can be treated as polygons in collision detection.
    Rect {
        w: f64,
        h: f64,
        points: [Vec2; 4],
    },
    Line {
        start: Vec2,
        end: Vec2,
    },
}

/// Shape kinds as seen by the narrow phase. Rects are polygons there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    Circle,
    Polygon,
    Line,
}

/// Already-deserialized construction arguments for a collider.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum ColliderDesc {
    Circle {
        radius: f64,
        #[cfg_attr(feature = "serde-types", serde(default))]
        offset: [f64; 2],
        #[cfg_attr(feature = "serde-types", serde(default))]
        trigger: bool,
    },
    Polygon {
        points: Vec<[f64; 2]>,
        #[cfg_attr(feature = "serde-types", serde(default))]
        trigger: bool,
    },
    Rect {
        width: f64,
        height: f64,
        #[cfg_attr(feature = "serde-types", serde(default))]
        trigger: bool,
    },
    Line {
        start: [f64; 2],
        end: [f64; 2],
        #[cfg_attr(feature = "serde-types", serde(default))]
        trigger: bool,
    },
}

/// A component that allows an object to collide with others.
#[derive(Clone, Debug)]
pub struct Collider {
    pub(crate) shape: ColliderShape,
    is_trigger: bool,
    // computed on first use, reset only when the shape is resized
    active_radius: OnceLock<f64>,
}

fn check_finite(name: &'static str, v: f64) -> Result<f64, ShapeError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(ShapeError::NotFinite(name))
    }
}

fn check_positive(name: &'static str, v: f64) -> Result<f64, ShapeError> {
    check_finite(name, v)?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(ShapeError::NotPositive(name))
    }
}

fn check_point(name: &'static str, p: Vec2) -> Result<Vec2, ShapeError> {
    check_finite(name, p.x)?;
    check_finite(name, p.y)?;
    Ok(p)
}

fn rect_points(w: f64, h: f64) -> [Vec2; 4] {
    let (hw, hh) = (w / 2.0, h / 2.0);
    [
        Vec2::new(-hw, hh),
        Vec2::new(hw, hh),
        Vec2::new(hw, -hh),
        Vec2::new(-hw, -hh),
    ]
}

/// Twice the signed area of a polygon. Positive for counterclockwise winding.
pub(crate) fn signed_area_2(points: &[Vec2]) -> f64 {
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(p1, p2)| m::cross(*p1, *p2))
        .sum()
}

impl Collider {
    fn from_shape(shape: ColliderShape) -> Self {
        Collider {
            shape,
            is_trigger: false,
            active_radius: OnceLock::new(),
        }
    }

    /// Create a circle collider from a radius.
    pub fn new_circle(radius: f64) -> Result<Self, ShapeError> {
        Self::new_circle_with_offset(radius, Vec2::zero())
    }

    /// Create a circle collider whose center is offset from the object's origin.
    pub fn new_circle_with_offset(radius: f64, offset: Vec2) -> Result<Self, ShapeError> {
        Ok(Self::from_shape(ColliderShape::Circle {
            r: check_positive("radius", radius)?,
            offset: check_point("offset", offset)?,
        }))
    }

    /// Create a convex polygon collider from its vertices in either winding order.
    pub fn new_polygon(points: impl Into<Vec<Vec2>>) -> Result<Self, ShapeError> {
        let points = points.into();
        if points.len() < 3 {
            return Err(ShapeError::TooFewVertices(points.len()));
        }
        for p in &points {
            check_point("points", *p)?;
        }
        if signed_area_2(&points).abs() < f64::EPSILON {
            return Err(ShapeError::ZeroArea);
        }
        Ok(Self::from_shape(ColliderShape::Polygon { points }))
    }

    /// Create a rect collider centered on the object's origin.
    pub fn new_rect(width: f64, height: f64) -> Result<Self, ShapeError> {
        let w = check_positive("width", width)?;
        let h = check_positive("height", height)?;
        Ok(Self::from_shape(ColliderShape::Rect {
            w,
            h,
            points: rect_points(w, h),
        }))
    }

    /// Create a rect collider with both sides set to the same length.
    pub fn new_square(side_length: f64) -> Result<Self, ShapeError> {
        Self::new_rect(side_length, side_length)
    }

    /// Create a line segment collider.
    pub fn new_line(start: Vec2, end: Vec2) -> Result<Self, ShapeError> {
        let start = check_point("start", start)?;
        let end = check_point("end", end)?;
        if (end - start).mag_sq() < f64::EPSILON {
            return Err(ShapeError::DegenerateLine);
        }
        Ok(Self::from_shape(ColliderShape::Line { start, end }))
    }

    /// Build a collider from deserialized construction arguments.
    pub fn from_desc(desc: &ColliderDesc) -> Result<Self, ShapeError> {
        let v = |p: [f64; 2]| Vec2::new(p[0], p[1]);
        let (coll, trigger) = match desc {
            ColliderDesc::Circle {
                radius,
                offset,
                trigger,
            } => (Self::new_circle_with_offset(*radius, v(*offset))?, *trigger),
            ColliderDesc::Polygon { points, trigger } => (
                Self::new_polygon(points.iter().copied().map(v).collect::<Vec<_>>())?,
                *trigger,
            ),
            ColliderDesc::Rect {
                width,
                height,
                trigger,
            } => (Self::new_rect(*width, *height)?, *trigger),
            ColliderDesc::Line {
                start,
                end,
                trigger,
            } => (Self::new_line(v(*start), v(*end))?, *trigger),
        };
        Ok(coll.with_trigger(trigger))
    }

    /// Make this collider a trigger, which reports overlaps
    /// but has no physical response.
    pub fn with_trigger(mut self, is_trigger: bool) -> Self {
        self.is_trigger = is_trigger;
        self
    }

    #[inline]
    pub fn is_trigger(&self) -> bool {
        self.is_trigger
    }

    #[inline]
    pub fn shape(&self) -> &ColliderShape {
        &self.shape
    }

    #[inline]
    pub fn kind(&self) -> ShapeKind {
        match self.shape {
            ColliderShape::Circle { .. } => ShapeKind::Circle,
            ColliderShape::Polygon { .. } | ColliderShape::Rect { .. } => ShapeKind::Polygon,
            ColliderShape::Line { .. } => ShapeKind::Line,
        }
    }

    /// Change the size of a rect collider, recomputing its corners.
    /// Does nothing for other shapes.
    pub fn set_size(&mut self, width: f64, height: f64) -> Result<(), ShapeError> {
        if let ColliderShape::Rect { w, h, points } = &mut self.shape {
            *w = check_positive("width", width)?;
            *h = check_positive("height", height)?;
            *points = rect_points(*w, *h);
            self.active_radius = OnceLock::new();
        }
        Ok(())
    }

    /// Vertices of a polygon or rect in local space.
    pub fn polygon_points(&self) -> Option<&[Vec2]> {
        match &self.shape {
            ColliderShape::Polygon { points } => Some(points),
            ColliderShape::Rect { points, .. } => Some(points),
            _ => None,
        }
    }

    /// The logical center of mass in object-local space.
    pub fn center_of_mass(&self) -> Vec2 {
        match &self.shape {
            ColliderShape::Circle { offset, .. } => *offset,
            ColliderShape::Polygon { points } => {
                points.iter().fold(Vec2::zero(), |acc, p| acc + *p) / points.len() as f64
            }
            ColliderShape::Rect { .. } => Vec2::zero(),
            ColliderShape::Line { start, end } => (*start + *end) * 0.5,
        }
    }

    /// The center of mass in world space.
    #[inline]
    pub fn world_center(&self, tr: &Transform) -> Vec2 {
        tr.apply(self.center_of_mass())
    }

    /// Maximum distance from the center of mass to any point of the shape
    /// at unit scale. Computed once and cached.
    pub fn active_radius(&self) -> f64 {
        *self.active_radius.get_or_init(|| {
            let com = self.center_of_mass();
            match &self.shape {
                ColliderShape::Circle { r, .. } => *r,
                ColliderShape::Rect { w, h, .. } => (w * w + h * h).sqrt() / 2.0,
                ColliderShape::Polygon { points } => points
                    .iter()
                    .map(|p| m::distance(*p, com))
                    .fold(0.0, f64::max),
                ColliderShape::Line { start, end } => {
                    m::distance(*start, com).max(m::distance(*end, com))
                }
            }
        })
    }

    /// Radius of a circle collider under the object's scale.
    /// The x scale factor is used for circles.
    pub fn world_radius(&self, tr: &Transform) -> Option<f64> {
        match self.shape {
            ColliderShape::Circle { r, .. } => Some(r * tr.scale.x.abs()),
            _ => None,
        }
    }

    /// Moment of inertia around the center of mass for a given total mass.
    pub fn moment_of_inertia(&self, mass: f64) -> f64 {
        // from https://en.wikipedia.org/wiki/List_of_moments_of_inertia
        match &self.shape {
            ColliderShape::Circle { r, .. } => mass * r * r / 2.0,
            ColliderShape::Rect { w, h, .. } => mass * (w * w + h * h) / 12.0,
            ColliderShape::Line { start, end } => mass * (*end - *start).mag_sq() / 3.0,
            ColliderShape::Polygon { points } => {
                let (mut num, mut den) = (0.0, 0.0);
                for (p1, p2) in points.iter().zip(points.iter().cycle().skip(1)) {
                    let a = m::cross(*p1, *p2);
                    num += a * (p1.dot(*p1) + p1.dot(*p2) + p2.dot(*p2));
                    den += a;
                }
                mass * num / (6.0 * den)
            }
        }
    }

    /// The defining points of the shape in world space.
    ///
    /// Polygons and rects give their vertices, lines their endpoints
    /// and circles their center followed by the four axis-extreme points.
    pub fn transformed_points(&self, tr: &Transform) -> Vec<Vec2> {
        match &self.shape {
            ColliderShape::Polygon { points } => points.iter().map(|p| tr.apply(*p)).collect(),
            ColliderShape::Rect { points, .. } => points.iter().map(|p| tr.apply(*p)).collect(),
            ColliderShape::Line { start, end } => vec![tr.apply(*start), tr.apply(*end)],
            ColliderShape::Circle { r, offset } => {
                let c = tr.apply(*offset);
                let r = r * tr.scale.x.abs();
                vec![
                    c,
                    c + Vec2::new(r, 0.0),
                    c + Vec2::new(0.0, r),
                    c - Vec2::new(r, 0.0),
                    c - Vec2::new(0.0, r),
                ]
            }
        }
    }

    /// How far the shape extends from its world center of mass in a direction.
    pub fn support_distance(&self, tr: &Transform, dir: Vec2) -> f64 {
        let dir = m::normalize_or_zero(dir);
        match self.world_radius(tr) {
            Some(r) => r,
            None => {
                let center = self.world_center(tr);
                self.transformed_points(tr)
                    .into_iter()
                    .map(|p| (p - center).dot(dir))
                    .fold(0.0, f64::max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_arguments_fail_fast() {
        assert_eq!(
            Collider::new_circle(-1.0).unwrap_err(),
            ShapeError::NotPositive("radius")
        );
        assert_eq!(
            Collider::new_rect(f64::NAN, 1.0).unwrap_err(),
            ShapeError::NotFinite("width")
        );
        assert_eq!(
            Collider::new_polygon(vec![Vec2::zero(), Vec2::unit_x()]).unwrap_err(),
            ShapeError::TooFewVertices(2)
        );
        assert_eq!(
            Collider::new_polygon(vec![Vec2::zero(), Vec2::unit_x(), Vec2::new(2.0, 0.0)])
                .unwrap_err(),
            ShapeError::ZeroArea
        );
        assert_eq!(
            Collider::new_line(Vec2::unit_x(), Vec2::unit_x()).unwrap_err(),
            ShapeError::DegenerateLine
        );
    }

    #[test]
    fn active_radius_bounds_every_point() {
        let colls = [
            Collider::new_circle_with_offset(3.0, Vec2::new(1.0, 1.0)).unwrap(),
            Collider::new_rect(4.0, 2.0).unwrap(),
            Collider::new_polygon(vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(6.0, 0.0),
                Vec2::new(1.0, 3.0),
            ])
            .unwrap(),
            Collider::new_line(Vec2::new(-2.0, 0.0), Vec2::new(4.0, 0.0)).unwrap(),
        ];
        let unit = Transform::default();
        for coll in &colls {
            let com = coll.center_of_mass();
            let radius = coll.active_radius();
            for p in coll.transformed_points(&unit) {
                assert!(m::distance(p, com) <= radius + 1e-9, "{coll:?}");
            }
        }
        assert!((colls[1].active_radius() - 5.0_f64.sqrt()).abs() < 1e-9);
        assert_eq!(colls[3].active_radius(), 3.0);
    }

    #[test]
    fn resizing_a_rect_refreshes_corners_and_radius() {
        let mut rect = Collider::new_rect(2.0, 2.0).unwrap();
        assert!((rect.active_radius() - 2.0_f64.sqrt()).abs() < 1e-9);
        rect.set_size(6.0, 8.0).unwrap();
        assert_eq!(rect.active_radius(), 5.0);
        assert_eq!(rect.polygon_points().unwrap()[1], Vec2::new(3.0, 4.0));
        assert_eq!(rect.kind(), ShapeKind::Polygon);
    }

    #[test]
    fn moments_of_inertia() {
        let circle = Collider::new_circle(2.0).unwrap();
        assert_eq!(circle.moment_of_inertia(3.0), 6.0);
        let line = Collider::new_line(Vec2::zero(), Vec2::new(3.0, 0.0)).unwrap();
        assert_eq!(line.moment_of_inertia(1.0), 3.0);
        let rect = Collider::new_rect(2.0, 4.0).unwrap();
        assert!((rect.moment_of_inertia(6.0) - 10.0).abs() < 1e-9);
        // a square as a generic polygon agrees with the box formula
        let poly = Collider::new_polygon(vec![
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
        ])
        .unwrap();
        let square = Collider::new_square(2.0).unwrap();
        assert!((poly.moment_of_inertia(5.0) - square.moment_of_inertia(5.0)).abs() < 1e-9);
    }

    #[test]
    fn transformed_points_apply_scale_rotation_translation() {
        let rect = Collider::new_rect(2.0, 2.0).unwrap();
        let tr = Transform::from_position([5.0, 5.0])
            .with_rotation(90.0)
            .with_scale([2.0, 2.0]);
        let pts = rect.transformed_points(&tr);
        // local (-1, 1) -> scaled (-2, 2) -> rotated (-2, -2) -> translated (3, 3)
        assert!((pts[0] - Vec2::new(3.0, 3.0)).mag() < 1e-9);
    }

    #[test]
    fn from_desc_sets_trigger() {
        let coll = Collider::from_desc(&ColliderDesc::Rect {
            width: 1.0,
            height: 2.0,
            trigger: true,
        })
        .unwrap();
        assert!(coll.is_trigger());
        assert!(Collider::from_desc(&ColliderDesc::Circle {
            radius: 0.0,
            offset: [0.0, 0.0],
            trigger: false
        })
        .is_err());
    }
}
