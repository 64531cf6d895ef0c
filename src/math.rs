//! Types, aliases and helper operations for doing math with `ultraviolet`.
use std::f64::consts::PI;
pub use ultraviolet as uv;

pub type Vec2 = uv::DVec2;

/// An angle in either degrees or radians.
/// Default conversion from f64 is in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as degrees.
    #[inline]
    pub fn deg(&self) -> f64 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Deg(0.0)
    }
}
impl From<f64> for Angle {
    #[inline]
    fn from(deg: f64) -> Self {
        Angle::Deg(deg)
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unit<T>(T);

impl Unit<Vec2> {
    /// Normalize a vector. Zero vectors fall back to the x axis
    /// so that a `Unit` is never NaN.
    pub fn new_normalize(v: Vec2) -> Self {
        let mag = v.mag();
        if mag < f64::EPSILON {
            Unit(Vec2::unit_x())
        } else {
            Unit(v / mag)
        }
    }

    pub const fn new_unchecked(v: Vec2) -> Self {
        Unit(v)
    }

    pub fn unit_x() -> Self {
        Unit(Vec2::unit_x())
    }

    pub fn unit_y() -> Self {
        Unit(Vec2::unit_y())
    }

    #[inline]
    pub fn into_inner(self) -> Vec2 {
        self.0
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> std::ops::Neg for Unit<T>
where
    T: std::ops::Neg,
{
    type Output = Unit<<T as std::ops::Neg>::Output>;

    fn neg(self) -> Self::Output {
        Unit(-self.0)
    }
}

/// Position, rotation and scale of an object that owns physics components.
///
/// Rotation is stored in degrees. Local points are mapped to world space by
/// scaling first, then rotating about the object's origin, then translating.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct Transform {
    pub position: Vec2,
    pub rotation: f64,
    pub scale: Vec2,
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            position: Vec2::zero(),
            rotation: 0.0,
            scale: Vec2::one(),
        }
    }
}

impl Transform {
    pub fn from_position(position: impl Into<[f64; 2]>) -> Self {
        let [x, y] = position.into();
        Transform {
            position: Vec2::new(x, y),
            ..Default::default()
        }
    }

    #[inline]
    pub fn with_rotation(mut self, angle: impl Into<Angle>) -> Self {
        self.rotation = angle.into().deg();
        self
    }

    #[inline]
    pub fn with_scale(mut self, scale: impl Into<[f64; 2]>) -> Self {
        let [x, y] = scale.into();
        self.scale = Vec2::new(x, y);
        self
    }

    /// Map a point from object-local space to world space.
    #[inline]
    pub fn apply(&self, local: Vec2) -> Vec2 {
        let scaled = Vec2::new(local.x * self.scale.x, local.y * self.scale.y);
        rotate(scaled, Angle::Deg(self.rotation)) + self.position
    }

    /// Map a direction from object-local space to world space, ignoring translation.
    #[inline]
    pub fn apply_direction(&self, local: Vec2) -> Vec2 {
        rotate(local, Angle::Deg(self.rotation))
    }

    /// The largest absolute scale factor, used to bound shapes under non-uniform scaling.
    #[inline]
    pub fn max_scale(&self) -> f64 {
        self.scale.x.abs().max(self.scale.y.abs())
    }
}

// Vec2 utils

#[inline]
pub fn left_normal(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}
#[inline]
pub fn right_normal(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

/// The z component of the 3D cross product of two vectors in the xy plane.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

#[inline]
pub fn distance(a: Vec2, b: Vec2) -> f64 {
    (b - a).mag()
}

#[inline]
pub fn lerp(from: Vec2, to: Vec2, t: f64) -> Vec2 {
    from * (1.0 - t) + to * t
}

/// Normalize a vector, returning the zero vector unchanged instead of NaN.
#[inline]
pub fn normalize_or_zero(v: Vec2) -> Vec2 {
    let mag = v.mag();
    if mag < f64::EPSILON {
        Vec2::zero()
    } else {
        v / mag
    }
}

/// Rotate a vector counterclockwise about the origin.
#[inline]
pub fn rotate(v: Vec2, angle: Angle) -> Vec2 {
    let (sin, cos) = angle.rad().sin_cos();
    Vec2::new(cos * v.x - sin * v.y, sin * v.x + cos * v.y)
}

/// Rotate a point counterclockwise about another point.
#[inline]
pub fn rotate_around(v: Vec2, angle: Angle, center: Vec2) -> Vec2 {
    rotate(v - center, angle) + center
}

/// Clamp a value to the range [0, 1].
#[inline]
pub fn clamp01(t: f64) -> f64 {
    t.max(0.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Vec2, b: Vec2) -> bool {
        (a - b).mag() < 1e-9
    }

    #[test]
    fn vector_examples() {
        let a = Vec2::new(2.0, 3.0);
        let b = Vec2::new(1.0, -1.0);
        assert_eq!(a + b, Vec2::new(3.0, 2.0));
        assert_eq!(a - b, Vec2::new(1.0, 4.0));
        assert_eq!(a * -1.0, -a);
        assert_eq!(a.dot(Vec2::new(-5.0, 2.0)), -4.0);
        assert_eq!(lerp(a, Vec2::new(1.0, 1.0), 0.5), Vec2::new(1.5, 2.0));
        assert_eq!(Vec2::new(3.0, 4.0).mag(), 5.0);
        assert_eq!(cross(Vec2::unit_x(), Vec2::unit_y()), 1.0);
    }

    #[test]
    fn scalar_distributivity() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let a = Vec2::new(rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0));
            let b = Vec2::new(rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0));
            let s = rng.gen_range(-10.0..10.0);
            assert!(approx_eq(a * s + b * s, (a + b) * s));
        }
    }

    #[test]
    fn rotation() {
        let v = rotate(Vec2::unit_x(), Angle::Deg(90.0));
        assert!(approx_eq(v, Vec2::unit_y()));
        let p = rotate_around(Vec2::new(2.0, 1.0), Angle::Deg(180.0), Vec2::new(1.0, 1.0));
        assert!(approx_eq(p, Vec2::new(0.0, 1.0)));
        assert!((Angle::Rad(PI).deg() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn transform_scales_then_rotates_then_translates() {
        let tr = Transform::from_position([10.0, 0.0])
            .with_rotation(90.0)
            .with_scale([2.0, 1.0]);
        assert!(approx_eq(tr.apply(Vec2::new(1.0, 0.0)), Vec2::new(10.0, 2.0)));
        assert_eq!(tr.max_scale(), 2.0);
    }

    #[test]
    fn zero_normalization() {
        assert_eq!(normalize_or_zero(Vec2::zero()), Vec2::zero());
        assert_eq!(*Unit::new_normalize(Vec2::zero()), Vec2::unit_x());
        assert!(approx_eq(normalize_or_zero(Vec2::new(0.0, 5.0)), Vec2::unit_y()));
    }
}
