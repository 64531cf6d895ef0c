//! Broad phase collision detection algorithms
//! are responsible for rejecting pairs of objects that can't possibly intersect
//! before they're handed to the more accurate narrow phase.

use super::ShapeRef;
use crate::math::{self as m, Vec2};
use crate::physics::layers::LayerFilter;

/// Extra distance added to every bounding circle by default.
pub const DEFAULT_MARGIN: f64 = 5.0;

/// A broad phase algorithm.
pub trait BroadPhase {
    /// Returns false if the two shapes definitely don't intersect.
    fn may_collide(&self, a: &ShapeRef, b: &ShapeRef) -> bool;
}

/// Conservative test with circles around each shape's center of mass,
/// inflated by a margin and by the distance the shape moved last step.
#[derive(Clone, Copy, Debug)]
pub struct BoundingCircles {
    pub margin: f64,
}

impl Default for BoundingCircles {
    fn default() -> Self {
        BoundingCircles {
            margin: DEFAULT_MARGIN,
        }
    }
}

impl BoundingCircles {
    pub fn new(margin: f64) -> Self {
        BoundingCircles { margin }
    }

    /// Radius of the circle that is tested for this shape.
    #[inline]
    pub fn inflated_radius(&self, shape: &ShapeRef) -> f64 {
        shape.scaled_radius() + self.margin + shape.displacement.mag()
    }

    /// Center and radius of the circle that is tested for this shape.
    pub fn bounding_circle(&self, shape: &ShapeRef) -> (Vec2, f64) {
        (shape.center(), self.inflated_radius(shape))
    }
}

impl BroadPhase for BoundingCircles {
    fn may_collide(&self, a: &ShapeRef, b: &ShapeRef) -> bool {
        if a.key.is_some() && a.key == b.key {
            return false;
        }
        let reach = self.inflated_radius(a) + self.inflated_radius(b);
        let (ca, cb) = (a.center(), b.center());
        if m::distance(ca, cb) < reach {
            return true;
        }
        // where the shapes will be if they keep moving the same way
        let predicted_a = ca + a.displacement;
        let predicted_b = cb + b.displacement;
        m::distance(predicted_a, predicted_b) < reach
    }
}

/// Full broad phase check including layer exclusions.
pub fn check(
    bp: &impl BroadPhase,
    a: &ShapeRef,
    a_filter: &LayerFilter,
    b: &ShapeRef,
    b_filter: &LayerFilter,
) -> bool {
    a_filter.allows(b_filter) && bp.may_collide(a, b)
}
