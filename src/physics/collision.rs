mod collider;
pub use collider::{Collider, ColliderDesc, ColliderShape, ShapeError, ShapeKind};

mod data;
pub use data::CollisionData;

pub mod broadphase;
pub mod narrowphase;
pub mod query;

use crate::math::{Transform, Vec2};
use crate::physics::ObjectKey;

/// A collider in a specific world configuration, ready to be tested.
#[derive(Clone, Copy, Debug)]
pub struct ShapeRef<'a> {
    pub key: Option<ObjectKey>,
    pub transform: Transform,
    pub collider: &'a Collider,
    /// How far the owner moved during the last step.
    pub displacement: Vec2,
}

impl<'a> ShapeRef<'a> {
    pub fn new(collider: &'a Collider, transform: Transform) -> Self {
        ShapeRef {
            key: None,
            transform,
            collider,
            displacement: Vec2::zero(),
        }
    }

    pub fn with_key(mut self, key: ObjectKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_displacement(mut self, displacement: Vec2) -> Self {
        self.displacement = displacement;
        self
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        self.collider.world_center(&self.transform)
    }

    /// Active radius under the owner's current scale.
    #[inline]
    pub fn scaled_radius(&self) -> f64 {
        self.collider.active_radius() * self.transform.max_scale()
    }

    #[inline]
    pub fn points(&self) -> Vec<Vec2> {
        self.collider.transformed_points(&self.transform)
    }
}
