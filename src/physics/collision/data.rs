use crate::math::{self as m, Vec2};
use crate::physics::ObjectKey;
use std::cmp::Ordering;

/// The result of testing two shapes against each other.
///
/// A result is either empty (nothing happened) or describes a hit from the
/// point of view of `initiator`: `normal` points from `other` toward
/// `initiator`, and `time_of_impact` is the fraction of the last step's
/// motion at which the shapes first touched.
#[derive(Clone, Debug, PartialEq)]
pub struct CollisionData {
    pub initiator: Option<ObjectKey>,
    pub other: Option<ObjectKey>,
    /// Points of contact in world space. May be empty for shapes that
    /// are fully inside one another.
    pub points: Vec<Vec2>,
    pub normal: Vec2,
    pub time_of_impact: f64,
    pub is_inside: bool,
    /// Set when this result should be skipped by resolution,
    /// e.g. because the same pair was already resolved this step.
    pub disabled: bool,
    /// Set when one of the shapes is a trigger. Trigger results are only reported.
    pub trigger: bool,
    empty: bool,
}

impl CollisionData {
    /// The "nothing happened" result.
    pub fn empty() -> Self {
        CollisionData {
            initiator: None,
            other: None,
            points: Vec::new(),
            normal: Vec2::zero(),
            time_of_impact: 1.0,
            is_inside: false,
            disabled: false,
            trigger: false,
            empty: true,
        }
    }

    pub(crate) fn hit(
        initiator: Option<ObjectKey>,
        other: Option<ObjectKey>,
        points: Vec<Vec2>,
        normal: Vec2,
        time_of_impact: f64,
    ) -> Self {
        CollisionData {
            initiator,
            other,
            points,
            normal: m::normalize_or_zero(normal),
            time_of_impact: m::clamp01(time_of_impact),
            is_inside: false,
            disabled: false,
            trigger: false,
            empty: false,
        }
    }

    pub(crate) fn inside(mut self, is_inside: bool) -> Self {
        self.is_inside = is_inside;
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Whether this result should be acted upon by resolution and listeners.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.empty && !self.disabled
    }

    /// The same collision as seen from the other object.
    pub fn flipped(mut self) -> Self {
        if !self.empty {
            std::mem::swap(&mut self.initiator, &mut self.other);
            self.normal = -self.normal;
        }
        self
    }

    /// Mean of the contact points, or `None` if there are none.
    pub fn average_point(&self) -> Option<Vec2> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self.points.iter().fold(Vec2::zero(), |acc, p| acc + *p);
        Some(sum / self.points.len() as f64)
    }

    /// Total order by time of impact.
    pub fn cmp_toi(&self, other: &Self) -> Ordering {
        self.time_of_impact.total_cmp(&other.time_of_impact)
    }
}

impl Default for CollisionData {
    fn default() -> Self {
        Self::empty()
    }
}
