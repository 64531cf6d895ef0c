use crate::math::{self as m, Transform, Vec2};

const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

/// Construction arguments for a rigid body.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct BodyParams {
    /// Velocity damping per second, also added to the other body's friction on contact.
    pub friction: f64,
    /// Restitution. The smaller of two bodies' values is used in a collision.
    pub bounciness: f64,
    pub mass: f64,
    /// Stored but not used in the simulation yet.
    pub softness: f64,
    pub center_of_mass: [f64; 2],
    pub is_static: bool,
}

impl Default for BodyParams {
    fn default() -> Self {
        BodyPreset::Standard.params()
    }
}

/// Commonly used sets of body parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum BodyPreset {
    Standard,
    /// Heavy and immovable, with strong friction.
    Static,
    /// Light and frictionless, for fast projectiles.
    Bullet,
}

impl BodyPreset {
    pub fn params(self) -> BodyParams {
        let (friction, mass, is_static) = match self {
            BodyPreset::Standard => (1.0, 6.0, false),
            BodyPreset::Static => (4.0, 1000.0, true),
            BodyPreset::Bullet => (0.0, 1.0, false),
        };
        BodyParams {
            friction,
            bounciness: 0.2,
            mass,
            softness: 0.2,
            center_of_mass: [0.0, 0.0],
            is_static,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BodyError {
    #[error("Body parameter `{0}` must be finite")]
    NotFinite(&'static str),
    #[error("Body parameter `{0}` must not be negative")]
    Negative(&'static str),
    #[error("Mass must be positive, got {0}")]
    NonPositiveMass(f64),
}

/// Mass or moment of inertia of a body, which can be infinite.
///
/// This stores both a mass value and its inverse, because calculating inverse mass
/// is expensive and needed a lot in physics calculations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mass {
    Finite { mass: f64, inverse: f64 },
    Infinite,
}

impl From<f64> for Mass {
    #[inline]
    fn from(mass: f64) -> Self {
        Mass::Finite {
            mass,
            inverse: 1.0 / mass,
        }
    }
}

impl Mass {
    /// Get the inverse of the mass, which is zero if the mass is infinite.
    #[inline]
    pub fn inv(&self) -> f64 {
        match self {
            Mass::Finite { inverse, .. } => *inverse,
            Mass::Infinite => 0.0,
        }
    }
}

/// A rigid body moves its owner according to its velocity
/// and responds to collisions with impulses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigidBody {
    pub velocity: Vec2,
    /// Radians per second. Only integrated when angular integration is enabled.
    pub angular_velocity: f64,
    pub friction: f64,
    pub bounciness: f64,
    pub softness: f64,
    /// Offset of the center of mass from the owner's origin, in local space.
    pub center_of_mass: Vec2,
    mass: Mass,
    is_static: bool,
    prev_velocity: Vec2,
    prev_angular_velocity: f64,
    displacement: Vec2,
    rotation_delta: f64,
}

fn finite(name: &'static str, v: f64) -> Result<f64, BodyError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(BodyError::NotFinite(name))
    }
}

fn non_negative(name: &'static str, v: f64) -> Result<f64, BodyError> {
    if finite(name, v)? < 0.0 {
        Err(BodyError::Negative(name))
    } else {
        Ok(v)
    }
}

impl RigidBody {
    /// Stand-in for objects that collide without having a body of their own.
    pub const IMMOVABLE: RigidBody = RigidBody {
        velocity: ZERO,
        angular_velocity: 0.0,
        friction: 4.0,
        bounciness: 0.2,
        softness: 0.2,
        center_of_mass: ZERO,
        mass: Mass::Infinite,
        is_static: true,
        prev_velocity: ZERO,
        prev_angular_velocity: 0.0,
        displacement: ZERO,
        rotation_delta: 0.0,
    };

    pub fn new(params: BodyParams) -> Result<Self, BodyError> {
        let friction = non_negative("friction", params.friction)?;
        let bounciness = non_negative("bounciness", params.bounciness)?;
        let softness = non_negative("softness", params.softness)?;
        let mass = finite("mass", params.mass)?;
        if mass <= 0.0 {
            return Err(BodyError::NonPositiveMass(mass));
        }
        let [cx, cy] = params.center_of_mass;
        let center_of_mass = Vec2::new(finite("center_of_mass", cx)?, finite("center_of_mass", cy)?);

        Ok(RigidBody {
            velocity: Vec2::zero(),
            angular_velocity: 0.0,
            friction,
            bounciness,
            softness,
            center_of_mass,
            mass: if params.is_static {
                Mass::Infinite
            } else {
                Mass::from(mass)
            },
            is_static: params.is_static,
            prev_velocity: Vec2::zero(),
            prev_angular_velocity: 0.0,
            displacement: Vec2::zero(),
            rotation_delta: 0.0,
        })
    }

    pub fn from_preset(preset: BodyPreset) -> Self {
        // presets are known to be valid
        Self::new(preset.params()).unwrap_or(Self::IMMOVABLE)
    }

    /// Set the velocity of the body in a builder-like chain.
    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        if !self.is_static {
            self.velocity = velocity;
        }
        self
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Returns the mass of the body if finite, otherwise None.
    pub fn mass(&self) -> Option<f64> {
        match self.mass {
            Mass::Finite { mass, .. } => Some(mass),
            Mass::Infinite => None,
        }
    }

    /// Returns the inverse mass of the body, which is zero for static bodies.
    #[inline]
    pub fn inverse_mass(&self) -> f64 {
        self.mass.inv()
    }

    /// How far the owner moved during the last integration step.
    #[inline]
    pub fn displacement(&self) -> Vec2 {
        self.displacement
    }

    /// How many degrees the owner rotated during the last integration step.
    #[inline]
    pub fn rotation_delta(&self) -> f64 {
        self.rotation_delta
    }

    /// Move the owner by the body's velocity for one step.
    ///
    /// Damping only kicks in when nothing else changed the velocity
    /// since the previous step, so forces and impulses act at full strength.
    pub fn integrate(&mut self, tr: &mut Transform, dt: f64, angular: bool) {
        if self.is_static {
            self.displacement = Vec2::zero();
            self.rotation_delta = 0.0;
            return;
        }

        let prev_position = tr.position;
        tr.position += self.velocity * dt;
        if self.prev_velocity == self.velocity {
            self.apply_friction(self.friction, dt);
        }
        self.prev_velocity = self.velocity;
        self.displacement = tr.position - prev_position;

        if angular {
            let prev_rotation = tr.rotation;
            tr.rotation += self.angular_velocity.to_degrees() * dt;
            if self.prev_angular_velocity == self.angular_velocity {
                self.apply_angular_friction(self.friction, dt);
            }
            self.prev_angular_velocity = self.angular_velocity;
            self.rotation_delta = tr.rotation - prev_rotation;
        }
    }

    pub fn apply_friction(&mut self, friction: f64, dt: f64) {
        self.velocity /= 1.0 + friction * dt;
    }

    pub fn apply_angular_friction(&mut self, friction: f64, dt: f64) {
        self.angular_velocity /= 1.0 + friction * dt;
    }

    /// Apply an instantaneous force, changing velocity by `force / mass`.
    /// Static bodies are unaffected.
    pub fn add_force(&mut self, force: Vec2) {
        self.velocity += force * self.inverse_mass();
    }

    /// Apply a force at an offset from the center of mass,
    /// which also spins the body according to its moment of inertia.
    pub fn add_force_at_offset(&mut self, force: Vec2, offset: Vec2, moment_of_inertia: f64) {
        self.add_force(force);
        if self.is_static || moment_of_inertia <= 0.0 {
            return;
        }
        let torque = m::cross(offset, force);
        self.angular_velocity += torque / moment_of_inertia;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 60.0;

    #[test]
    fn presets() {
        let standard = RigidBody::from_preset(BodyPreset::Standard);
        assert_eq!(standard.mass(), Some(6.0));
        assert_eq!(standard.friction, 1.0);
        let stat = RigidBody::from_preset(BodyPreset::Static);
        assert!(stat.is_static());
        assert_eq!(stat.inverse_mass(), 0.0);
        assert_eq!(stat.friction, 4.0);
        let bullet = RigidBody::from_preset(BodyPreset::Bullet);
        assert_eq!((bullet.mass(), bullet.friction), (Some(1.0), 0.0));
        assert_eq!(BodyParams::default(), BodyPreset::Standard.params());
    }

    #[test]
    fn invalid_params_are_rejected() {
        let params = |f: fn(&mut BodyParams)| {
            let mut p = BodyParams::default();
            f(&mut p);
            RigidBody::new(p)
        };
        assert_eq!(
            params(|p| p.mass = 0.0).unwrap_err(),
            BodyError::NonPositiveMass(0.0)
        );
        assert_eq!(
            params(|p| p.friction = -1.0).unwrap_err(),
            BodyError::Negative("friction")
        );
        assert_eq!(
            params(|p| p.center_of_mass = [f64::NAN, 0.0]).unwrap_err(),
            BodyError::NotFinite("center_of_mass")
        );
    }

    #[test]
    fn damping_only_applies_to_unchanged_velocity() {
        let mut body = RigidBody::from_preset(BodyPreset::Standard);
        let mut tr = Transform::default();
        body.velocity = Vec2::new(60.0, 0.0);

        // velocity changed since the (zero) previous one: no damping
        body.integrate(&mut tr, DT, false);
        assert_eq!(body.velocity, Vec2::new(60.0, 0.0));
        assert!((tr.position.x - 1.0).abs() < 1e-12);
        assert_eq!(body.displacement(), tr.position);

        body.integrate(&mut tr, DT, false);
        assert!((body.velocity.x - 60.0 / (1.0 + DT)).abs() < 1e-12);
    }

    #[test]
    fn static_bodies_ignore_everything() {
        let mut body = RigidBody::from_preset(BodyPreset::Static).with_velocity(Vec2::one());
        let mut tr = Transform::from_position([3.0, 4.0]);
        body.add_force(Vec2::new(100.0, 0.0));
        body.add_force_at_offset(Vec2::new(0.0, 5.0), Vec2::unit_x(), 1.0);
        for _ in 0..100 {
            body.integrate(&mut tr, DT, true);
        }
        assert_eq!(tr, Transform::from_position([3.0, 4.0]));
        assert_eq!(body.velocity, Vec2::zero());
        assert_eq!(body.angular_velocity, 0.0);
    }

    #[test]
    fn forces() {
        let mut body = RigidBody::from_preset(BodyPreset::Standard);
        body.add_force(Vec2::new(12.0, 0.0));
        assert!((body.velocity - Vec2::new(2.0, 0.0)).mag() < 1e-12);

        // pushing up on the right side spins counterclockwise
        body.add_force_at_offset(Vec2::new(0.0, 6.0), Vec2::new(2.0, 0.0), 4.0);
        assert!((body.velocity - Vec2::new(2.0, 1.0)).mag() < 1e-12);
        assert_eq!(body.angular_velocity, 3.0);
    }

    #[test]
    fn angular_integration() {
        let mut body = RigidBody::from_preset(BodyPreset::Bullet);
        body.angular_velocity = std::f64::consts::PI;
        let mut tr = Transform::default();
        body.integrate(&mut tr, 0.5, false);
        assert_eq!(tr.rotation, 0.0);
        body.integrate(&mut tr, 0.5, true);
        assert!((tr.rotation - 90.0).abs() < 1e-9);
        assert!((body.rotation_delta() - 90.0).abs() < 1e-9);

        // damped once the angular velocity stays the same
        let mut body = RigidBody::from_preset(BodyPreset::Standard);
        body.angular_velocity = 2.0;
        body.integrate(&mut tr, 0.5, true);
        body.integrate(&mut tr, 0.5, true);
        assert!((body.angular_velocity - 2.0 / 1.5).abs() < 1e-12);
    }

    #[test]
    fn random_angular_integration() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let w: f64 = rng.gen_range(-20.0..20.0);
            let dt: f64 = rng.gen_range(0.001..0.1);
            let start: f64 = rng.gen_range(-360.0..360.0);

            // frictionless bodies spin at a constant rate
            let mut body = RigidBody::from_preset(BodyPreset::Bullet);
            body.angular_velocity = w;
            let mut tr = Transform::default();
            tr.rotation = start;
            for step in 1..=10 {
                body.integrate(&mut tr, dt, true);
                let expected = start + w.to_degrees() * dt * step as f64;
                assert!((tr.rotation - expected).abs() < 1e-6);
                assert!((body.rotation_delta() - w.to_degrees() * dt).abs() < 1e-9);
                assert_eq!(body.angular_velocity, w);
            }

            // friction slows the spin down without ever reversing it
            let mut body = RigidBody::from_preset(BodyPreset::Standard);
            body.angular_velocity = w;
            let mut prev = w;
            for _ in 0..10 {
                body.integrate(&mut tr, dt, true);
                assert!(body.angular_velocity.abs() <= prev.abs());
                assert!(body.angular_velocity * w >= 0.0);
                assert!(body.rotation_delta() * w >= 0.0);
                prev = body.angular_velocity;
            }
        }
    }
}
