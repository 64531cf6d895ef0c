//! A multithreaded 2D collision detection and rigid body physics core.

/// Open a profiler span that closes when the returned value is dropped.
/// Does nothing unless the `tracy` feature is enabled.
#[cfg(feature = "tracy")]
macro_rules! tracy_span {
    ($name:literal, $fn_name:literal) => {
        tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!($name), 0))
    };
}

#[cfg(not(feature = "tracy"))]
macro_rules! tracy_span {
    ($name:literal, $fn_name:literal) => {
        ()
    };
}

pub mod math;
pub use math::{uv, Angle, Transform, Unit, Vec2};

pub mod config;
pub use config::{ConfigError, PhysicsConfig, ResolveOrder};

pub mod physics;
pub use physics::{
    collision::{self, Collider, ColliderDesc, ColliderShape, CollisionData, ShapeError},
    debug::{DebugBuffer, DebugShape, DebugSink},
    layers::{LayerFilter, LayerId, LayerMask, Layers},
    rigidbody::{BodyError, BodyParams, BodyPreset, Mass, RigidBody},
    CollisionListener, FixedTimestep, ObjectKey, Physics, PhysicsError, PhysicsHandle,
    QueryFilter, StepStats,
};
