//! Side channel for visualizing what collision detection is doing.

use crate::math::Vec2;
use crate::physics::ObjectKey;
use parking_lot::Mutex;

/// Something the collision system wants drawn for debugging.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DebugShape {
    /// The inflated circle a body was tested with in the broad phase.
    BroadPhaseCircle {
        owner: ObjectKey,
        center: Vec2,
        radius: f64,
        /// Whether anything survived the narrow phase.
        collided: bool,
    },
    Contact {
        owner: ObjectKey,
        point: Vec2,
        normal: Vec2,
    },
}

/// Receiver of debug shapes. Called from worker threads during a step.
pub trait DebugSink: Send + Sync {
    fn draw(&self, shape: DebugShape);
}

/// A sink that stores every shape until taken, e.g. once per rendered frame.
#[derive(Debug, Default)]
pub struct DebugBuffer {
    shapes: Mutex<Vec<DebugShape>>,
}

impl DebugBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<DebugShape> {
        std::mem::take(&mut *self.shapes.lock())
    }
}

impl DebugSink for DebugBuffer {
    fn draw(&self, shape: DebugShape) {
        self.shapes.lock().push(shape);
    }
}
