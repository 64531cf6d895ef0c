//! The physics world: registration of objects and their components,
//! and the multithreaded step that moves and collides them.

use crate::{
    config::{ConfigError, PhysicsConfig},
    math::{Transform, Vec2},
};

use parking_lot::{Mutex, RwLock};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

//

pub mod collision;
use collision::{broadphase::BoundingCircles, query::point_collider_bool};
pub use collision::{
    Collider, ColliderDesc, ColliderShape, CollisionData, ShapeError, ShapeKind, ShapeRef,
};

pub mod debug;
pub use debug::{DebugBuffer, DebugShape, DebugSink};

pub mod layers;
pub use layers::{LayerFilter, LayerId, LayerMask, Layers};

pub mod rigidbody;
pub use rigidbody::{BodyError, BodyParams, BodyPreset, Mass, RigidBody};

pub mod timestep;
pub use timestep::FixedTimestep;

mod registry;
pub use registry::ObjectKey;
use registry::{Addition, Registry, Removal};

mod solver;
use solver::{BodyJob, Snapshot, StepContext, TriggerMode};

mod worker;
use worker::WorkerPool;

//

/// Something that wants to know when an object collides.
///
/// Listeners run on worker threads in the middle of a step. To add or remove
/// components from inside a listener, use a [`PhysicsHandle`], which stages
/// the change for the next step.
pub trait CollisionListener: Send + Sync {
    fn on_collision(&self, data: &CollisionData);
}

impl<F> CollisionListener for F
where
    F: Fn(&CollisionData) + Send + Sync,
{
    fn on_collision(&self, data: &CollisionData) {
        self(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PhysicsError {
    #[error("A physics step is already in progress")]
    StepInProgress,
    #[error("No physics object with key {0:?}")]
    NoSuchObject(ObjectKey),
    #[error("Physics object {0:?} has no rigid body")]
    NoBody(ObjectKey),
    #[error("{0} bodies panicked during the step")]
    WorkerPanic(usize),
    #[error("The physics world has been shut down")]
    ShutDown,
    #[error("Failed to start physics workers")]
    Spawn(#[source] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Body(#[from] BodyError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// What happened during one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    pub bodies_updated: usize,
    /// Pairs thrown out by the broad phase, including by layer exclusion.
    pub broad_phase_rejections: usize,
    pub narrow_phase_tests: usize,
    pub collisions_found: usize,
    pub collisions_resolved: usize,
}

/// Restricts which colliders [`PhysicsHandle::check_all_for`] tests against.
#[derive(Clone, Debug, Default)]
pub struct QueryFilter {
    /// Test only against triggers instead of only against solid colliders.
    pub triggers: bool,
    /// If set, only colliders in one of these layers are tested.
    pub layers: Option<Vec<String>>,
}

impl QueryFilter {
    pub fn triggers() -> Self {
        QueryFilter {
            triggers: true,
            layers: None,
        }
    }

    pub fn in_layers<S: Into<String>>(mut self, layers: impl IntoIterator<Item = S>) -> Self {
        self.layers = Some(layers.into_iter().map(Into::into).collect());
        self
    }
}

struct Shared {
    registry: Arc<Registry>,
    stepping: AtomicBool,
    broad_phase: BoundingCircles,
    debug: RwLock<Option<Arc<dyn DebugSink>>>,
}

/// Resets the stepping flag when a step ends, however it ends.
struct SteppingGuard<'a>(&'a AtomicBool);

impl<'a> Drop for SteppingGuard<'a> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A cloneable reference to a physics world that can register objects,
/// stage component changes and run queries, but not step the world.
///
/// Safe to use from collision listeners.
#[derive(Clone)]
pub struct PhysicsHandle {
    shared: Arc<Shared>,
}

impl PhysicsHandle {
    #[inline]
    fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    fn object(&self, key: ObjectKey) -> Result<Arc<registry::Object>, PhysicsError> {
        self.registry()
            .get(key)
            .ok_or(PhysicsError::NoSuchObject(key))
    }

    fn ensure_exists(&self, key: ObjectKey) -> Result<(), PhysicsError> {
        if self.registry().contains(key) {
            Ok(())
        } else {
            Err(PhysicsError::NoSuchObject(key))
        }
    }

    /// Whether a step is running right now.
    pub fn is_stepping(&self) -> bool {
        self.shared.stepping.load(Ordering::Acquire)
    }

    //
    // objects and components
    //

    /// Register a new object. It has no components until some are attached.
    pub fn spawn(&self, transform: Transform) -> ObjectKey {
        self.registry().spawn(transform)
    }

    /// Remove an object and all its components at the next step.
    pub fn despawn(&self, key: ObjectKey) -> Result<(), PhysicsError> {
        self.ensure_exists(key)?;
        self.registry().stage_removal(Removal::Object(key));
        Ok(())
    }

    /// Give an object a rigid body, replacing any it had, starting from the next step.
    pub fn attach_body(&self, key: ObjectKey, body: RigidBody) -> Result<(), PhysicsError> {
        self.ensure_exists(key)?;
        self.registry().stage_addition(Addition::Body(key, body));
        Ok(())
    }

    /// Create a rigid body from parameters and attach it.
    pub fn attach_body_params(
        &self,
        key: ObjectKey,
        params: BodyParams,
    ) -> Result<(), PhysicsError> {
        self.attach_body(key, RigidBody::new(params)?)
    }

    /// Give an object a collider, replacing any it had, starting from the next step.
    pub fn attach_collider(&self, key: ObjectKey, collider: Collider) -> Result<(), PhysicsError> {
        self.ensure_exists(key)?;
        self.registry()
            .stage_addition(Addition::Collider(key, collider));
        Ok(())
    }

    pub fn detach_body(&self, key: ObjectKey) -> Result<(), PhysicsError> {
        self.ensure_exists(key)?;
        self.registry().stage_removal(Removal::Body(key));
        Ok(())
    }

    /// Remove the object's collider at the next step, along with its listeners.
    pub fn detach_collider(&self, key: ObjectKey) -> Result<(), PhysicsError> {
        self.ensure_exists(key)?;
        self.registry().stage_removal(Removal::Collider(key));
        Ok(())
    }

    /// Register a listener for the object's collisions, starting from the next step.
    pub fn add_listener(
        &self,
        key: ObjectKey,
        listener: impl CollisionListener + 'static,
    ) -> Result<(), PhysicsError> {
        self.ensure_exists(key)?;
        self.registry()
            .stage_addition(Addition::Listener(key, Arc::new(listener)));
        Ok(())
    }

    /// Remove every listener of the object at the next step.
    ///
    /// Detaching an object's collider does this too.
    pub fn clear_listeners(&self, key: ObjectKey) -> Result<(), PhysicsError> {
        self.ensure_exists(key)?;
        self.registry().stage_removal(Removal::Listeners(key));
        Ok(())
    }

    pub fn object_count(&self) -> usize {
        self.registry().object_count()
    }

    /// Number of colliders taking part in the simulation.
    pub fn collider_count(&self) -> usize {
        self.registry().collider_count()
    }

    /// Number of bodies taking part in the simulation.
    pub fn body_count(&self) -> usize {
        self.registry().body_count()
    }

    //
    // state access
    //

    pub fn transform(&self, key: ObjectKey) -> Result<Transform, PhysicsError> {
        Ok(self.object(key)?.state.lock().transform)
    }

    pub fn set_transform(&self, key: ObjectKey, transform: Transform) -> Result<(), PhysicsError> {
        self.object(key)?.state.lock().transform = transform;
        Ok(())
    }

    /// A copy of the object's active rigid body, if it has one.
    pub fn body(&self, key: ObjectKey) -> Result<Option<RigidBody>, PhysicsError> {
        Ok(self.object(key)?.state.lock().body)
    }

    /// Change the object's active rigid body in place.
    pub fn modify_body<R>(
        &self,
        key: ObjectKey,
        f: impl FnOnce(&mut RigidBody) -> R,
    ) -> Result<R, PhysicsError> {
        let obj = self.object(key)?;
        let mut state = obj.state.lock();
        let body = state.body.as_mut().ok_or(PhysicsError::NoBody(key))?;
        Ok(f(body))
    }

    /// The object's active collider, if it has one.
    pub fn collider(&self, key: ObjectKey) -> Result<Option<Arc<Collider>>, PhysicsError> {
        Ok(self.object(key)?.collider.read().clone())
    }

    pub fn add_force(&self, key: ObjectKey, force: Vec2) -> Result<(), PhysicsError> {
        self.modify_body(key, |body| body.add_force(force))
    }

    /// Apply a force at a point in world space, spinning the body
    /// if the point is off its center of mass.
    pub fn add_force_at_position(
        &self,
        key: ObjectKey,
        force: Vec2,
        position: Vec2,
    ) -> Result<(), PhysicsError> {
        let obj = self.object(key)?;
        let collider = obj.collider.read().clone();
        let mut guard = obj.state.lock();
        let state = &mut *guard;
        let body = state.body.as_mut().ok_or(PhysicsError::NoBody(key))?;
        match (collider, body.mass()) {
            (Some(coll), Some(mass)) => {
                let center = state.transform.apply(coll.center_of_mass() + body.center_of_mass);
                body.add_force_at_offset(force, position - center, coll.moment_of_inertia(mass));
            }
            _ => body.add_force(force),
        }
        Ok(())
    }

    /// Results recorded for the object during the last step.
    pub fn collisions_of(&self, key: ObjectKey) -> Vec<CollisionData> {
        self.registry()
            .current_collisions
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    //
    // queries
    //

    /// Test an object's collider against every active collider matching the filter,
    /// without resolving anything.
    pub fn check_all_for(
        &self,
        key: ObjectKey,
        filter: &QueryFilter,
    ) -> Result<Vec<CollisionData>, PhysicsError> {
        let obj = self.object(key)?;
        let Some(me) = Snapshot::of(&obj) else {
            return Ok(Vec::new());
        };
        let mode = if filter.triggers {
            TriggerMode::Only
        } else {
            TriggerMode::Exclude
        };
        let required = filter.layers.as_ref().map(|names| {
            let layers = self.registry().layers.read();
            names.iter().filter_map(|n| layers.id(n)).collect::<LayerMask>()
        });
        Ok(solver::collide_against(
            &self.shared.broad_phase,
            None,
            key,
            &me,
            &self.registry().colliders(),
            mode,
            required.as_ref(),
        ))
    }

    /// Every object whose collider contains the point.
    pub fn check_point(&self, point: Vec2) -> Vec<ObjectKey> {
        self.registry()
            .colliders()
            .into_iter()
            .filter(|(_, obj)| {
                Snapshot::of(obj)
                    .map_or(false, |s| point_collider_bool(point, &s.transform, &s.collider))
            })
            .map(|(key, _)| key)
            .collect()
    }

    //
    // layers
    //

    pub fn add_layer(&self, name: &str) -> LayerId {
        self.registry().layers.write().add(name)
    }

    pub fn add_layers<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        self.registry().layers.write().add_all(names);
    }

    /// All layer names in ID order.
    pub fn layers(&self) -> Vec<String> {
        self.registry().layers.read().names().to_vec()
    }

    pub fn layer_id(&self, name: &str) -> Option<LayerId> {
        self.registry().layers.read().id(name)
    }

    pub fn layer_name(&self, id: LayerId) -> Option<String> {
        self.registry().layers.read().name(id).map(str::to_owned)
    }

    /// Compare two layer names, declaring any that weren't known yet.
    pub fn compare_layers(&self, a: &str, b: &str) -> bool {
        self.registry().layers.write().compare(a, b)
    }

    /// Move an object to a layer, declaring the layer if needed.
    pub fn set_layer(&self, key: ObjectKey, layer: &str) -> Result<LayerId, PhysicsError> {
        let obj = self.object(key)?;
        let id = self.add_layer(layer);
        obj.filter.write().layer = id;
        Ok(id)
    }

    /// Stop an object from colliding with anything in a layer.
    pub fn exclude_layer(&self, key: ObjectKey, layer: &str) -> Result<(), PhysicsError> {
        self.exclude_layers(key, [layer])
    }

    pub fn exclude_layers<'a>(
        &self,
        key: ObjectKey,
        layers: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), PhysicsError> {
        let obj = self.object(key)?;
        let ids: Vec<LayerId> = layers.into_iter().map(|l| self.add_layer(l)).collect();
        let mut filter = obj.filter.write();
        for id in ids {
            filter.excluded.insert(id);
        }
        Ok(())
    }

    /// Undo [`exclude_layer`][Self::exclude_layer].
    pub fn include_layer(&self, key: ObjectKey, layer: &str) -> Result<(), PhysicsError> {
        let obj = self.object(key)?;
        if let Some(id) = self.layer_id(layer) {
            obj.filter.write().excluded.remove(id);
        }
        Ok(())
    }

    pub fn layer_filter(&self, key: ObjectKey) -> Result<LayerFilter, PhysicsError> {
        Ok(self.object(key)?.filter.read().clone())
    }

    //

    /// Set where collision debug shapes go when `collision_debug` is enabled.
    pub fn set_debug_sink(&self, sink: Option<Arc<dyn DebugSink>>) {
        *self.shared.debug.write() = sink;
    }
}

/// A physics world and the worker threads that simulate it.
///
/// Derefs to [`PhysicsHandle`] for everything except stepping.
pub struct Physics {
    handle: PhysicsHandle,
    config: PhysicsConfig,
    pool: WorkerPool<BodyJob>,
    timestep: Mutex<FixedTimestep>,
}

impl std::ops::Deref for Physics {
    type Target = PhysicsHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Physics {
    pub fn new(config: PhysicsConfig) -> Result<Self, PhysicsError> {
        config.validate()?;

        let mut layers = Layers::new();
        layers.add_all(config.layers.iter().map(String::as_str));
        if layers.is_empty() {
            layers.add("default");
        }

        let shared = Arc::new(Shared {
            registry: Arc::new(Registry::new(layers)),
            stepping: AtomicBool::new(false),
            broad_phase: BoundingCircles::new(config.broad_phase_margin),
            debug: RwLock::new(None),
        });
        let pool =
            WorkerPool::new(config.thread_count(), solver::run_job).map_err(PhysicsError::Spawn)?;

        Ok(Physics {
            handle: PhysicsHandle { shared },
            timestep: Mutex::new(FixedTimestep::new(config.timestep)),
            config,
            pool,
        })
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Get a handle that can be moved into listeners and other threads.
    pub fn handle(&self) -> PhysicsHandle {
        self.handle.clone()
    }

    pub fn thread_count(&self) -> usize {
        self.pool.thread_count()
    }

    /// Run one fixed step: apply staged changes, then update every body on the
    /// worker pool and wait for all of them to finish.
    pub fn step(&self) -> Result<StepStats, PhysicsError> {
        let _span = tracy_span!("physics step", "step");

        let shared = &self.handle.shared;
        if shared
            .stepping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("Tried to step physics while a step was already running");
            return Err(PhysicsError::StepInProgress);
        }
        let _guard = SteppingGuard(&shared.stepping);

        if self.pool.thread_count() == 0 {
            return Err(PhysicsError::ShutDown);
        }

        if shared.registry.has_pending() {
            let counts = shared.registry.flush();
            log::trace!(
                "Applied {} staged additions and {} removals",
                counts.added,
                counts.removed
            );
        }
        shared.registry.clear_collisions();

        let debug = if self.config.collision_debug {
            shared.debug.read().clone()
        } else {
            None
        };
        let ctx = Arc::new(StepContext::new(
            self.config.timestep,
            self.config.angular_integration,
            self.config.resolve_order,
            shared.broad_phase,
            shared.registry.clone(),
            debug,
        ));

        {
            let _span = tracy_span!("update bodies", "step");
            let bodies = shared.registry.bodies();
            self.pool
                .submit_all(bodies.into_iter().map(|(key, object)| BodyJob {
                    key,
                    object,
                    ctx: ctx.clone(),
                }));
            let panicked = self.pool.wait_idle();
            if panicked > 0 {
                log::warn!("{panicked} physics jobs panicked");
                return Err(PhysicsError::WorkerPanic(panicked));
            }
        }

        Ok(ctx.counters.stats())
    }

    /// Account for `elapsed` wall-clock time and run as many fixed steps as fit in it.
    /// Returns the number of steps run.
    pub fn advance(&self, elapsed: Duration) -> Result<usize, PhysicsError> {
        let steps = self.timestep.lock().advance(elapsed);
        for _ in 0..steps {
            self.step()?;
        }
        Ok(steps)
    }

    /// Stop and join the worker threads. Further steps fail with [`PhysicsError::ShutDown`].
    pub fn shutdown(&mut self) {
        self.pool.shutdown();
        log::debug!("Physics workers shut down");
    }
}
