//! The per-body pipeline run by the workers: integrate, query, resolve, report.

use super::{
    collision::{
        broadphase::{self, BoundingCircles},
        narrowphase, Collider, CollisionData, ShapeRef,
    },
    debug::{DebugShape, DebugSink},
    layers::{LayerFilter, LayerMask},
    registry::{Object, ObjectKey, ObjectRef, Registry},
    rigidbody::RigidBody,
    StepStats,
};
use crate::{
    config::ResolveOrder,
    math::{self as m, Transform, Vec2},
};

use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Overlap smaller than this is left alone after position correction.
const DEPENETRATION_SLOP: f64 = 1e-6;

#[derive(Debug, Default)]
pub(crate) struct StepCounters {
    bodies_updated: AtomicUsize,
    broad_phase_rejections: AtomicUsize,
    narrow_phase_tests: AtomicUsize,
    collisions_found: AtomicUsize,
    collisions_resolved: AtomicUsize,
}

impl StepCounters {
    #[inline]
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> StepStats {
        StepStats {
            bodies_updated: self.bodies_updated.load(Ordering::Relaxed),
            broad_phase_rejections: self.broad_phase_rejections.load(Ordering::Relaxed),
            narrow_phase_tests: self.narrow_phase_tests.load(Ordering::Relaxed),
            collisions_found: self.collisions_found.load(Ordering::Relaxed),
            collisions_resolved: self.collisions_resolved.load(Ordering::Relaxed),
        }
    }
}

/// Everything the workers share during one step.
pub(crate) struct StepContext {
    pub dt: f64,
    pub angular_integration: bool,
    pub resolve_order: ResolveOrder,
    pub broad_phase: BoundingCircles,
    pub registry: Arc<Registry>,
    /// The active colliders at the start of the step.
    pub colliders: Vec<ObjectRef>,
    pub debug: Option<Arc<dyn DebugSink>>,
    pub counters: StepCounters,
    // unordered pairs that have been resolved this step, by any worker
    resolved_pairs: Mutex<HashSet<(ObjectKey, ObjectKey)>>,
}

impl StepContext {
    pub fn new(
        dt: f64,
        angular_integration: bool,
        resolve_order: ResolveOrder,
        broad_phase: BoundingCircles,
        registry: Arc<Registry>,
        debug: Option<Arc<dyn DebugSink>>,
    ) -> Self {
        StepContext {
            dt,
            angular_integration,
            resolve_order,
            broad_phase,
            colliders: registry.colliders(),
            registry,
            debug,
            counters: StepCounters::default(),
            resolved_pairs: Mutex::new(HashSet::new()),
        }
    }

    /// Claim a pair for resolution. Returns false if it was already resolved this step.
    fn claim_pair(&self, a: ObjectKey, b: ObjectKey) -> bool {
        self.resolved_pairs.lock().insert((a.min(b), a.max(b)))
    }
}

/// One unit of work for the pool: a body to update.
pub(crate) struct BodyJob {
    pub key: ObjectKey,
    pub object: Arc<Object>,
    pub ctx: Arc<StepContext>,
}

pub(crate) fn run_job(job: BodyJob) {
    update_body(&job.ctx, job.key, &job.object);
}

/// Which colliders a query is tested against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TriggerMode {
    Exclude,
    Only,
    Include,
}

impl TriggerMode {
    #[inline]
    fn accepts(self, coll: &Collider) -> bool {
        match self {
            TriggerMode::Exclude => !coll.is_trigger(),
            TriggerMode::Only => coll.is_trigger(),
            TriggerMode::Include => true,
        }
    }
}

/// What a query needs to know about an object, copied out of its locks.
#[derive(Clone)]
pub(crate) struct Snapshot {
    pub transform: Transform,
    pub displacement: Vec2,
    pub filter: LayerFilter,
    pub collider: Arc<Collider>,
}

impl Snapshot {
    /// Take a snapshot, or `None` if the object has no collider.
    pub fn of(obj: &Object) -> Option<Self> {
        let collider = obj.collider.read().clone()?;
        let filter = obj.filter.read().clone();
        let state = *obj.state.lock();
        Some(Snapshot {
            transform: state.transform,
            displacement: state.body.map_or(Vec2::zero(), |b| b.displacement()),
            filter,
            collider,
        })
    }

    pub fn shape_ref(&self, key: ObjectKey) -> ShapeRef<'_> {
        ShapeRef::new(&self.collider, self.transform)
            .with_key(key)
            .with_displacement(self.displacement)
    }
}

/// Test one object against a list of others through the broad and narrow phase.
/// Only one object lock is held at a time.
pub(crate) fn collide_against(
    broad_phase: &BoundingCircles,
    counters: Option<&StepCounters>,
    key: ObjectKey,
    me: &Snapshot,
    others: &[ObjectRef],
    mode: TriggerMode,
    required_layers: Option<&LayerMask>,
) -> Vec<CollisionData> {
    let my_shape = me.shape_ref(key);
    let mut results = Vec::new();

    for (other_key, other) in others {
        if *other_key == key {
            continue;
        }
        let Some(snap) = Snapshot::of(other) else {
            continue;
        };
        if !mode.accepts(&snap.collider) {
            continue;
        }
        if required_layers.map_or(false, |layers| !layers.contains(snap.filter.layer)) {
            continue;
        }

        let other_shape = snap.shape_ref(*other_key);
        if !broadphase::check(broad_phase, &my_shape, &me.filter, &other_shape, &snap.filter) {
            if let Some(c) = counters {
                StepCounters::bump(&c.broad_phase_rejections);
            }
            continue;
        }

        if let Some(c) = counters {
            StepCounters::bump(&c.narrow_phase_tests);
        }
        let mut result = narrowphase::test(&my_shape, &other_shape);
        if !result.is_empty() {
            result.trigger = me.collider.is_trigger() || snap.collider.is_trigger();
            if let Some(c) = counters {
                StepCounters::bump(&c.collisions_found);
            }
            results.push(result);
        }
    }

    results
}

/// Sort results for resolution and disable all but the first
/// of several results against the same other object.
pub(crate) fn plan_resolution(results: &mut [CollisionData], order: ResolveOrder) {
    match order {
        ResolveOrder::EarliestFirst => results.sort_by(CollisionData::cmp_toi),
        ResolveOrder::LatestFirst => results.sort_by(|a, b| b.cmp_toi(a)),
    }
    disable_duplicates(results);
}

pub(crate) fn disable_duplicates(results: &mut [CollisionData]) {
    let mut seen = HashSet::new();
    for result in results.iter_mut().filter(|r| r.is_active()) {
        if !seen.insert(result.other) {
            result.disabled = true;
        }
    }
}

fn update_body(ctx: &StepContext, key: ObjectKey, obj: &Object) {
    let _span = tracy_span!("update body", "update_body");

    let is_static = {
        let mut guard = obj.state.lock();
        let state = &mut *guard;
        let Some(body) = state.body.as_mut() else {
            return;
        };
        body.integrate(&mut state.transform, ctx.dt, ctx.angular_integration);
        body.is_static()
    };
    StepCounters::bump(&ctx.counters.bodies_updated);

    if is_static {
        return;
    }
    let Some(me) = Snapshot::of(obj) else {
        // bodies without colliders only move
        return;
    };

    let q = |mode| {
        collide_against(
            &ctx.broad_phase,
            Some(&ctx.counters),
            key,
            &me,
            &ctx.colliders,
            mode,
            None,
        )
    };

    let mut results;
    if me.collider.is_trigger() {
        results = q(TriggerMode::Include);
        for r in &mut results {
            r.trigger = true;
        }
        plan_resolution(&mut results, ctx.resolve_order);
    } else {
        results = q(TriggerMode::Exclude);
        plan_resolution(&mut results, ctx.resolve_order);
        for result in &mut results {
            if result.is_active() {
                resolve(ctx, key, obj, &me.collider, result);
            }
        }
        let mut trigger_results = q(TriggerMode::Only);
        plan_resolution(&mut trigger_results, ctx.resolve_order);
        results.extend(trigger_results);
    }

    if let Some(sink) = &ctx.debug {
        draw_debug(&**sink, ctx, key, obj, &me, &results);
    }

    report(ctx, obj, &results);
    ctx.registry.record_collisions(key, results);
}

/// Push two objects apart and exchange impulses between them.
fn resolve(
    ctx: &StepContext,
    key: ObjectKey,
    obj: &Object,
    self_coll: &Collider,
    data: &mut CollisionData,
) {
    let Some(other_key) = data.other else {
        return;
    };
    if other_key == key {
        return;
    }
    if !ctx.claim_pair(key, other_key) {
        data.disabled = true;
        return;
    }
    let Some(other) = ctx.registry.get(other_key) else {
        return;
    };
    let other_coll = other.collider.read().clone();

    // always lock in key order so two workers resolving the same pair can't deadlock
    let (mut self_state, mut other_state) = if key < other_key {
        let s = obj.state.lock();
        (s, other.state.lock())
    } else {
        let o = other.state.lock();
        (obj.state.lock(), o)
    };

    let Some(mut self_body) = self_state.body else {
        return;
    };
    let other_has_body = other_state.body.is_some();
    let mut other_body = other_state.body.unwrap_or(RigidBody::IMMOVABLE);
    let normal = data.normal;
    let toi = m::clamp01(data.time_of_impact);

    if let Some(contact) = data.average_point() {
        let other_movable = other_coll.is_some() && !other_body.is_static();
        // overlap along the normal left over after interpolating toward contact
        let mut remaining = 0.0;
        if !self_body.is_static() {
            let tr = &mut self_state.transform;
            let center = self_coll.world_center(tr);
            let target = contact + normal * self_coll.support_distance(tr, -normal);
            let moved = m::lerp(center, target, toi);
            tr.position += moved - center;
            remaining = (target - moved).dot(normal);
        }
        if let (Some(coll), true) = (&other_coll, other_movable) {
            let tr = &mut other_state.transform;
            let center = coll.world_center(tr);
            let target = contact - normal * coll.support_distance(tr, normal);
            let moved = m::lerp(center, target, 1.0 - toi);
            tr.position += moved - center;
            remaining -= (center - moved).dot(normal);
        }

        if remaining > DEPENETRATION_SLOP {
            let self_inv = self_body.inverse_mass();
            let other_inv = if other_movable {
                other_body.inverse_mass()
            } else {
                0.0
            };
            let inv_sum = self_inv + other_inv;
            if inv_sum > 0.0 {
                self_state.transform.position += normal * (remaining * self_inv / inv_sum);
                other_state.transform.position -= normal * (remaining * other_inv / inv_sum);
            }
        }
    }

    let friction = self_body.friction + other_body.friction;
    self_body.apply_friction(friction, ctx.dt);
    self_body.apply_angular_friction(friction, ctx.dt);
    if !other_body.is_static() {
        other_body.apply_friction(friction, ctx.dt);
        other_body.apply_angular_friction(friction, ctx.dt);
    }

    let rel_vel = self_body.velocity - other_body.velocity;
    let normal_vel = rel_vel.dot(normal);
    let inv_mass_sum = self_body.inverse_mass() + other_body.inverse_mass();
    // no impulse if already separating
    if normal_vel < 0.0 && inv_mass_sum > 0.0 {
        let e = self_body.bounciness.min(other_body.bounciness);
        let j = -(1.0 + e) * normal_vel / inv_mass_sum;
        self_body.add_force(normal * j);
        other_body.add_force(-normal * j);
    }

    self_state.body = Some(self_body);
    if other_has_body {
        other_state.body = Some(other_body);
    }
    StepCounters::bump(&ctx.counters.collisions_resolved);
}

/// Invoke listeners for every result that wasn't disabled.
/// Trigger objects also hear about whatever entered them.
fn report(ctx: &StepContext, obj: &Object, results: &[CollisionData]) {
    let listeners = obj.listeners.read().clone();
    for result in results.iter().filter(|r| r.is_active()) {
        for listener in &listeners {
            listener.on_collision(result);
        }
        if result.trigger {
            let Some(other) = result.other.and_then(|k| ctx.registry.get(k)) else {
                continue;
            };
            let other_listeners = other.listeners.read().clone();
            if other_listeners.is_empty() {
                continue;
            }
            let flipped = result.clone().flipped();
            for listener in &other_listeners {
                listener.on_collision(&flipped);
            }
        }
    }
}

fn draw_debug(
    sink: &dyn DebugSink,
    ctx: &StepContext,
    key: ObjectKey,
    obj: &Object,
    me: &Snapshot,
    results: &[CollisionData],
) {
    // the snapshot predates resolution, so read the current position
    let transform = obj.state.lock().transform;
    let shape = ShapeRef::new(&me.collider, transform).with_displacement(me.displacement);
    let (center, radius) = ctx.broad_phase.bounding_circle(&shape);
    sink.draw(DebugShape::BroadPhaseCircle {
        owner: key,
        center,
        radius,
        collided: results.iter().any(CollisionData::is_active),
    });
    for result in results.iter().filter(|r| r.is_active()) {
        for point in &result.points {
            sink.draw(DebugShape::Contact {
                owner: key,
                point: *point,
                normal: result.normal,
            });
        }
    }
}
