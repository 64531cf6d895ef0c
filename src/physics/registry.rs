use super::{
    collision::{Collider, CollisionData},
    layers::{LayerFilter, Layers},
    rigidbody::RigidBody,
    CollisionListener,
};
use crate::math::Transform;

use parking_lot::{Mutex, RwLock};
use std::{collections::HashMap, sync::Arc};
use thunderdome as td;

/// Key type to look up an object registered in the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey(pub(super) td::Index);

impl ObjectKey {
    /// Get the underlying [`thunderdome::Index`][thunderdome::Index] of this key.
    /// Useful for creating your own mappings from physics objects to other things.
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

// total order used to lock pairs of objects without deadlocking
impl PartialOrd for ObjectKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ObjectKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.to_bits().cmp(&other.0.to_bits())
    }
}

/// Mutable simulation state of an object, locked as a unit.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ObjectState {
    pub transform: Transform,
    pub body: Option<RigidBody>,
}

/// An entry in the physics world. Every component sits behind its own lock
/// so that workers only ever contend on the objects they actually touch.
pub(crate) struct Object {
    pub state: Mutex<ObjectState>,
    pub collider: RwLock<Option<Arc<Collider>>>,
    pub filter: RwLock<LayerFilter>,
    pub listeners: RwLock<Vec<Arc<dyn CollisionListener>>>,
}

impl Object {
    fn new(transform: Transform) -> Self {
        Object {
            state: Mutex::new(ObjectState {
                transform,
                body: None,
            }),
            collider: RwLock::new(None),
            filter: RwLock::new(LayerFilter::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }
}

pub(crate) type ObjectRef = (ObjectKey, Arc<Object>);

/// A structural change waiting for the next flush.
pub(crate) enum Addition {
    Body(ObjectKey, RigidBody),
    Collider(ObjectKey, Collider),
    Listener(ObjectKey, Arc<dyn CollisionListener>),
}

pub(crate) enum Removal {
    Body(ObjectKey),
    /// Also drops the object's listeners, which were registered for this collider.
    Collider(ObjectKey),
    Listeners(ObjectKey),
    Object(ObjectKey),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct FlushCounts {
    pub added: usize,
    pub removed: usize,
}

/// Owner of every object and of the lists the simulation iterates over.
///
/// The active collider and body lists are only modified in [`flush`][Self::flush],
/// which applies all staged additions and then all staged removals.
pub(crate) struct Registry {
    objects: RwLock<td::Arena<Arc<Object>>>,
    colliders: RwLock<Vec<ObjectRef>>,
    bodies: RwLock<Vec<ObjectRef>>,
    pending_additions: Mutex<Vec<Addition>>,
    pending_removals: Mutex<Vec<Removal>>,
    pub current_collisions: Mutex<HashMap<ObjectKey, Vec<CollisionData>>>,
    pub layers: RwLock<Layers>,
}

impl Registry {
    pub fn new(layers: Layers) -> Self {
        Registry {
            objects: RwLock::new(td::Arena::new()),
            colliders: RwLock::new(Vec::new()),
            bodies: RwLock::new(Vec::new()),
            pending_additions: Mutex::new(Vec::new()),
            pending_removals: Mutex::new(Vec::new()),
            current_collisions: Mutex::new(HashMap::new()),
            layers: RwLock::new(layers),
        }
    }

    pub fn spawn(&self, transform: Transform) -> ObjectKey {
        ObjectKey(self.objects.write().insert(Arc::new(Object::new(transform))))
    }

    #[inline]
    pub fn get(&self, key: ObjectKey) -> Option<Arc<Object>> {
        self.objects.read().get(key.0).cloned()
    }

    #[inline]
    pub fn contains(&self, key: ObjectKey) -> bool {
        self.objects.read().contains(key.0)
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    pub fn stage_addition(&self, addition: Addition) {
        self.pending_additions.lock().push(addition);
    }

    pub fn stage_removal(&self, removal: Removal) {
        self.pending_removals.lock().push(removal);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_additions.lock().is_empty() || !self.pending_removals.lock().is_empty()
    }

    /// Apply every staged change. Must not run concurrently with a step.
    pub fn flush(&self) -> FlushCounts {
        let additions = std::mem::take(&mut *self.pending_additions.lock());
        let removals = std::mem::take(&mut *self.pending_removals.lock());
        let mut counts = FlushCounts::default();

        let mut colliders = self.colliders.write();
        let mut bodies = self.bodies.write();

        for addition in additions {
            let key = match &addition {
                Addition::Body(k, _) | Addition::Collider(k, _) | Addition::Listener(k, _) => *k,
            };
            let Some(obj) = self.get(key) else {
                log::warn!("Dropping a component staged for removed object {key:?}");
                continue;
            };
            match addition {
                Addition::Body(_, body) => {
                    obj.state.lock().body = Some(body);
                    if !bodies.iter().any(|(k, _)| *k == key) {
                        bodies.push((key, obj));
                    }
                }
                Addition::Collider(_, coll) => {
                    *obj.collider.write() = Some(Arc::new(coll));
                    if !colliders.iter().any(|(k, _)| *k == key) {
                        colliders.push((key, obj));
                    }
                }
                Addition::Listener(_, listener) => obj.listeners.write().push(listener),
            }
            counts.added += 1;
        }

        for removal in removals {
            match removal {
                Removal::Body(key) => {
                    if let Some(obj) = self.get(key) {
                        obj.state.lock().body = None;
                    }
                    bodies.retain(|(k, _)| *k != key);
                }
                Removal::Collider(key) => {
                    if let Some(obj) = self.get(key) {
                        *obj.collider.write() = None;
                        obj.listeners.write().clear();
                    }
                    colliders.retain(|(k, _)| *k != key);
                }
                Removal::Listeners(key) => {
                    if let Some(obj) = self.get(key) {
                        obj.listeners.write().clear();
                    }
                }
                Removal::Object(key) => {
                    self.objects.write().remove(key.0);
                    bodies.retain(|(k, _)| *k != key);
                    colliders.retain(|(k, _)| *k != key);
                    self.current_collisions.lock().remove(&key);
                }
            }
            counts.removed += 1;
        }

        counts
    }

    /// Copy of the active collider list.
    pub fn colliders(&self) -> Vec<ObjectRef> {
        self.colliders.read().clone()
    }

    /// Copy of the active body list.
    pub fn bodies(&self) -> Vec<ObjectRef> {
        self.bodies.read().clone()
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.read().len()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.read().len()
    }

    pub fn record_collisions(&self, key: ObjectKey, results: Vec<CollisionData>) {
        if !results.is_empty() {
            self.current_collisions.lock().insert(key, results);
        }
    }

    pub fn clear_collisions(&self) {
        self.current_collisions.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::rigidbody::BodyPreset;

    #[test]
    fn staged_changes_wait_for_flush() {
        let reg = Registry::new(Layers::new());
        let key = reg.spawn(Transform::default());
        reg.stage_addition(Addition::Body(key, RigidBody::from_preset(BodyPreset::Standard)));
        reg.stage_addition(Addition::Collider(key, Collider::new_circle(1.0).unwrap()));
        assert_eq!((reg.body_count(), reg.collider_count()), (0, 0));
        assert!(reg.get(key).unwrap().state.lock().body.is_none());

        let counts = reg.flush();
        assert_eq!(counts, FlushCounts { added: 2, removed: 0 });
        assert_eq!((reg.body_count(), reg.collider_count()), (1, 1));
        assert!(!reg.has_pending());
    }

    #[test]
    fn removals_apply_after_additions() {
        let reg = Registry::new(Layers::new());
        let key = reg.spawn(Transform::default());
        reg.stage_removal(Removal::Body(key));
        reg.stage_addition(Addition::Body(key, RigidBody::from_preset(BodyPreset::Bullet)));
        reg.flush();
        assert_eq!(reg.body_count(), 0);
        assert!(reg.get(key).unwrap().state.lock().body.is_none());
    }

    #[test]
    fn reattaching_replaces_without_duplicating() {
        let reg = Registry::new(Layers::new());
        let key = reg.spawn(Transform::default());
        reg.stage_addition(Addition::Collider(key, Collider::new_circle(1.0).unwrap()));
        reg.flush();
        reg.stage_addition(Addition::Collider(key, Collider::new_rect(1.0, 1.0).unwrap()));
        reg.flush();
        assert_eq!(reg.collider_count(), 1);
        let coll = reg.get(key).unwrap().collider.read().clone().unwrap();
        assert!(matches!(coll.shape(), crate::physics::collision::ColliderShape::Rect { .. }));
    }

    #[test]
    fn listeners_are_dropped_with_the_collider() {
        let reg = Registry::new(Layers::new());
        let key = reg.spawn(Transform::default());
        let listener: Arc<dyn CollisionListener> = Arc::new(|_: &CollisionData| {});
        reg.stage_addition(Addition::Collider(key, Collider::new_circle(1.0).unwrap()));
        reg.stage_addition(Addition::Listener(key, listener.clone()));
        reg.flush();
        assert_eq!(reg.get(key).unwrap().listeners.read().len(), 1);

        reg.stage_removal(Removal::Collider(key));
        reg.flush();
        assert!(reg.get(key).unwrap().listeners.read().is_empty());

        reg.stage_addition(Addition::Listener(key, listener));
        reg.stage_removal(Removal::Listeners(key));
        assert!(reg.has_pending());
        assert_eq!(reg.flush(), FlushCounts { added: 1, removed: 1 });
        assert!(reg.get(key).unwrap().listeners.read().is_empty());
    }

    #[test]
    fn removing_an_object_clears_everything() {
        let reg = Registry::new(Layers::new());
        let key = reg.spawn(Transform::default());
        reg.stage_addition(Addition::Collider(key, Collider::new_circle(1.0).unwrap()));
        reg.flush();
        reg.record_collisions(key, vec![CollisionData::empty()]);
        reg.stage_removal(Removal::Object(key));
        reg.flush();
        assert!(!reg.contains(key));
        assert_eq!(reg.collider_count(), 0);
        assert!(reg.current_collisions.lock().is_empty());

        // components staged for a dead object are dropped
        reg.stage_addition(Addition::Body(key, RigidBody::from_preset(BodyPreset::Bullet)));
        assert_eq!(reg.flush().added, 0);
    }
}
