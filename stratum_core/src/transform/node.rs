// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The shared, lockable transform node.

use core::any::Any;
use core::{fmt, mem, ptr};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};

use super::{NodeId, Transform, TransformKind};
use crate::error::{Operation, TransformError, TransformResult};
use crate::matrix::{Mat3, Matrix4};
use crate::time::{ModifiedTime, TimeStamp};
use crate::trace::{
    ErrorEvent, InverseCreatedEvent, InverseDetachedEvent, InverseLinkedEvent, Tracer,
    UpdateEvent, UpdatePath,
};

/// How a node relates to its inverse.
enum InverseLink<K: TransformKind> {
    /// No inverse yet.
    None,
    /// Lazily created by this node; this node owns it and it mirrors us.
    Owned(Arc<TransformNode<K>>),
    /// Linked explicitly; this node mirrors it.
    Source(Arc<TransformNode<K>>),
    /// This node was lazily created by the referent and mirrors it.
    Derived(Weak<TransformNode<K>>),
}

impl<K: TransformKind> InverseLink<K> {
    /// The node this one mirrors, if it is still alive.
    fn source(&self) -> Option<Arc<TransformNode<K>>> {
        match self {
            Self::Source(node) => Some(Arc::clone(node)),
            Self::Derived(creator) => creator.upgrade(),
            Self::None | Self::Owned(_) => None,
        }
    }

    fn inverse(&self) -> Option<Arc<TransformNode<K>>> {
        match self {
            Self::Owned(node) | Self::Source(node) => Some(Arc::clone(node)),
            Self::Derived(creator) => creator.upgrade(),
            Self::None => None,
        }
    }

    fn points_to(&self, node: &TransformNode<K>) -> bool {
        match self {
            Self::Owned(n) | Self::Source(n) => ptr::eq(Arc::as_ptr(n), node),
            Self::Derived(creator) => ptr::eq(creator.as_ptr(), node),
            Self::None => false,
        }
    }
}

/// A shared transform node with state of kind `K`.
///
/// Nodes are always handled through [`Arc`]; constructors return one. State
/// is changed through [`edit`](Self::edit), which records a modification, and
/// brought up to date by [`Transform::update`]. See the
/// [module docs](crate::transform) for the inverse protocol.
pub struct TransformNode<K: TransformKind> {
    id: NodeId,
    this: Weak<Self>,
    state: RwLock<K>,
    /// Also serializes lazy inverse creation.
    link: RwLock<InverseLink<K>>,
    update_lock: Mutex<()>,
    modified: TimeStamp,
    updated: TimeStamp,
    /// Clock value just before the last copy of the source's state.
    synced: TimeStamp,
    /// Thread currently running this node's update, if any.
    updating: Mutex<Option<ThreadId>>,
}

impl<K: TransformKind> TransformNode<K> {
    /// Creates a node with default state.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_state(K::default())
    }

    /// Creates a node with the given state.
    #[must_use]
    pub fn with_state(state: K) -> Arc<Self> {
        Self::build(state, InverseLink::None)
    }

    fn build(state: K, link: InverseLink<K>) -> Arc<Self> {
        Arc::new_cyclic(|this| {
            let node = Self {
                id: NodeId::next(),
                this: this.clone(),
                state: RwLock::new(state),
                link: RwLock::new(link),
                update_lock: Mutex::new(()),
                modified: TimeStamp::new(),
                updated: TimeStamp::new(),
                synced: TimeStamp::new(),
                updating: Mutex::new(None),
            };
            node.modified.modified();
            node
        })
    }

    /// Calls `f` with the current state, without updating first.
    pub fn read<R>(&self, f: impl FnOnce(&K) -> R) -> R {
        f(&self.state.read())
    }

    /// Calls `f` with mutable access to the state, then records a
    /// modification.
    pub fn edit<R>(&self, f: impl FnOnce(&mut K) -> R) -> R {
        let out = f(&mut self.state.write());
        Transform::modified(self);
        out
    }

    /// Mutates cached state without recording a modification.
    pub(crate) fn touch<R>(&self, f: impl FnOnce(&mut K) -> R) -> R {
        f(&mut self.state.write())
    }

    /// Returns the inverse as a node of the same kind, creating it on first
    /// use.
    pub fn inverse_node(&self) -> Arc<Self> {
        if let Some(inverse) = self.link.read().inverse() {
            return inverse;
        }
        let mut link = self.link.write();
        if let Some(inverse) = link.inverse() {
            return inverse;
        }
        let inverse = Self::build(K::default(), InverseLink::Derived(self.this.clone()));
        *link = InverseLink::Owned(Arc::clone(&inverse));
        drop(link);
        log::debug!("{} {}: created inverse {}", K::NAME, self.id, inverse.id);
        Tracer::inverse_created(|| InverseCreatedEvent {
            node: self.id,
            inverse: inverse.id,
            kind: K::NAME,
        });
        inverse
    }

    /// Makes `inverse` this node's inverse. See [`Transform::set_inverse`].
    pub fn link_inverse(&self, inverse: Arc<Self>) -> TransformResult {
        if self.link.read().points_to(&inverse) {
            return Ok(());
        }
        if inverse.circuit_check(self.id) {
            return Err(self.reject(TransformError::CircularReference {
                operation: Operation::SetInverse,
            }));
        }
        let inverse_id = inverse.id;
        let previous = mem::replace(&mut *self.link.write(), InverseLink::Source(inverse));
        drop(previous);
        Tracer::inverse_linked(|| InverseLinkedEvent {
            node: self.id,
            inverse: inverse_id,
        });
        Transform::modified(self);
        Ok(())
    }

    /// Copies `source`'s state into this node. See [`Transform::deep_copy`].
    pub fn copy_from(&self, source: &Self) -> TransformResult {
        if ptr::eq(self, source) {
            return Ok(());
        }
        if source.circuit_check(self.id) {
            return Err(self.reject(TransformError::CircularReference {
                operation: Operation::DeepCopy,
            }));
        }
        // Snapshot first so that two nodes copying each other cannot deadlock.
        let snapshot = source.state.read().clone();
        let stale = mem::replace(&mut *self.state.write(), snapshot);
        drop(stale);
        Transform::modified(self);
        Ok(())
    }

    pub(crate) fn reject(&self, error: TransformError) -> TransformError {
        Tracer::error(|| ErrorEvent {
            node: self.id,
            error,
        });
        error.report()
    }

    fn is_updating_here(&self) -> bool {
        *self.updating.lock() == Some(thread::current().id())
    }

    fn modification_time_with(&self, source: Option<&Self>) -> ModifiedTime {
        let own = self.modified.get().max(self.state.read().dependency_time());
        source.map_or(own, |source| own.max(source.modification_time()))
    }

    fn run_update(&self) {
        // Declared before the guard so that the last handle to a creator is
        // never released while this node's update lock is held.
        let source = self.link.read().source();
        let guard = self.update_lock.lock();
        *self.updating.lock() = Some(thread::current().id());

        let last = self.updated.get();
        let started = ModifiedTime::now();
        let mut stamp = started;
        let path = match source.as_deref() {
            Some(source) if source.modification_time() >= self.synced.get() => {
                let mut fresh = source.state.read().clone();
                fresh.invert();
                // Nodes stamped by the copy and inversion above are private
                // to `fresh`; later edits to shared members still count.
                stamp = ModifiedTime::now();
                fresh.internal_update();
                let stale = mem::replace(&mut *self.state.write(), fresh);
                drop(stale);
                self.synced.set(started);
                UpdatePath::FromInverse
            }
            source if self.modification_time_with(source) >= last => {
                self.state.write().internal_update();
                UpdatePath::Internal
            }
            _ => UpdatePath::UpToDate,
        };

        self.updated.set(stamp);
        *self.updating.lock() = None;
        drop(guard);
        if path != UpdatePath::UpToDate {
            log::debug!("{} {}: updated ({path:?})", K::NAME, self.id);
        }
        Tracer::update(|| UpdateEvent {
            node: self.id,
            kind: K::NAME,
            path,
            time: stamp,
        });
        drop(source);
    }

    /// Takes a final snapshot of a dropped creator's state and stops
    /// mirroring it.
    ///
    /// A mirror that lost its creator may already have created an inverse of
    /// its own (the creator's last handle is gone before its drop runs); it
    /// still takes the snapshot. Only an explicitly linked inverse wins.
    fn detach(&self, owner: NodeId, owner_state: &K) {
        let _guard = (!self.is_updating_here()).then(|| self.update_lock.lock());
        if matches!(*self.link.read(), InverseLink::Source(_)) {
            return;
        }
        let mut fresh = owner_state.clone();
        fresh.invert();
        fresh.internal_update();
        let stale = mem::replace(&mut *self.state.write(), fresh);
        {
            let mut link = self.link.write();
            if matches!(*link, InverseLink::Derived(_)) {
                *link = InverseLink::None;
            }
        }
        self.modified.modified();
        drop(stale);
        log::debug!("{} {}: detached from dropped owner {}", K::NAME, self.id, owner);
        Tracer::inverse_detached(|| InverseDetachedEvent {
            owner,
            inverse: self.id,
        });
    }
}

impl<K: TransformKind> Drop for TransformNode<K> {
    fn drop(&mut self) {
        let InverseLink::Owned(inverse) = mem::replace(self.link.get_mut(), InverseLink::None)
        else {
            return;
        };
        if Arc::strong_count(&inverse) > 1 {
            inverse.detach(self.id, self.state.get_mut());
        }
    }
}

impl<K: TransformKind> fmt::Debug for TransformNode<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(K::NAME)
            .field("id", &self.id)
            .field("modified", &self.modified.get())
            .field("updated", &self.updated.get())
            .finish_non_exhaustive()
    }
}

impl<K: TransformKind> Transform for TransformNode<K> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind_name(&self) -> &'static str {
        K::NAME
    }

    fn update(&self) {
        self.run_update();
    }

    fn modified(&self) {
        if self.is_updating_here() {
            return;
        }
        self.modified.modified();
    }

    fn modification_time(&self) -> ModifiedTime {
        let source = self.link.read().source();
        self.modification_time_with(source.as_deref())
    }

    fn inverse(&self) -> Arc<dyn Transform> {
        self.inverse_node()
    }

    fn depends_on_inverse(&self) -> bool {
        match &*self.link.read() {
            InverseLink::Source(_) => true,
            InverseLink::Derived(creator) => creator.strong_count() > 0,
            InverseLink::None | InverseLink::Owned(_) => false,
        }
    }

    fn set_inverse(&self, inverse: Arc<dyn Transform>) -> TransformResult {
        let found = inverse.kind_name();
        match inverse.into_any().downcast::<Self>() {
            Ok(inverse) => self.link_inverse(inverse),
            Err(_) => Err(self.reject(TransformError::TypeMismatch {
                operation: Operation::SetInverse,
                expected: K::NAME,
                found,
            })),
        }
    }

    fn deep_copy(&self, source: &dyn Transform) -> TransformResult {
        match source.as_any().downcast_ref::<Self>() {
            Some(source) => self.copy_from(source),
            None => Err(self.reject(TransformError::TypeMismatch {
                operation: Operation::DeepCopy,
                expected: K::NAME,
                found: source.kind_name(),
            })),
        }
    }

    fn circuit_check(&self, target: NodeId) -> bool {
        if self.id == target || self.state.read().circuit_check(target) {
            return true;
        }
        let source = self.link.read().source();
        source.is_some_and(|source| source.circuit_check(target))
    }

    fn matrix(&self) -> Option<Matrix4> {
        self.state.read().matrix()
    }

    fn internal_transform_point(&self, point: [f64; 3]) -> [f64; 3] {
        self.state.read().transform_point(point)
    }

    fn internal_transform_derivative(&self, point: [f64; 3]) -> ([f64; 3], Mat3) {
        self.state.read().transform_derivative(point)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{ComposedTransform, MatrixKind, MatrixTransform};

    fn assert_point_eq(a: [f64; 3], b: [f64; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-12, "{a:?} != {b:?}");
        }
    }

    fn translation(x: f64, y: f64, z: f64) -> Arc<MatrixTransform> {
        MatrixTransform::from_matrix(Matrix4::from_translation(x, y, z))
    }

    #[test]
    fn inverse_is_created_once() {
        let a = translation(1.0, 2.0, 3.0);
        let first = a.inverse_node();
        let second = a.inverse_node();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.depends_on_inverse());
        assert!(!a.depends_on_inverse());
    }

    #[test]
    fn inverse_of_inverse_is_original() {
        let a = translation(1.0, 2.0, 3.0);
        let b = a.inverse_node();
        let back = b.inverse_node();
        assert!(Arc::ptr_eq(&a, &back));
    }

    #[test]
    fn inverse_tracks_modifications() {
        let a = translation(1.0, 2.0, 3.0);
        let b = a.inverse();
        assert_point_eq(b.transform_point([1.0, 2.0, 3.0]), [0.0, 0.0, 0.0]);

        a.set_matrix(Matrix4::from_scale(2.0, 4.0, 8.0));
        assert_point_eq(b.transform_point([2.0, 4.0, 8.0]), [1.0, 1.0, 1.0]);
    }

    /// Notifies its own node from inside the update hook.
    #[derive(Clone, Debug, Default)]
    struct SelfNotifyingKind {
        node: Option<Weak<TransformNode<SelfNotifyingKind>>>,
        updates: usize,
    }

    impl TransformKind for SelfNotifyingKind {
        const NAME: &'static str = "SelfNotifying";

        fn invert(&mut self) {}

        fn internal_update(&mut self) {
            self.updates += 1;
            if let Some(node) = self.node.as_ref().and_then(Weak::upgrade) {
                node.modified();
            }
        }

        fn transform_point(&self, point: [f64; 3]) -> [f64; 3] {
            point
        }

        fn transform_derivative(&self, point: [f64; 3]) -> ([f64; 3], Mat3) {
            (point, crate::matrix::MAT3_IDENTITY)
        }
    }

    #[test]
    fn modified_is_suppressed_during_own_update() {
        let node = TransformNode::with_state(SelfNotifyingKind::default());
        node.edit(|kind| kind.node = Some(Arc::downgrade(&node)));

        node.update();
        assert_eq!(node.read(|kind| kind.updates), 1);
        assert!(node.modification_time() < node.updated.get());

        node.update();
        assert_eq!(node.read(|kind| kind.updates), 1);

        node.modified();
        node.update();
        assert_eq!(node.read(|kind| kind.updates), 2);
    }

    #[test]
    fn mirror_is_current_after_copying_its_source() {
        let a = ComposedTransform::new();
        a.translate(1.0, 2.0, 3.0);
        a.concatenate(translation(0.0, 0.0, 1.0)).unwrap();
        a.post_multiply();
        a.scale(2.0, 2.0, 2.0);
        let i = a.inverse_node();

        i.update();
        assert!(i.modification_time() < i.updated.get());
        i.update();
        assert!(i.modification_time() < i.updated.get());

        a.translate(1.0, 0.0, 0.0);
        assert!(i.modification_time() >= i.updated.get());
        let p = [0.5, -1.0, 2.0];
        assert_point_eq(i.transform_point(a.transform_point(p)), p);
        assert!(i.modification_time() < i.updated.get());
    }

    #[test]
    fn update_after_modification_is_not_lost() {
        let a = translation(1.0, 0.0, 0.0);
        a.update();
        let updated = a.updated.get();
        assert!(a.modification_time() < updated);
        a.set_matrix(Matrix4::from_translation(2.0, 0.0, 0.0));
        assert!(a.modification_time() >= updated);
        assert_point_eq(a.transform_point([0.0; 3]), [2.0, 0.0, 0.0]);
    }

    #[test]
    fn pair_without_outside_handles_is_freed() {
        let a = translation(1.0, 0.0, 0.0);
        let b = a.inverse_node();
        let weak_a = Arc::downgrade(&a);
        let weak_b = Arc::downgrade(&b);
        drop(b);
        drop(a);
        assert!(weak_a.upgrade().is_none());
        assert!(weak_b.upgrade().is_none());
    }

    #[test]
    fn inverse_outlives_creator() {
        let a = translation(1.0, 2.0, 3.0);
        let b = a.inverse_node();
        let weak_a = Arc::downgrade(&a);
        drop(a);
        assert!(weak_a.upgrade().is_none());
        assert!(!b.depends_on_inverse());
        assert_point_eq(b.transform_point([1.0, 2.0, 3.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn inverse_snapshot_survives_unseen_modification() {
        let a = translation(1.0, 0.0, 0.0);
        let b = a.inverse_node();
        b.update();
        a.set_matrix(Matrix4::from_translation(5.0, 0.0, 0.0));
        drop(a);
        assert_point_eq(b.transform_point([5.0, 0.0, 0.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn orphaned_mirror_with_own_inverse_takes_final_snapshot() {
        let a = translation(1.0, 0.0, 0.0);
        let b = a.inverse_node();
        b.update();
        a.set_matrix(Matrix4::from_translation(5.0, 0.0, 0.0));

        // What `b.inverse_node()` leaves behind when it runs after the
        // creator's last handle is gone but before the creator's drop.
        let own = TransformNode::build(
            MatrixKind::default(),
            InverseLink::Derived(Arc::downgrade(&b)),
        );
        *b.link.write() = InverseLink::Owned(Arc::clone(&own));

        drop(a);
        assert!(!b.depends_on_inverse());
        assert_point_eq(b.transform_point([5.0, 0.0, 0.0]), [0.0; 3]);
        assert_point_eq(own.transform_point([0.0; 3]), [5.0, 0.0, 0.0]);
        assert!(Arc::ptr_eq(&b.inverse_node(), &own));
    }

    #[test]
    fn explicit_inverse_is_mirrored() {
        let u = MatrixTransform::new();
        let t = translation(0.0, 0.0, 4.0);
        u.set_inverse(t.clone()).unwrap();
        assert!(u.depends_on_inverse());
        assert_point_eq(u.transform_point([0.0, 0.0, 4.0]), [0.0; 3]);
        assert!(Arc::ptr_eq(&u.inverse_node(), &t));
    }

    #[test]
    fn mutual_inverses_are_refused_and_freed() {
        let u = MatrixTransform::new();
        let t = MatrixTransform::new();
        assert!(u.set_inverse(t.clone()).is_ok());
        assert_eq!(
            t.set_inverse(u.clone()),
            Err(TransformError::CircularReference {
                operation: Operation::SetInverse
            })
        );
        assert!(!t.depends_on_inverse());

        let weak_u = Arc::downgrade(&u);
        let weak_t = Arc::downgrade(&t);
        drop(u);
        drop(t);
        assert!(weak_u.upgrade().is_none());
        assert!(weak_t.upgrade().is_none());
    }

    #[test]
    fn linking_the_current_inverse_is_a_no_op() {
        let a = translation(1.0, 0.0, 0.0);
        let b = a.inverse_node();
        assert!(a.link_inverse(b.clone()).is_ok());
        assert!(Arc::ptr_eq(&a.inverse_node(), &b));
        assert!(!a.depends_on_inverse());
    }

    #[test]
    fn mismatched_kinds_are_refused() {
        let m = translation(1.0, 0.0, 0.0);
        let c = ComposedTransform::new();
        let err = m.set_inverse(c.clone()).unwrap_err();
        assert_eq!(
            err,
            TransformError::TypeMismatch {
                operation: Operation::SetInverse,
                expected: "MatrixTransform",
                found: "ComposedTransform",
            }
        );
        assert!(!m.depends_on_inverse());

        let err = m.deep_copy(&*c).unwrap_err();
        assert_eq!(err.operation(), Operation::DeepCopy);
        assert_point_eq(m.transform_point([0.0; 3]), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn deep_copy_copies_state() {
        let a = translation(1.0, 2.0, 3.0);
        let b = MatrixTransform::new();
        b.deep_copy(&*a).unwrap();
        assert_point_eq(b.transform_point([0.0; 3]), [1.0, 2.0, 3.0]);
        a.set_matrix(Matrix4::IDENTITY);
        assert_point_eq(b.transform_point([0.0; 3]), [1.0, 2.0, 3.0]);
        assert!(b.deep_copy(&*b).is_ok());
    }

    #[test]
    fn deep_copy_from_dependent_is_refused() {
        let u = MatrixTransform::new();
        let t = translation(1.0, 0.0, 0.0);
        u.set_inverse(t.clone()).unwrap();
        let err = t.deep_copy(&*u).unwrap_err();
        assert_eq!(
            err,
            TransformError::CircularReference {
                operation: Operation::DeepCopy
            }
        );
        assert_point_eq(t.transform_point([0.0; 3]), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn circuit_check_follows_sources() {
        let u = MatrixTransform::new();
        let t = MatrixTransform::new();
        u.set_inverse(t.clone()).unwrap();
        assert!(u.circuit_check(u.id()));
        assert!(u.circuit_check(t.id()));
        assert!(!t.circuit_check(u.id()));
    }
}
