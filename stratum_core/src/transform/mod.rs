// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transform nodes and the lazy update protocol.
//!
//! A *transform node* maps points, vectors and normals. Each node has:
//!
//! - An identity ([`NodeId`]), unique for the life of the process.
//! - A **kind** ([`TransformKind`]): the state and mapping rules, e.g. a
//!   single matrix ([`MatrixKind`]) or a whole concatenation
//!   ([`ComposedKind`]). Kinds can produce themselves afresh
//!   ([`Default`]), copy themselves ([`Clone`]), invert themselves in place,
//!   and map a point.
//! - A **modification time** bumped by [`Transform::modified`] and a
//!   **last-updated time** recorded by [`Transform::update`].
//! - An optional **inverse link**.
//!
//! # Inverses
//!
//! [`Transform::inverse`] returns the node's inverse, creating it on first
//! use. The created node mirrors its creator: whenever the creator's
//! modification time reaches the mirror's last update, the mirror's next
//! update copies the creator's state and inverts it in place. Asking the
//! mirror for *its* inverse returns the creator.
//!
//! The creator owns the mirror; the mirror refers back weakly, so a pair
//! with no outside handles is freed like any other value. If the creator is
//! dropped while the mirror is still in use, the mirror is refreshed one
//! last time and detached.
//!
//! [`Transform::set_inverse`] links an explicit inverse instead. The receiver
//! then holds its inverse strongly and mirrors it.
//!
//! # Thread safety
//!
//! Updates of one node are serialized by a per-node lock. Inverse creation
//! takes a second, independent lock and never updates while holding it.

mod batch;
mod composed;
mod id;
mod matrix;
mod node;

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use crate::error::TransformResult;
use crate::matrix::{Mat3, Matrix4, mat3_mul_vec, transform_normal_by};
use crate::time::ModifiedTime;

pub use batch::MappedGeometry;
pub use composed::{ComposedKind, ComposedTransform};
pub use id::NodeId;
pub use matrix::{MatrixKind, MatrixTransform};
pub use node::TransformNode;

/// The state and mapping rules of one family of transforms.
///
/// [`TransformNode`] supplies identity, locking, modification tracking and
/// inverse management; a kind only describes the mapping itself.
///
/// - [`Default`] produces the kind afresh (used for lazily created inverses).
/// - [`Clone`] copies the state another node of the same kind should mirror.
/// - [`invert`](Self::invert) turns the state into its inverse in place.
pub trait TransformKind: Clone + Default + fmt::Debug + Send + Sync + 'static {
    /// Human-readable kind name, used in errors and diagnostics.
    const NAME: &'static str;

    /// Inverts the state in place.
    fn invert(&mut self);

    /// Recomputes cached derived state. Runs under the node's update lock.
    fn internal_update(&mut self) {}

    /// Maps a point using the current (already updated) state.
    fn transform_point(&self, point: [f64; 3]) -> [f64; 3];

    /// Maps a point and returns the mapping's derivative at that point.
    fn transform_derivative(&self, point: [f64; 3]) -> ([f64; 3], Mat3);

    /// Returns the homogeneous matrix if the mapping is one.
    fn matrix(&self) -> Option<Matrix4> {
        None
    }

    /// Latest modification time of any node this state refers to.
    fn dependency_time(&self) -> ModifiedTime {
        ModifiedTime::ZERO
    }

    /// Whether any node this state refers to is, or depends on, `target`.
    fn circuit_check(&self, target: NodeId) -> bool {
        _ = target;
        false
    }
}

/// A transform node of any kind.
///
/// This is the object-safe face of [`TransformNode`] used wherever kinds are
/// mixed, most notably inside a [`Concatenation`](crate::Concatenation).
///
/// The `internal_*` methods read cached state as-is; the provided mapping
/// methods call [`update`](Self::update) first.
pub trait Transform: Any + Send + Sync + fmt::Debug {
    /// Returns the node's identity.
    fn id(&self) -> NodeId;

    /// Returns the kind name (see [`TransformKind::NAME`]).
    fn kind_name(&self) -> &'static str;

    /// Brings cached state up to date with everything it depends on.
    ///
    /// Concurrent callers on one node block rather than race.
    fn update(&self);

    /// Records a modification, unless called from within this node's own
    /// update on the same thread.
    fn modified(&self);

    /// Latest modification of this node, of anything its state refers to,
    /// and of the inverse it mirrors (if any).
    fn modification_time(&self) -> ModifiedTime;

    /// Returns the inverse, creating it on first use.
    fn inverse(&self) -> Arc<dyn Transform>;

    /// Whether this node mirrors its inverse.
    fn depends_on_inverse(&self) -> bool;

    /// Makes `inverse` this node's inverse; this node will mirror it.
    ///
    /// Fails with [`TypeMismatch`](crate::TransformError::TypeMismatch) for a
    /// different kind and with
    /// [`CircularReference`](crate::TransformError::CircularReference) if
    /// `inverse` already depends on this node. On failure nothing changes.
    fn set_inverse(&self, inverse: Arc<dyn Transform>) -> TransformResult;

    /// Copies `source`'s state into this node.
    ///
    /// Fails like [`set_inverse`](Self::set_inverse); on failure nothing
    /// changes.
    fn deep_copy(&self, source: &dyn Transform) -> TransformResult;

    /// Whether this node is `target` or depends on it.
    fn circuit_check(&self, target: NodeId) -> bool;

    /// The cached homogeneous matrix, if the mapping is one.
    fn matrix(&self) -> Option<Matrix4>;

    /// Maps a point using cached state.
    fn internal_transform_point(&self, point: [f64; 3]) -> [f64; 3];

    /// Maps a point and returns the derivative, using cached state.
    fn internal_transform_derivative(&self, point: [f64; 3]) -> ([f64; 3], Mat3);

    /// Upcast for downcasting to a concrete node type.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for downcasting a shared handle to a concrete node type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Updates, then returns the homogeneous matrix if the mapping is one.
    fn linear_matrix(&self) -> Option<Matrix4> {
        self.update();
        self.matrix()
    }

    /// Maps a single point.
    fn transform_point(&self, point: [f64; 3]) -> [f64; 3] {
        self.update();
        self.internal_transform_point(point)
    }

    /// Maps a vector anchored at `point`.
    fn transform_vector_at_point(&self, point: [f64; 3], vector: [f64; 3]) -> [f64; 3] {
        self.update();
        let (_, derivative) = self.internal_transform_derivative(point);
        mat3_mul_vec(&derivative, vector)
    }

    /// Maps a surface normal anchored at `point`; the result is unit length.
    fn transform_normal_at_point(&self, point: [f64; 3], normal: [f64; 3]) -> [f64; 3] {
        self.update();
        let (_, derivative) = self.internal_transform_derivative(point);
        transform_normal_by(&derivative, normal)
    }

    /// Maps a batch of points after a single update.
    ///
    /// With the `parallel` feature the points are mapped on the rayon pool.
    fn transform_points(&self, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        self.update();
        batch::map_range(points.len(), |i| self.internal_transform_point(points[i]))
    }

    /// Maps a batch of points together with optional per-point normals and
    /// vectors, after a single update.
    ///
    /// # Panics
    ///
    /// Panics if `normals` or `vectors` is not the same length as `points`.
    fn transform_points_normals_vectors(
        &self,
        points: &[[f64; 3]],
        normals: Option<&[[f64; 3]]>,
        vectors: Option<&[[f64; 3]]>,
    ) -> MappedGeometry {
        if let Some(normals) = normals {
            assert_eq!(normals.len(), points.len(), "one normal per point");
        }
        if let Some(vectors) = vectors {
            assert_eq!(vectors.len(), points.len(), "one vector per point");
        }
        self.update();
        let mapped = batch::map_range(points.len(), |i| {
            let (point, derivative) = self.internal_transform_derivative(points[i]);
            let normal = normals.map(|n| transform_normal_by(&derivative, n[i]));
            let vector = vectors.map(|v| mat3_mul_vec(&derivative, v[i]));
            (point, normal, vector)
        });
        MappedGeometry::collect(mapped, normals.is_some(), vectors.is_some())
    }
}
