// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ordered lists of transforms with matrix accumulation and O(1) inversion.
//!
//! A [`Concatenation`] holds a sequence of transforms in *logical order*:
//! index 0 is applied to a point first, so the composite of `T0, T1, ..., Tn`
//! is `Tn · ... · T1 · T0`.
//!
//! ## Pre- and post-multiplication
//!
//! New transforms are added at the logical front (*pre-multiply*, applied
//! before everything already present) or at the logical back
//! (*post-multiply*, applied after). Pre-multiply is the default.
//!
//! ## Matrix accumulators
//!
//! Consecutive plain matrices (`translate`, `rotate`, `scale`,
//! `concatenate_matrix`) do not grow the list. They are folded into an
//! *accumulator*: a [`MatrixTransform`] owned by the concatenation that sits
//! at the end being added to. There is at most one accumulator at each end.
//! Adding a general transform at an end retires that end's accumulator; it
//! stays in the list as an ordinary element and later matrices start a fresh
//! one.
//!
//! ## Inversion
//!
//! [`Concatenation::invert`] does not touch the list. It flips an
//! `inverted` flag under which logical index `i` reads physical index
//! `n - 1 - i` and yields the inverse of the stored transform. Inverses of
//! stored transforms are obtained lazily and cached next to them in a
//! [`TransformPair`]. Accumulators are the exception: they are inverted in
//! place so that they can keep absorbing matrices.

use core::mem;
use std::collections::VecDeque;
use std::sync::Arc;

use kurbo::Affine;

use crate::matrix::Matrix4;
use crate::time::ModifiedTime;
use crate::transform::{MatrixTransform, NodeId, Transform, TransformKind};

/// A stored transform together with its inverse, where known.
///
/// Adding a transform while the concatenation is inverted stores it on the
/// inverse side; the missing side is filled in the first time it is read.
#[derive(Clone, Debug)]
pub enum TransformPair {
    /// Only the forward side is known.
    Forward(Arc<dyn Transform>),
    /// Only the inverse side is known.
    Inverse(Arc<dyn Transform>),
    /// Both sides are known.
    Both {
        /// The forward side.
        forward: Arc<dyn Transform>,
        /// The inverse side.
        inverse: Arc<dyn Transform>,
    },
}

impl TransformPair {
    fn new(transform: Arc<dyn Transform>, inverted: bool) -> Self {
        if inverted {
            Self::Inverse(transform)
        } else {
            Self::Forward(transform)
        }
    }

    /// The forward side, if known.
    #[must_use]
    pub fn forward(&self) -> Option<&Arc<dyn Transform>> {
        match self {
            Self::Forward(forward) | Self::Both { forward, .. } => Some(forward),
            Self::Inverse(_) => None,
        }
    }

    /// The inverse side, if known.
    #[must_use]
    pub fn inverse(&self) -> Option<&Arc<dyn Transform>> {
        match self {
            Self::Inverse(inverse) | Self::Both { inverse, .. } => Some(inverse),
            Self::Forward(_) => None,
        }
    }

    /// The side the transform was added as.
    fn stored(&self) -> &Arc<dyn Transform> {
        match self {
            Self::Forward(forward) | Self::Both { forward, .. } => forward,
            Self::Inverse(inverse) => inverse,
        }
    }

    fn resolve_forward(&mut self) -> Arc<dyn Transform> {
        match self {
            Self::Forward(forward) | Self::Both { forward, .. } => Arc::clone(forward),
            Self::Inverse(inverse) => {
                let inverse = Arc::clone(inverse);
                let forward = inverse.inverse();
                *self = Self::Both {
                    forward: Arc::clone(&forward),
                    inverse,
                };
                forward
            }
        }
    }

    fn resolve_inverse(&mut self) -> Arc<dyn Transform> {
        match self {
            Self::Inverse(inverse) | Self::Both { inverse, .. } => Arc::clone(inverse),
            Self::Forward(forward) => {
                let forward = Arc::clone(forward);
                let inverse = forward.inverse();
                *self = Self::Both {
                    forward,
                    inverse: Arc::clone(&inverse),
                };
                inverse
            }
        }
    }

    fn swap(&mut self) {
        match self {
            Self::Both { forward, inverse } => mem::swap(forward, inverse),
            Self::Forward(forward) => *self = Self::Inverse(Arc::clone(forward)),
            Self::Inverse(inverse) => *self = Self::Forward(Arc::clone(inverse)),
        }
    }

    fn circuit_check(&self, target: NodeId) -> bool {
        self.forward().is_some_and(|t| t.circuit_check(target))
            || self.inverse().is_some_and(|t| t.circuit_check(target))
    }
}

/// An ordered, invertible list of transforms.
///
/// See the [module docs](self) for ordering and accumulator rules.
#[derive(Debug)]
pub struct Concatenation {
    /// Physical storage; reversed relative to logical order while inverted.
    pairs: VecDeque<TransformPair>,
    pre_multiply: bool,
    inverted: bool,
    /// Elements in the logical-front section.
    pre_count: usize,
    pre_accumulator: Option<Arc<MatrixTransform>>,
    post_accumulator: Option<Arc<MatrixTransform>>,
}

impl Default for Concatenation {
    fn default() -> Self {
        Self::new()
    }
}

impl Concatenation {
    /// Creates an empty concatenation in pre-multiply mode.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pre_multiply(true)
    }

    /// Creates an empty concatenation with the given multiplication mode.
    #[must_use]
    pub fn with_pre_multiply(pre_multiply: bool) -> Self {
        Self {
            pairs: VecDeque::new(),
            pre_multiply,
            inverted: false,
            pre_count: 0,
            pre_accumulator: None,
            post_accumulator: None,
        }
    }

    /// Adds a transform at the current end, retiring that end's accumulator.
    pub fn concatenate(&mut self, transform: Arc<dyn Transform>) {
        if self.pre_multiply {
            self.pre_accumulator = None;
            self.pre_count += 1;
        } else {
            self.post_accumulator = None;
        }
        let pair = TransformPair::new(transform, self.inverted);
        if self.pre_multiply != self.inverted {
            self.pairs.push_front(pair);
        } else {
            self.pairs.push_back(pair);
        }
    }

    /// Folds a matrix into the current end's accumulator.
    pub fn concatenate_matrix(&mut self, matrix: Matrix4) {
        let existing = if self.pre_multiply {
            self.pre_accumulator.clone()
        } else {
            self.post_accumulator.clone()
        };
        let Some(accumulator) = existing else {
            let accumulator = MatrixTransform::from_matrix(matrix);
            self.concatenate(accumulator.clone());
            if self.pre_multiply {
                self.pre_accumulator = Some(accumulator);
            } else {
                self.post_accumulator = Some(accumulator);
            }
            return;
        };
        let pre_multiply = self.pre_multiply;
        accumulator.edit(|kind| {
            kind.matrix = if pre_multiply {
                kind.matrix * matrix
            } else {
                matrix * kind.matrix
            };
        });
    }

    /// Folds 16 row-major elements into the current end's accumulator.
    pub fn concatenate_elements(&mut self, elements: [f64; 16]) {
        self.concatenate_matrix(Matrix4::from_row_major(elements));
    }

    /// Folds a 2-D affine map (acting on x and y) into the current end's
    /// accumulator.
    pub fn concatenate_affine(&mut self, affine: Affine) {
        self.concatenate_matrix(Matrix4::from(affine));
    }

    /// Concatenates a translation. A zero translation is ignored.
    pub fn translate(&mut self, x: f64, y: f64, z: f64) {
        if x == 0.0 && y == 0.0 && z == 0.0 {
            return;
        }
        self.concatenate_matrix(Matrix4::from_translation(x, y, z));
    }

    /// Concatenates a rotation of `degrees` about the axis `(x, y, z)`.
    ///
    /// A zero angle or zero axis concatenates the identity.
    pub fn rotate(&mut self, degrees: f64, x: f64, y: f64, z: f64) {
        self.concatenate_matrix(Matrix4::from_rotation(degrees, x, y, z));
    }

    /// Concatenates a scale. A unit scale is ignored.
    pub fn scale(&mut self, x: f64, y: f64, z: f64) {
        if x == 1.0 && y == 1.0 && z == 1.0 {
            return;
        }
        self.concatenate_matrix(Matrix4::from_scale(x, y, z));
    }

    /// Replaces the sequence by its inverse.
    pub fn invert(&mut self) {
        let pre = self.pre_position();
        let post = self.post_position();
        if let Some(accumulator) = &self.pre_accumulator {
            accumulator.edit(TransformKind::invert);
            self.pairs[pre].swap();
        }
        if let Some(accumulator) = &self.post_accumulator {
            accumulator.edit(TransformKind::invert);
            self.pairs[post].swap();
        }
        mem::swap(&mut self.pre_accumulator, &mut self.post_accumulator);
        self.pre_count = self.pairs.len() - self.pre_count;
        self.inverted = !self.inverted;
    }

    /// Removes every transform. The multiplication mode and inverted flag
    /// are kept.
    pub fn identity(&mut self) {
        self.pairs.clear();
        self.pre_count = 0;
        self.pre_accumulator = None;
        self.post_accumulator = None;
    }

    /// Returns the transform at logical `index`, or `None` past the end.
    ///
    /// Takes `&mut self` because a missing inverse is obtained and cached.
    pub fn transform(&mut self, index: usize) -> Option<Arc<dyn Transform>> {
        let len = self.pairs.len();
        if index >= len {
            return None;
        }
        Some(if self.inverted {
            self.pairs[len - 1 - index].resolve_inverse()
        } else {
            self.pairs[index].resolve_forward()
        })
    }

    /// Number of transforms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there are no transforms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of transforms in the logical-front (pre-multiplied) section.
    #[must_use]
    pub fn number_of_pre_transforms(&self) -> usize {
        self.pre_count
    }

    /// Number of transforms in the logical-back (post-multiplied) section.
    #[must_use]
    pub fn number_of_post_transforms(&self) -> usize {
        self.pairs.len() - self.pre_count
    }

    /// Latest modification time among the stored transforms.
    #[must_use]
    pub fn max_modification_time(&self) -> ModifiedTime {
        self.pairs
            .iter()
            .map(|pair| pair.stored().modification_time())
            .max()
            .unwrap_or(ModifiedTime::ZERO)
    }

    /// Whether new transforms are added at the logical front.
    #[must_use]
    pub fn pre_multiply(&self) -> bool {
        self.pre_multiply
    }

    /// Sets whether new transforms are added at the logical front.
    pub fn set_pre_multiply(&mut self, pre_multiply: bool) {
        self.pre_multiply = pre_multiply;
    }

    /// Whether the sequence is currently read inverted.
    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// The accumulator at the logical front, if one is open.
    #[must_use]
    pub fn pre_accumulator(&self) -> Option<&Arc<MatrixTransform>> {
        self.pre_accumulator.as_ref()
    }

    /// The accumulator at the logical back, if one is open.
    #[must_use]
    pub fn post_accumulator(&self) -> Option<&Arc<MatrixTransform>> {
        self.post_accumulator.as_ref()
    }

    /// Stored pairs in physical order.
    pub fn pairs(&self) -> impl ExactSizeIterator<Item = &TransformPair> + '_ {
        self.pairs.iter()
    }

    /// Whether any stored transform is, or depends on, `target`.
    #[must_use]
    pub fn circuit_check(&self, target: NodeId) -> bool {
        self.pairs.iter().any(|pair| pair.circuit_check(target))
    }

    /// Makes this concatenation a copy of `other`.
    ///
    /// Stored transforms are shared; accumulators are copied into fresh
    /// nodes, reusing this concatenation's old accumulator nodes where
    /// nothing else refers to them.
    pub fn deep_copy(&mut self, other: &Self) {
        let mut spare: Vec<_> = [self.pre_accumulator.take(), self.post_accumulator.take()]
            .into_iter()
            .flatten()
            .collect();
        self.pairs.clear();
        spare.retain(|node| Arc::strong_count(node) == 1);

        let pre_at = other
            .pre_accumulator
            .as_ref()
            .map(|acc| (other.pre_position(), acc));
        let post_at = other
            .post_accumulator
            .as_ref()
            .map(|acc| (other.post_position(), acc));
        for (index, pair) in other.pairs.iter().enumerate() {
            let pair = match (pre_at, post_at) {
                (Some((at, source)), _) if at == index => {
                    let node = reuse_accumulator(&mut spare, source);
                    self.pre_accumulator = Some(Arc::clone(&node));
                    TransformPair::new(node, other.inverted)
                }
                (_, Some((at, source))) if at == index => {
                    let node = reuse_accumulator(&mut spare, source);
                    self.post_accumulator = Some(Arc::clone(&node));
                    TransformPair::new(node, other.inverted)
                }
                _ => pair.clone(),
            };
            self.pairs.push_back(pair);
        }

        self.pre_multiply = other.pre_multiply;
        self.inverted = other.inverted;
        self.pre_count = other.pre_count;
    }

    /// Physical index of the front accumulator's slot.
    fn pre_position(&self) -> usize {
        if self.inverted {
            self.pairs.len().saturating_sub(1)
        } else {
            0
        }
    }

    /// Physical index of the back accumulator's slot.
    fn post_position(&self) -> usize {
        if self.inverted {
            0
        } else {
            self.pairs.len().saturating_sub(1)
        }
    }
}

fn reuse_accumulator(
    spare: &mut Vec<Arc<MatrixTransform>>,
    source: &MatrixTransform,
) -> Arc<MatrixTransform> {
    let matrix = source.to_matrix();
    match spare.pop() {
        Some(node) => {
            if node.read(|kind| kind.matrix) != matrix {
                node.set_matrix(matrix);
            }
            node
        }
        None => MatrixTransform::from_matrix(matrix),
    }
}

impl Clone for Concatenation {
    fn clone(&self) -> Self {
        let mut copy = Self::with_pre_multiply(self.pre_multiply);
        copy.deep_copy(self);
        copy
    }

    fn clone_from(&mut self, source: &Self) {
        self.deep_copy(source);
    }
}
