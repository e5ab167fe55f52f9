// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transforms built from a concatenation of other transforms.

use core::mem;
use std::sync::Arc;

use kurbo::Affine;

use super::{NodeId, Transform, TransformKind, TransformNode};
use crate::concatenation::Concatenation;
use crate::error::{Operation, TransformError, TransformResult};
use crate::matrix::{MAT3_IDENTITY, Mat3, Matrix4, mat3_mul};
use crate::stack::ConcatenationStack;
use crate::time::ModifiedTime;

/// State of a [`ComposedTransform`].
///
/// Points pass through the concatenation's pre-transforms, then the input
/// (its inverse while the concatenation is inverted), then the
/// post-transforms. When every element exposes a matrix, the update folds
/// them into one.
#[derive(Debug, Default)]
pub struct ComposedKind {
    concatenation: Concatenation,
    stack: ConcatenationStack,
    input: Option<Arc<dyn Transform>>,
    /// Elements in application order, as of the last update.
    chain: Vec<Arc<dyn Transform>>,
    folded: Option<Matrix4>,
}

impl ComposedKind {
    /// The live concatenation.
    #[must_use]
    pub fn concatenation(&self) -> &Concatenation {
        &self.concatenation
    }

    /// Saved concatenations.
    #[must_use]
    pub fn stack(&self) -> &ConcatenationStack {
        &self.stack
    }

    /// The input transform, if set.
    #[must_use]
    pub fn input(&self) -> Option<&Arc<dyn Transform>> {
        self.input.as_ref()
    }
}

impl Clone for ComposedKind {
    /// Copies the definition; cached results are rebuilt by the next update.
    fn clone(&self) -> Self {
        Self {
            concatenation: self.concatenation.clone(),
            stack: self.stack.clone(),
            input: self.input.clone(),
            chain: Vec::new(),
            folded: None,
        }
    }
}

impl TransformKind for ComposedKind {
    const NAME: &'static str = "ComposedTransform";

    fn invert(&mut self) {
        self.concatenation.invert();
    }

    fn internal_update(&mut self) {
        let input = self.input.as_ref().map(|input| {
            if self.concatenation.is_inverted() {
                input.inverse()
            } else {
                Arc::clone(input)
            }
        });
        let pre = self.concatenation.number_of_pre_transforms();
        let mut chain: Vec<_> = (0..self.concatenation.len())
            .filter_map(|i| self.concatenation.transform(i))
            .collect();
        if let Some(input) = input {
            chain.insert(pre.min(chain.len()), input);
        }
        for transform in &chain {
            transform.update();
        }
        self.folded = chain
            .iter()
            .try_fold(Matrix4::IDENTITY, |acc, t| t.matrix().map(|m| m * acc));
        let stale = mem::replace(&mut self.chain, chain);
        drop(stale);
    }

    fn transform_point(&self, point: [f64; 3]) -> [f64; 3] {
        match &self.folded {
            Some(matrix) => matrix.transform_point(point),
            None => self
                .chain
                .iter()
                .fold(point, |p, t| t.internal_transform_point(p)),
        }
    }

    fn transform_derivative(&self, point: [f64; 3]) -> ([f64; 3], Mat3) {
        match &self.folded {
            Some(matrix) => (matrix.transform_point(point), matrix.linear_part()),
            None => self
                .chain
                .iter()
                .fold((point, MAT3_IDENTITY), |(p, d), t| {
                    let (p, dt) = t.internal_transform_derivative(p);
                    (p, mat3_mul(&dt, &d))
                }),
        }
    }

    fn matrix(&self) -> Option<Matrix4> {
        self.folded
    }

    fn dependency_time(&self) -> ModifiedTime {
        let input = self
            .input
            .as_ref()
            .map_or(ModifiedTime::ZERO, |input| input.modification_time());
        self.concatenation.max_modification_time().max(input)
    }

    fn circuit_check(&self, target: NodeId) -> bool {
        self.concatenation.circuit_check(target)
            || self
                .input
                .as_ref()
                .is_some_and(|input| input.circuit_check(target))
    }
}

/// A transform node composed of other transforms.
///
/// ```
/// use stratum_core::{ComposedTransform, Transform};
///
/// let t = ComposedTransform::new();
/// t.translate(1.0, 2.0, 3.0);
/// t.scale(2.0, 2.0, 2.0);
/// // Pre-multiply: the scale is applied first.
/// assert_eq!(t.transform_point([1.0, 1.0, 1.0]), [3.0, 4.0, 5.0]);
/// ```
pub type ComposedTransform = TransformNode<ComposedKind>;

impl TransformNode<ComposedKind> {
    /// Creates an empty composed transform with the given multiplication
    /// mode.
    #[must_use]
    pub fn with_pre_multiply(pre_multiply: bool) -> Arc<Self> {
        Self::with_state(ComposedKind {
            concatenation: Concatenation::with_pre_multiply(pre_multiply),
            ..ComposedKind::default()
        })
    }

    /// Concatenates a translation.
    pub fn translate(&self, x: f64, y: f64, z: f64) {
        self.edit(|kind| kind.concatenation.translate(x, y, z));
    }

    /// Concatenates a rotation of `degrees` about the axis `(x, y, z)`.
    pub fn rotate(&self, degrees: f64, x: f64, y: f64, z: f64) {
        self.edit(|kind| kind.concatenation.rotate(degrees, x, y, z));
    }

    /// Concatenates a scale.
    pub fn scale(&self, x: f64, y: f64, z: f64) {
        self.edit(|kind| kind.concatenation.scale(x, y, z));
    }

    /// Concatenates a matrix.
    pub fn concatenate_matrix(&self, matrix: Matrix4) {
        self.edit(|kind| kind.concatenation.concatenate_matrix(matrix));
    }

    /// Concatenates 16 row-major matrix elements.
    pub fn concatenate_elements(&self, elements: [f64; 16]) {
        self.edit(|kind| kind.concatenation.concatenate_elements(elements));
    }

    /// Concatenates a 2-D affine map acting on x and y.
    pub fn concatenate_affine(&self, affine: Affine) {
        self.edit(|kind| kind.concatenation.concatenate_affine(affine));
    }

    /// Concatenates another transform.
    ///
    /// Fails with `CircularReference` if `transform` is, or depends on, this
    /// node.
    pub fn concatenate(&self, transform: Arc<dyn Transform>) -> TransformResult {
        if transform.circuit_check(self.id()) {
            return Err(self.reject(TransformError::CircularReference {
                operation: Operation::Concatenate,
            }));
        }
        self.edit(|kind| kind.concatenation.concatenate(transform));
        Ok(())
    }

    /// Sets or clears the input transform.
    ///
    /// Fails with `CircularReference` if `input` is, or depends on, this
    /// node.
    pub fn set_input(&self, input: Option<Arc<dyn Transform>>) -> TransformResult {
        let current = self.read(|kind| kind.input.as_ref().map(|i| i.id()));
        if current == input.as_ref().map(|i| i.id()) {
            return Ok(());
        }
        if let Some(input) = &input
            && input.circuit_check(self.id())
        {
            return Err(self.reject(TransformError::CircularReference {
                operation: Operation::SetInput,
            }));
        }
        let previous = self.edit(|kind| mem::replace(&mut kind.input, input));
        drop(previous);
        Ok(())
    }

    /// The input transform, if set.
    #[must_use]
    pub fn input(&self) -> Option<Arc<dyn Transform>> {
        self.read(|kind| kind.input.clone())
    }

    /// Adds later transforms at the logical front.
    pub fn pre_multiply(&self) {
        self.set_pre_multiply(true);
    }

    /// Adds later transforms at the logical back.
    pub fn post_multiply(&self) {
        self.set_pre_multiply(false);
    }

    fn set_pre_multiply(&self, pre_multiply: bool) {
        if self.is_pre_multiply() == pre_multiply {
            return;
        }
        self.edit(|kind| kind.concatenation.set_pre_multiply(pre_multiply));
    }

    /// Whether later transforms are added at the logical front.
    #[must_use]
    pub fn is_pre_multiply(&self) -> bool {
        self.read(|kind| kind.concatenation.pre_multiply())
    }

    /// Removes every concatenated transform. The input, the stack and the
    /// multiplication mode are kept.
    pub fn identity(&self) {
        self.edit(|kind| kind.concatenation.identity());
    }

    /// Inverts the whole composition in place.
    pub fn invert(&self) {
        self.edit(TransformKind::invert);
    }

    /// Saves a copy of the concatenation.
    pub fn push(&self) {
        self.edit(|kind| kind.stack.push(&kind.concatenation));
    }

    /// Restores the most recently saved concatenation.
    ///
    /// Returns `false`, changing nothing, if nothing is saved.
    pub fn pop(&self) -> bool {
        if self.read(|kind| kind.stack.is_empty()) {
            return false;
        }
        self.edit(|kind| {
            let ComposedKind {
                stack,
                concatenation,
                ..
            } = kind;
            stack.pop(concatenation)
        })
    }

    /// Number of saved concatenations.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.read(|kind| kind.stack.depth())
    }

    /// Number of concatenated transforms, counting the input.
    #[must_use]
    pub fn number_of_concatenated_transforms(&self) -> usize {
        self.read(|kind| kind.concatenation.len() + usize::from(kind.input.is_some()))
    }

    /// The concatenated transform at `index` in application order, with the
    /// input in its place between the pre- and post-transforms.
    pub fn concatenated_transform(&self, index: usize) -> Option<Arc<dyn Transform>> {
        self.touch(|kind| {
            let pre = kind.concatenation.number_of_pre_transforms();
            let Some(input) = &kind.input else {
                return kind.concatenation.transform(index);
            };
            match index.cmp(&pre) {
                core::cmp::Ordering::Less => kind.concatenation.transform(index),
                core::cmp::Ordering::Greater => kind.concatenation.transform(index - 1),
                core::cmp::Ordering::Equal if kind.concatenation.is_inverted() => {
                    Some(input.inverse())
                }
                core::cmp::Ordering::Equal => Some(Arc::clone(input)),
            }
        })
    }

    /// Calls `f` with the live concatenation.
    pub fn with_concatenation<R>(&self, f: impl FnOnce(&Concatenation) -> R) -> R {
        self.read(|kind| f(&kind.concatenation))
    }
}
