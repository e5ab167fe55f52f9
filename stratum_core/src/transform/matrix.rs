// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transforms defined by a single homogeneous matrix.

use std::sync::Arc;

use super::{Transform, TransformKind, TransformNode};
use crate::matrix::{Mat3, Matrix4};

/// State of a [`MatrixTransform`]: one 4×4 homogeneous matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MatrixKind {
    /// The matrix applied to points.
    pub matrix: Matrix4,
}

impl TransformKind for MatrixKind {
    const NAME: &'static str = "MatrixTransform";

    fn invert(&mut self) {
        self.matrix.invert_in_place();
    }

    fn transform_point(&self, point: [f64; 3]) -> [f64; 3] {
        self.matrix.transform_point(point)
    }

    /// The derivative is the linear part; perspective terms are ignored.
    fn transform_derivative(&self, point: [f64; 3]) -> ([f64; 3], Mat3) {
        (self.matrix.transform_point(point), self.matrix.linear_part())
    }

    fn matrix(&self) -> Option<Matrix4> {
        Some(self.matrix)
    }
}

/// A transform node holding a single matrix.
pub type MatrixTransform = TransformNode<MatrixKind>;

impl TransformNode<MatrixKind> {
    /// Creates a node holding `matrix`.
    #[must_use]
    pub fn from_matrix(matrix: Matrix4) -> Arc<Self> {
        Self::with_state(MatrixKind { matrix })
    }

    /// Replaces the matrix.
    pub fn set_matrix(&self, matrix: Matrix4) {
        self.edit(|kind| kind.matrix = matrix);
    }

    /// Replaces the matrix with 16 row-major elements.
    pub fn set_elements(&self, elements: [f64; 16]) {
        self.set_matrix(Matrix4::from_row_major(elements));
    }

    /// Updates, then returns the matrix.
    #[must_use]
    pub fn to_matrix(&self) -> Matrix4 {
        self.update();
        self.read(|kind| kind.matrix)
    }
}
