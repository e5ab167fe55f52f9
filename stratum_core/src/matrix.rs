// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Column-major 4×4 homogeneous matrix.
//!
//! This type covers what the transform engine needs (identity, multiply,
//! inversion, point/vector/normal mapping, and the translate/scale/rotate
//! constructors used by [`Concatenation`](crate::Concatenation)) without
//! pulling in a full linear-algebra crate.
//!
//! Raw matrices cross the public API in the conventional row-major
//! `[f64; 16]` form via [`Matrix4::from_row_major`]; storage is column-major.

use core::ops::Mul;

use kurbo::Affine;

/// A row-major 3×3 matrix, used for transform derivatives.
///
/// `m[i][j]` is the partial derivative of output coordinate `i` with respect
/// to input coordinate `j`.
pub type Mat3 = [[f64; 3]; 3];

/// The 3×3 identity.
pub const MAT3_IDENTITY: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// A column-major 4×4 homogeneous matrix stored as `[[f64; 4]; 4]`.
///
/// Each inner array is one *column* of the matrix. Points are treated as
/// column vectors, so `a * b` maps a point through `b` first, then `a`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix4 {
    /// Four columns, each a 4-element array `[x, y, z, w]`.
    pub cols: [[f64; 4]; 4],
}

impl Matrix4 {
    /// The 4×4 identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Creates a matrix from four column arrays.
    #[inline]
    #[must_use]
    pub const fn from_cols(col0: [f64; 4], col1: [f64; 4], col2: [f64; 4], col3: [f64; 4]) -> Self {
        Self {
            cols: [col0, col1, col2, col3],
        }
    }

    /// Creates a matrix from a column-major 2-D array.
    #[inline]
    #[must_use]
    pub const fn from_cols_array_2d(cols: [[f64; 4]; 4]) -> Self {
        Self { cols }
    }

    /// Returns the columns as a 2-D array.
    #[inline]
    #[must_use]
    pub const fn to_cols_array_2d(self) -> [[f64; 4]; 4] {
        self.cols
    }

    /// Creates a matrix from sixteen elements in row-major order
    /// (`elements[4 * row + col]`).
    #[must_use]
    pub const fn from_row_major(elements: [f64; 16]) -> Self {
        let e = elements;
        Self {
            cols: [
                [e[0], e[4], e[8], e[12]],
                [e[1], e[5], e[9], e[13]],
                [e[2], e[6], e[10], e[14]],
                [e[3], e[7], e[11], e[15]],
            ],
        }
    }

    /// Returns the sixteen elements in row-major order.
    #[must_use]
    pub const fn to_row_major(self) -> [f64; 16] {
        let c = &self.cols;
        [
            c[0][0], c[1][0], c[2][0], c[3][0], //
            c[0][1], c[1][1], c[2][1], c[3][1], //
            c[0][2], c[1][2], c[2][2], c[3][2], //
            c[0][3], c[1][3], c[2][3], c[3][3],
        ]
    }

    /// Returns column `i` (0-based).
    ///
    /// # Panics
    ///
    /// Panics if `i >= 4`.
    #[inline]
    #[must_use]
    pub const fn col(self, i: usize) -> [f64; 4] {
        self.cols[i]
    }

    /// Returns the element at `row`, `col`.
    ///
    /// # Panics
    ///
    /// Panics if either index is `>= 4`.
    #[inline]
    #[must_use]
    pub const fn get(self, row: usize, col: usize) -> f64 {
        self.cols[col][row]
    }

    /// Creates a pure translation.
    #[inline]
    #[must_use]
    pub const fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    /// Creates a non-uniform scale.
    #[inline]
    #[must_use]
    pub const fn from_scale(sx: f64, sy: f64, sz: f64) -> Self {
        Self {
            cols: [
                [sx, 0.0, 0.0, 0.0],
                [0.0, sy, 0.0, 0.0],
                [0.0, 0.0, sz, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a right-handed rotation of `degrees` around the axis
    /// `(x, y, z)`.
    ///
    /// The axis does not need to be normalized. A zero angle or a zero axis
    /// yields the identity.
    #[must_use]
    pub fn from_rotation(degrees: f64, x: f64, y: f64, z: f64) -> Self {
        let norm = (x * x + y * y + z * z).sqrt();
        if degrees == 0.0 || norm == 0.0 {
            return Self::IDENTITY;
        }

        // Half-angle quaternion.
        let (f, w) = (degrees.to_radians() * 0.5).sin_cos();
        let (x, y, z) = (x / norm * f, y / norm * f, z / norm * f);

        let (ww, xx, yy, zz) = (w * w, x * x, y * y, z * z);
        let (xy, xz, yz) = (x * y, x * z, y * z);
        let (wx, wy, wz) = (w * x, w * y, w * z);

        Self {
            cols: [
                [ww + xx - yy - zz, 2.0 * (xy + wz), 2.0 * (xz - wy), 0.0],
                [2.0 * (xy - wz), ww - xx + yy - zz, 2.0 * (yz + wx), 0.0],
                [2.0 * (xz + wy), 2.0 * (yz - wx), ww - xx - yy + zz, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Returns the transpose.
    #[must_use]
    pub const fn transpose(self) -> Self {
        let c = &self.cols;
        Self {
            cols: [
                [c[0][0], c[1][0], c[2][0], c[3][0]],
                [c[0][1], c[1][1], c[2][1], c[3][1]],
                [c[0][2], c[1][2], c[2][2], c[3][2]],
                [c[0][3], c[1][3], c[2][3], c[3][3]],
            ],
        }
    }

    /// Returns the determinant.
    #[must_use]
    pub fn determinant(&self) -> f64 {
        adjugate(&self.flat()).1
    }

    /// Returns the inverse, or `None` if the matrix is singular.
    #[must_use]
    pub fn try_inverse(&self) -> Option<Self> {
        let (adj, det) = adjugate(&self.flat());
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        let mut cols = [[0.0_f64; 4]; 4];
        for (i, v) in adj.iter().enumerate() {
            cols[i / 4][i % 4] = v * inv_det;
        }
        Some(Self { cols })
    }

    /// Inverts this matrix in place.
    ///
    /// A singular matrix is left unchanged and a warning is logged.
    pub fn invert_in_place(&mut self) {
        match self.try_inverse() {
            Some(inv) => *self = inv,
            None => log::warn!("Matrix4::invert_in_place: matrix is singular, left unchanged"),
        }
    }

    /// Maps a point, applying the homogeneous divide.
    #[must_use]
    pub fn transform_point(&self, p: [f64; 3]) -> [f64; 3] {
        let c = &self.cols;
        let mut out = [0.0_f64; 4];
        for (r, o) in out.iter_mut().enumerate() {
            *o = c[0][r] * p[0] + c[1][r] * p[1] + c[2][r] * p[2] + c[3][r];
        }
        let w = out[3];
        if w != 1.0 && w != 0.0 {
            [out[0] / w, out[1] / w, out[2] / w]
        } else {
            [out[0], out[1], out[2]]
        }
    }

    /// Maps a direction vector through the linear part (no translation).
    #[must_use]
    pub fn transform_vector(&self, v: [f64; 3]) -> [f64; 3] {
        mat3_mul_vec(&self.linear_part(), v)
    }

    /// Maps a surface normal through the inverse transpose of the linear
    /// part and renormalizes it.
    ///
    /// Returns the normalized input if the linear part is singular.
    #[must_use]
    pub fn transform_normal(&self, n: [f64; 3]) -> [f64; 3] {
        transform_normal_by(&self.linear_part(), n)
    }

    /// Returns the upper-left 3×3 block, the derivative of an affine map.
    #[must_use]
    pub const fn linear_part(&self) -> Mat3 {
        let c = &self.cols;
        [
            [c[0][0], c[1][0], c[2][0]],
            [c[0][1], c[1][1], c[2][1]],
            [c[0][2], c[1][2], c[2][2]],
        ]
    }

    /// Projects onto the XY plane as a 2-D affine transform.
    ///
    /// Z terms and any perspective row are discarded.
    #[must_use]
    pub fn to_affine_2d(&self) -> Affine {
        let c = &self.cols;
        Affine::new([c[0][0], c[0][1], c[1][0], c[1][1], c[3][0], c[3][1]])
    }

    /// Is this matrix [finite]?
    ///
    /// [finite]: f64::is_finite
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.cols.iter().flatten().all(|v| v.is_finite())
    }

    /// Is any element [NaN]?
    ///
    /// [NaN]: f64::is_nan
    #[inline]
    #[must_use]
    pub fn is_nan(&self) -> bool {
        self.cols.iter().flatten().any(|v| v.is_nan())
    }

    fn flat(&self) -> [f64; 16] {
        let mut m = [0.0_f64; 16];
        for (i, v) in self.cols.iter().flatten().enumerate() {
            m[i] = *v;
        }
        m
    }
}

impl Default for Matrix4 {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Affine> for Matrix4 {
    fn from(affine: Affine) -> Self {
        let [a, b, c, d, e, f] = affine.as_coeffs();
        Self {
            cols: [
                [a, b, 0.0, 0.0],
                [c, d, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [e, f, 0.0, 1.0],
            ],
        }
    }
}

impl Mul for Matrix4 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let a = &self.cols;
        let b = &rhs.cols;
        let mut out = [[0.0_f64; 4]; 4];
        let mut j = 0;
        while j < 4 {
            let mut i = 0;
            while i < 4 {
                out[j][i] =
                    a[0][i] * b[j][0] + a[1][i] * b[j][1] + a[2][i] * b[j][2] + a[3][i] * b[j][3];
                i += 1;
            }
            j += 1;
        }
        Self { cols: out }
    }
}

/// Adjugate (transposed cofactors) and determinant of a flat 4×4.
///
/// Layout-agnostic: the result has the same layout as the input.
fn adjugate(m: &[f64; 16]) -> ([f64; 16], f64) {
    let mut inv = [0.0_f64; 16];
    inv[0] = m[5] * m[10] * m[15] - m[5] * m[11] * m[14] - m[9] * m[6] * m[15]
        + m[9] * m[7] * m[14]
        + m[13] * m[6] * m[11]
        - m[13] * m[7] * m[10];
    inv[4] = -m[4] * m[10] * m[15] + m[4] * m[11] * m[14] + m[8] * m[6] * m[15]
        - m[8] * m[7] * m[14]
        - m[12] * m[6] * m[11]
        + m[12] * m[7] * m[10];
    inv[8] = m[4] * m[9] * m[15] - m[4] * m[11] * m[13] - m[8] * m[5] * m[15]
        + m[8] * m[7] * m[13]
        + m[12] * m[5] * m[11]
        - m[12] * m[7] * m[9];
    inv[12] = -m[4] * m[9] * m[14] + m[4] * m[10] * m[13] + m[8] * m[5] * m[14]
        - m[8] * m[6] * m[13]
        - m[12] * m[5] * m[10]
        + m[12] * m[6] * m[9];
    inv[1] = -m[1] * m[10] * m[15] + m[1] * m[11] * m[14] + m[9] * m[2] * m[15]
        - m[9] * m[3] * m[14]
        - m[13] * m[2] * m[11]
        + m[13] * m[3] * m[10];
    inv[5] = m[0] * m[10] * m[15] - m[0] * m[11] * m[14] - m[8] * m[2] * m[15]
        + m[8] * m[3] * m[14]
        + m[12] * m[2] * m[11]
        - m[12] * m[3] * m[10];
    inv[9] = -m[0] * m[9] * m[15] + m[0] * m[11] * m[13] + m[8] * m[1] * m[15]
        - m[8] * m[3] * m[13]
        - m[12] * m[1] * m[11]
        + m[12] * m[3] * m[9];
    inv[13] = m[0] * m[9] * m[14] - m[0] * m[10] * m[13] - m[8] * m[1] * m[14]
        + m[8] * m[2] * m[13]
        + m[12] * m[1] * m[10]
        - m[12] * m[2] * m[9];
    inv[2] = m[1] * m[6] * m[15] - m[1] * m[7] * m[14] - m[5] * m[2] * m[15]
        + m[5] * m[3] * m[14]
        + m[13] * m[2] * m[7]
        - m[13] * m[3] * m[6];
    inv[6] = -m[0] * m[6] * m[15] + m[0] * m[7] * m[14] + m[4] * m[2] * m[15]
        - m[4] * m[3] * m[14]
        - m[12] * m[2] * m[7]
        + m[12] * m[3] * m[6];
    inv[10] = m[0] * m[5] * m[15] - m[0] * m[7] * m[13] - m[4] * m[1] * m[15]
        + m[4] * m[3] * m[13]
        + m[12] * m[1] * m[7]
        - m[12] * m[3] * m[5];
    inv[14] = -m[0] * m[5] * m[14] + m[0] * m[6] * m[13] + m[4] * m[1] * m[14]
        - m[4] * m[2] * m[13]
        - m[12] * m[1] * m[6]
        + m[12] * m[2] * m[5];
    inv[3] = -m[1] * m[6] * m[11] + m[1] * m[7] * m[10] + m[5] * m[2] * m[11]
        - m[5] * m[3] * m[10]
        - m[9] * m[2] * m[7]
        + m[9] * m[3] * m[6];
    inv[7] = m[0] * m[6] * m[11] - m[0] * m[7] * m[10] - m[4] * m[2] * m[11]
        + m[4] * m[3] * m[10]
        + m[8] * m[2] * m[7]
        - m[8] * m[3] * m[6];
    inv[11] = -m[0] * m[5] * m[11] + m[0] * m[7] * m[9] + m[4] * m[1] * m[11]
        - m[4] * m[3] * m[9]
        - m[8] * m[1] * m[7]
        + m[8] * m[3] * m[5];
    inv[15] = m[0] * m[5] * m[10] - m[0] * m[6] * m[9] - m[4] * m[1] * m[10]
        + m[4] * m[2] * m[9]
        + m[8] * m[1] * m[6]
        - m[8] * m[2] * m[5];

    let det = m[0] * inv[0] + m[1] * inv[4] + m[2] * inv[8] + m[3] * inv[12];
    (inv, det)
}

// ---------------------------------------------------------------------------
// 3×3 helpers
// ---------------------------------------------------------------------------

/// Multiplies a 3×3 matrix by a column vector.
#[must_use]
pub fn mat3_mul_vec(m: &Mat3, v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Returns `a * b`.
#[must_use]
pub fn mat3_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0_f64; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    out
}

/// Returns the transpose.
#[must_use]
pub fn mat3_transpose(m: &Mat3) -> Mat3 {
    [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ]
}

/// Solves `m * x = b` by Cramer's rule; `None` when `m` is singular.
#[must_use]
pub fn mat3_solve(m: &Mat3, b: [f64; 3]) -> Option<[f64; 3]> {
    let det3 = |a: &Mat3| {
        a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
            - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
            + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
    };
    let det = det3(m);
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let mut x = [0.0_f64; 3];
    for (k, xk) in x.iter_mut().enumerate() {
        let mut mk = *m;
        for (row, bv) in mk.iter_mut().zip(b) {
            row[k] = bv;
        }
        *xk = det3(&mk) / det;
    }
    Some(x)
}

/// Returns `v` scaled to unit length, or `v` unchanged if it is zero.
#[must_use]
pub fn normalize(v: [f64; 3]) -> [f64; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len == 0.0 {
        v
    } else {
        [v[0] / len, v[1] / len, v[2] / len]
    }
}

/// Maps a normal through the inverse transpose of a derivative `d`.
pub(crate) fn transform_normal_by(d: &Mat3, n: [f64; 3]) -> [f64; 3] {
    normalize(mat3_solve(&mat3_transpose(d), n).unwrap_or(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_point_eq(a: [f64; 3], b: [f64; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < EPS, "{a:?} != {b:?}");
        }
    }

    fn assert_matrix_eq(a: &Matrix4, b: &Matrix4) {
        for (x, y) in a.cols.iter().flatten().zip(b.cols.iter().flatten()) {
            assert!((x - y).abs() < EPS, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn default_is_identity() {
        assert_eq!(Matrix4::default(), Matrix4::IDENTITY);
    }

    #[test]
    fn identity_multiply() {
        let t = Matrix4::from_translation(1.0, 2.0, 3.0);
        assert_eq!(Matrix4::IDENTITY * t, t);
        assert_eq!(t * Matrix4::IDENTITY, t);
    }

    #[test]
    fn translation_composition() {
        let a = Matrix4::from_translation(1.0, 0.0, 0.0);
        let b = Matrix4::from_translation(0.0, 2.0, 0.0);
        assert_eq!((a * b).col(3), [1.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn scale_then_translate() {
        let s = Matrix4::from_scale(2.0, 2.0, 2.0);
        let t = Matrix4::from_translation(3.0, 4.0, 0.0);
        // Scale first, then translate: T * S.
        let combined = t * s;
        assert_eq!(combined.col(0), [2.0, 0.0, 0.0, 0.0]);
        assert_eq!(combined.col(3), [3.0, 4.0, 0.0, 1.0]);
        assert_point_eq(combined.transform_point([1.0, 1.0, 1.0]), [5.0, 6.0, 2.0]);
    }

    #[test]
    fn row_major_layout() {
        let m = Matrix4::from_row_major([
            1.0, 0.0, 0.0, 7.0, //
            0.0, 1.0, 0.0, 8.0, //
            0.0, 0.0, 1.0, 9.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        assert_eq!(m, Matrix4::from_translation(7.0, 8.0, 9.0));
        assert_eq!(Matrix4::from_row_major(m.to_row_major()), m);
        assert_eq!(m.get(0, 3), 7.0);
    }

    #[test]
    fn rotation_about_z() {
        let r = Matrix4::from_rotation(90.0, 0.0, 0.0, 1.0);
        assert_point_eq(r.transform_point([1.0, 0.0, 0.0]), [0.0, 1.0, 0.0]);
        assert_point_eq(r.transform_point([0.0, 1.0, 0.0]), [-1.0, 0.0, 0.0]);
    }

    #[test]
    fn rotation_axis_is_normalized() {
        let a = Matrix4::from_rotation(30.0, 0.0, 5.0, 0.0);
        let b = Matrix4::from_rotation(30.0, 0.0, 1.0, 0.0);
        assert_matrix_eq(&a, &b);
    }

    #[test]
    fn degenerate_rotation_is_identity() {
        assert_eq!(Matrix4::from_rotation(45.0, 0.0, 0.0, 0.0), Matrix4::IDENTITY);
        assert_eq!(Matrix4::from_rotation(0.0, 1.0, 0.0, 0.0), Matrix4::IDENTITY);
    }

    #[test]
    fn inverse_round_trip() {
        let m = Matrix4::from_translation(1.0, -2.0, 3.0)
            * Matrix4::from_rotation(33.0, 1.0, 1.0, 0.0)
            * Matrix4::from_scale(2.0, 3.0, 0.5);
        let inv = m.try_inverse().expect("matrix is invertible");
        assert_matrix_eq(&(m * inv), &Matrix4::IDENTITY);
        assert_matrix_eq(&(inv * m), &Matrix4::IDENTITY);
        assert!((m.determinant() - 3.0).abs() < EPS);
    }

    #[test]
    fn singular_inverse_left_unchanged() {
        let mut m = Matrix4::from_scale(1.0, 0.0, 1.0);
        assert!(m.try_inverse().is_none());
        m.invert_in_place();
        assert_eq!(m, Matrix4::from_scale(1.0, 0.0, 1.0));
    }

    #[test]
    fn vectors_ignore_translation() {
        let m = Matrix4::from_translation(5.0, 5.0, 5.0) * Matrix4::from_scale(2.0, 1.0, 1.0);
        assert_point_eq(m.transform_vector([1.0, 1.0, 0.0]), [2.0, 1.0, 0.0]);
    }

    #[test]
    fn normals_use_inverse_transpose() {
        // Squashing y keeps the plane normal of x = y tilted towards y.
        let m = Matrix4::from_scale(1.0, 0.5, 1.0);
        let n = m.transform_normal([1.0, -1.0, 0.0]);
        let expected = normalize([1.0, -2.0, 0.0]);
        assert_point_eq(n, expected);
    }

    #[test]
    fn affine_round_trip() {
        let affine = Affine::translate((3.0, 4.0)) * Affine::scale(2.0);
        let m = Matrix4::from(affine);
        assert_point_eq(m.transform_point([1.0, 1.0, 7.0]), [5.0, 6.0, 7.0]);
        assert_eq!(m.to_affine_2d(), affine);
    }

    #[test]
    fn nan_detected() {
        let mut t = Matrix4::IDENTITY;
        t.cols[2][1] = f64::NAN;
        assert!(!t.is_finite());
        assert!(t.is_nan());
    }

    #[test]
    fn infinity_detected() {
        let mut t = Matrix4::IDENTITY;
        t.cols[0][3] = f64::INFINITY;
        assert!(!t.is_finite());
        assert!(!t.is_nan());
    }
}
