// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Batch mapping of point sets.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Points, normals and vectors produced by
/// [`Transform::transform_points_normals_vectors`](crate::Transform::transform_points_normals_vectors).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MappedGeometry {
    /// Mapped points, in input order.
    pub points: Vec<[f64; 3]>,
    /// Mapped unit normals, if normals were supplied.
    pub normals: Option<Vec<[f64; 3]>>,
    /// Mapped vectors, if vectors were supplied.
    pub vectors: Option<Vec<[f64; 3]>>,
}

type Mapped = ([f64; 3], Option<[f64; 3]>, Option<[f64; 3]>);

impl MappedGeometry {
    pub(super) fn collect(mapped: Vec<Mapped>, normals: bool, vectors: bool) -> Self {
        let len = mapped.len();
        let mut out = Self {
            points: Vec::with_capacity(len),
            normals: normals.then(|| Vec::with_capacity(len)),
            vectors: vectors.then(|| Vec::with_capacity(len)),
        };
        for (point, normal, vector) in mapped {
            out.points.push(point);
            if let (Some(dst), Some(n)) = (out.normals.as_mut(), normal) {
                dst.push(n);
            }
            if let (Some(dst), Some(v)) = (out.vectors.as_mut(), vector) {
                dst.push(v);
            }
        }
        out
    }
}

/// Maps `0..len` through `f`, on the rayon pool when `parallel` is enabled.
pub(super) fn map_range<T, F>(len: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        (0..len).into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..len).map(f).collect()
    }
}
