// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lazily evaluated, invertible composition of 3D transforms.
//!
//! `stratum_core` builds chains of coordinate transforms (translations,
//! rotations, scales, arbitrary user kinds) that recompute only when
//! something they depend on changed, hand out a correct inverse of any
//! transform on demand, and can be saved and restored like a graphics matrix
//! stack. Transform nodes are shared between threads behind [`Arc`]s.
//!
//! # Architecture
//!
//! ```text
//!   translate / rotate / scale / concatenate
//!       │
//!       ▼
//!   Concatenation ──(push/pop)──► ConcatenationStack
//!       │   accumulators absorb raw matrices
//!       ▼
//!   ComposedTransform ──► update() ──► folded matrix or element chain
//!       │                     ▲
//!       │ inverse()           │ modification times
//!       ▼                     │
//!   derived inverse ──────────┘ copies, inverts, re-derives on demand
//! ```
//!
//! **[`transform`]**: The [`Transform`] node protocol: update, modification
//! times, lazy inverses, explicit inverse links, and teardown. Kinds plug in
//! through [`TransformKind`]; [`MatrixTransform`] and [`ComposedTransform`]
//! are provided.
//!
//! **[`concatenation`]**: [`Concatenation`], ordered transform lists with
//! pre/post multiplication, matrix accumulators, and O(1) inversion.
//!
//! **[`stack`]**: [`ConcatenationStack`] for save/restore.
//!
//! **[`matrix`]**: [`Matrix4`], the 4×4 homogeneous matrix used throughout.
//!
//! **[`time`]**: The process-wide modification clock.
//!
//! **[`error`]**: [`TransformError`], returned by rejected links and copies.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! observing updates and inverse management.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables trace event emission.
//! - `parallel` (disabled by default): Maps point batches on the rayon pool.
//!
//! [`Arc`]: std::sync::Arc

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod concatenation;
pub mod error;
pub mod matrix;
pub mod stack;
pub mod time;
pub mod trace;
pub mod transform;

pub use concatenation::{Concatenation, TransformPair};
pub use error::{Operation, TransformError, TransformResult};
pub use matrix::Matrix4;
pub use stack::ConcatenationStack;
pub use time::ModifiedTime;
pub use transform::{
    ComposedKind, ComposedTransform, MappedGeometry, MatrixKind, MatrixTransform, NodeId,
    Transform, TransformKind, TransformNode,
};
