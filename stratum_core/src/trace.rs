// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing hooks for the transform update protocol.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! transform nodes call at each interesting point: updates, lazy inverse
//! creation, explicit inverse links, teardown of a creator/inverse pair, and
//! rejected operations. All method bodies default to no-ops, so implementing
//! only the events you care about is fine.
//!
//! Transform nodes are shared between threads, so the sink is process-wide:
//! [`install`] replaces it and [`uninstall`] removes it. When the `trace`
//! feature is **off**, every emit point compiles to nothing (zero overhead)
//! and installing a sink has no effect. When **on**, each emit point takes a
//! read lock and performs a single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace`: enables event emission.

use std::sync::Arc;

use crate::error::TransformError;
use crate::time::ModifiedTime;
use crate::transform::NodeId;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which branch of [`Transform::update`](crate::Transform::update) ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdatePath {
    /// The node copied its inverse's state, inverted it, and ran the kind's
    /// update hook.
    FromInverse,
    /// The node ran the kind's update hook on its own state.
    Internal,
    /// Nothing was stale.
    UpToDate,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted at the end of every update.
#[derive(Clone, Copy, Debug)]
pub struct UpdateEvent {
    /// The node that was updated.
    pub node: NodeId,
    /// Kind name of the node.
    pub kind: &'static str,
    /// Which branch ran.
    pub path: UpdatePath,
    /// The node's new last-updated time.
    pub time: ModifiedTime,
}

/// Emitted when a node lazily creates its inverse.
#[derive(Clone, Copy, Debug)]
pub struct InverseCreatedEvent {
    /// The creator, which owns the new node.
    pub node: NodeId,
    /// The new inverse.
    pub inverse: NodeId,
    /// Kind name shared by both nodes.
    pub kind: &'static str,
}

/// Emitted when an inverse is linked explicitly.
#[derive(Clone, Copy, Debug)]
pub struct InverseLinkedEvent {
    /// The node that now mirrors `inverse`.
    pub node: NodeId,
    /// The node being mirrored.
    pub inverse: NodeId,
}

/// Emitted when a creator is dropped while its lazily created inverse is
/// still referenced elsewhere; the inverse is refreshed and detached.
#[derive(Clone, Copy, Debug)]
pub struct InverseDetachedEvent {
    /// The creator being dropped.
    pub owner: NodeId,
    /// The inverse that survives it.
    pub inverse: NodeId,
}

/// Emitted when an operation is rejected.
#[derive(Clone, Copy, Debug)]
pub struct ErrorEvent {
    /// The receiver of the rejected operation.
    pub node: NodeId,
    /// What went wrong.
    pub error: TransformError,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from transform nodes.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about. Events may arrive concurrently from
/// several threads.
pub trait TraceSink: Send + Sync {
    /// Called after a node finishes an update.
    fn on_update(&self, e: &UpdateEvent) {
        _ = e;
    }

    /// Called after a node lazily creates its inverse.
    fn on_inverse_created(&self, e: &InverseCreatedEvent) {
        _ = e;
    }

    /// Called after an explicit inverse link succeeds.
    fn on_inverse_linked(&self, e: &InverseLinkedEvent) {
        _ = e;
    }

    /// Called when a creator/inverse pair is torn down.
    fn on_inverse_detached(&self, e: &InverseDetachedEvent) {
        _ = e;
    }

    /// Called when an operation is rejected.
    fn on_error(&self, e: &ErrorEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Installation
// ---------------------------------------------------------------------------

#[cfg(feature = "trace")]
static SINK: parking_lot::RwLock<Option<Arc<dyn TraceSink>>> = parking_lot::const_rwlock(None);

/// Installs `sink` as the process-wide trace sink, replacing any previous one.
///
/// Without the `trace` feature the sink is dropped immediately.
pub fn install(sink: Arc<dyn TraceSink>) {
    #[cfg(feature = "trace")]
    {
        *SINK.write() = Some(sink);
    }
    #[cfg(not(feature = "trace"))]
    {
        _ = sink;
    }
}

/// Removes the process-wide trace sink, returning it if one was installed.
pub fn uninstall() -> Option<Arc<dyn TraceSink>> {
    #[cfg(feature = "trace")]
    {
        SINK.write().take()
    }
    #[cfg(not(feature = "trace"))]
    {
        None
    }
}

// ---------------------------------------------------------------------------
// Tracer
// ---------------------------------------------------------------------------

/// Emit points used by the transform nodes.
///
/// Events are built lazily so that nothing is computed when tracing is off
/// or no sink is installed.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Tracer;

impl Tracer {
    #[inline]
    fn with(f: impl FnOnce(&dyn TraceSink)) {
        #[cfg(feature = "trace")]
        if let Some(sink) = SINK.read().as_deref() {
            f(sink);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = f;
        }
    }

    #[inline]
    pub(crate) fn update(e: impl FnOnce() -> UpdateEvent) {
        Self::with(|s| s.on_update(&e()));
    }

    #[inline]
    pub(crate) fn inverse_created(e: impl FnOnce() -> InverseCreatedEvent) {
        Self::with(|s| s.on_inverse_created(&e()));
    }

    #[inline]
    pub(crate) fn inverse_linked(e: impl FnOnce() -> InverseLinkedEvent) {
        Self::with(|s| s.on_inverse_linked(&e()));
    }

    #[inline]
    pub(crate) fn inverse_detached(e: impl FnOnce() -> InverseDetachedEvent) {
        Self::with(|s| s.on_inverse_detached(&e()));
    }

    #[inline]
    pub(crate) fn error(e: impl FnOnce() -> ErrorEvent) {
        Self::with(|s| s.on_error(&e()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_accepts_every_event() {
        let sink = NoopSink;
        let node = NodeId::next();
        sink.on_update(&UpdateEvent {
            node,
            kind: "MatrixTransform",
            path: UpdatePath::UpToDate,
            time: ModifiedTime::ZERO,
        });
        sink.on_inverse_linked(&InverseLinkedEvent {
            node,
            inverse: NodeId::next(),
        });
    }

    #[cfg(not(feature = "trace"))]
    #[test]
    fn install_is_inert_without_feature() {
        install(Arc::new(NoopSink));
        assert!(uninstall().is_none());
    }
}
