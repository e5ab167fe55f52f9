// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as little-endian records. [`decode`] reads them back as an
//! iterator of [`RecordedEvent`].
//!
//! Node ids are stored as their raw value; kind names are stored as
//! length-prefixed UTF-8 (at most 255 bytes).

use parking_lot::Mutex;

use stratum_core::error::{Operation, TransformError};
use stratum_core::trace::{
    ErrorEvent, InverseCreatedEvent, InverseDetachedEvent, InverseLinkedEvent, TraceSink,
    UpdateEvent, UpdatePath,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_UPDATE: u8 = 1;
const TAG_INVERSE_CREATED: u8 = 2;
const TAG_INVERSE_LINKED: u8 = 3;
const TAG_INVERSE_DETACHED: u8 = 4;
const TAG_ERROR: u8 = 5;

const ERROR_TYPE_MISMATCH: u8 = 0;
const ERROR_CIRCULAR_REFERENCE: u8 = 1;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
///
/// Events from concurrent threads are serialized by an internal lock.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Mutex<Vec<u8>>,
}

/// Appends to a locked buffer.
struct Encoder<'a>(&'a mut Vec<u8>);

impl Encoder<'_> {
    fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    fn u64(&mut self, v: u64) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Writes at most 255 bytes of `s`, cut at a character boundary.
    fn str(&mut self, s: &str) -> &mut Self {
        let mut end = s.len().min(usize::from(u8::MAX));
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let len = u8::try_from(end).unwrap_or(u8::MAX);
        self.u8(len);
        self.0.extend_from_slice(&s.as_bytes()[..end]);
        self
    }

    fn operation(&mut self, op: Operation) -> &mut Self {
        self.u8(match op {
            Operation::SetInverse => 0,
            Operation::DeepCopy => 1,
            Operation::Concatenate => 2,
            Operation::SetInput => 3,
        })
    }

    fn path(&mut self, path: UpdatePath) -> &mut Self {
        self.u8(match path {
            UpdatePath::FromInverse => 0,
            UpdatePath::Internal => 1,
            UpdatePath::UpToDate => 2,
        })
    }
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.buf.lock().clone()
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.into_inner()
    }

    /// Discards everything recorded so far.
    pub fn clear(&self) {
        self.buf.lock().clear();
    }

    fn record(&self, f: impl FnOnce(&mut Encoder<'_>)) {
        let mut buf = self.buf.lock();
        f(&mut Encoder(&mut buf));
    }
}

impl TraceSink for RecorderSink {
    fn on_update(&self, e: &UpdateEvent) {
        self.record(|w| {
            w.u8(TAG_UPDATE)
                .u64(e.node.get())
                .str(e.kind)
                .path(e.path)
                .u64(e.time.ticks());
        });
    }

    fn on_inverse_created(&self, e: &InverseCreatedEvent) {
        self.record(|w| {
            w.u8(TAG_INVERSE_CREATED)
                .u64(e.node.get())
                .u64(e.inverse.get())
                .str(e.kind);
        });
    }

    fn on_inverse_linked(&self, e: &InverseLinkedEvent) {
        self.record(|w| {
            w.u8(TAG_INVERSE_LINKED)
                .u64(e.node.get())
                .u64(e.inverse.get());
        });
    }

    fn on_inverse_detached(&self, e: &InverseDetachedEvent) {
        self.record(|w| {
            w.u8(TAG_INVERSE_DETACHED)
                .u64(e.owner.get())
                .u64(e.inverse.get());
        });
    }

    fn on_error(&self, e: &ErrorEvent) {
        self.record(|w| {
            w.u8(TAG_ERROR)
                .u64(e.node.get())
                .operation(e.error.operation());
            match e.error {
                TransformError::TypeMismatch {
                    expected, found, ..
                } => {
                    w.u8(ERROR_TYPE_MISMATCH).str(expected).str(found);
                }
                TransformError::CircularReference { .. } => {
                    w.u8(ERROR_CIRCULAR_REFERENCE);
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded rejected operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedError {
    /// See [`TransformError::TypeMismatch`].
    TypeMismatch {
        /// Kind of the receiver.
        expected: String,
        /// Kind of the argument.
        found: String,
    },
    /// See [`TransformError::CircularReference`].
    CircularReference,
}

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// An [`UpdateEvent`].
    Update {
        /// Raw id of the updated node.
        node: u64,
        /// Kind name.
        kind: String,
        /// Which branch ran.
        path: UpdatePath,
        /// Clock ticks of the new last-updated time.
        time: u64,
    },
    /// An [`InverseCreatedEvent`].
    InverseCreated {
        /// Raw id of the creator.
        node: u64,
        /// Raw id of the new inverse.
        inverse: u64,
        /// Kind name.
        kind: String,
    },
    /// An [`InverseLinkedEvent`].
    InverseLinked {
        /// Raw id of the mirroring node.
        node: u64,
        /// Raw id of the mirrored node.
        inverse: u64,
    },
    /// An [`InverseDetachedEvent`].
    InverseDetached {
        /// Raw id of the dropped creator.
        owner: u64,
        /// Raw id of the surviving inverse.
        inverse: u64,
    },
    /// An [`ErrorEvent`].
    Error {
        /// Raw id of the receiver.
        node: u64,
        /// The rejected operation.
        operation: Operation,
        /// What went wrong.
        error: RecordedError,
    },
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Decoding stops at the first truncated or unknown record.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take(&mut self, n: usize) -> Option<&[u8]> {
        let end = self.pos.checked_add(n)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn read_u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    fn read_str(&mut self) -> Option<String> {
        let len = usize::from(self.read_u8()?);
        let bytes = self.take(len)?;
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    fn read_operation(&mut self) -> Option<Operation> {
        Some(match self.read_u8()? {
            0 => Operation::SetInverse,
            1 => Operation::DeepCopy,
            2 => Operation::Concatenate,
            3 => Operation::SetInput,
            _ => return None,
        })
    }

    fn read_path(&mut self) -> Option<UpdatePath> {
        Some(match self.read_u8()? {
            0 => UpdatePath::FromInverse,
            1 => UpdatePath::Internal,
            2 => UpdatePath::UpToDate,
            _ => return None,
        })
    }

    fn decode_update(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Update {
            node: self.read_u64()?,
            kind: self.read_str()?,
            path: self.read_path()?,
            time: self.read_u64()?,
        })
    }

    fn decode_inverse_created(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::InverseCreated {
            node: self.read_u64()?,
            inverse: self.read_u64()?,
            kind: self.read_str()?,
        })
    }

    fn decode_error(&mut self) -> Option<RecordedEvent> {
        let node = self.read_u64()?;
        let operation = self.read_operation()?;
        let error = match self.read_u8()? {
            ERROR_TYPE_MISMATCH => RecordedError::TypeMismatch {
                expected: self.read_str()?,
                found: self.read_str()?,
            },
            ERROR_CIRCULAR_REFERENCE => RecordedError::CircularReference,
            _ => return None,
        };
        Some(RecordedEvent::Error {
            node,
            operation,
            error,
        })
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_u8()? {
            TAG_UPDATE => self.decode_update(),
            TAG_INVERSE_CREATED => self.decode_inverse_created(),
            TAG_INVERSE_LINKED => Some(RecordedEvent::InverseLinked {
                node: self.read_u64()?,
                inverse: self.read_u64()?,
            }),
            TAG_INVERSE_DETACHED => Some(RecordedEvent::InverseDetached {
                owner: self.read_u64()?,
                inverse: self.read_u64()?,
            }),
            TAG_ERROR => self.decode_error(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::time::ModifiedTime;
    use stratum_core::{MatrixTransform, Transform};

    #[test]
    fn update_and_inverse_events_decode() {
        let a = MatrixTransform::new();
        let b = MatrixTransform::new();
        let rec = RecorderSink::new();
        rec.on_update(&UpdateEvent {
            node: a.id(),
            kind: "MatrixTransform",
            path: UpdatePath::FromInverse,
            time: ModifiedTime(42),
        });
        rec.on_inverse_created(&InverseCreatedEvent {
            node: a.id(),
            inverse: b.id(),
            kind: "MatrixTransform",
        });
        rec.on_inverse_detached(&InverseDetachedEvent {
            owner: a.id(),
            inverse: b.id(),
        });

        let events: Vec<_> = decode(&rec.to_bytes()).collect();
        assert_eq!(
            events,
            vec![
                RecordedEvent::Update {
                    node: a.id().get(),
                    kind: "MatrixTransform".into(),
                    path: UpdatePath::FromInverse,
                    time: 42,
                },
                RecordedEvent::InverseCreated {
                    node: a.id().get(),
                    inverse: b.id().get(),
                    kind: "MatrixTransform".into(),
                },
                RecordedEvent::InverseDetached {
                    owner: a.id().get(),
                    inverse: b.id().get(),
                },
            ]
        );
    }

    #[test]
    fn errors_keep_their_kind_names() {
        let a = MatrixTransform::new();
        let rec = RecorderSink::new();
        rec.on_error(&ErrorEvent {
            node: a.id(),
            error: TransformError::TypeMismatch {
                operation: Operation::SetInverse,
                expected: "MatrixTransform",
                found: "ComposedTransform",
            },
        });
        rec.on_error(&ErrorEvent {
            node: a.id(),
            error: TransformError::CircularReference {
                operation: Operation::Concatenate,
            },
        });

        let events: Vec<_> = decode(&rec.into_bytes()).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            RecordedEvent::Error {
                node: a.id().get(),
                operation: Operation::SetInverse,
                error: RecordedError::TypeMismatch {
                    expected: "MatrixTransform".into(),
                    found: "ComposedTransform".into(),
                },
            }
        );
        assert!(matches!(
            events[1],
            RecordedEvent::Error {
                operation: Operation::Concatenate,
                error: RecordedError::CircularReference,
                ..
            }
        ));
    }

    #[test]
    fn long_kind_names_are_cut_between_characters() {
        let a = MatrixTransform::new();
        let kind: &'static str = "é".repeat(200).leak();
        let rec = RecorderSink::new();
        rec.on_inverse_created(&InverseCreatedEvent {
            node: a.id(),
            inverse: a.id(),
            kind,
        });
        rec.on_inverse_linked(&InverseLinkedEvent {
            node: a.id(),
            inverse: a.id(),
        });

        let events: Vec<_> = decode(&rec.to_bytes()).collect();
        assert_eq!(events.len(), 2);
        let RecordedEvent::InverseCreated { kind, .. } = &events[0] else {
            panic!("unexpected event {:?}", events[0]);
        };
        assert_eq!(*kind, "é".repeat(127));
    }

    #[test]
    fn truncated_record_stops_decoding() {
        let a = MatrixTransform::new();
        let rec = RecorderSink::new();
        rec.on_inverse_linked(&InverseLinkedEvent {
            node: a.id(),
            inverse: a.id(),
        });
        rec.on_inverse_linked(&InverseLinkedEvent {
            node: a.id(),
            inverse: a.id(),
        });
        let mut bytes = rec.to_bytes();
        bytes.truncate(bytes.len() - 3);
        assert_eq!(decode(&bytes).count(), 1);

        rec.clear();
        assert_eq!(decode(&rec.to_bytes()).count(), 0);
    }
}
