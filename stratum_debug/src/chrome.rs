// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! The modification clock is logical, so timestamps are clock ticks rather
//! than microseconds. Each node gets its own track (`tid` is the node id).
//! Events that carry no time of their own are placed at the most recent
//! time seen in the recording.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::recorder::{RecordedError, RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut now = 0_u64;

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::Update {
                node,
                kind,
                path,
                time,
            } => {
                now = now.max(time);
                events.push(json!({
                    "ph": "i",
                    "name": "Update",
                    "cat": kind,
                    "ts": time,
                    "pid": 0,
                    "tid": node,
                    "s": "t",
                    "args": {
                        "path": format!("{path:?}"),
                    }
                }));
            }
            RecordedEvent::InverseCreated {
                node,
                inverse,
                kind,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "InverseCreated",
                    "cat": kind,
                    "ts": now,
                    "pid": 0,
                    "tid": node,
                    "s": "t",
                    "args": {
                        "inverse": inverse,
                    }
                }));
            }
            RecordedEvent::InverseLinked { node, inverse } => {
                events.push(json!({
                    "ph": "i",
                    "name": "InverseLinked",
                    "cat": "Inverse",
                    "ts": now,
                    "pid": 0,
                    "tid": node,
                    "s": "t",
                    "args": {
                        "inverse": inverse,
                    }
                }));
            }
            RecordedEvent::InverseDetached { owner, inverse } => {
                events.push(json!({
                    "ph": "i",
                    "name": "InverseDetached",
                    "cat": "Inverse",
                    "ts": now,
                    "pid": 0,
                    "tid": inverse,
                    "s": "t",
                    "args": {
                        "owner": owner,
                    }
                }));
            }
            RecordedEvent::Error {
                node,
                operation,
                error,
            } => {
                let message = match error {
                    RecordedError::TypeMismatch { expected, found } => {
                        format!("requires a {expected}, a {found} is not compatible")
                    }
                    RecordedError::CircularReference => "circular reference".to_owned(),
                };
                events.push(json!({
                    "ph": "i",
                    "name": "Error",
                    "cat": "Error",
                    "ts": now,
                    "pid": 0,
                    "tid": node,
                    "s": "g",
                    "args": {
                        "operation": operation.as_str(),
                        "message": message,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use stratum_core::error::{Operation, TransformError};
    use stratum_core::time::ModifiedTime;
    use stratum_core::trace::{ErrorEvent, InverseCreatedEvent, TraceSink, UpdateEvent, UpdatePath};
    use stratum_core::{MatrixTransform, Transform};

    #[test]
    fn export_produces_valid_json() {
        let a = MatrixTransform::new();
        let b = MatrixTransform::new();
        let rec = RecorderSink::new();
        rec.on_update(&UpdateEvent {
            node: a.id(),
            kind: "MatrixTransform",
            path: UpdatePath::Internal,
            time: ModifiedTime(10),
        });
        rec.on_inverse_created(&InverseCreatedEvent {
            node: a.id(),
            inverse: b.id(),
            kind: "MatrixTransform",
        });
        rec.on_error(&ErrorEvent {
            node: b.id(),
            error: TransformError::CircularReference {
                operation: Operation::SetInverse,
            },
        });

        let mut out = Vec::new();
        export(&rec.to_bytes(), &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();

        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.len(), 3);

        assert_eq!(parsed[0]["name"], "Update");
        assert_eq!(parsed[0]["cat"], "MatrixTransform");
        assert_eq!(parsed[0]["ts"], 10);
        assert_eq!(parsed[0]["tid"], a.id().get());
        assert_eq!(parsed[0]["args"]["path"], "Internal");

        // Untimed events inherit the last update time.
        assert_eq!(parsed[1]["name"], "InverseCreated");
        assert_eq!(parsed[1]["ts"], 10);
        assert_eq!(parsed[1]["args"]["inverse"], b.id().get());

        assert_eq!(parsed[2]["name"], "Error");
        assert_eq!(parsed[2]["args"]["operation"], "SetInverse");
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert!(parsed.is_empty());
    }
}
