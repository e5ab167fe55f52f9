// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output and structure dumps.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Times are
//! ticks of the process-wide modification clock.
//!
//! [`write_concatenation`] and [`write_composed`] print the structure of a
//! concatenation or composed transform, one element per line.

use std::io::{self, Write};

use parking_lot::Mutex;

use stratum_core::trace::{
    ErrorEvent, InverseCreatedEvent, InverseDetachedEvent, InverseLinkedEvent, TraceSink,
    UpdateEvent, UpdatePath,
};
use stratum_core::{ComposedTransform, Concatenation, Transform, TransformPair};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write + Send = Box<dyn Write + Send>> {
    writer: Mutex<W>,
    skip_up_to_date: bool,
}

impl<W: Write + Send> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("skip_up_to_date", &self.skip_up_to_date)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(io::stderr()))
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self::with_writer(writer)
    }
}

impl<W: Write + Send> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            skip_up_to_date: false,
        }
    }

    /// Omits updates that found nothing stale.
    #[must_use]
    pub fn skip_up_to_date(mut self, skip: bool) -> Self {
        self.skip_up_to_date = skip;
        self
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

fn path_name(path: UpdatePath) -> &'static str {
    match path {
        UpdatePath::FromInverse => "from-inverse",
        UpdatePath::Internal => "internal",
        UpdatePath::UpToDate => "up-to-date",
    }
}

impl<W: Write + Send> TraceSink for PrettyPrintSink<W> {
    fn on_update(&self, e: &UpdateEvent) {
        if self.skip_up_to_date && e.path == UpdatePath::UpToDate {
            return;
        }
        let _ = writeln!(
            self.writer.lock(),
            "[update] {} {} {} t={}",
            e.kind,
            e.node,
            path_name(e.path),
            e.time.ticks(),
        );
    }

    fn on_inverse_created(&self, e: &InverseCreatedEvent) {
        let _ = writeln!(
            self.writer.lock(),
            "[inverse:create] {} {} -> {}",
            e.kind,
            e.node,
            e.inverse,
        );
    }

    fn on_inverse_linked(&self, e: &InverseLinkedEvent) {
        let _ = writeln!(
            self.writer.lock(),
            "[inverse:link] {} mirrors {}",
            e.node,
            e.inverse,
        );
    }

    fn on_inverse_detached(&self, e: &InverseDetachedEvent) {
        let _ = writeln!(
            self.writer.lock(),
            "[inverse:detach] {} outlives {}",
            e.inverse,
            e.owner,
        );
    }

    fn on_error(&self, e: &ErrorEvent) {
        let _ = writeln!(self.writer.lock(), "[error] {} {}", e.node, e.error);
    }
}

/// Writes the flags, counts and elements of `concatenation`.
///
/// Elements are listed in physical order; accumulators are marked.
pub fn write_concatenation(
    w: &mut dyn Write,
    concatenation: &Concatenation,
    indent: usize,
) -> io::Result<()> {
    let pad = "  ".repeat(indent);
    writeln!(w, "{pad}Inverted: {}", concatenation.is_inverted())?;
    let mode = if concatenation.pre_multiply() {
        "PreMultiply"
    } else {
        "PostMultiply"
    };
    writeln!(w, "{pad}{mode}")?;
    writeln!(
        w,
        "{pad}NumberOfPreTransforms: {}",
        concatenation.number_of_pre_transforms()
    )?;
    writeln!(
        w,
        "{pad}NumberOfPostTransforms: {}",
        concatenation.number_of_post_transforms()
    )?;

    let pre = concatenation.pre_accumulator().map(|a| a.id());
    let post = concatenation.post_accumulator().map(|a| a.id());
    for (index, pair) in concatenation.pairs().enumerate() {
        let (side, transform) = match pair {
            TransformPair::Forward(t) => ("forward", t),
            TransformPair::Inverse(t) => ("inverse", t),
            TransformPair::Both { forward, .. } => ("both", forward),
        };
        let marker = match Some(transform.id()) {
            id if id == pre => " (pre accumulator)",
            id if id == post => " (post accumulator)",
            _ => "",
        };
        writeln!(
            w,
            "{pad}[{index}] {} {} {side}{marker}",
            transform.kind_name(),
            transform.id(),
        )?;
    }
    Ok(())
}

/// Writes the structure of a composed transform, including its input and
/// saved stack depth.
pub fn write_composed(w: &mut dyn Write, transform: &ComposedTransform) -> io::Result<()> {
    writeln!(
        w,
        "{} {} (modified t={})",
        transform.kind_name(),
        transform.id(),
        transform.modification_time().ticks()
    )?;
    match transform.input() {
        Some(input) => writeln!(w, "  Input: {} {}", input.kind_name(), input.id())?,
        None => writeln!(w, "  Input: none")?,
    }
    writeln!(w, "  StackDepth: {}", transform.stack_depth())?;
    transform.with_concatenation(|c| write_concatenation(w, c, 1))
}
