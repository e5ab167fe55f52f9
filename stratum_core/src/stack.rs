// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Save/restore stack for concatenations.

use crate::concatenation::Concatenation;

/// A stack of saved [`Concatenation`] snapshots.
///
/// [`push`](Self::push) saves a deep copy of the live concatenation;
/// [`pop`](Self::pop) swaps the most recent copy back in.
#[derive(Debug, Default)]
pub struct ConcatenationStack {
    saved: Vec<Concatenation>,
}

impl ConcatenationStack {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self { saved: Vec::new() }
    }

    /// Saves a copy of `live`; `live` itself is left as it is.
    pub fn push(&mut self, live: &Concatenation) {
        self.saved.push(live.clone());
    }

    /// Replaces `live` with the most recently saved copy.
    ///
    /// Returns `false`, leaving `live` untouched, if nothing is saved. The
    /// multiplication mode of `live` carries over to the restored copy.
    pub fn pop(&mut self, live: &mut Concatenation) -> bool {
        let Some(mut saved) = self.saved.pop() else {
            return false;
        };
        saved.set_pre_multiply(live.pre_multiply());
        *live = saved;
        true
    }

    /// Number of saved copies.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    /// Whether nothing is saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    /// Saved copies, oldest first.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Concatenation> + '_ {
        self.saved.iter()
    }

    /// Makes this stack a copy of `other`, reusing existing entries.
    pub fn deep_copy(&mut self, other: &Self) {
        self.saved.truncate(other.saved.len());
        for (mine, theirs) in self.saved.iter_mut().zip(&other.saved) {
            mine.deep_copy(theirs);
        }
        let kept = self.saved.len();
        self.saved.extend(other.saved[kept..].iter().cloned());
    }
}

impl Clone for ConcatenationStack {
    fn clone(&self) -> Self {
        Self {
            saved: self.saved.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.deep_copy(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Transform;

    fn apply(c: &mut Concatenation, mut p: [f64; 3]) -> [f64; 3] {
        for i in 0..c.len() {
            p = c.transform(i).unwrap().transform_point(p);
        }
        p
    }

    #[test]
    fn push_then_pop_restores() {
        let mut stack = ConcatenationStack::new();
        let mut live = Concatenation::new();
        live.translate(1.0, 0.0, 0.0);
        stack.push(&live);
        assert_eq!(stack.depth(), 1);

        live.translate(5.0, 0.0, 0.0);
        live.set_pre_multiply(false);
        assert_eq!(apply(&mut live, [0.0; 3]), [6.0, 0.0, 0.0]);

        assert!(stack.pop(&mut live));
        assert!(stack.is_empty());
        assert!(!live.pre_multiply());
        assert_eq!(apply(&mut live, [0.0; 3]), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn pop_on_empty_is_a_no_op() {
        let mut stack = ConcatenationStack::new();
        let mut live = Concatenation::new();
        live.translate(2.0, 0.0, 0.0);
        assert!(!stack.pop(&mut live));
        assert_eq!(live.len(), 1);
    }

    #[test]
    fn saved_copies_are_independent() {
        let mut stack = ConcatenationStack::new();
        let mut live = Concatenation::new();
        live.translate(1.0, 0.0, 0.0);
        stack.push(&live);
        live.translate(1.0, 0.0, 0.0);
        let saved = stack.iter().next().unwrap();
        assert_ne!(
            saved.pre_accumulator().unwrap().id(),
            live.pre_accumulator().unwrap().id()
        );
    }

    #[test]
    fn deep_copy_matches_depth() {
        let mut a = ConcatenationStack::new();
        let mut live = Concatenation::new();
        for _ in 0..3 {
            a.push(&live);
            live.translate(1.0, 0.0, 0.0);
        }
        let mut b = ConcatenationStack::new();
        b.push(&live);
        b.push(&live);
        b.push(&live);
        b.push(&live);
        b.deep_copy(&a);
        assert_eq!(b.depth(), 3);

        let mut c = ConcatenationStack::new();
        c.clone_from(&a);
        assert_eq!(c.depth(), 3);
        let mut top = Concatenation::new();
        assert!(c.pop(&mut top));
        assert_eq!(apply(&mut top, [0.0; 3]), [2.0, 0.0, 0.0]);
    }
}
