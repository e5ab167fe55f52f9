// Copyright 2026 the Stratum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Process-wide modification clock.
//!
//! [`ModifiedTime`] is a point on a single monotonically increasing counter
//! shared by every transform in the process, so stamps taken by different
//! nodes can be compared directly. A node is stale when a dependency's
//! modification time is at or after the node's last update time.
//!
//! [`TimeStamp`] is an atomic cell holding one such value.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static CLOCK: AtomicU64 = AtomicU64::new(0);

/// A value of the process-wide modification clock.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ModifiedTime(pub u64);

impl ModifiedTime {
    /// The time before anything was modified.
    pub const ZERO: Self = Self(0);

    /// Advances the clock and returns the new value.
    #[must_use]
    pub fn now() -> Self {
        Self(CLOCK.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ModifiedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModifiedTime({})", self.0)
    }
}

/// An atomically updated [`ModifiedTime`].
#[derive(Default)]
pub struct TimeStamp(AtomicU64);

impl TimeStamp {
    /// Creates a stamp holding [`ModifiedTime::ZERO`].
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Records the next clock value and returns it.
    pub fn modified(&self) -> ModifiedTime {
        let now = ModifiedTime::now();
        self.0.store(now.0, Ordering::Release);
        now
    }

    /// Records a value taken earlier with [`ModifiedTime::now`].
    pub fn set(&self, time: ModifiedTime) {
        self.0.store(time.0, Ordering::Release);
    }

    /// Returns the recorded value.
    #[must_use]
    pub fn get(&self) -> ModifiedTime {
        ModifiedTime(self.0.load(Ordering::Acquire))
    }
}

impl fmt::Debug for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TimeStamp").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic() {
        let a = ModifiedTime::now();
        let b = ModifiedTime::now();
        assert!(b > a);
    }

    #[test]
    fn stamp_tracks_latest_modification() {
        let stamp = TimeStamp::new();
        assert_eq!(stamp.get(), ModifiedTime::ZERO);
        let first = stamp.modified();
        assert_eq!(stamp.get(), first);
        let second = stamp.modified();
        assert!(second > first);
        assert_eq!(stamp.get().ticks(), second.ticks());
    }
}
