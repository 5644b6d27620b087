// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-clocked trailing debounce.
//!
//! ## Usage
//!
//! 1) Call [`Debounce::push`] for every raw value, with the current time.
//! 2) Call [`Debounce::poll`] from the host's timer or frame loop.
//! 3) On teardown, [`Debounce::flush`] or [`Debounce::cancel`].
//!
//! A later push replaces the pending value and restarts the window, so a
//! burst yields one emission carrying the last value.
//!
//! ```
//! use strata_view::Debounce;
//!
//! let mut d = Debounce::new(100);
//! for (i, now) in (0..10).zip((0..100).step_by(10)) {
//!     d.push(i, now);
//! }
//! assert_eq!(d.poll(150), None);
//! assert_eq!(d.poll(190), Some(9));
//! assert_eq!(d.poll(500), None);
//! ```

/// Trailing debounce over values of type `T`.
///
/// Time is an opaque millisecond counter supplied by the caller.
#[derive(Clone, Debug)]
pub struct Debounce<T> {
    window_ms: u64,
    pending: Option<(T, u64)>,
}

impl<T> Debounce<T> {
    /// Creates a debounce that emits `window_ms` after the last push.
    #[must_use]
    pub const fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            pending: None,
        }
    }

    /// Length of the quiet window in milliseconds.
    #[must_use]
    pub const fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Records `value` at time `now`, replacing any pending value.
    pub fn push(&mut self, value: T, now: u64) {
        self.pending = Some((value, now.saturating_add(self.window_ms)));
    }

    /// Emits the pending value if its window elapsed by `now`.
    pub fn poll(&mut self, now: u64) -> Option<T> {
        match self.pending {
            Some((_, deadline)) if now >= deadline => self.pending.take().map(|(v, _)| v),
            _ => None,
        }
    }

    /// Emits the pending value immediately.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(v, _)| v)
    }

    /// Drops the pending value.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Whether a value is waiting.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Time at which the pending value will be emitted.
    #[must_use]
    pub fn deadline(&self) -> Option<u64> {
        self.pending.as_ref().map(|&(_, d)| d)
    }
}
