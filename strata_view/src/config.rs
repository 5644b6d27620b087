// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! View controller configuration.

/// Default rotation debounce window in milliseconds.
pub const DEFAULT_ROTATION_DEBOUNCE_MS: u64 = 100;

/// Default number of times an interrupted fit is re-issued.
pub const DEFAULT_MAX_FIT_RETRIES: u32 = 3;

/// What to do once an interrupted fit ran out of retries.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FitFallback {
    /// Re-issue the fit once more with zero duration.
    #[default]
    Jump,
    /// Leave the camera where the interruption left it.
    GiveUp,
}

/// Tunables of a [`ViewController`](crate::ViewController).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViewConfig {
    /// Quiet window before a user rotation is reported.
    pub rotation_debounce_ms: u64,
    /// Animated re-issues of an interrupted fit before falling back.
    pub max_fit_retries: u32,
    /// Behavior after the last retry was interrupted.
    pub fit_fallback: FitFallback,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            rotation_debounce_ms: DEFAULT_ROTATION_DEBOUNCE_MS,
            max_fit_retries: DEFAULT_MAX_FIT_RETRIES,
            fit_fallback: FitFallback::Jump,
        }
    }
}

impl ViewConfig {
    /// Returns a copy with a different rotation debounce window.
    #[must_use]
    pub const fn with_rotation_debounce_ms(mut self, ms: u64) -> Self {
        self.rotation_debounce_ms = ms;
        self
    }

    /// Returns a copy with a different retry cap.
    #[must_use]
    pub const fn with_max_fit_retries(mut self, retries: u32) -> Self {
        self.max_fit_retries = retries;
        self
    }

    /// Returns a copy with a different fallback.
    #[must_use]
    pub const fn with_fit_fallback(mut self, fallback: FitFallback) -> Self {
        self.fit_fallback = fallback;
        self
    }
}
