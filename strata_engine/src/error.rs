// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors raised while constructing engine objects.

/// Error returned when the engine cannot construct an object.
///
/// Only construction is fallible. Attach, detach, and setter calls on live
/// handles are infallible; calls on stale handles are ignored.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A source URL is empty or can not address any tile.
    #[error("degenerate source url {url:?}")]
    DegenerateSourceUrl {
        /// The rejected URL template.
        url: String,
    },
    /// A composite raster source was given no inputs.
    #[error("raster source needs at least one input")]
    EmptyRasterInputs,
}
