// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Upward reports of engine-driven camera changes.

use strata_engine::GeoPoint;

/// A camera change to be written back into the external store.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ViewUpdate {
    /// The user moved the camera.
    Moved {
        /// New center.
        center: GeoPoint,
        /// New zoom.
        zoom: f64,
    },
    /// The user rotated the camera; reported after the debounce window.
    Rotated {
        /// New rotation in radians.
        rotation: f64,
    },
    /// The controller is going away; this is the last known camera.
    Flushed {
        /// Last center.
        center: GeoPoint,
        /// Last zoom.
        zoom: f64,
        /// Last rotation in radians.
        rotation: f64,
    },
}

/// Receives [`ViewUpdate`]s.
///
/// Only user-driven changes and the final flush are reported; changes the
/// controller made itself are not.
pub trait ViewSink {
    /// Called once per report.
    fn view_changed(&mut self, update: ViewUpdate);
}

impl ViewSink for () {
    fn view_changed(&mut self, _update: ViewUpdate) {}
}

impl ViewSink for Vec<ViewUpdate> {
    fn view_changed(&mut self, update: ViewUpdate) {
        self.push(update);
    }
}
