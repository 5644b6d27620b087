// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Camera state at the scene boundary.

use strata_engine::{GeoBounds, GeoPoint, Projection, ViewSnapshot};

/// Camera position in canonical geographic coordinates.
///
/// `zoom` is clamped to `[min_zoom, max_zoom]` by the engine, not here: a
/// `ViewState` read back from the engine always satisfies the limits, one
/// supplied by the host may not.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViewState {
    /// Center of the camera.
    pub center: GeoPoint,
    /// Zoom level.
    pub zoom: f64,
    /// Rotation in radians, counter-clockwise.
    pub rotation: f64,
    /// Bounds the center is constrained to.
    pub extent: Option<GeoBounds>,
    /// Lower zoom limit.
    pub min_zoom: Option<f64>,
    /// Upper zoom limit.
    pub max_zoom: Option<f64>,
}

impl ViewState {
    /// Creates an unrotated, unconstrained state.
    #[must_use]
    pub const fn new(center: GeoPoint, zoom: f64) -> Self {
        Self {
            center,
            zoom,
            rotation: 0.0,
            extent: None,
            min_zoom: None,
            max_zoom: None,
        }
    }

    /// Returns a copy with `rotation`.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    /// Returns a copy constrained to `extent`.
    #[must_use]
    pub const fn with_extent(mut self, extent: Option<GeoBounds>) -> Self {
        self.extent = extent;
        self
    }

    /// Returns a copy with zoom limits.
    #[must_use]
    pub const fn with_zoom_limits(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_zoom = min;
        self.max_zoom = max;
        self
    }

    /// Builds a state from an engine snapshot, keeping the constraints of `self`.
    #[must_use]
    pub fn observed(&self, snapshot: &ViewSnapshot) -> Self {
        Self {
            center: snapshot.projection.unproject(snapshot.center),
            zoom: snapshot.zoom,
            rotation: snapshot.rotation,
            ..*self
        }
    }
}

/// A request to animate the camera so `extent` fits the viewport.
///
/// A fit is issued once per `revision`; bump the revision to fit again.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FitRequest {
    /// Bounds to show.
    pub extent: GeoBounds,
    /// Animation duration in milliseconds.
    pub duration_ms: u64,
    /// Padding kept free on every side, in pixels.
    pub padding_px: f64,
    /// Caller-supplied revision.
    pub revision: u64,
}

/// Declarative description of a view.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ViewDescriptor {
    /// Desired camera.
    pub state: ViewState,
    /// Native projection of the engine view. Changing it rebuilds the view.
    pub projection: Projection,
    /// Optional camera fit.
    pub fit: Option<FitRequest>,
}

impl ViewDescriptor {
    /// Creates a descriptor in the default projection with no fit.
    #[must_use]
    pub fn new(state: ViewState) -> Self {
        Self {
            state,
            projection: Projection::default(),
            fit: None,
        }
    }

    /// Returns a copy using `projection`.
    #[must_use]
    pub const fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Returns a copy requesting `fit`.
    #[must_use]
    pub const fn with_fit(mut self, fit: Option<FitRequest>) -> Self {
        self.fit = fit;
        self
    }
}
