// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Source and layer construction parameters, plus the function-typed hooks an
//! engine stores on its objects.

use std::rc::Rc;
use core::fmt;

use smallvec::SmallVec;

use crate::error::EngineError;
use crate::geo::Projection;
use crate::id::HandleId;

/// Kind of engine layer object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Raster tiles addressed by an XYZ URL template.
    Tile,
    /// Vector features loaded from a single URL.
    Vector,
    /// Vector tiles addressed by an XYZ URL template.
    VectorTile,
    /// Raster image produced by a per-pixel operation over input rasters.
    Image,
}

/// Values handed to a [`PixelOperation`] on every pixel.
///
/// This is the side channel between the scene and an engine-invoked
/// operation: the owner writes it with
/// [`MapEngine::set_operation_data`](crate::MapEngine::set_operation_data)
/// before the engine renders, and the operation only ever reads it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperationData {
    values: SmallVec<[f64; 4]>,
}

impl OperationData {
    /// Creates operation data from a slice of values.
    #[must_use]
    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            values: SmallVec::from_slice(values),
        }
    }

    /// Returns the value at `index`, or `fallback` if absent.
    #[must_use]
    pub fn get_or(&self, index: usize, fallback: f64) -> f64 {
        self.values.get(index).copied().unwrap_or(fallback)
    }

    /// Returns all values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Per-pixel operation run by the engine for every pixel of a composited raster.
///
/// Operations are plain functions so that they are pure: the output may only
/// depend on the pixel and the operation data.
pub type PixelOperation = fn([u8; 4], &OperationData) -> [u8; 4];

/// Parameters for building an engine data source.
#[derive(Clone)]
pub enum SourceSpec {
    /// Raster tiles.
    Tile {
        /// XYZ URL template, for example `https://host/{z}/{x}/{y}.png`.
        url: String,
        /// Projection the tiles are served in.
        projection: Projection,
    },
    /// Vector features from a single document.
    Vector {
        /// Feature collection URL.
        url: String,
        /// Projection the features are expressed in.
        projection: Projection,
    },
    /// Vector tiles.
    VectorTile {
        /// XYZ URL template.
        url: String,
        /// Projection the tiles are served in.
        projection: Projection,
    },
    /// Raster composited from inputs by a per-pixel operation.
    Raster {
        /// XYZ URL templates of the input rasters.
        inputs: Vec<String>,
        /// Operation applied to each pixel of the first input.
        operation: PixelOperation,
    },
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tile { url, projection } => f
                .debug_struct("Tile")
                .field("url", url)
                .field("projection", projection)
                .finish(),
            Self::Vector { url, projection } => f
                .debug_struct("Vector")
                .field("url", url)
                .field("projection", projection)
                .finish(),
            Self::VectorTile { url, projection } => f
                .debug_struct("VectorTile")
                .field("url", url)
                .field("projection", projection)
                .finish(),
            Self::Raster { inputs, .. } => f
                .debug_struct("Raster")
                .field("inputs", inputs)
                .finish_non_exhaustive(),
        }
    }
}

impl SourceSpec {
    /// Checks that the spec can address data at all.
    ///
    /// Tiled sources need a template containing both `{x}` and `{z}`;
    /// single-document sources need a non-blank URL.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            Self::Tile { url, .. } | Self::VectorTile { url, .. } => check_template(url),
            Self::Vector { url, .. } => {
                if url.trim().is_empty() {
                    Err(EngineError::DegenerateSourceUrl { url: url.clone() })
                } else {
                    Ok(())
                }
            }
            Self::Raster { inputs, .. } => {
                if inputs.is_empty() {
                    return Err(EngineError::EmptyRasterInputs);
                }
                inputs.iter().try_for_each(|url| check_template(url))
            }
        }
    }

    /// Projection of the data, if the source declares one.
    #[must_use]
    pub fn projection(&self) -> Option<Projection> {
        match self {
            Self::Tile { projection, .. }
            | Self::Vector { projection, .. }
            | Self::VectorTile { projection, .. } => Some(*projection),
            Self::Raster { .. } => None,
        }
    }
}

fn check_template(url: &str) -> Result<(), EngineError> {
    if url.trim().is_empty() || !url.contains("{z}") || !url.contains("{x}") {
        return Err(EngineError::DegenerateSourceUrl { url: url.into() });
    }
    Ok(())
}

/// Identifier of a vector feature passed to a [`StyleFn`].
pub type FeatureId = u64;

/// Style produced for one vector feature.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FeatureStyle {
    /// Stroke color as RGBA.
    pub stroke: [u8; 4],
    /// Fill color as RGBA.
    pub fill: [u8; 4],
    /// Stroke width in pixels.
    pub width: f64,
}

impl Default for FeatureStyle {
    fn default() -> Self {
        Self {
            stroke: [51, 153, 204, 255],
            fill: [255, 255, 255, 102],
            width: 1.25,
        }
    }
}

/// Style function for vector layers: `(feature, resolution) -> style`.
pub type StyleFn = Rc<dyn Fn(FeatureId, f64) -> FeatureStyle>;

/// Phase of a layer render at which a [`RenderHook`] runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RenderPhase {
    /// Before the layer draws.
    PreRender,
    /// After the layer draws.
    PostRender,
}

/// Payload passed to a [`RenderHook`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RenderEvent {
    /// Layer being rendered.
    pub layer: HandleId,
    /// Phase of the render.
    pub phase: RenderPhase,
    /// Monotonic frame counter of the engine.
    pub frame: u64,
}

/// Callback invoked synchronously by the engine while rendering a layer.
pub type RenderHook = Rc<dyn Fn(&RenderEvent)>;
