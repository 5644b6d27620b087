// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Declarative scene descriptors, rebuilt by the host on every render.
//!
//! Descriptors are values. Function-typed fields ([`StyleFn`], [`RenderHook`],
//! [`CommitFn`]) never take part in the comparisons that gate expensive
//! rebuilds; nodes compare them by pointer only to decide whether to rebind.

use std::rc::Rc;
use core::fmt;

use kurbo::Vec2;
use strata_engine::{
    GeoBounds, GeoPoint, InteractionClass, LayerKind, Projection, RenderHook, SourceSpec, StyleFn,
};
use strata_raster::{RampPayload, colorize_operation};
use strata_view::ViewDescriptor;

/// Callback receiving the committed position of a dragged overlay.
pub type CommitFn = Rc<dyn Fn(GeoPoint)>;

/// Identity of a node among its siblings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(String);

impl NodeKey {
    /// Creates a key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeKey {
    fn from(key: &str) -> Self {
        Self(key.into())
    }
}

impl From<String> for NodeKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Kind of scene node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Camera view.
    View,
    /// Layer group.
    Group,
    /// Layer.
    Layer,
    /// Positioned overlay.
    Overlay,
    /// Interaction blocker.
    Blocker,
}

/// Scalar properties of a layer group.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GroupDescriptor {
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
    /// Visibility.
    pub visible: bool,
    /// Stacking order within the parent.
    pub z_index: i32,
}

impl Default for GroupDescriptor {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            visible: true,
            z_index: 0,
        }
    }
}

/// In-place mutable properties of a layer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LayerProps {
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
    /// Visibility.
    pub visible: bool,
    /// Stacking order within the parent.
    pub z_index: i32,
    /// Rendering extent.
    pub extent: Option<GeoBounds>,
    /// Preload depth.
    pub preload: u32,
    /// Hidden at or below this zoom.
    pub min_zoom: Option<f64>,
    /// Hidden above this zoom.
    pub max_zoom: Option<f64>,
}

impl Default for LayerProps {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            visible: true,
            z_index: 0,
            extent: None,
            preload: 0,
            min_zoom: None,
            max_zoom: None,
        }
    }
}

/// Where a layer gets its data from.
///
/// Projections left as `None` follow the projection of the resolved view.
#[derive(Clone)]
pub enum LayerSource {
    /// Raster tiles.
    Tile {
        /// XYZ URL template.
        url: String,
        /// Projection of the tiles.
        projection: Option<Projection>,
    },
    /// Vector features from one document.
    Vector {
        /// Feature collection URL.
        url: String,
        /// Projection of the features.
        projection: Option<Projection>,
        /// Feature style.
        style: Option<StyleFn>,
    },
    /// Vector tiles.
    VectorTile {
        /// XYZ URL template.
        url: String,
        /// Projection of the tiles.
        projection: Option<Projection>,
        /// Feature style.
        style: Option<StyleFn>,
    },
    /// Elevation colorized from raster inputs.
    ColorizedRaster {
        /// XYZ URL templates of the inputs.
        inputs: Vec<String>,
        /// Colorization window and opacity.
        ramp: RampPayload,
    },
}

impl fmt::Debug for LayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tile { url, projection } => f
                .debug_struct("Tile")
                .field("url", url)
                .field("projection", projection)
                .finish(),
            Self::Vector {
                url,
                projection,
                style,
            } => f
                .debug_struct("Vector")
                .field("url", url)
                .field("projection", projection)
                .field("style", &style.is_some())
                .finish(),
            Self::VectorTile {
                url,
                projection,
                style,
            } => f
                .debug_struct("VectorTile")
                .field("url", url)
                .field("projection", projection)
                .field("style", &style.is_some())
                .finish(),
            Self::ColorizedRaster { inputs, ramp } => f
                .debug_struct("ColorizedRaster")
                .field("inputs", inputs)
                .field("ramp", ramp)
                .finish(),
        }
    }
}

impl LayerSource {
    /// Engine layer kind this source needs.
    #[must_use]
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Tile { .. } => LayerKind::Tile,
            Self::Vector { .. } => LayerKind::Vector,
            Self::VectorTile { .. } => LayerKind::VectorTile,
            Self::ColorizedRaster { .. } => LayerKind::Image,
        }
    }

    /// Engine source parameters, resolving unset projections to `view_projection`.
    #[must_use]
    pub fn spec(&self, view_projection: Projection) -> SourceSpec {
        match self {
            Self::Tile { url, projection } => SourceSpec::Tile {
                url: url.clone(),
                projection: projection.unwrap_or(view_projection),
            },
            Self::Vector {
                url, projection, ..
            } => SourceSpec::Vector {
                url: url.clone(),
                projection: projection.unwrap_or(view_projection),
            },
            Self::VectorTile {
                url, projection, ..
            } => SourceSpec::VectorTile {
                url: url.clone(),
                projection: projection.unwrap_or(view_projection),
            },
            Self::ColorizedRaster { inputs, .. } => SourceSpec::Raster {
                inputs: inputs.clone(),
                operation: colorize_operation,
            },
        }
    }

    /// Feature style, for vector sources.
    #[must_use]
    pub fn style(&self) -> Option<&StyleFn> {
        match self {
            Self::Vector { style, .. } | Self::VectorTile { style, .. } => style.as_ref(),
            Self::Tile { .. } | Self::ColorizedRaster { .. } => None,
        }
    }

    /// Colorization payload, for colorized rasters.
    #[must_use]
    pub fn ramp(&self) -> Option<RampPayload> {
        match self {
            Self::ColorizedRaster { ramp, .. } => Some(*ramp),
            _ => None,
        }
    }
}

/// Declarative description of a layer.
#[derive(Clone)]
pub struct LayerDescriptor {
    /// Data source.
    pub source: LayerSource,
    /// Bump to force a new source with unchanged parameters.
    pub revision: u64,
    /// In-place mutable properties.
    pub props: LayerProps,
    /// Hook run before the layer renders.
    pub pre_render: Option<RenderHook>,
    /// Hook run after the layer renders.
    pub post_render: Option<RenderHook>,
}

impl fmt::Debug for LayerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerDescriptor")
            .field("source", &self.source)
            .field("revision", &self.revision)
            .field("props", &self.props)
            .field("pre_render", &self.pre_render.is_some())
            .field("post_render", &self.post_render.is_some())
            .finish()
    }
}

impl LayerDescriptor {
    /// Creates a descriptor with default properties.
    #[must_use]
    pub fn new(source: LayerSource) -> Self {
        Self {
            source,
            revision: 0,
            props: LayerProps::default(),
            pre_render: None,
            post_render: None,
        }
    }

    /// Returns a copy with `props`.
    #[must_use]
    pub fn with_props(mut self, props: LayerProps) -> Self {
        self.props = props;
        self
    }

    /// Returns a copy with `revision`.
    #[must_use]
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Returns a copy with a post-render hook.
    #[must_use]
    pub fn with_post_render(mut self, hook: Option<RenderHook>) -> Self {
        self.post_render = hook;
        self
    }

    /// Returns a copy with a pre-render hook.
    #[must_use]
    pub fn with_pre_render(mut self, hook: Option<RenderHook>) -> Self {
        self.pre_render = hook;
        self
    }
}

/// Declarative description of an overlay pin.
#[derive(Clone)]
pub struct OverlayDescriptor {
    /// Anchor position.
    pub position: GeoPoint,
    /// Pixel offset from the anchor.
    pub offset: Vec2,
    /// Whether the user can drag the pin.
    pub draggable: bool,
    /// Called once with the final position when a drag ends.
    pub on_commit: Option<CommitFn>,
}

impl fmt::Debug for OverlayDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayDescriptor")
            .field("position", &self.position)
            .field("offset", &self.offset)
            .field("draggable", &self.draggable)
            .field("on_commit", &self.on_commit.is_some())
            .finish()
    }
}

impl OverlayDescriptor {
    /// Creates a non-draggable pin at `position`.
    #[must_use]
    pub fn new(position: GeoPoint) -> Self {
        Self {
            position,
            offset: Vec2::ZERO,
            draggable: false,
            on_commit: None,
        }
    }

    /// Returns a draggable copy reporting commits to `on_commit`.
    #[must_use]
    pub fn draggable(mut self, on_commit: CommitFn) -> Self {
        self.draggable = true;
        self.on_commit = Some(on_commit);
        self
    }

    /// Returns a copy with a pixel offset.
    #[must_use]
    pub fn with_offset(mut self, offset: Vec2) -> Self {
        self.offset = offset;
        self
    }
}

/// Kind-specific part of a [`SceneNode`].
#[derive(Clone, Debug)]
pub enum NodeDescriptor {
    /// Camera view.
    View(ViewDescriptor),
    /// Layer group.
    Group(GroupDescriptor),
    /// Layer.
    Layer(LayerDescriptor),
    /// Overlay pin.
    Overlay(OverlayDescriptor),
    /// Interaction blocker for one class.
    Blocker(InteractionClass),
}

impl NodeDescriptor {
    /// Kind of node this descriptor produces.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::View(_) => NodeKind::View,
            Self::Group(_) => NodeKind::Group,
            Self::Layer(_) => NodeKind::Layer,
            Self::Overlay(_) => NodeKind::Overlay,
            Self::Blocker(_) => NodeKind::Blocker,
        }
    }
}

/// One node of the declarative scene tree.
#[derive(Clone, Debug)]
pub struct SceneNode {
    /// Identity among siblings.
    pub key: NodeKey,
    /// What the node describes.
    pub descriptor: NodeDescriptor,
    /// Child nodes. Children of a view see it as their view; children of a
    /// group attach into it.
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    /// Creates a leaf node.
    #[must_use]
    pub fn new(key: impl Into<NodeKey>, descriptor: NodeDescriptor) -> Self {
        Self {
            key: key.into(),
            descriptor,
            children: Vec::new(),
        }
    }

    /// A view node.
    #[must_use]
    pub fn view(key: impl Into<NodeKey>, desc: ViewDescriptor) -> Self {
        Self::new(key, NodeDescriptor::View(desc))
    }

    /// A layer group node.
    #[must_use]
    pub fn group(key: impl Into<NodeKey>, desc: GroupDescriptor) -> Self {
        Self::new(key, NodeDescriptor::Group(desc))
    }

    /// A layer node.
    #[must_use]
    pub fn layer(key: impl Into<NodeKey>, desc: LayerDescriptor) -> Self {
        Self::new(key, NodeDescriptor::Layer(desc))
    }

    /// An overlay node.
    #[must_use]
    pub fn overlay(key: impl Into<NodeKey>, desc: OverlayDescriptor) -> Self {
        Self::new(key, NodeDescriptor::Overlay(desc))
    }

    /// An interaction blocker node.
    #[must_use]
    pub fn blocker(key: impl Into<NodeKey>, class: InteractionClass) -> Self {
        Self::new(key, NodeDescriptor::Blocker(class))
    }

    /// Returns a copy with `children`.
    #[must_use]
    pub fn with_children(mut self, children: Vec<Self>) -> Self {
        self.children = children;
        self
    }
}
