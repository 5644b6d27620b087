// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The imperative engine surface the scene layer drives.

use kurbo::{Point, Rect, Size, Vec2};
use smallvec::SmallVec;

use crate::error::EngineError;
use crate::event::{EngineEvent, EventType, InteractionClass};
use crate::geo::Projection;
use crate::id::{AnimationId, HandleId, InteractionId, ListenerKey};
use crate::source::{
    LayerKind, OperationData, RenderHook, RenderPhase, SourceSpec, StyleFn,
};

/// Construction parameters for an engine view.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewOptions {
    /// Native projection of the view.
    pub projection: Projection,
    /// Initial center in projected units.
    pub center: Point,
    /// Initial zoom level.
    pub zoom: f64,
    /// Initial rotation in radians.
    pub rotation: f64,
    /// Lower zoom limit.
    pub min_zoom: Option<f64>,
    /// Upper zoom limit.
    pub max_zoom: Option<f64>,
    /// Extent the center is constrained to, in projected units.
    pub extent: Option<Rect>,
}

/// Current camera of an engine view, in native units.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ViewSnapshot {
    /// Native projection.
    pub projection: Projection,
    /// Center in projected units.
    pub center: Point,
    /// Zoom level, already clamped to the view's limits.
    pub zoom: f64,
    /// Rotation in radians.
    pub rotation: f64,
}

/// Parameters for [`MapEngine::fit`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FitOptions {
    /// Size of the map viewport in pixels.
    pub size: Size,
    /// Padding kept free on every side, in pixels.
    pub padding: f64,
    /// Animation duration in milliseconds; `0` jumps immediately.
    pub duration_ms: u64,
}

/// Scalar properties shared by layers and layer groups.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LayerProperty {
    /// Opacity in `[0, 1]`.
    Opacity(f64),
    /// Visibility.
    Visible(bool),
    /// Stacking order within the parent; higher draws on top.
    ZIndex(i32),
    /// Rendering extent in projected units; nothing is drawn outside.
    Extent(Option<Rect>),
    /// Number of lower zoom levels to preload.
    Preload(u32),
    /// Zoom window outside which the layer is hidden.
    ZoomRange {
        /// Lower zoom bound.
        min: Option<f64>,
        /// Upper zoom bound.
        max: Option<f64>,
    },
}

/// Imperative, stateful map engine.
///
/// Every object the engine creates is identified by a [`HandleId`] and lives
/// until [`MapEngine::dispose`] is called for it. Engines keep their own
/// references to listeners and hooks; callers must remove them explicitly.
///
/// Setter calls on stale handles are ignored. Attaching a child that already
/// has a parent is a caller bug: detach first.
pub trait MapEngine {
    /// Returns `true` if `handle` refers to a live object.
    fn is_alive(&self, handle: HandleId) -> bool;

    /// Releases the object behind `handle`.
    ///
    /// Listeners and hooks registered on the object are dropped with it.
    fn dispose(&mut self, handle: HandleId);

    /// Size of the map viewport in pixels.
    fn map_size(&self, map: HandleId) -> Option<Size>;

    /// Creates a view.
    fn create_view(&mut self, options: &ViewOptions) -> HandleId;

    /// Installs `view` as the view of `map`, or clears it.
    fn set_map_view(&mut self, map: HandleId, view: Option<HandleId>);

    /// Returns the view currently installed on `map`.
    fn map_view(&self, map: HandleId) -> Option<HandleId>;

    /// Reads the current camera of `view`.
    fn view_snapshot(&self, view: HandleId) -> Option<ViewSnapshot>;

    /// Moves the center of `view`.
    fn set_center(&mut self, view: HandleId, center: Point);

    /// Changes the zoom of `view`; the engine clamps it to the zoom limits.
    fn set_zoom(&mut self, view: HandleId, zoom: f64);

    /// Changes the rotation of `view`.
    fn set_rotation(&mut self, view: HandleId, rotation: f64);

    /// Changes the zoom limits of `view`.
    fn set_zoom_limits(&mut self, view: HandleId, min: Option<f64>, max: Option<f64>);

    /// Constrains the center of `view` to `extent`.
    fn set_view_extent(&mut self, view: HandleId, extent: Option<Rect>);

    /// Starts a camera animation fitting `extent` into the viewport.
    ///
    /// Starting a fit interrupts any animation already running on `view`.
    /// The engine reports the end of the animation with
    /// [`EngineEvent::AnimationEnded`].
    fn fit(&mut self, view: HandleId, extent: Rect, options: FitOptions) -> AnimationId;

    /// Creates a data source.
    fn create_source(&mut self, spec: &SourceSpec) -> Result<HandleId, EngineError>;

    /// Writes the side-channel data read by a raster source's operation.
    fn set_operation_data(&mut self, source: HandleId, data: &OperationData);

    /// Creates a layer reading from `source`.
    fn create_layer(&mut self, kind: LayerKind, source: HandleId) -> HandleId;

    /// Replaces the source of `layer`, keeping the layer and its hooks.
    fn set_layer_source(&mut self, layer: HandleId, source: HandleId);

    /// Returns the source of `layer`.
    fn layer_source(&self, layer: HandleId) -> Option<HandleId>;

    /// Creates an empty layer group.
    fn create_group(&mut self) -> HandleId;

    /// Sets one scalar property of a layer or group.
    fn set_property(&mut self, target: HandleId, property: LayerProperty);

    /// Sets the style function of a vector layer.
    fn set_style(&mut self, layer: HandleId, style: Option<StyleFn>);

    /// Attaches `child` (a layer or group) to `parent` (a map or group).
    fn add_layer(&mut self, parent: HandleId, child: HandleId);

    /// Detaches `child` from `parent`. Returns `false` if it was not attached there.
    fn remove_layer(&mut self, parent: HandleId, child: HandleId) -> bool;

    /// Returns the map or group that currently holds `child`.
    fn parent_of(&self, child: HandleId) -> Option<HandleId>;

    /// Creates an overlay anchored at `position` (projected units).
    fn create_overlay(&mut self, position: Point, offset: Vec2) -> HandleId;

    /// Moves an overlay.
    fn set_overlay_position(&mut self, overlay: HandleId, position: Point);

    /// Changes the pixel offset of an overlay.
    fn set_overlay_offset(&mut self, overlay: HandleId, offset: Vec2);

    /// Returns the anchor of an overlay in projected units.
    fn overlay_position(&self, overlay: HandleId) -> Option<Point>;

    /// Adds an overlay to a map.
    fn add_overlay(&mut self, map: HandleId, overlay: HandleId);

    /// Removes an overlay from a map. Returns `false` if it was not there.
    fn remove_overlay(&mut self, map: HandleId, overlay: HandleId) -> bool;

    /// Returns the map that currently shows `overlay`.
    fn overlay_map(&self, overlay: HandleId) -> Option<HandleId>;

    /// Lists the interaction instances of `class` installed on `map`.
    fn interactions(&self, map: HandleId, class: InteractionClass) -> SmallVec<[InteractionId; 2]>;

    /// Returns whether an interaction instance is active.
    fn interaction_active(&self, map: HandleId, interaction: InteractionId) -> bool;

    /// Activates or deactivates an interaction instance.
    fn set_interaction_active(&mut self, map: HandleId, interaction: InteractionId, active: bool);

    /// Subscribes to `event` on `target`.
    fn listen(&mut self, target: HandleId, event: EventType) -> ListenerKey;

    /// Binds a render hook to `layer`.
    fn bind_render_hook(&mut self, layer: HandleId, phase: RenderPhase, hook: RenderHook)
    -> ListenerKey;

    /// Removes a listener or render hook. Returns `false` if the key was unknown.
    fn unlisten(&mut self, key: ListenerKey) -> bool;

    /// Converts a map pixel into projected units of the map's view.
    fn coordinate_from_pixel(&self, map: HandleId, pixel: Point) -> Option<Point>;

    /// Takes the events queued since the last call, in delivery order.
    fn drain_events(&mut self) -> Vec<EngineEvent>;
}
