// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A stateful, in-memory engine that records every mutation.
//!
//! [`HeadlessEngine`] keeps a real object graph (maps, views, layers, groups,
//! sources, overlays, interactions, listeners) and applies the same rules a
//! rendering engine does: zoom clamping, extent constraints, change events,
//! interruptible camera animations, and per-pixel raster operations.
//!
//! It does not draw. It is intended for tests, benchmarks, and for hosts that
//! want to assert on the exact engine calls a scene makes:
//! - [`HeadlessEngine::mutations`] lists every mutating call in order.
//! - `user_*` and `pointer_*` methods simulate interaction that originates
//!   inside the engine; they are not recorded as mutations.

use core::fmt;

use hashbrown::HashMap;
use kurbo::{Point, Rect, Size, Vec2};
use smallvec::SmallVec;

use crate::engine::{FitOptions, LayerProperty, MapEngine, ViewOptions, ViewSnapshot};
use crate::error::EngineError;
use crate::event::{
    EngineEvent, EventType, InteractionClass, ListenerEvent, PointerEvent, PointerKind,
};
use crate::geo::Projection;
use crate::id::{AnimationId, HandleId, InteractionId, ListenerKey};
use crate::source::{
    FeatureId, FeatureStyle, LayerKind, OperationData, RenderEvent, RenderHook, RenderPhase,
    SourceSpec, StyleFn,
};

/// Default lower zoom limit of a view.
const DEFAULT_MIN_ZOOM: f64 = 0.0;
/// Default upper zoom limit of a view.
const DEFAULT_MAX_ZOOM: f64 = 28.0;
/// Radius around an overlay anchor that counts as a hit, in pixels.
const OVERLAY_HIT_RADIUS: f64 = 16.0;

/// Kind of object behind a [`HandleId`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// Root map.
    Map,
    /// Camera view.
    View,
    /// Data source.
    Source,
    /// Layer.
    Layer,
    /// Layer group.
    Group,
    /// Positioned overlay.
    Overlay,
}

/// A mutating call recorded by [`HeadlessEngine`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MutationOp {
    /// An object was created.
    Create(HandleKind),
    /// An object was disposed.
    Dispose,
    /// A map's view was replaced.
    SetMapView,
    /// A view center was written.
    SetCenter,
    /// A view zoom was written.
    SetZoom,
    /// A view rotation was written.
    SetRotation,
    /// View zoom limits were written.
    SetZoomLimits,
    /// A view extent was written.
    SetViewExtent,
    /// A camera fit was started.
    Fit,
    /// Raster operation data was written.
    SetOperationData,
    /// A layer's source was swapped.
    SetLayerSource,
    /// A scalar layer or group property was written.
    SetProperty,
    /// A vector style was written.
    SetStyle,
    /// A child was attached.
    AddLayer,
    /// A child was detached.
    RemoveLayer,
    /// An overlay was moved.
    SetOverlayPosition,
    /// An overlay offset was written.
    SetOverlayOffset,
    /// An overlay was added to a map.
    AddOverlay,
    /// An overlay was removed from a map.
    RemoveOverlay,
    /// An interaction was toggled.
    SetInteractionActive,
    /// A listener or hook was registered.
    Listen,
    /// A listener or hook was removed.
    Unlisten,
}

/// One entry of the mutation log.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Mutation {
    /// Object the call targeted. For [`MutationOp::Unlisten`] this is the
    /// object the listener was registered on.
    pub target: HandleId,
    /// The call.
    pub op: MutationOp,
}

/// Scalar state of a layer or group.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LayerState {
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
    /// Visibility.
    pub visible: bool,
    /// Stacking order within the parent.
    pub z_index: i32,
    /// Rendering extent in projected units.
    pub extent: Option<Rect>,
    /// Preload depth.
    pub preload: u32,
    /// Lower zoom bound.
    pub min_zoom: Option<f64>,
    /// Upper zoom bound.
    pub max_zoom: Option<f64>,
}

impl Default for LayerState {
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

impl LayerState {
    fn apply(&mut self, property: LayerProperty) {
        match property {
            LayerProperty::Opacity(v) => self.opacity = v.clamp(0.0, 1.0),
            LayerProperty::Visible(v) => self.visible = v,
            LayerProperty::ZIndex(v) => self.z_index = v,
            LayerProperty::Extent(v) => self.extent = v,
            LayerProperty::Preload(v) => self.preload = v,
            LayerProperty::ZoomRange { min, max } => {
                self.min_zoom = min;
                self.max_zoom = max;
            }
        }
    }

    fn shows_at(&self, zoom: f64) -> bool {
        self.visible
            && self.min_zoom.is_none_or(|min| zoom > min)
            && self.max_zoom.is_none_or(|max| zoom <= max)
    }
}

#[derive(Clone, Debug)]
struct Interaction {
    class: InteractionClass,
    active: bool,
}

#[derive(Clone, Debug)]
struct MapObject {
    size: Size,
    view: Option<HandleId>,
    layers: Vec<HandleId>,
    overlays: Vec<HandleId>,
    interactions: Vec<Interaction>,
}

#[derive(Copy, Clone, Debug)]
struct PendingFit {
    id: AnimationId,
    center: Point,
    zoom: f64,
}

#[derive(Clone, Debug)]
struct ViewObject {
    projection: Projection,
    center: Point,
    zoom: f64,
    rotation: f64,
    min_zoom: f64,
    max_zoom: f64,
    extent: Option<Rect>,
    animation: Option<PendingFit>,
}

impl ViewObject {
    fn constrain_center(&self, center: Point) -> Point {
        match self.extent {
            Some(e) => Point::new(center.x.clamp(e.x0, e.x1), center.y.clamp(e.y0, e.y1)),
            None => center,
        }
    }

    fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            projection: self.projection,
            center: self.center,
            zoom: self.zoom,
            rotation: self.rotation,
        }
    }
}

#[derive(Clone, Debug)]
struct SourceObject {
    spec: SourceSpec,
    data: OperationData,
}

#[derive(Clone)]
struct LayerObject {
    kind: LayerKind,
    source: HandleId,
    parent: Option<HandleId>,
    state: LayerState,
    style: Option<StyleFn>,
}

impl fmt::Debug for LayerObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerObject")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("parent", &self.parent)
            .field("state", &self.state)
            .field("style", &self.style.is_some())
            .finish()
    }
}

#[derive(Clone, Debug)]
struct GroupObject {
    children: Vec<HandleId>,
    parent: Option<HandleId>,
    state: LayerState,
}

#[derive(Clone, Debug)]
struct OverlayObject {
    position: Point,
    offset: Vec2,
    map: Option<HandleId>,
}

#[derive(Clone, Debug)]
enum Object {
    Map(MapObject),
    View(ViewObject),
    Source(SourceObject),
    Layer(LayerObject),
    Group(GroupObject),
    Overlay(OverlayObject),
}

impl Object {
    fn kind(&self) -> HandleKind {
        match self {
            Self::Map(_) => HandleKind::Map,
            Self::View(_) => HandleKind::View,
            Self::Source(_) => HandleKind::Source,
            Self::Layer(_) => HandleKind::Layer,
            Self::Group(_) => HandleKind::Group,
            Self::Overlay(_) => HandleKind::Overlay,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Slot {
    generation: u32,
    object: Option<Object>,
}

#[derive(Clone)]
enum Listener {
    Event {
        target: HandleId,
        event: EventType,
    },
    Render {
        layer: HandleId,
        phase: RenderPhase,
        hook: RenderHook,
    },
}

impl Listener {
    fn target(&self) -> HandleId {
        match self {
            Self::Event { target, .. } => *target,
            Self::Render { layer, .. } => *layer,
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event { target, event } => f
                .debug_struct("Event")
                .field("target", target)
                .field("event", event)
                .finish(),
            Self::Render { layer, phase, .. } => f
                .debug_struct("Render")
                .field("layer", layer)
                .field("phase", phase)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Press {
    map: HandleId,
    last: Point,
    panned: bool,
}

/// In-memory engine that applies engine rules and records every mutation.
///
/// See the [module docs](self) for details.
#[derive(Debug, Default)]
pub struct HeadlessEngine {
    slots: Vec<Slot>,
    free: Vec<u32>,
    listeners: HashMap<ListenerKey, Listener>,
    next_listener: u64,
    next_animation: u64,
    events: Vec<EngineEvent>,
    mutations: Vec<Mutation>,
    frame: u64,
    press: Option<Press>,
}

impl HeadlessEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a root map with the default interaction set.
    ///
    /// Root maps belong to the host, so this is not part of [`MapEngine`].
    pub fn create_map(&mut self, size: Size) -> HandleId {
        let interactions = [
            InteractionClass::DragPan,
            InteractionClass::DragRotate,
            InteractionClass::DoubleClickZoom,
            InteractionClass::MouseWheelZoom,
            InteractionClass::PinchZoom,
            InteractionClass::KeyboardPan,
        ]
        .into_iter()
        .map(|class| Interaction {
            class,
            active: true,
        })
        .collect();
        self.alloc(Object::Map(MapObject {
            size,
            view: None,
            layers: Vec::new(),
            overlays: Vec::new(),
            interactions,
        }))
    }

    /// Installs an additional interaction on `map`.
    pub fn add_interaction(&mut self, map: HandleId, class: InteractionClass) -> InteractionId {
        let Some(m) = self.map_mut(map) else {
            return InteractionId(u32::MAX);
        };
        m.interactions.push(Interaction {
            class,
            active: true,
        });
        InteractionId(index_u32(m.interactions.len() - 1))
    }

    /// Returns the kind of a live handle.
    #[must_use]
    pub fn kind_of(&self, handle: HandleId) -> Option<HandleKind> {
        self.get(handle).map(Object::kind)
    }

    /// Number of live objects of `kind`.
    #[must_use]
    pub fn live_count(&self, kind: HandleKind) -> usize {
        self.slots
            .iter()
            .filter_map(|s| s.object.as_ref())
            .filter(|o| o.kind() == kind)
            .count()
    }

    /// Mutations recorded since creation or the last [`clear_mutations`](Self::clear_mutations).
    #[must_use]
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Number of recorded mutations.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.mutations.len()
    }

    /// Clears the mutation log.
    pub fn clear_mutations(&mut self) {
        self.mutations.clear();
    }

    /// Number of registered listeners and hooks.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of listeners and hooks registered on `target`.
    #[must_use]
    pub fn listeners_on(&self, target: HandleId) -> usize {
        self.listeners
            .values()
            .filter(|l| l.target() == target)
            .count()
    }

    /// Direct children of a map or group, in attach order.
    #[must_use]
    pub fn children(&self, parent: HandleId) -> &[HandleId] {
        match self.get(parent) {
            Some(Object::Map(m)) => &m.layers,
            Some(Object::Group(g)) => &g.children,
            _ => &[],
        }
    }

    /// Scalar state of a layer or group.
    #[must_use]
    pub fn layer_state(&self, handle: HandleId) -> Option<LayerState> {
        match self.get(handle)? {
            Object::Layer(l) => Some(l.state),
            Object::Group(g) => Some(g.state),
            _ => None,
        }
    }

    /// Kind of a layer.
    #[must_use]
    pub fn layer_kind(&self, layer: HandleId) -> Option<LayerKind> {
        match self.get(layer)? {
            Object::Layer(l) => Some(l.kind),
            _ => None,
        }
    }

    /// Construction parameters of a source.
    #[must_use]
    pub fn source_spec(&self, source: HandleId) -> Option<&SourceSpec> {
        match self.get(source)? {
            Object::Source(s) => Some(&s.spec),
            _ => None,
        }
    }

    /// Current side-channel data of a source.
    #[must_use]
    pub fn operation_data(&self, source: HandleId) -> Option<&OperationData> {
        match self.get(source)? {
            Object::Source(s) => Some(&s.data),
            _ => None,
        }
    }

    /// Evaluates the style function of a vector layer for one feature.
    #[must_use]
    pub fn style_feature(&self, layer: HandleId, feature: FeatureId) -> Option<FeatureStyle> {
        let Object::Layer(l) = self.get(layer)? else {
            return None;
        };
        let style = l.style.as_ref()?;
        let resolution = self
            .layer_map(layer)
            .and_then(|map| self.map_view(map))
            .and_then(|view| self.view_snapshot(view))
            .map_or(1.0, |s| s.projection.resolution(s.zoom));
        Some(style(feature, resolution))
    }

    /// Whether `layer` has a style function.
    #[must_use]
    pub fn has_style(&self, layer: HandleId) -> bool {
        matches!(self.get(layer), Some(Object::Layer(l)) if l.style.is_some())
    }

    /// Overlays shown on `map`.
    #[must_use]
    pub fn overlays(&self, map: HandleId) -> &[HandleId] {
        match self.get(map) {
            Some(Object::Map(m)) => &m.overlays,
            _ => &[],
        }
    }

    /// Whether an animation is running on `view`.
    #[must_use]
    pub fn is_animating(&self, view: HandleId) -> bool {
        matches!(self.get(view), Some(Object::View(v)) if v.animation.is_some())
    }

    /// Layers of `map` in draw order, with groups flattened.
    ///
    /// Siblings are ordered by z-index, ties by attach order.
    #[must_use]
    pub fn render_order(&self, map: HandleId) -> Vec<HandleId> {
        let mut out = Vec::new();
        self.collect_render_order(map, &mut out);
        out
    }

    fn collect_render_order(&self, parent: HandleId, out: &mut Vec<HandleId>) {
        let mut children: Vec<(i32, usize, HandleId)> = self
            .children(parent)
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| Some((self.layer_state(c)?.z_index, i, c)))
            .collect();
        children.sort_by_key(|&(z, i, _)| (z, i));
        for (_, _, child) in children {
            match self.get(child) {
                Some(Object::Group(_)) => self.collect_render_order(child, out),
                Some(Object::Layer(_)) => out.push(child),
                _ => {}
            }
        }
    }

    /// Renders one frame of every map: runs render hooks for each shown layer.
    ///
    /// Returns the number of layers rendered.
    pub fn render_frame(&mut self) -> usize {
        self.frame += 1;
        let maps: Vec<HandleId> = self.handles_of(HandleKind::Map);
        let mut rendered = 0;
        for map in maps {
            let zoom = self
                .map_view(map)
                .and_then(|v| self.view_snapshot(v))
                .map_or(0.0, |s| s.zoom);
            for layer in self.render_order(map) {
                if !self.effectively_shown(layer, zoom) {
                    continue;
                }
                rendered += 1;
                for phase in [RenderPhase::PreRender, RenderPhase::PostRender] {
                    let event = RenderEvent {
                        layer,
                        phase,
                        frame: self.frame,
                    };
                    for hook in self.hooks_for(layer, phase) {
                        hook(&event);
                    }
                }
            }
        }
        rendered
    }

    /// Runs the pixel operation of a raster layer's source over `pixels`.
    ///
    /// Returns `None` if `layer` does not read from a raster source.
    #[must_use]
    pub fn render_raster(&self, layer: HandleId, pixels: &[[u8; 4]]) -> Option<Vec<[u8; 4]>> {
        let source = self.layer_source(layer)?;
        let Object::Source(s) = self.get(source)? else {
            return None;
        };
        let SourceSpec::Raster { operation, .. } = &s.spec else {
            return None;
        };
        Some(pixels.iter().map(|&px| operation(px, &s.data)).collect())
    }

    /// Simulates the user rotating `view`.
    pub fn user_rotate(&mut self, view: HandleId, rotation: f64) {
        let Some(v) = self.view_mut(view) else {
            return;
        };
        if v.rotation == rotation {
            return;
        }
        v.rotation = rotation;
        self.notify(
            view,
            EventType::RotationChange,
            ListenerEvent::RotationChanged(rotation),
        );
    }

    /// Simulates the user panning and zooming `view` to a new camera.
    pub fn user_move(&mut self, view: HandleId, center: Point, zoom: f64) {
        let Some(v) = self.view_mut(view) else {
            return;
        };
        let center = v.constrain_center(center);
        let zoom = zoom.clamp(v.min_zoom, v.max_zoom);
        if v.center == center && v.zoom == zoom {
            return;
        }
        v.center = center;
        v.zoom = zoom;
        self.notify(view, EventType::MoveEnd, ListenerEvent::MoveEnd);
    }

    /// Simulates a pointer press on `map`.
    ///
    /// Listeners on an overlay under the pointer and on the map are notified.
    pub fn pointer_down(&mut self, map: HandleId, pixel: Point) {
        let event = ListenerEvent::Pointer(PointerEvent {
            kind: PointerKind::Down,
            pixel,
        });
        if let Some(overlay) = self.overlay_at(map, pixel) {
            self.notify(overlay, EventType::PointerDown, event);
        }
        self.notify(map, EventType::PointerDown, event);
        self.press = Some(Press {
            map,
            last: pixel,
            panned: false,
        });
    }

    /// Simulates a pointer move on `map`.
    ///
    /// While pressed, the view pans if a drag-pan interaction is active.
    pub fn pointer_move(&mut self, map: HandleId, pixel: Point) {
        self.notify(
            map,
            EventType::PointerMove,
            ListenerEvent::Pointer(PointerEvent {
                kind: PointerKind::Move,
                pixel,
            }),
        );
        let Some(mut press) = self.press.filter(|p| p.map == map) else {
            return;
        };
        if self.drag_pan_active(map) {
            if let (Some(from), Some(to), Some(view)) = (
                self.coordinate_from_pixel(map, press.last),
                self.coordinate_from_pixel(map, pixel),
                self.map_view(map),
            ) {
                if let Some(v) = self.view_mut(view) {
                    v.center = v.constrain_center(v.center + (from - to));
                    press.panned = true;
                }
            }
        }
        press.last = pixel;
        self.press = Some(press);
    }

    /// Simulates a pointer release on `map`.
    pub fn pointer_up(&mut self, map: HandleId, pixel: Point) {
        self.notify(
            map,
            EventType::PointerUp,
            ListenerEvent::Pointer(PointerEvent {
                kind: PointerKind::Up,
                pixel,
            }),
        );
        if let Some(press) = self.press.take() {
            if press.panned {
                if let Some(view) = self.map_view(press.map) {
                    self.notify(view, EventType::MoveEnd, ListenerEvent::MoveEnd);
                }
            }
        }
    }

    /// Completes every running animation at its target.
    pub fn finish_animations(&mut self) {
        for view in self.handles_of(HandleKind::View) {
            let Some(v) = self.view_mut(view) else {
                continue;
            };
            let Some(fit) = v.animation.take() else {
                continue;
            };
            let moved = v.center != fit.center || v.zoom != fit.zoom;
            v.center = fit.center;
            v.zoom = fit.zoom;
            self.events.push(EngineEvent::AnimationEnded {
                view,
                animation: fit.id,
                completed: true,
            });
            if moved {
                self.notify(view, EventType::MoveEnd, ListenerEvent::MoveEnd);
            }
        }
    }

    /// Interrupts every running animation without reaching its target.
    pub fn interrupt_animations(&mut self) {
        for view in self.handles_of(HandleKind::View) {
            self.interrupt(view);
        }
    }

    /// Pixel position of a projected coordinate on `map`.
    #[must_use]
    pub fn pixel_from_coordinate(&self, map: HandleId, coordinate: Point) -> Option<Point> {
        let size = self.map_size(map)?;
        let view = self.view_snapshot(self.map_view(map)?)?;
        let res = view.projection.resolution(view.zoom);
        let d = coordinate - view.center;
        let (sin, cos) = view.rotation.sin_cos();
        // Undo the view rotation, then flip y into screen space.
        let dx = d.x * cos + d.y * sin;
        let dy = -d.x * sin + d.y * cos;
        Some(Point::new(
            size.width / 2.0 + dx / res,
            size.height / 2.0 - dy / res,
        ))
    }

    fn interrupt(&mut self, view: HandleId) {
        let Some(v) = self.view_mut(view) else {
            return;
        };
        if let Some(fit) = v.animation.take() {
            self.events.push(EngineEvent::AnimationEnded {
                view,
                animation: fit.id,
                completed: false,
            });
        }
    }

    fn drag_pan_active(&self, map: HandleId) -> bool {
        match self.get(map) {
            Some(Object::Map(m)) => m
                .interactions
                .iter()
                .any(|i| i.class == InteractionClass::DragPan && i.active),
            _ => false,
        }
    }

    fn overlay_at(&self, map: HandleId, pixel: Point) -> Option<HandleId> {
        self.overlays(map).iter().rev().copied().find(|&overlay| {
            let Some(Object::Overlay(o)) = self.get(overlay) else {
                return false;
            };
            self.pixel_from_coordinate(map, o.position)
                .is_some_and(|anchor| (anchor + o.offset).distance(pixel) <= OVERLAY_HIT_RADIUS)
        })
    }

    fn effectively_shown(&self, layer: HandleId, zoom: f64) -> bool {
        let mut current = Some(layer);
        while let Some(h) = current {
            let (state, parent) = match self.get(h) {
                Some(Object::Layer(l)) => (l.state, l.parent),
                Some(Object::Group(g)) => (g.state, g.parent),
                _ => return true,
            };
            if !state.shows_at(zoom) {
                return false;
            }
            current = parent;
        }
        true
    }

    fn layer_map(&self, layer: HandleId) -> Option<HandleId> {
        let mut current = self.parent_of(layer)?;
        loop {
            match self.get(current)? {
                Object::Map(_) => return Some(current),
                Object::Group(g) => current = g.parent?,
                _ => return None,
            }
        }
    }

    fn hooks_for(&self, layer: HandleId, phase: RenderPhase) -> Vec<RenderHook> {
        let mut hooks: Vec<(ListenerKey, RenderHook)> = self
            .listeners
            .iter()
            .filter_map(|(k, l)| match l {
                Listener::Render {
                    layer: target,
                    phase: p,
                    hook,
                } if *target == layer && *p == phase => Some((*k, hook.clone())),
                _ => None,
            })
            .collect();
        hooks.sort_by_key(|(k, _)| *k);
        hooks.into_iter().map(|(_, h)| h).collect()
    }

    fn handles_of(&self, kind: HandleKind) -> Vec<HandleId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                let o = s.object.as_ref()?;
                (o.kind() == kind).then(|| HandleId::new(index_u32(i), s.generation))
            })
            .collect()
    }

    /// Queues `event` for every listener of `event_type` on `target`.
    ///
    /// Move-end notifications are coalesced: a listener never has two
    /// undelivered move-ends queued.
    fn notify(&mut self, target: HandleId, event_type: EventType, event: ListenerEvent) {
        let mut keys: SmallVec<[ListenerKey; 4]> = self
            .listeners
            .iter()
            .filter_map(|(k, l)| match l {
                Listener::Event { target: t, event: e } if *t == target && *e == event_type => {
                    Some(*k)
                }
                _ => None,
            })
            .collect();
        keys.sort_unstable();
        for key in keys {
            let queued = EngineEvent::Listener { key, target, event };
            if event == ListenerEvent::MoveEnd && self.events.contains(&queued) {
                continue;
            }
            self.events.push(queued);
        }
    }

    fn record(&mut self, target: HandleId, op: MutationOp) {
        self.mutations.push(Mutation { target, op });
    }

    fn alloc(&mut self, object: Object) -> HandleId {
        let kind = object.kind();
        let id = if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.object = Some(object);
            HandleId::new(idx, slot.generation)
        } else {
            self.slots.push(Slot {
                generation: 1,
                object: Some(object),
            });
            HandleId::new(index_u32(self.slots.len() - 1), 1)
        };
        self.record(id, MutationOp::Create(kind));
        id
    }

    fn get(&self, handle: HandleId) -> Option<&Object> {
        let slot = self.slots.get(handle.idx())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.object.as_ref()
    }

    fn get_mut(&mut self, handle: HandleId) -> Option<&mut Object> {
        let slot = self.slots.get_mut(handle.idx())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.object.as_mut()
    }

    fn map_mut(&mut self, map: HandleId) -> Option<&mut MapObject> {
        match self.get_mut(map)? {
            Object::Map(m) => Some(m),
            _ => None,
        }
    }

    fn view_mut(&mut self, view: HandleId) -> Option<&mut ViewObject> {
        match self.get_mut(view)? {
            Object::View(v) => Some(v),
            _ => None,
        }
    }

    fn set_parent(&mut self, child: HandleId, parent: Option<HandleId>) {
        match self.get_mut(child) {
            Some(Object::Layer(l)) => l.parent = parent,
            Some(Object::Group(g)) => g.parent = parent,
            _ => {}
        }
    }

    fn children_mut(&mut self, parent: HandleId) -> Option<&mut Vec<HandleId>> {
        match self.get_mut(parent)? {
            Object::Map(m) => Some(&mut m.layers),
            Object::Group(g) => Some(&mut g.children),
            _ => None,
        }
    }

    /// Writes a view field and emits the change notification if it moved.
    fn write_view(&mut self, view: HandleId, op: MutationOp, f: impl FnOnce(&mut ViewObject)) {
        if self.get(view).is_none() {
            return;
        }
        self.record(view, op);
        if matches!(op, MutationOp::SetCenter | MutationOp::SetZoom) {
            self.interrupt(view);
        }
        let Some(v) = self.view_mut(view) else {
            return;
        };
        let before = v.snapshot();
        f(v);
        v.zoom = v.zoom.clamp(v.min_zoom, v.max_zoom);
        v.center = v.constrain_center(v.center);
        let after = v.snapshot();
        if before.rotation != after.rotation {
            self.notify(
                view,
                EventType::RotationChange,
                ListenerEvent::RotationChanged(after.rotation),
            );
        }
        if before.center != after.center || before.zoom != after.zoom {
            self.notify(view, EventType::MoveEnd, ListenerEvent::MoveEnd);
        }
    }
}

fn index_u32(i: usize) -> u32 {
    u32::try_from(i).unwrap_or(u32::MAX)
}

impl MapEngine for HeadlessEngine {
    fn is_alive(&self, handle: HandleId) -> bool {
        self.get(handle).is_some()
    }

    fn dispose(&mut self, handle: HandleId) {
        debug_assert!(self.is_alive(handle), "dispose of stale handle {handle:?}");
        let Some(object) = self
            .slots
            .get_mut(handle.idx())
            .filter(|s| s.generation == handle.generation())
            .and_then(|s| s.object.take())
        else {
            return;
        };
        self.record(handle, MutationOp::Dispose);
        self.free.push(handle.slot());
        self.listeners.retain(|_, l| l.target() != handle);
        match object {
            Object::Map(m) => {
                for child in m.layers {
                    self.set_parent(child, None);
                }
                for overlay in m.overlays {
                    if let Some(Object::Overlay(o)) = self.get_mut(overlay) {
                        o.map = None;
                    }
                }
            }
            Object::Group(g) => {
                for child in g.children {
                    self.set_parent(child, None);
                }
                if let Some(list) = g.parent.and_then(|p| self.children_mut(p)) {
                    list.retain(|&c| c != handle);
                }
            }
            Object::Layer(l) => {
                if let Some(list) = l.parent.and_then(|p| self.children_mut(p)) {
                    list.retain(|&c| c != handle);
                }
            }
            Object::Overlay(o) => {
                if let Some(m) = o.map.and_then(|m| self.map_mut(m)) {
                    m.overlays.retain(|&c| c != handle);
                }
            }
            Object::View(_) => {
                for map in self.handles_of(HandleKind::Map) {
                    if let Some(m) = self.map_mut(map) {
                        if m.view == Some(handle) {
                            m.view = None;
                        }
                    }
                }
            }
            Object::Source(_) => {}
        }
    }

    fn map_size(&self, map: HandleId) -> Option<Size> {
        match self.get(map)? {
            Object::Map(m) => Some(m.size),
            _ => None,
        }
    }

    fn create_view(&mut self, options: &ViewOptions) -> HandleId {
        let min_zoom = options.min_zoom.unwrap_or(DEFAULT_MIN_ZOOM);
        let max_zoom = options.max_zoom.unwrap_or(DEFAULT_MAX_ZOOM);
        let mut view = ViewObject {
            projection: options.projection,
            center: options.center,
            zoom: options.zoom.clamp(min_zoom, max_zoom),
            rotation: options.rotation,
            min_zoom,
            max_zoom,
            extent: options.extent,
            animation: None,
        };
        view.center = view.constrain_center(view.center);
        self.alloc(Object::View(view))
    }

    fn set_map_view(&mut self, map: HandleId, view: Option<HandleId>) {
        if self.get(map).is_none() {
            return;
        }
        self.record(map, MutationOp::SetMapView);
        if let Some(m) = self.map_mut(map) {
            m.view = view;
        }
    }

    fn map_view(&self, map: HandleId) -> Option<HandleId> {
        match self.get(map)? {
            Object::Map(m) => m.view.filter(|&v| self.is_alive(v)),
            _ => None,
        }
    }

    fn view_snapshot(&self, view: HandleId) -> Option<ViewSnapshot> {
        match self.get(view)? {
            Object::View(v) => Some(v.snapshot()),
            _ => None,
        }
    }

    fn set_center(&mut self, view: HandleId, center: Point) {
        self.write_view(view, MutationOp::SetCenter, |v| v.center = center);
    }

    fn set_zoom(&mut self, view: HandleId, zoom: f64) {
        self.write_view(view, MutationOp::SetZoom, |v| v.zoom = zoom);
    }

    fn set_rotation(&mut self, view: HandleId, rotation: f64) {
        self.write_view(view, MutationOp::SetRotation, |v| v.rotation = rotation);
    }

    fn set_zoom_limits(&mut self, view: HandleId, min: Option<f64>, max: Option<f64>) {
        self.write_view(view, MutationOp::SetZoomLimits, |v| {
            v.min_zoom = min.unwrap_or(DEFAULT_MIN_ZOOM);
            v.max_zoom = max.unwrap_or(DEFAULT_MAX_ZOOM).max(v.min_zoom);
        });
    }

    fn set_view_extent(&mut self, view: HandleId, extent: Option<Rect>) {
        self.write_view(view, MutationOp::SetViewExtent, |v| v.extent = extent);
    }

    fn fit(&mut self, view: HandleId, extent: Rect, options: FitOptions) -> AnimationId {
        self.next_animation += 1;
        let id = AnimationId(self.next_animation);
        if self.get(view).is_none() {
            return id;
        }
        self.record(view, MutationOp::Fit);
        self.interrupt(view);
        let Some(v) = self.view_mut(view) else {
            return id;
        };
        let avail_w = (options.size.width - 2.0 * options.padding).max(1.0);
        let avail_h = (options.size.height - 2.0 * options.padding).max(1.0);
        let res = (extent.width() / avail_w).max(extent.height() / avail_h);
        let zoom = v
            .projection
            .zoom_for_resolution(res)
            .clamp(v.min_zoom, v.max_zoom);
        let center = v.constrain_center(extent.center());
        if options.duration_ms == 0 {
            let moved = v.center != center || v.zoom != zoom;
            v.center = center;
            v.zoom = zoom;
            self.events.push(EngineEvent::AnimationEnded {
                view,
                animation: id,
                completed: true,
            });
            if moved {
                self.notify(view, EventType::MoveEnd, ListenerEvent::MoveEnd);
            }
        } else {
            v.animation = Some(PendingFit { id, center, zoom });
        }
        id
    }

    fn create_source(&mut self, spec: &SourceSpec) -> Result<HandleId, EngineError> {
        spec.validate()?;
        Ok(self.alloc(Object::Source(SourceObject {
            spec: spec.clone(),
            data: OperationData::default(),
        })))
    }

    fn set_operation_data(&mut self, source: HandleId, data: &OperationData) {
        if let Some(Object::Source(s)) = self.get_mut(source) {
            s.data = data.clone();
            self.record(source, MutationOp::SetOperationData);
        }
    }

    fn create_layer(&mut self, kind: LayerKind, source: HandleId) -> HandleId {
        self.alloc(Object::Layer(LayerObject {
            kind,
            source,
            parent: None,
            state: LayerState::default(),
            style: None,
        }))
    }

    fn set_layer_source(&mut self, layer: HandleId, source: HandleId) {
        if let Some(Object::Layer(l)) = self.get_mut(layer) {
            l.source = source;
            self.record(layer, MutationOp::SetLayerSource);
        }
    }

    fn layer_source(&self, layer: HandleId) -> Option<HandleId> {
        match self.get(layer)? {
            Object::Layer(l) => Some(l.source),
            _ => None,
        }
    }

    fn create_group(&mut self) -> HandleId {
        self.alloc(Object::Group(GroupObject {
            children: Vec::new(),
            parent: None,
            state: LayerState::default(),
        }))
    }

    fn set_property(&mut self, target: HandleId, property: LayerProperty) {
        let applied = match self.get_mut(target) {
            Some(Object::Layer(l)) => {
                l.state.apply(property);
                true
            }
            Some(Object::Group(g)) => {
                g.state.apply(property);
                true
            }
            _ => false,
        };
        if applied {
            self.record(target, MutationOp::SetProperty);
        }
    }

    fn set_style(&mut self, layer: HandleId, style: Option<StyleFn>) {
        if let Some(Object::Layer(l)) = self.get_mut(layer) {
            l.style = style;
            self.record(layer, MutationOp::SetStyle);
        }
    }

    fn add_layer(&mut self, parent: HandleId, child: HandleId) {
        debug_assert!(
            self.parent_of(child).is_none(),
            "{child:?} is already attached to {:?}",
            self.parent_of(child)
        );
        if self.get(child).is_none() {
            return;
        }
        let Some(list) = self.children_mut(parent) else {
            return;
        };
        list.push(child);
        self.set_parent(child, Some(parent));
        self.record(parent, MutationOp::AddLayer);
    }

    fn remove_layer(&mut self, parent: HandleId, child: HandleId) -> bool {
        let Some(list) = self.children_mut(parent) else {
            return false;
        };
        let before = list.len();
        list.retain(|&c| c != child);
        if list.len() == before {
            return false;
        }
        self.set_parent(child, None);
        self.record(parent, MutationOp::RemoveLayer);
        true
    }

    fn parent_of(&self, child: HandleId) -> Option<HandleId> {
        match self.get(child)? {
            Object::Layer(l) => l.parent,
            Object::Group(g) => g.parent,
            _ => None,
        }
    }

    fn create_overlay(&mut self, position: Point, offset: Vec2) -> HandleId {
        self.alloc(Object::Overlay(OverlayObject {
            position,
            offset,
            map: None,
        }))
    }

    fn set_overlay_position(&mut self, overlay: HandleId, position: Point) {
        if let Some(Object::Overlay(o)) = self.get_mut(overlay) {
            o.position = position;
            self.record(overlay, MutationOp::SetOverlayPosition);
        }
    }

    fn set_overlay_offset(&mut self, overlay: HandleId, offset: Vec2) {
        if let Some(Object::Overlay(o)) = self.get_mut(overlay) {
            o.offset = offset;
            self.record(overlay, MutationOp::SetOverlayOffset);
        }
    }

    fn overlay_position(&self, overlay: HandleId) -> Option<Point> {
        match self.get(overlay)? {
            Object::Overlay(o) => Some(o.position),
            _ => None,
        }
    }

    fn add_overlay(&mut self, map: HandleId, overlay: HandleId) {
        if !matches!(self.get(overlay), Some(Object::Overlay(_))) {
            return;
        }
        let Some(m) = self.map_mut(map) else {
            return;
        };
        m.overlays.push(overlay);
        if let Some(Object::Overlay(o)) = self.get_mut(overlay) {
            o.map = Some(map);
        }
        self.record(map, MutationOp::AddOverlay);
    }

    fn remove_overlay(&mut self, map: HandleId, overlay: HandleId) -> bool {
        let Some(m) = self.map_mut(map) else {
            return false;
        };
        let before = m.overlays.len();
        m.overlays.retain(|&o| o != overlay);
        if m.overlays.len() == before {
            return false;
        }
        if let Some(Object::Overlay(o)) = self.get_mut(overlay) {
            o.map = None;
        }
        self.record(map, MutationOp::RemoveOverlay);
        true
    }

    fn overlay_map(&self, overlay: HandleId) -> Option<HandleId> {
        match self.get(overlay)? {
            Object::Overlay(o) => o.map,
            _ => None,
        }
    }

    fn interactions(&self, map: HandleId, class: InteractionClass) -> SmallVec<[InteractionId; 2]> {
        match self.get(map) {
            Some(Object::Map(m)) => m
                .interactions
                .iter()
                .enumerate()
                .filter(|(_, i)| i.class == class)
                .map(|(idx, _)| InteractionId(index_u32(idx)))
                .collect(),
            _ => SmallVec::new(),
        }
    }

    fn interaction_active(&self, map: HandleId, interaction: InteractionId) -> bool {
        match self.get(map) {
            Some(Object::Map(m)) => m
                .interactions
                .get(interaction.0 as usize)
                .is_some_and(|i| i.active),
            _ => false,
        }
    }

    fn set_interaction_active(&mut self, map: HandleId, interaction: InteractionId, active: bool) {
        let Some(m) = self.map_mut(map) else {
            return;
        };
        if let Some(i) = m.interactions.get_mut(interaction.0 as usize) {
            i.active = active;
            self.record(map, MutationOp::SetInteractionActive);
        }
    }

    fn listen(&mut self, target: HandleId, event: EventType) -> ListenerKey {
        self.next_listener += 1;
        let key = ListenerKey(self.next_listener);
        if self.get(target).is_some() {
            self.listeners.insert(key, Listener::Event { target, event });
            self.record(target, MutationOp::Listen);
        }
        key
    }

    fn bind_render_hook(
        &mut self,
        layer: HandleId,
        phase: RenderPhase,
        hook: RenderHook,
    ) -> ListenerKey {
        self.next_listener += 1;
        let key = ListenerKey(self.next_listener);
        if matches!(self.get(layer), Some(Object::Layer(_))) {
            self.listeners
                .insert(key, Listener::Render { layer, phase, hook });
            self.record(layer, MutationOp::Listen);
        }
        key
    }

    fn unlisten(&mut self, key: ListenerKey) -> bool {
        let Some(listener) = self.listeners.remove(&key) else {
            return false;
        };
        self.record(listener.target(), MutationOp::Unlisten);
        true
    }

    fn coordinate_from_pixel(&self, map: HandleId, pixel: Point) -> Option<Point> {
        let size = self.map_size(map)?;
        let view = self.view_snapshot(self.map_view(map)?)?;
        let res = view.projection.resolution(view.zoom);
        let dx = (pixel.x - size.width / 2.0) * res;
        let dy = (size.height / 2.0 - pixel.y) * res;
        let (sin, cos) = view.rotation.sin_cos();
        Some(Point::new(
            view.center.x + dx * cos - dy * sin,
            view.center.y + dx * sin + dy * cos,
        ))
    }

    fn drain_events(&mut self) -> Vec<EngineEvent> {
        core::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_view() -> (HeadlessEngine, HandleId, HandleId) {
        let mut engine = HeadlessEngine::new();
        let map = engine.create_map(Size::new(800.0, 600.0));
        let view = engine.create_view(&ViewOptions {
            projection: Projection::WebMercator,
            center: Point::ZERO,
            zoom: 4.0,
            rotation: 0.0,
            min_zoom: None,
            max_zoom: None,
            extent: None,
        });
        engine.set_map_view(map, Some(view));
        (engine, map, view)
    }

    fn tile_source(engine: &mut HeadlessEngine) -> HandleId {
        engine
            .create_source(&SourceSpec::Tile {
                url: String::from("https://t/{z}/{x}/{y}.png"),
                projection: Projection::WebMercator,
            })
            .unwrap()
    }

    #[test]
    fn stale_handles_do_not_alias_reused_slots() {
        let mut engine = HeadlessEngine::new();
        let a = engine.create_group();
        engine.dispose(a);
        let b = engine.create_group();
        assert_eq!(a.slot(), b.slot());
        assert_ne!(a, b);
        assert!(!engine.is_alive(a));
        assert!(engine.is_alive(b));
    }

    #[test]
    fn zoom_is_clamped_to_limits() {
        let (mut engine, _, view) = engine_with_view();
        engine.set_zoom_limits(view, Some(2.0), Some(10.0));
        engine.set_zoom(view, 40.0);
        assert_eq!(engine.view_snapshot(view).unwrap().zoom, 10.0);
    }

    #[test]
    fn programmatic_moves_notify_listeners_once_per_drain() {
        let (mut engine, _, view) = engine_with_view();
        let key = engine.listen(view, EventType::MoveEnd);
        engine.set_center(view, Point::new(10.0, 10.0));
        engine.set_zoom(view, 6.0);
        let events = engine.drain_events();
        assert_eq!(
            events,
            vec![EngineEvent::Listener {
                key,
                target: view,
                event: ListenerEvent::MoveEnd
            }]
        );
    }

    #[test]
    fn unchanged_writes_emit_nothing() {
        let (mut engine, _, view) = engine_with_view();
        engine.listen(view, EventType::MoveEnd);
        engine.listen(view, EventType::RotationChange);
        engine.set_zoom(view, 4.0);
        engine.set_rotation(view, 0.0);
        assert!(engine.drain_events().is_empty());
    }

    #[test]
    fn starting_a_fit_interrupts_the_previous_one() {
        let (mut engine, _, view) = engine_with_view();
        let opts = FitOptions {
            size: Size::new(800.0, 600.0),
            padding: 0.0,
            duration_ms: 250,
        };
        let first = engine.fit(view, Rect::new(0.0, 0.0, 1000.0, 1000.0), opts);
        let second = engine.fit(view, Rect::new(0.0, 0.0, 2000.0, 2000.0), opts);
        assert_eq!(
            engine.drain_events(),
            vec![EngineEvent::AnimationEnded {
                view,
                animation: first,
                completed: false
            }]
        );
        engine.finish_animations();
        assert!(engine.drain_events().contains(&EngineEvent::AnimationEnded {
            view,
            animation: second,
            completed: true
        }));
    }

    #[test]
    fn render_order_sorts_by_z_and_flattens_groups() {
        let (mut engine, map, _) = engine_with_view();
        let group = engine.create_group();
        let s = tile_source(&mut engine);
        let a = engine.create_layer(LayerKind::Tile, s);
        let b = engine.create_layer(LayerKind::Tile, s);
        let c = engine.create_layer(LayerKind::Tile, s);
        engine.add_layer(map, a);
        engine.add_layer(map, group);
        engine.add_layer(group, b);
        engine.add_layer(group, c);
        engine.set_property(a, LayerProperty::ZIndex(5));
        engine.set_property(b, LayerProperty::ZIndex(1));
        assert_eq!(engine.render_order(map), vec![c, b, a]);
    }

    #[test]
    fn render_hooks_run_for_shown_layers_only() {
        use core::cell::Cell;

        let (mut engine, map, _) = engine_with_view();
        let s = tile_source(&mut engine);
        let layer = engine.create_layer(LayerKind::Tile, s);
        engine.add_layer(map, layer);
        let calls = std::rc::Rc::new(Cell::new(0));
        let seen = calls.clone();
        engine.bind_render_hook(
            layer,
            RenderPhase::PostRender,
            std::rc::Rc::new(move |_| seen.set(seen.get() + 1)),
        );
        assert_eq!(engine.render_frame(), 1);
        engine.set_property(layer, LayerProperty::Visible(false));
        assert_eq!(engine.render_frame(), 0);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn pixel_and_coordinate_conversions_are_inverse() {
        let (mut engine, map, view) = engine_with_view();
        engine.set_rotation(view, 0.7);
        let px = Point::new(123.0, 456.0);
        let coord = engine.coordinate_from_pixel(map, px).unwrap();
        let back = engine.pixel_from_coordinate(map, coord).unwrap();
        assert!((back - px).hypot() < 1e-6);
    }

    #[test]
    fn dragging_pans_only_while_drag_pan_is_active() {
        let (mut engine, map, view) = engine_with_view();
        engine.pointer_down(map, Point::new(400.0, 300.0));
        engine.pointer_move(map, Point::new(450.0, 300.0));
        engine.pointer_up(map, Point::new(450.0, 300.0));
        let panned = engine.view_snapshot(view).unwrap().center;
        assert!(panned.x < 0.0);

        for id in engine.interactions(map, InteractionClass::DragPan) {
            engine.set_interaction_active(map, id, false);
        }
        engine.pointer_down(map, Point::new(400.0, 300.0));
        engine.pointer_move(map, Point::new(500.0, 300.0));
        engine.pointer_up(map, Point::new(500.0, 300.0));
        assert_eq!(engine.view_snapshot(view).unwrap().center, panned);
    }

    #[test]
    fn disposing_a_map_orphans_its_children() {
        let (mut engine, map, _) = engine_with_view();
        let group = engine.create_group();
        engine.add_layer(map, group);
        engine.dispose(map);
        assert_eq!(engine.parent_of(group), None);
    }
}
