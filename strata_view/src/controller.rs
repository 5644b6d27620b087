// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The view controller: owns one engine view and keeps it in sync with an
//! external [`ViewState`] in both directions.

use log::{debug, trace, warn};
use smallvec::SmallVec;
use strata_engine::{
    AnimationId, EngineEvent, EventType, FitOptions, HandleId, ListenerEvent, ListenerKey,
    MapEngine, ViewOptions, ViewSnapshot,
};

use crate::config::{FitFallback, ViewConfig};
use crate::debounce::Debounce;
use crate::sink::{ViewSink, ViewUpdate};
use crate::state::{FitRequest, ViewDescriptor, ViewState};

bitflags::bitflags! {
    /// Programmatic writes whose change notification has not been seen yet.
    ///
    /// A flag is raised right before the controller writes to the engine and
    /// lowered when the matching notification arrives, or immediately if the
    /// write turned out not to change the engine.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PendingWrites: u8 {
        /// Center written; waiting for a move-end.
        const CENTER   = 0b0000_0001;
        /// Zoom written; waiting for a move-end.
        const ZOOM     = 0b0000_0010;
        /// Rotation written; waiting for a rotation change.
        const ROTATION = 0b0000_0100;
        /// Both flags acknowledged by a move-end.
        const MOVE = Self::CENTER.bits() | Self::ZOOM.bits();
    }
}

bitflags::bitflags! {
    /// Engine calls made by one [`ViewController::update`].
    ///
    /// Empty means the update touched nothing.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ViewChanges: u16 {
        /// Center written.
        const CENTER      = 1 << 0;
        /// Zoom written.
        const ZOOM        = 1 << 1;
        /// Rotation written.
        const ROTATION    = 1 << 2;
        /// Zoom limits written.
        const ZOOM_LIMITS = 1 << 3;
        /// Extent written.
        const EXTENT      = 1 << 4;
        /// A fit was started.
        const FIT         = 1 << 5;
        /// The view was installed on (or removed from) a map.
        const INSTALLED   = 1 << 6;
        /// The view was rebuilt for a new projection.
        const REBUILT     = 1 << 7;
    }
}

#[derive(Copy, Clone, Debug)]
struct FitInFlight {
    request: FitRequest,
    animation: AnimationId,
    before: ViewSnapshot,
    retries: u32,
    jumped: bool,
}

/// Owns one engine view.
///
/// Downward, external [`ViewState`] changes are pushed with the narrowest
/// setter, and only when the engine does not already hold the value.
/// Upward, user-driven changes are reported to a [`ViewSink`]: moves on
/// move-end, rotations after a debounce window. Changes the controller made
/// itself are recognized through [`PendingWrites`] and not reported.
///
/// Events must be fed in with [`handle_event`](Self::handle_event) and the
/// debounce driven with [`poll`](Self::poll).
#[derive(Debug)]
pub struct ViewController {
    view: HandleId,
    map: Option<HandleId>,
    applied: ViewDescriptor,
    listeners: SmallVec<[ListenerKey; 2]>,
    pending: PendingWrites,
    rotation: Debounce<f64>,
    last_known: ViewState,
    fit: Option<FitInFlight>,
    config: ViewConfig,
}

fn view_options(desc: &ViewDescriptor) -> ViewOptions {
    let p = desc.projection;
    ViewOptions {
        projection: p,
        center: p.project(desc.state.center),
        zoom: desc.state.zoom,
        rotation: desc.state.rotation,
        min_zoom: desc.state.min_zoom,
        max_zoom: desc.state.max_zoom,
        extent: desc.state.extent.map(|e| e.project(p)),
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

impl ViewController {
    /// Creates the engine view from `desc` and installs it on `map`.
    ///
    /// Without a map the view is created but not shown; it is installed by
    /// the first [`update`](Self::update) that supplies one.
    pub fn mount<E: MapEngine + ?Sized>(
        engine: &mut E,
        map: Option<HandleId>,
        desc: &ViewDescriptor,
        config: ViewConfig,
    ) -> Self {
        let view = engine.create_view(&view_options(desc));
        let listeners = subscribe(engine, view);
        let mut this = Self {
            view,
            map: None,
            applied: ViewDescriptor { fit: None, ..*desc },
            listeners,
            pending: PendingWrites::empty(),
            rotation: Debounce::new(config.rotation_debounce_ms),
            last_known: desc.state,
            fit: None,
            config,
        };
        this.install(engine, map);
        this.observe(engine);
        if let Some(fit) = desc.fit {
            if this.issue_fit(engine, fit, 0, fit.duration_ms, false) {
                this.applied.fit = Some(fit);
            }
        }
        debug!("mounted view {view:?} on {map:?}");
        this
    }

    /// Engine view owned by this controller.
    #[must_use]
    pub fn handle(&self) -> HandleId {
        self.view
    }

    /// Map the view is installed on.
    #[must_use]
    pub fn map(&self) -> Option<HandleId> {
        self.map
    }

    /// Descriptor the engine was last brought in line with.
    #[must_use]
    pub fn applied(&self) -> &ViewDescriptor {
        &self.applied
    }

    /// Writes still waiting for their change notification.
    #[must_use]
    pub fn pending(&self) -> PendingWrites {
        self.pending
    }

    /// Last camera read back from the engine.
    #[must_use]
    pub fn last_known(&self) -> ViewState {
        self.last_known
    }

    /// Whether a fit animation is in flight.
    #[must_use]
    pub fn is_fitting(&self) -> bool {
        self.fit.is_some()
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> ViewConfig {
        self.config
    }

    /// Brings the engine view in line with `desc`.
    ///
    /// Each field is compared with the previously applied descriptor first,
    /// then with what the engine actually holds; the engine is only written
    /// when both differ. A projection change rebuilds the view.
    pub fn update<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        map: Option<HandleId>,
        desc: &ViewDescriptor,
    ) -> ViewChanges {
        let mut changes = ViewChanges::empty();
        if desc.projection != self.applied.projection {
            self.rebuild(engine, map, desc);
            return ViewChanges::REBUILT | ViewChanges::INSTALLED;
        }
        if self.install(engine, map) {
            changes |= ViewChanges::INSTALLED;
        }

        let prev = self.applied.state;
        let next = desc.state;
        let projection = desc.projection;

        if next.min_zoom != prev.min_zoom || next.max_zoom != prev.max_zoom {
            self.write(engine, |e, v| e.set_zoom_limits(v, next.min_zoom, next.max_zoom));
            changes |= ViewChanges::ZOOM_LIMITS;
        }
        if next.extent != prev.extent {
            let extent = next.extent.map(|b| b.project(projection));
            self.write(engine, |e, v| e.set_view_extent(v, extent));
            changes |= ViewChanges::EXTENT;
        }
        if next.center != prev.center {
            let target = projection.project(next.center);
            let held = engine.view_snapshot(self.view).map(|s| s.center);
            if held.is_some_and(|c| !close(c.x, target.x) || !close(c.y, target.y)) {
                self.write(engine, |e, v| e.set_center(v, target));
                changes |= ViewChanges::CENTER;
            }
        }
        if next.zoom != prev.zoom {
            let held = engine.view_snapshot(self.view).map(|s| s.zoom);
            if held.is_some_and(|z| !close(z, next.zoom)) {
                self.write(engine, |e, v| e.set_zoom(v, next.zoom));
                changes |= ViewChanges::ZOOM;
            }
        }
        if next.rotation != prev.rotation {
            let held = engine.view_snapshot(self.view).map(|s| s.rotation);
            if held.is_some_and(|r| !close(r, next.rotation)) {
                self.write(engine, |e, v| e.set_rotation(v, next.rotation));
                changes |= ViewChanges::ROTATION;
            }
        }

        let mut fit = self.applied.fit;
        if let Some(request) = desc.fit {
            if fit.map(|f| f.revision) != Some(request.revision)
                && self.issue_fit(engine, request, 0, request.duration_ms, false)
            {
                fit = Some(request);
                changes |= ViewChanges::FIT;
            }
        }
        self.applied = ViewDescriptor { fit, ..*desc };
        if !changes.is_empty() {
            trace!("view {:?} patched: {changes:?}", self.view);
        }
        changes
    }

    /// Handles an engine event. Returns `false` if it was not addressed to
    /// this controller.
    ///
    /// `now` is the host clock in milliseconds, used to start the rotation
    /// debounce window.
    pub fn handle_event<E: MapEngine + ?Sized, S: ViewSink + ?Sized>(
        &mut self,
        engine: &mut E,
        event: &EngineEvent,
        now: u64,
        sink: &mut S,
    ) -> bool {
        match *event {
            EngineEvent::Listener { key, event, .. } if self.listeners.contains(&key) => {
                match event {
                    ListenerEvent::RotationChanged(rotation) => {
                        self.last_known.rotation = rotation;
                        if self.pending.contains(PendingWrites::ROTATION) {
                            self.pending.remove(PendingWrites::ROTATION);
                            trace!("view {:?}: own rotation acknowledged", self.view);
                        } else {
                            self.rotation.push(rotation, now);
                        }
                    }
                    ListenerEvent::MoveEnd => {
                        self.observe(engine);
                        if self.pending.intersects(PendingWrites::MOVE) {
                            self.pending.remove(PendingWrites::MOVE);
                            trace!("view {:?}: own move acknowledged", self.view);
                        } else {
                            sink.view_changed(ViewUpdate::Moved {
                                center: self.last_known.center,
                                zoom: self.last_known.zoom,
                            });
                        }
                    }
                    ListenerEvent::Pointer(_) => {}
                }
                true
            }
            EngineEvent::AnimationEnded {
                view,
                animation,
                completed,
            } if view == self.view => {
                self.animation_ended(engine, animation, completed);
                true
            }
            EngineEvent::Listener { .. } | EngineEvent::AnimationEnded { .. } => false,
        }
    }

    /// Emits a debounced rotation whose window elapsed by `now`.
    ///
    /// Returns `true` if something was reported.
    pub fn poll<S: ViewSink + ?Sized>(&mut self, now: u64, sink: &mut S) -> bool {
        match self.rotation.poll(now) {
            Some(rotation) => {
                sink.view_changed(ViewUpdate::Rotated { rotation });
                true
            }
            None => false,
        }
    }

    /// Time at which [`poll`](Self::poll) will next have something to report.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.rotation.deadline()
    }

    /// Releases the engine view.
    ///
    /// Listeners are removed first and the pending rotation is dropped; the
    /// last known camera is then flushed to `sink` exactly once.
    pub fn unmount<E: MapEngine + ?Sized, S: ViewSink + ?Sized>(
        mut self,
        engine: &mut E,
        sink: &mut S,
    ) {
        for key in self.listeners.drain(..) {
            engine.unlisten(key);
        }
        self.rotation.cancel();
        self.observe(engine);
        sink.view_changed(ViewUpdate::Flushed {
            center: self.last_known.center,
            zoom: self.last_known.zoom,
            rotation: self.last_known.rotation,
        });
        self.uninstall(engine);
        engine.dispose(self.view);
        debug!("unmounted view {:?}", self.view);
    }

    fn rebuild<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        map: Option<HandleId>,
        desc: &ViewDescriptor,
    ) {
        debug!(
            "view {:?}: projection {} -> {}, rebuilding",
            self.view,
            self.applied.projection.code(),
            desc.projection.code()
        );
        for key in self.listeners.drain(..) {
            engine.unlisten(key);
        }
        self.uninstall(engine);
        engine.dispose(self.view);

        self.view = engine.create_view(&view_options(desc));
        self.listeners = subscribe(engine, self.view);
        self.pending = PendingWrites::empty();
        self.rotation.cancel();
        self.fit = None;
        self.map = None;
        self.applied = ViewDescriptor { fit: None, ..*desc };
        self.install(engine, map);
        self.observe(engine);
        if let Some(fit) = desc.fit {
            if self.issue_fit(engine, fit, 0, fit.duration_ms, false) {
                self.applied.fit = Some(fit);
            }
        }
    }

    /// Points the view at `map`. Returns `true` if the engine was touched.
    fn install<E: MapEngine + ?Sized>(&mut self, engine: &mut E, map: Option<HandleId>) -> bool {
        let mut touched = false;
        if self.map != map {
            touched |= self.uninstall(engine);
            self.map = map;
        }
        if let Some(m) = map {
            if engine.is_alive(m) && engine.map_view(m) != Some(self.view) {
                engine.set_map_view(m, Some(self.view));
                touched = true;
            }
        }
        touched
    }

    fn uninstall<E: MapEngine + ?Sized>(&mut self, engine: &mut E) -> bool {
        match self.map {
            Some(m) if engine.map_view(m) == Some(self.view) => {
                engine.set_map_view(m, None);
                true
            }
            _ => false,
        }
    }

    /// Runs one programmatic write, raising pending flags for whatever it moved.
    fn write<E: MapEngine + ?Sized>(&mut self, engine: &mut E, f: impl FnOnce(&mut E, HandleId)) {
        let fresh = PendingWrites::all() - self.pending;
        let before = engine.view_snapshot(self.view);
        self.pending |= fresh;
        f(engine, self.view);
        let after = engine.view_snapshot(self.view);
        let (moved, rotated) = match (before, after) {
            (Some(b), Some(a)) => (b.center != a.center || b.zoom != a.zoom, b.rotation != a.rotation),
            _ => (false, false),
        };
        if !moved {
            self.pending.remove(fresh & PendingWrites::MOVE);
        }
        if !rotated {
            self.pending.remove(fresh & PendingWrites::ROTATION);
        }
        self.observe(engine);
    }

    fn observe<E: MapEngine + ?Sized>(&mut self, engine: &E) {
        if let Some(snapshot) = engine.view_snapshot(self.view) {
            self.last_known = self.applied.state.observed(&snapshot);
        }
    }

    fn issue_fit<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        request: FitRequest,
        retries: u32,
        duration_ms: u64,
        jumped: bool,
    ) -> bool {
        let Some(size) = self.map.and_then(|m| engine.map_size(m)) else {
            return false;
        };
        let Some(before) = engine.view_snapshot(self.view) else {
            return false;
        };
        let extent = request.extent.project(before.projection);
        self.pending |= PendingWrites::MOVE;
        let animation = engine.fit(
            self.view,
            extent,
            FitOptions {
                size,
                padding: request.padding_px,
                duration_ms,
            },
        );
        self.fit = Some(FitInFlight {
            request,
            animation,
            before,
            retries,
            jumped,
        });
        true
    }

    fn animation_ended<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        animation: AnimationId,
        completed: bool,
    ) {
        let Some(fit) = self.fit else {
            return;
        };
        if fit.animation != animation {
            trace!("view {:?}: stale animation {animation:?}", self.view);
            return;
        }
        if completed {
            self.settle_fit(engine, &fit);
            return;
        }
        let reissued = if fit.retries < self.config.max_fit_retries {
            trace!(
                "view {:?}: fit interrupted, retry {}",
                self.view,
                fit.retries + 1
            );
            self.issue_fit(
                engine,
                fit.request,
                fit.retries + 1,
                fit.request.duration_ms,
                false,
            )
        } else if !fit.jumped && self.config.fit_fallback == FitFallback::Jump {
            warn!(
                "view {:?}: fit interrupted {} times, jumping to target",
                self.view,
                fit.retries + 1
            );
            self.issue_fit(engine, fit.request, fit.retries, 0, true)
        } else {
            warn!(
                "view {:?}: fit interrupted {} times, giving up",
                self.view,
                fit.retries + 1
            );
            false
        };
        if !reissued {
            self.settle_fit(engine, &fit);
        }
    }

    /// Ends `fit` for good. A fit that left the camera where it started never
    /// produces a move-end, so its pending move is dropped here.
    fn settle_fit<E: MapEngine + ?Sized>(&mut self, engine: &E, fit: &FitInFlight) {
        self.fit = None;
        let unmoved = engine
            .view_snapshot(self.view)
            .is_some_and(|s| s.center == fit.before.center && s.zoom == fit.before.zoom);
        if unmoved {
            self.pending.remove(PendingWrites::MOVE);
        }
    }
}

fn subscribe<E: MapEngine + ?Sized>(engine: &mut E, view: HandleId) -> SmallVec<[ListenerKey; 2]> {
    let mut keys = SmallVec::new();
    keys.push(engine.listen(view, EventType::RotationChange));
    keys.push(engine.listen(view, EventType::MoveEnd));
    keys
}
