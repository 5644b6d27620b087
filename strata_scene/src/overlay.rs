// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Overlay node: a pin anchored to a geographic position, optionally draggable.
//!
//! ## Drag state machine
//!
//! `Idle --pointer down on the pin--> Dragging --pointer up--> Idle`
//!
//! - Pointer-down is only listened for on draggable pins.
//! - While dragging, pointer-move and pointer-up are listened for on the map
//!   and an [`InteractionBlocker`] suspends drag-pan, so dragging the pin
//!   never pans the map.
//! - Moves update the pin in the engine only; nothing is reported.
//! - Pointer-up moves the pin to the release point and calls the commit
//!   callback exactly once with that position in geographic coordinates.
//! - Unmounting, switching maps, or turning `draggable` off mid-drag
//!   abandons the drag without a commit.

use log::{debug, trace};
use strata_engine::{
    EngineEvent, EventType, GeoPoint, HandleId, InteractionClass, ListenerEvent, ListenerKey,
    MapEngine, PointerKind,
};

use crate::blocker::InteractionBlocker;
use crate::context::HandleContext;
use crate::descriptor::OverlayDescriptor;

/// Tolerance in degrees under which a position write is skipped.
const POSITION_EPSILON: f64 = 1e-9;

bitflags::bitflags! {
    /// Engine calls made by one [`OverlayNode::update`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct OverlayChanges: u8 {
        /// Position written.
        const POSITION  = 1 << 0;
        /// Offset written.
        const OFFSET    = 1 << 1;
        /// Pointer-down listener added or removed.
        const DRAGGABLE = 1 << 2;
        /// Moved to another map.
        const MAP       = 1 << 3;
        /// An active drag was abandoned.
        const ABANDONED = 1 << 4;
    }
}

#[derive(Debug)]
struct ActiveDrag {
    map: HandleId,
    move_key: ListenerKey,
    up_key: ListenerKey,
    blocker: InteractionBlocker,
}

/// Owns one engine overlay.
#[derive(Debug)]
pub struct OverlayNode {
    overlay: HandleId,
    map: Option<HandleId>,
    applied: OverlayDescriptor,
    down_key: Option<ListenerKey>,
    drag: Option<ActiveDrag>,
}

impl OverlayNode {
    /// Creates the overlay at `desc.position` and shows it on the resolved map.
    pub fn mount<E: MapEngine + ?Sized>(
        engine: &mut E,
        ctx: &HandleContext,
        desc: &OverlayDescriptor,
    ) -> Self {
        let position = ctx.projection(engine).project(desc.position);
        let overlay = engine.create_overlay(position, desc.offset);
        let map = ctx.map().filter(|&m| engine.is_alive(m));
        if let Some(m) = map {
            engine.add_overlay(m, overlay);
        }
        let down_key = desc
            .draggable
            .then(|| engine.listen(overlay, EventType::PointerDown));
        debug!("mounted overlay {overlay:?} on {map:?}");
        Self {
            overlay,
            map,
            applied: desc.clone(),
            down_key,
            drag: None,
        }
    }

    /// Engine overlay owned by this node.
    #[must_use]
    pub fn handle(&self) -> HandleId {
        self.overlay
    }

    /// Whether a drag is in progress.
    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Brings the engine overlay in line with `desc`.
    ///
    /// Position changes are ignored while dragging: the pin follows the
    /// pointer until the drag ends.
    pub fn update<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        ctx: &HandleContext,
        desc: &OverlayDescriptor,
    ) -> OverlayChanges {
        let mut changes = OverlayChanges::empty();
        let map = ctx.map().filter(|&m| engine.is_alive(m));

        if map != self.map {
            if self.abandon_drag(engine) {
                changes |= OverlayChanges::ABANDONED;
            }
            if let Some(old) = self.map {
                engine.remove_overlay(old, self.overlay);
            }
            if let Some(new) = map {
                engine.add_overlay(new, self.overlay);
            }
            self.map = map;
            changes |= OverlayChanges::MAP;
        }

        if desc.draggable != self.down_key.is_some() {
            if desc.draggable {
                self.down_key = Some(engine.listen(self.overlay, EventType::PointerDown));
            } else {
                if let Some(key) = self.down_key.take() {
                    engine.unlisten(key);
                }
                if self.abandon_drag(engine) {
                    changes |= OverlayChanges::ABANDONED;
                }
            }
            changes |= OverlayChanges::DRAGGABLE;
        }

        if desc.position != self.applied.position && self.drag.is_none() {
            let projection = ctx.projection(engine);
            let held = engine
                .overlay_position(self.overlay)
                .map(|p| projection.unproject(p));
            if !held.is_some_and(|h| h.approx_eq(desc.position, POSITION_EPSILON)) {
                engine.set_overlay_position(self.overlay, projection.project(desc.position));
                changes |= OverlayChanges::POSITION;
            }
        }

        if desc.offset != self.applied.offset {
            engine.set_overlay_offset(self.overlay, desc.offset);
            changes |= OverlayChanges::OFFSET;
        }

        self.applied = desc.clone();
        changes
    }

    /// Handles an engine event. Returns `false` if it was not addressed to
    /// this overlay.
    pub fn handle_event<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        event: &EngineEvent,
    ) -> bool {
        let EngineEvent::Listener {
            key,
            event: ListenerEvent::Pointer(pointer),
            ..
        } = *event
        else {
            return false;
        };

        if Some(key) == self.down_key {
            if pointer.kind == PointerKind::Down && self.drag.is_none() {
                self.begin_drag(engine);
            }
            return true;
        }

        let Some(drag) = self.drag.as_ref() else {
            return false;
        };
        let map = drag.map;
        if key == drag.move_key {
            if let Some(coordinate) = engine.coordinate_from_pixel(map, pointer.pixel) {
                engine.set_overlay_position(self.overlay, coordinate);
            }
            true
        } else if key == drag.up_key {
            let committed = engine.coordinate_from_pixel(map, pointer.pixel);
            if let Some(coordinate) = committed {
                engine.set_overlay_position(self.overlay, coordinate);
            }
            let projection = engine
                .map_view(map)
                .and_then(|v| engine.view_snapshot(v))
                .map(|s| s.projection)
                .unwrap_or_default();
            self.end_drag(engine);
            if let Some(position) = committed.map(|c| projection.unproject(c)) {
                trace!("overlay {:?}: committing {position:?}", self.overlay);
                self.commit(position);
            }
            true
        } else {
            false
        }
    }

    /// Abandons any drag without committing, hides the overlay, and disposes it.
    pub fn unmount<E: MapEngine + ?Sized>(mut self, engine: &mut E) {
        self.abandon_drag(engine);
        if let Some(key) = self.down_key.take() {
            engine.unlisten(key);
        }
        if let Some(map) = self.map {
            engine.remove_overlay(map, self.overlay);
        }
        engine.dispose(self.overlay);
        debug!("unmounted overlay {:?}", self.overlay);
    }

    fn begin_drag<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        let Some(map) = self.map else {
            return;
        };
        let move_key = engine.listen(map, EventType::PointerMove);
        let up_key = engine.listen(map, EventType::PointerUp);
        let blocker = InteractionBlocker::mount(engine, Some(map), InteractionClass::DragPan);
        trace!("overlay {:?}: drag started", self.overlay);
        self.drag = Some(ActiveDrag {
            map,
            move_key,
            up_key,
            blocker,
        });
    }

    fn end_drag<E: MapEngine + ?Sized>(&mut self, engine: &mut E) -> bool {
        let Some(drag) = self.drag.take() else {
            return false;
        };
        engine.unlisten(drag.move_key);
        engine.unlisten(drag.up_key);
        drag.blocker.unmount(engine);
        true
    }

    fn abandon_drag<E: MapEngine + ?Sized>(&mut self, engine: &mut E) -> bool {
        let abandoned = self.end_drag(engine);
        if abandoned {
            debug!("overlay {:?}: drag abandoned", self.overlay);
        }
        abandoned
    }

    fn commit(&self, position: GeoPoint) {
        if let Some(on_commit) = &self.applied.on_commit {
            on_commit(position);
        }
    }
}
