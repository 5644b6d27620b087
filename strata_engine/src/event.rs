// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Events an engine delivers to its listeners, and the interaction classes it
//! installs on maps.

use kurbo::Point;

use crate::id::{AnimationId, HandleId, ListenerKey};

/// Class of engine-native pointer interaction installed on a map.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InteractionClass {
    /// Pan by dragging with the primary pointer.
    DragPan,
    /// Rotate by dragging with a modifier held.
    DragRotate,
    /// Zoom in on double click.
    DoubleClickZoom,
    /// Zoom with the mouse wheel.
    MouseWheelZoom,
    /// Zoom and rotate with two-finger gestures.
    PinchZoom,
    /// Pan with arrow keys.
    KeyboardPan,
    /// Application-defined interaction.
    Custom(u32),
}

/// Event types a listener can subscribe to with
/// [`MapEngine::listen`](crate::MapEngine::listen).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    /// View rotation changed.
    RotationChange,
    /// View finished moving (center or zoom changed).
    MoveEnd,
    /// Pointer pressed on the target.
    PointerDown,
    /// Pointer moved over the map.
    PointerMove,
    /// Pointer released over the map.
    PointerUp,
}

/// Phase of a pointer gesture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// Pointer pressed.
    Down,
    /// Pointer moved.
    Move,
    /// Pointer released.
    Up,
}

/// A pointer event in map pixel coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PointerEvent {
    /// Gesture phase.
    pub kind: PointerKind,
    /// Position in map pixels, origin at the top-left corner.
    pub pixel: Point,
}

/// Payload of a listener notification.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ListenerEvent {
    /// New rotation of the view, in radians.
    RotationChanged(f64),
    /// The view finished moving.
    MoveEnd,
    /// A pointer event.
    Pointer(PointerEvent),
}

/// An event delivered by the engine.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// A registered listener fired.
    Listener {
        /// Key returned by [`MapEngine::listen`](crate::MapEngine::listen).
        key: ListenerKey,
        /// Object the listener is registered on.
        target: HandleId,
        /// What happened.
        event: ListenerEvent,
    },
    /// A camera animation ended, either by completing or by being interrupted.
    AnimationEnded {
        /// View that was animating.
        view: HandleId,
        /// Animation returned by [`MapEngine::fit`](crate::MapEngine::fit).
        animation: AnimationId,
        /// `false` if the animation was interrupted before reaching its target.
        completed: bool,
    },
}

impl EngineEvent {
    /// Returns the listener key if this is a listener notification.
    #[must_use]
    pub fn listener_key(&self) -> Option<ListenerKey> {
        match self {
            Self::Listener { key, .. } => Some(*key),
            Self::AnimationEnded { .. } => None,
        }
    }
}
