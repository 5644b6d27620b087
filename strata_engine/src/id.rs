// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identifiers for live engine objects, listeners, and animations.

/// Identifier for a live engine object (map, view, layer, group, source, overlay).
///
/// This is a small, copyable handle. It stays stable for the lifetime of the
/// object and becomes stale once the object is disposed.
/// It consists of a slot index and a generation counter.
///
/// ## Semantics
///
/// - On creation, a fresh slot is allocated with generation `1`.
/// - On dispose, the slot is freed; any existing `HandleId` that pointed to that slot is now stale.
/// - On reuse of a freed slot, its generation is incremented, producing a new, distinct `HandleId`.
///
/// Stale ids never alias a different live object because the generation must match.
/// Use [`MapEngine::is_alive`](crate::MapEngine::is_alive) to check liveness.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub(crate) u32, pub(crate) u32);

impl HandleId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }

    /// Returns the slot index of this handle.
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.0
    }

    /// Returns the generation of this handle.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.1
    }
}

/// Key of a registered engine listener or render hook.
///
/// Keys are never reused by an engine instance, so a removed key can not
/// accidentally unbind a later registration.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ListenerKey(pub(crate) u64);

impl ListenerKey {
    /// Returns the raw value of this key.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Identifier of a camera animation started with [`MapEngine::fit`](crate::MapEngine::fit).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct AnimationId(pub(crate) u64);

impl AnimationId {
    /// Returns the raw value of this id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Identifier of an interaction instance installed on a map.
///
/// Interaction ids are only meaningful together with the map that owns them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct InteractionId(pub(crate) u32);

impl InteractionId {
    /// Returns the index of this interaction within its map.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}
