// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Suspends one class of engine-native interaction on a map.

use log::debug;
use smallvec::SmallVec;
use strata_engine::{HandleId, InteractionClass, InteractionId, MapEngine};

/// Disables every active interaction of one class on the current map.
///
/// Only the instances this blocker switched off are remembered, and only
/// those are switched back on. Blockers for different classes therefore
/// coexist, and a blocker never re-enables an interaction something else
/// disabled.
#[derive(Debug)]
pub struct InteractionBlocker {
    class: InteractionClass,
    map: Option<HandleId>,
    disabled: SmallVec<[InteractionId; 2]>,
}

impl InteractionBlocker {
    /// Disables `class` on `map`.
    pub fn mount<E: MapEngine + ?Sized>(
        engine: &mut E,
        map: Option<HandleId>,
        class: InteractionClass,
    ) -> Self {
        let mut blocker = Self {
            class,
            map,
            disabled: SmallVec::new(),
        };
        blocker.block(engine);
        blocker
    }

    /// Interaction class being blocked.
    #[must_use]
    pub fn class(&self) -> InteractionClass {
        self.class
    }

    /// Map the blocker currently applies to.
    #[must_use]
    pub fn map(&self) -> Option<HandleId> {
        self.map
    }

    /// Instances currently held disabled by this blocker.
    #[must_use]
    pub fn disabled(&self) -> &[InteractionId] {
        &self.disabled
    }

    /// Follows a map or class change: re-enables on the previous map, then
    /// disables on the new one. Returns `true` if anything changed.
    pub fn update<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        map: Option<HandleId>,
        class: InteractionClass,
    ) -> bool {
        if map == self.map && class == self.class {
            return false;
        }
        self.release(engine);
        self.map = map;
        self.class = class;
        self.block(engine);
        true
    }

    /// Re-enables what this blocker disabled.
    pub fn unmount<E: MapEngine + ?Sized>(mut self, engine: &mut E) {
        self.release(engine);
    }

    fn block<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        let Some(map) = self.map else {
            return;
        };
        for id in engine.interactions(map, self.class) {
            if engine.interaction_active(map, id) {
                engine.set_interaction_active(map, id, false);
                self.disabled.push(id);
            }
        }
        debug!(
            "blocked {} {:?} interaction(s) on {map:?}",
            self.disabled.len(),
            self.class
        );
    }

    fn release<E: MapEngine + ?Sized>(&mut self, engine: &mut E) {
        let Some(map) = self.map else {
            self.disabled.clear();
            return;
        };
        let alive = engine.is_alive(map);
        for id in self.disabled.drain(..) {
            if alive {
                engine.set_interaction_active(map, id, true);
            }
        }
    }
}
