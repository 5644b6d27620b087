// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Parent reconciliation shared by layers and groups.

use log::debug;
use strata_engine::{HandleId, MapEngine};

/// Moves `child` under `desired`, detaching it from wherever it is now.
///
/// The current parent is read from the engine, so a parent that changed
/// behind the node's back (for example a swapped root map) is still detached
/// correctly. Remove and add happen within one call: nothing can observe the
/// child attached to both parents, or to neither.
///
/// Returns `true` if the engine was touched.
pub(crate) fn reconcile_parent<E: MapEngine + ?Sized>(
    engine: &mut E,
    child: HandleId,
    desired: Option<HandleId>,
) -> bool {
    let desired = desired.filter(|&p| engine.is_alive(p));
    let current = engine.parent_of(child);
    if current == desired {
        return false;
    }
    if let Some(old) = current {
        engine.remove_layer(old, child);
    }
    if let Some(new) = desired {
        engine.add_layer(new, child);
    }
    debug!("reparented {child:?}: {current:?} -> {desired:?}");
    true
}

/// Detaches `child` from its current parent, if any.
pub(crate) fn detach<E: MapEngine + ?Sized>(engine: &mut E, child: HandleId) {
    if let Some(parent) = engine.parent_of(child) {
        engine.remove_layer(parent, child);
    }
}
