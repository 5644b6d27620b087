// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render-scoped registry of the nearest ancestor handles.

use strata_engine::{HandleId, MapEngine, Projection};

/// Live handles a node resolves from its ancestors.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Binding {
    /// Root map.
    pub map: Option<HandleId>,
    /// Nearest ancestor layer group.
    pub layer_group: Option<HandleId>,
    /// Nearest ancestor view.
    pub view: Option<HandleId>,
}

/// Registry of the current live handles for one subtree.
///
/// A fresh context is threaded down on every render pass, so a node always
/// resolves the handles that are live *now*, not the ones it saw at mount.
/// Absent handles are a valid state: the node has nothing to attach to yet.
///
/// The context only carries handles. It is never used to mutate a handle
/// owned by another node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct HandleContext {
    binding: Binding,
}

impl HandleContext {
    /// Creates the root context for `map`.
    #[must_use]
    pub const fn new(map: Option<HandleId>) -> Self {
        Self {
            binding: Binding {
                map,
                layer_group: None,
                view: None,
            },
        }
    }

    /// Returns the current binding.
    #[must_use]
    pub const fn resolve(&self) -> Binding {
        self.binding
    }

    /// Root map.
    #[must_use]
    pub const fn map(&self) -> Option<HandleId> {
        self.binding.map
    }

    /// Nearest ancestor view.
    #[must_use]
    pub const fn view(&self) -> Option<HandleId> {
        self.binding.view
    }

    /// Effective parent for a layer or group: the nearest group, else the map.
    #[must_use]
    pub fn parent(&self) -> Option<HandleId> {
        self.binding.layer_group.or(self.binding.map)
    }

    /// Context for the children of a layer group.
    #[must_use]
    pub const fn with_layer_group(mut self, group: HandleId) -> Self {
        self.binding.layer_group = Some(group);
        self
    }

    /// Context for the children of a view.
    #[must_use]
    pub const fn with_view(mut self, view: HandleId) -> Self {
        self.binding.view = Some(view);
        self
    }

    /// Projection of the nearest view, falling back to the map's installed
    /// view, then to the default projection.
    pub fn projection<E: MapEngine + ?Sized>(&self, engine: &E) -> Projection {
        self.binding
            .view
            .or_else(|| self.binding.map.and_then(|m| engine.map_view(m)))
            .and_then(|v| engine.view_snapshot(v))
            .map(|s| s.projection)
            .unwrap_or_default()
    }
}
