// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Observability hook for render passes.
//!
//! A render pass does not keep a history of what it did to the engine. This
//! module provides a minimal, additive hook, [`SceneTrace`], that a
//! [`SceneTree`](crate::SceneTree) calls once per node lifecycle step, plus
//! a small recorder, [`PatchRecorder`], for tests and debugging.

use hashbrown::HashMap;
use strata_view::ViewChanges;

use crate::descriptor::{NodeKey, NodeKind};
use crate::group::GroupChanges;
use crate::layer::LayerChanges;
use crate::overlay::OverlayChanges;

/// Engine calls made to update one node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Patch {
    /// A view was patched.
    View(ViewChanges),
    /// A layer group was patched.
    Group(GroupChanges),
    /// A layer was patched.
    Layer(LayerChanges),
    /// An overlay was patched.
    Overlay(OverlayChanges),
    /// A blocker moved to another map or class.
    Blocker,
}

/// A callback sink for render passes.
///
/// All methods default to doing nothing.
pub trait SceneTrace {
    /// A node was mounted.
    fn mounted(&mut self, key: &NodeKey, kind: NodeKind) {
        let _ = (key, kind);
    }

    /// An existing node changed the engine.
    ///
    /// Not called for updates that made no engine call.
    fn patched(&mut self, key: &NodeKey, patch: Patch) {
        let _ = (key, patch);
    }

    /// A node was unmounted.
    fn unmounted(&mut self, key: &NodeKey, kind: NodeKind) {
        let _ = (key, kind);
    }
}

impl SceneTrace for () {}

/// One recorded trace call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceEntry {
    /// See [`SceneTrace::mounted`].
    Mounted(NodeKey, NodeKind),
    /// See [`SceneTrace::patched`].
    Patched(NodeKey, Patch),
    /// See [`SceneTrace::unmounted`].
    Unmounted(NodeKey, NodeKind),
}

/// Records every trace call in order.
#[derive(Clone, Debug, Default)]
pub struct PatchRecorder {
    entries: Vec<TraceEntry>,
    patches: HashMap<NodeKey, usize>,
}

impl PatchRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded calls, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Number of patches recorded for `key`.
    #[must_use]
    pub fn patch_count(&self, key: &NodeKey) -> usize {
        self.patches.get(key).copied().unwrap_or(0)
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.patches.clear();
    }
}

impl SceneTrace for PatchRecorder {
    fn mounted(&mut self, key: &NodeKey, kind: NodeKind) {
        self.entries.push(TraceEntry::Mounted(key.clone(), kind));
    }

    fn patched(&mut self, key: &NodeKey, patch: Patch) {
        *self.patches.entry(key.clone()).or_insert(0) += 1;
        self.entries.push(TraceEntry::Patched(key.clone(), patch));
    }

    fn unmounted(&mut self, key: &NodeKey, kind: NodeKind) {
        self.entries.push(TraceEntry::Unmounted(key.clone(), kind));
    }
}
