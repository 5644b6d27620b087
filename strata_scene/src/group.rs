// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer group node.

use log::debug;
use strata_engine::{HandleId, LayerProperty, MapEngine};

use crate::attach::{detach, reconcile_parent};
use crate::context::HandleContext;
use crate::descriptor::GroupDescriptor;

bitflags::bitflags! {
    /// Engine calls made by one [`LayerGroupNode::update`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct GroupChanges: u8 {
        /// Opacity written.
        const OPACITY    = 1 << 0;
        /// Visibility written.
        const VISIBLE    = 1 << 1;
        /// Z-index written.
        const Z_INDEX    = 1 << 2;
        /// Moved to another parent.
        const REPARENTED = 1 << 3;
    }
}

/// Owns one engine layer group.
///
/// Children resolve the group as their parent through
/// [`HandleContext::with_layer_group`].
#[derive(Debug)]
pub struct LayerGroupNode {
    group: HandleId,
    applied: GroupDescriptor,
}

impl LayerGroupNode {
    /// Creates the group and attaches it to the resolved parent.
    pub fn mount<E: MapEngine + ?Sized>(
        engine: &mut E,
        ctx: &HandleContext,
        desc: &GroupDescriptor,
    ) -> Self {
        let group = engine.create_group();
        let mut node = Self {
            group,
            applied: GroupDescriptor::default(),
        };
        node.apply(engine, desc);
        reconcile_parent(engine, group, ctx.parent());
        debug!("mounted group {group:?} under {:?}", ctx.parent());
        node
    }

    /// Engine group owned by this node.
    #[must_use]
    pub fn handle(&self) -> HandleId {
        self.group
    }

    /// Writes changed scalar properties and follows the resolved parent.
    pub fn update<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        ctx: &HandleContext,
        desc: &GroupDescriptor,
    ) -> GroupChanges {
        let mut changes = self.apply(engine, desc);
        if reconcile_parent(engine, self.group, ctx.parent()) {
            changes |= GroupChanges::REPARENTED;
        }
        changes
    }

    /// Detaches the group from whichever parent holds it and disposes it.
    ///
    /// Children must be unmounted first.
    pub fn unmount<E: MapEngine + ?Sized>(self, engine: &mut E) {
        detach(engine, self.group);
        engine.dispose(self.group);
        debug!("unmounted group {:?}", self.group);
    }

    fn apply<E: MapEngine + ?Sized>(&mut self, engine: &mut E, desc: &GroupDescriptor) -> GroupChanges {
        let mut changes = GroupChanges::empty();
        if desc.opacity != self.applied.opacity {
            engine.set_property(self.group, LayerProperty::Opacity(desc.opacity));
            changes |= GroupChanges::OPACITY;
        }
        if desc.visible != self.applied.visible {
            engine.set_property(self.group, LayerProperty::Visible(desc.visible));
            changes |= GroupChanges::VISIBLE;
        }
        if desc.z_index != self.applied.z_index {
            engine.set_property(self.group, LayerProperty::ZIndex(desc.z_index));
            changes |= GroupChanges::Z_INDEX;
        }
        self.applied = *desc;
        changes
    }
}
