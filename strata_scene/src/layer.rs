// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer node: one engine layer plus its source.
//!
//! On update, descriptor changes are sorted into buckets, cheapest last:
//! - A different [`LayerKind`] rebuilds the engine layer.
//! - A different source (URL, projection, inputs, or revision) builds a new
//!   source and swaps it into the existing layer, keeping the layer's
//!   identity and its render hooks.
//! - Scalar properties are written with one narrow setter each.
//! - A different style function is set in place.
//! - A different render hook is unbound, then the new one is bound.
//!
//! Colorized rasters write their payload into the source before anything
//! else, so the first frame after an update reads the fresh payload.

use std::rc::Rc;

use log::debug;
use strata_engine::{
    EngineError, HandleId, LayerKind, LayerProperty, ListenerKey, MapEngine, Projection,
    RenderHook, RenderPhase, SourceSpec, StyleFn,
};

use crate::attach::{detach, reconcile_parent};
use crate::context::HandleContext;
use crate::descriptor::{LayerDescriptor, LayerProps};

bitflags::bitflags! {
    /// Engine calls made by one [`LayerNode::update`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LayerChanges: u16 {
        /// Raster payload written.
        const PAYLOAD    = 1 << 0;
        /// Layer rebuilt for a new kind.
        const REBUILT    = 1 << 1;
        /// Source swapped.
        const SOURCE     = 1 << 2;
        /// Opacity written.
        const OPACITY    = 1 << 3;
        /// Visibility written.
        const VISIBLE    = 1 << 4;
        /// Z-index written.
        const Z_INDEX    = 1 << 5;
        /// Extent written.
        const EXTENT     = 1 << 6;
        /// Preload depth written.
        const PRELOAD    = 1 << 7;
        /// Zoom window written.
        const ZOOM_RANGE = 1 << 8;
        /// Style function rebound.
        const STYLE      = 1 << 9;
        /// Render hooks rebound.
        const HOOKS      = 1 << 10;
        /// Moved to another parent.
        const REPARENTED = 1 << 11;
    }
}

#[derive(Clone)]
struct BoundHook {
    key: ListenerKey,
    hook: RenderHook,
}

impl core::fmt::Debug for BoundHook {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BoundHook")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Owns one engine layer and its source.
#[derive(Debug)]
pub struct LayerNode {
    layer: HandleId,
    source: HandleId,
    kind: LayerKind,
    spec: SourceSpec,
    revision: u64,
    projection: Projection,
    applied: LayerDescriptor,
    pre: Option<BoundHook>,
    post: Option<BoundHook>,
}

impl LayerNode {
    /// Builds the source and layer and attaches the layer to the resolved parent.
    ///
    /// Fails only if the engine rejects the source; nothing is left behind then.
    pub fn mount<E: MapEngine + ?Sized>(
        engine: &mut E,
        ctx: &HandleContext,
        desc: &LayerDescriptor,
    ) -> Result<Self, EngineError> {
        let projection = ctx.projection(engine);
        let spec = desc.source.spec(projection);
        let source = engine.create_source(&spec)?;
        if let Some(ramp) = desc.source.ramp() {
            engine.set_operation_data(source, &ramp.to_operation_data());
        }
        let kind = desc.source.kind();
        let layer = engine.create_layer(kind, source);
        let mut node = Self {
            layer,
            source,
            kind,
            spec,
            revision: desc.revision,
            projection,
            applied: desc.clone(),
            pre: None,
            post: None,
        };
        node.apply_props(engine, &LayerProps::default(), &desc.props, true);
        if let Some(style) = desc.source.style() {
            engine.set_style(layer, Some(style.clone()));
        }
        node.pre = bind(engine, layer, RenderPhase::PreRender, desc.pre_render.as_ref());
        node.post = bind(engine, layer, RenderPhase::PostRender, desc.post_render.as_ref());
        reconcile_parent(engine, layer, ctx.parent());
        debug!("mounted {kind:?} layer {layer:?} under {:?}", ctx.parent());
        Ok(node)
    }

    /// Engine layer owned by this node.
    #[must_use]
    pub fn handle(&self) -> HandleId {
        self.layer
    }

    /// Engine source owned by this node.
    #[must_use]
    pub fn source(&self) -> HandleId {
        self.source
    }

    /// Brings the engine layer in line with `desc`.
    ///
    /// On error the node keeps its previous engine objects.
    pub fn update<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        ctx: &HandleContext,
        desc: &LayerDescriptor,
    ) -> Result<LayerChanges, EngineError> {
        let mut changes = LayerChanges::empty();

        let ramp = desc.source.ramp();
        if let Some(fresh) = ramp.filter(|r| Some(*r) != self.applied.source.ramp()) {
            engine.set_operation_data(self.source, &fresh.to_operation_data());
            changes |= LayerChanges::PAYLOAD;
        }

        if desc.source.kind() != self.kind {
            debug!(
                "layer {:?}: kind {:?} -> {:?}, rebuilding",
                self.layer,
                self.kind,
                desc.source.kind()
            );
            let fresh = Self::mount(engine, ctx, desc)?;
            let stale = core::mem::replace(self, fresh);
            stale.unmount(engine);
            return Ok(changes | LayerChanges::REBUILT);
        }

        let projection = ctx.projection(engine);
        let spec = desc.source.spec(projection);
        if !same_source(&spec, &self.spec) || desc.revision != self.revision {
            let source = engine.create_source(&spec)?;
            if let Some(ramp) = ramp {
                engine.set_operation_data(source, &ramp.to_operation_data());
            }
            engine.set_layer_source(self.layer, source);
            engine.dispose(self.source);
            debug!(
                "layer {:?}: source {:?} -> {source:?}",
                self.layer, self.source
            );
            self.source = source;
            self.spec = spec;
            self.revision = desc.revision;
            changes |= LayerChanges::SOURCE;
        }

        let reproject = projection != self.projection;
        self.projection = projection;
        let prev = self.applied.props;
        changes |= self.apply_props(engine, &prev, &desc.props, reproject);

        let style = desc.source.style();
        if !same_fn(style, self.applied.source.style()) {
            engine.set_style(self.layer, style.cloned());
            changes |= LayerChanges::STYLE;
        }

        if !same_fn(desc.pre_render.as_ref(), self.pre.as_ref().map(|b| &b.hook)) {
            unbind(engine, self.pre.take());
            self.pre = bind(
                engine,
                self.layer,
                RenderPhase::PreRender,
                desc.pre_render.as_ref(),
            );
            changes |= LayerChanges::HOOKS;
        }
        if !same_fn(desc.post_render.as_ref(), self.post.as_ref().map(|b| &b.hook)) {
            unbind(engine, self.post.take());
            self.post = bind(
                engine,
                self.layer,
                RenderPhase::PostRender,
                desc.post_render.as_ref(),
            );
            changes |= LayerChanges::HOOKS;
        }

        if reconcile_parent(engine, self.layer, ctx.parent()) {
            changes |= LayerChanges::REPARENTED;
        }
        self.applied = desc.clone();
        Ok(changes)
    }

    /// Unbinds hooks, detaches from the current parent, and disposes the
    /// layer and its source.
    pub fn unmount<E: MapEngine + ?Sized>(mut self, engine: &mut E) {
        unbind(engine, self.pre.take());
        unbind(engine, self.post.take());
        detach(engine, self.layer);
        engine.dispose(self.layer);
        engine.dispose(self.source);
        debug!("unmounted layer {:?}", self.layer);
    }

    fn apply_props<E: MapEngine + ?Sized>(
        &self,
        engine: &mut E,
        prev: &LayerProps,
        next: &LayerProps,
        reproject: bool,
    ) -> LayerChanges {
        let layer = self.layer;
        let mut changes = LayerChanges::empty();
        if next.opacity != prev.opacity {
            engine.set_property(layer, LayerProperty::Opacity(next.opacity));
            changes |= LayerChanges::OPACITY;
        }
        if next.visible != prev.visible {
            engine.set_property(layer, LayerProperty::Visible(next.visible));
            changes |= LayerChanges::VISIBLE;
        }
        if next.z_index != prev.z_index {
            engine.set_property(layer, LayerProperty::ZIndex(next.z_index));
            changes |= LayerChanges::Z_INDEX;
        }
        if next.extent != prev.extent || (reproject && next.extent.is_some()) {
            let extent = next.extent.map(|b| b.project(self.projection));
            engine.set_property(layer, LayerProperty::Extent(extent));
            changes |= LayerChanges::EXTENT;
        }
        if next.preload != prev.preload {
            engine.set_property(layer, LayerProperty::Preload(next.preload));
            changes |= LayerChanges::PRELOAD;
        }
        if next.min_zoom != prev.min_zoom || next.max_zoom != prev.max_zoom {
            engine.set_property(
                layer,
                LayerProperty::ZoomRange {
                    min: next.min_zoom,
                    max: next.max_zoom,
                },
            );
            changes |= LayerChanges::ZOOM_RANGE;
        }
        changes
    }
}

fn bind<E: MapEngine + ?Sized>(
    engine: &mut E,
    layer: HandleId,
    phase: RenderPhase,
    hook: Option<&RenderHook>,
) -> Option<BoundHook> {
    let hook = hook?.clone();
    let key = engine.bind_render_hook(layer, phase, hook.clone());
    Some(BoundHook { key, hook })
}

fn unbind<E: MapEngine + ?Sized>(engine: &mut E, bound: Option<BoundHook>) {
    if let Some(b) = bound {
        engine.unlisten(b.key);
    }
}

/// Compares two optional callbacks by identity.
fn same_fn<T: ?Sized>(a: Option<&Rc<T>>, b: Option<&Rc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

/// Compares the data-addressing parts of two specs, ignoring operations.
fn same_source(a: &SourceSpec, b: &SourceSpec) -> bool {
    match (a, b) {
        (
            SourceSpec::Tile {
                url: ua,
                projection: pa,
            },
            SourceSpec::Tile {
                url: ub,
                projection: pb,
            },
        )
        | (
            SourceSpec::Vector {
                url: ua,
                projection: pa,
            },
            SourceSpec::Vector {
                url: ub,
                projection: pb,
            },
        )
        | (
            SourceSpec::VectorTile {
                url: ua,
                projection: pa,
            },
            SourceSpec::VectorTile {
                url: ub,
                projection: pb,
            },
        ) => ua == ub && pa == pb,
        (SourceSpec::Raster { inputs: ia, .. }, SourceSpec::Raster { inputs: ib, .. }) => ia == ib,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::LayerSource;
    use kurbo::Size;
    use strata_engine::{FeatureStyle, HeadlessEngine, MutationOp};

    fn tile(url: &str) -> LayerDescriptor {
        LayerDescriptor::new(LayerSource::Tile {
            url: url.into(),
            projection: None,
        })
    }

    fn setup() -> (HeadlessEngine, HandleContext) {
        let mut engine = HeadlessEngine::new();
        let map = engine.create_map(Size::new(256.0, 256.0));
        (engine, HandleContext::new(Some(map)))
    }

    #[test]
    fn revision_bump_swaps_the_source_in_place() {
        let (mut engine, ctx) = setup();
        let desc = tile("https://a/{z}/{x}/{y}.png");
        let mut node = LayerNode::mount(&mut engine, &ctx, &desc).unwrap();
        let (layer, old_source) = (node.handle(), node.source());

        let changes = node
            .update(&mut engine, &ctx, &desc.clone().with_revision(1))
            .unwrap();
        assert_eq!(changes, LayerChanges::SOURCE);
        assert_eq!(node.handle(), layer);
        assert_ne!(node.source(), old_source);
        assert!(!engine.is_alive(old_source));
        assert_eq!(engine.layer_source(layer), Some(node.source()));
    }

    #[test]
    fn fresh_style_closure_rebinds_without_new_source() {
        let (mut engine, ctx) = setup();
        let vector = |style: StyleFn| {
            LayerDescriptor::new(LayerSource::Vector {
                url: "https://features.json".into(),
                projection: None,
                style: Some(style),
            })
        };
        let mut node = LayerNode::mount(
            &mut engine,
            &ctx,
            &vector(Rc::new(|_, _| FeatureStyle::default())),
        )
        .unwrap();
        engine.clear_mutations();

        let changes = node
            .update(
                &mut engine,
                &ctx,
                &vector(Rc::new(|_, _| FeatureStyle::default())),
            )
            .unwrap();
        assert_eq!(changes, LayerChanges::STYLE);
        assert!(
            engine
                .mutations()
                .iter()
                .all(|m| m.op == MutationOp::SetStyle)
        );
    }

    #[test]
    fn kind_change_rebuilds_under_the_same_parent() {
        let (mut engine, ctx) = setup();
        let mut node = LayerNode::mount(&mut engine, &ctx, &tile("https://a/{z}/{x}/{y}.png")).unwrap();
        let old = node.handle();
        let vt = LayerDescriptor::new(LayerSource::VectorTile {
            url: "https://vt/{z}/{x}/{y}.pbf".into(),
            projection: None,
            style: None,
        });
        let changes = node.update(&mut engine, &ctx, &vt).unwrap();
        assert!(changes.contains(LayerChanges::REBUILT));
        assert!(!engine.is_alive(old));
        assert_eq!(engine.parent_of(node.handle()), ctx.map());
        assert_eq!(engine.layer_kind(node.handle()), Some(LayerKind::VectorTile));
    }

    #[test]
    fn failed_source_swap_keeps_the_old_objects() {
        let (mut engine, ctx) = setup();
        let mut node = LayerNode::mount(&mut engine, &ctx, &tile("https://a/{z}/{x}/{y}.png")).unwrap();
        let source = node.source();
        let err = node.update(&mut engine, &ctx, &tile("https://broken"));
        assert!(err.is_err());
        assert_eq!(node.source(), source);
        assert!(engine.is_alive(source));
    }
}
