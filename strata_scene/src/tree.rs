// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Keyed render-pass driver.

use hashbrown::{HashMap, HashSet};
use log::{trace, warn};
use strata_engine::{EngineEvent, HandleId, MapEngine};
use strata_view::{ViewConfig, ViewController, ViewSink};

use crate::blocker::InteractionBlocker;
use crate::context::HandleContext;
use crate::descriptor::{NodeDescriptor, NodeKey, NodeKind, SceneNode};
use crate::error::SceneError;
use crate::group::LayerGroupNode;
use crate::layer::LayerNode;
use crate::overlay::OverlayNode;
use crate::trace::{Patch, SceneTrace};

/// Upper bound on drain rounds in [`SceneTree::dispatch_pending`].
const MAX_DISPATCH_ROUNDS: usize = 16;

/// Configuration handed to [`SceneTree::new`].
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SceneConfig {
    /// Configuration of every view node.
    pub view: ViewConfig,
}

impl SceneConfig {
    /// Returns a copy with `view`.
    #[must_use]
    pub fn with_view(mut self, view: ViewConfig) -> Self {
        self.view = view;
        self
    }
}

#[derive(Debug)]
enum LiveNode {
    View(ViewController),
    Group(LayerGroupNode),
    Layer(LayerNode),
    Overlay(OverlayNode),
    Blocker(InteractionBlocker),
}

impl LiveNode {
    fn kind(&self) -> NodeKind {
        match self {
            Self::View(_) => NodeKind::View,
            Self::Group(_) => NodeKind::Group,
            Self::Layer(_) => NodeKind::Layer,
            Self::Overlay(_) => NodeKind::Overlay,
            Self::Blocker(_) => NodeKind::Blocker,
        }
    }
}

#[derive(Debug)]
struct Live {
    key: NodeKey,
    node: LiveNode,
    children: Vec<Live>,
}

/// Everything a reconciliation pass threads down the tree.
struct Pass<'a, E: ?Sized, S: ?Sized, T: ?Sized> {
    engine: &'a mut E,
    config: SceneConfig,
    sink: &'a mut S,
    trace: &'a mut T,
}

/// Owns the live nodes of one declarative scene and reconciles them against
/// each new description.
///
/// Nodes are matched to their previous incarnation by key among siblings.
/// A matched node is patched in place; an unmatched one is mounted; a
/// previous node with no match, or whose kind changed, is unmounted. Every
/// engine handle is owned by exactly one live node and released exactly once.
#[derive(Debug)]
pub struct SceneTree {
    config: SceneConfig,
    roots: Vec<Live>,
}

impl SceneTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config,
            roots: Vec::new(),
        }
    }

    /// Configuration the tree was created with.
    #[must_use]
    pub fn config(&self) -> SceneConfig {
        self.config
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        fn count(nodes: &[Live]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.roots)
    }

    /// Whether no node is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Reconciles the live tree against `nodes`, rooted at `map`.
    ///
    /// `map` may change between passes; every node re-resolves its parent.
    /// Views that are unmounted flush their last camera to `sink`.
    ///
    /// A description with duplicate sibling keys is rejected before any
    /// engine call. If the engine rejects a node, the pass stops there and
    /// returns the error; nodes not yet reached keep their previous state and
    /// nothing is leaked.
    pub fn render<E, S, T>(
        &mut self,
        engine: &mut E,
        map: Option<HandleId>,
        nodes: &[SceneNode],
        sink: &mut S,
        trace: &mut T,
    ) -> Result<(), SceneError>
    where
        E: MapEngine + ?Sized,
        S: ViewSink + ?Sized,
        T: SceneTrace + ?Sized,
    {
        check_keys(nodes)?;
        let mut pass = Pass {
            engine,
            config: self.config,
            sink,
            trace,
        };
        reconcile(&mut pass, &HandleContext::new(map), &mut self.roots, nodes)
    }

    /// Routes one engine event to the node that owns its target.
    ///
    /// Returns `true` if a node consumed it.
    pub fn dispatch<E, S>(&mut self, engine: &mut E, event: &EngineEvent, now: u64, sink: &mut S) -> bool
    where
        E: MapEngine + ?Sized,
        S: ViewSink + ?Sized,
    {
        let handled = route(&mut self.roots, engine, event, now, sink);
        if !handled {
            trace!("unrouted event {event:?}");
        }
        handled
    }

    /// Drains the engine queue and dispatches until it stays empty.
    ///
    /// Handling an event may queue further events (a retried fit, a drag
    /// starting). Rounds are bounded; returns the number of events handed out.
    pub fn dispatch_pending<E, S>(&mut self, engine: &mut E, now: u64, sink: &mut S) -> usize
    where
        E: MapEngine + ?Sized,
        S: ViewSink + ?Sized,
    {
        let mut dispatched = 0;
        for _ in 0..MAX_DISPATCH_ROUNDS {
            let events = engine.drain_events();
            if events.is_empty() {
                return dispatched;
            }
            dispatched += events.len();
            for event in &events {
                self.dispatch(engine, event, now, sink);
            }
        }
        warn!("engine still queuing events after {MAX_DISPATCH_ROUNDS} dispatch rounds");
        dispatched
    }

    /// Drives deferred work that is due at `now`.
    ///
    /// Returns `true` if anything was reported to `sink`.
    pub fn poll<S: ViewSink + ?Sized>(&mut self, now: u64, sink: &mut S) -> bool {
        let mut reported = false;
        visit_mut(&mut self.roots, &mut |live| {
            if let LiveNode::View(view) = &mut live.node {
                reported |= view.poll(now, &mut *sink);
            }
        });
        reported
    }

    /// Earliest time at which [`poll`](Self::poll) has something to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        let mut deadline: Option<u64> = None;
        visit(&self.roots, &mut |live| {
            if let LiveNode::View(view) = &live.node {
                if let Some(d) = view.next_deadline() {
                    deadline = Some(deadline.map_or(d, |cur| cur.min(d)));
                }
            }
        });
        deadline
    }

    /// Every engine handle owned by a live node, with the owner's key.
    ///
    /// A layer contributes its layer and its source.
    #[must_use]
    pub fn owned_handles(&self) -> Vec<(NodeKey, HandleId)> {
        let mut owned = Vec::new();
        visit(&self.roots, &mut |live| match &live.node {
            LiveNode::View(view) => owned.push((live.key.clone(), view.handle())),
            LiveNode::Group(group) => owned.push((live.key.clone(), group.handle())),
            LiveNode::Layer(layer) => {
                owned.push((live.key.clone(), layer.handle()));
                owned.push((live.key.clone(), layer.source()));
            }
            LiveNode::Overlay(overlay) => owned.push((live.key.clone(), overlay.handle())),
            LiveNode::Blocker(_) => {}
        });
        owned
    }

    /// Unmounts every node, children before parents.
    pub fn unmount_all<E, S>(&mut self, engine: &mut E, sink: &mut S)
    where
        E: MapEngine + ?Sized,
        S: ViewSink + ?Sized,
    {
        let mut no_trace = ();
        let mut pass = Pass {
            engine,
            config: self.config,
            sink,
            trace: &mut no_trace,
        };
        for live in self.roots.drain(..) {
            unmount(&mut pass, live);
        }
    }
}

fn check_keys(nodes: &[SceneNode]) -> Result<(), SceneError> {
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !seen.insert(&node.key) {
            return Err(SceneError::DuplicateKey {
                key: node.key.clone(),
            });
        }
        check_keys(&node.children)?;
    }
    Ok(())
}

fn reconcile<E, S, T>(
    pass: &mut Pass<'_, E, S, T>,
    ctx: &HandleContext,
    live: &mut Vec<Live>,
    desired: &[SceneNode],
) -> Result<(), SceneError>
where
    E: MapEngine + ?Sized,
    S: ViewSink + ?Sized,
    T: SceneTrace + ?Sized,
{
    let mut previous: Vec<Option<Live>> = live.drain(..).map(Some).collect();
    let index: HashMap<NodeKey, usize> = previous
        .iter()
        .enumerate()
        .filter_map(|(i, l)| l.as_ref().map(|l| (l.key.clone(), i)))
        .collect();

    let mut next = Vec::with_capacity(desired.len());
    let mut result = Ok(());
    for node in desired {
        let old = index.get(&node.key).and_then(|&i| previous[i].take());
        let old = match old {
            Some(old) if old.node.kind() != node.descriptor.kind() => {
                unmount(pass, old);
                None
            }
            old => old,
        };
        let step = match old {
            Some(mut old) => match patch(pass, ctx, &mut old, node) {
                Ok(()) => Ok(old),
                Err(err) => Err((Some(old), err)),
            },
            None => mount(pass, ctx, node),
        };
        match step {
            Ok(live) => next.push(live),
            Err((live, err)) => {
                next.extend(live);
                result = Err(err);
                break;
            }
        }
    }

    match result {
        Ok(()) => {
            for old in previous.into_iter().flatten() {
                unmount(pass, old);
            }
        }
        // Unreached previous nodes stay live and are retried next pass.
        Err(_) => next.extend(previous.into_iter().flatten()),
    }
    *live = next;
    result
}

/// A failed mount hands back whatever part of the subtree did get mounted.
type MountResult = Result<Live, (Option<Live>, SceneError)>;

fn mount<E, S, T>(pass: &mut Pass<'_, E, S, T>, ctx: &HandleContext, node: &SceneNode) -> MountResult
where
    E: MapEngine + ?Sized,
    S: ViewSink + ?Sized,
    T: SceneTrace + ?Sized,
{
    let engine = &mut *pass.engine;
    let live = match &node.descriptor {
        NodeDescriptor::View(desc) => {
            LiveNode::View(ViewController::mount(engine, ctx.map(), desc, pass.config.view))
        }
        NodeDescriptor::Group(desc) => LiveNode::Group(LayerGroupNode::mount(engine, ctx, desc)),
        NodeDescriptor::Layer(desc) => match LayerNode::mount(engine, ctx, desc) {
            Ok(layer) => LiveNode::Layer(layer),
            Err(source) => {
                return Err((
                    None,
                    SceneError::Engine {
                        key: node.key.clone(),
                        source,
                    },
                ));
            }
        },
        NodeDescriptor::Overlay(desc) => LiveNode::Overlay(OverlayNode::mount(engine, ctx, desc)),
        NodeDescriptor::Blocker(class) => {
            LiveNode::Blocker(InteractionBlocker::mount(engine, ctx.map(), *class))
        }
    };
    pass.trace.mounted(&node.key, node.descriptor.kind());
    let mut live = Live {
        key: node.key.clone(),
        node: live,
        children: Vec::new(),
    };
    let child_ctx = child_context(ctx, &live.node);
    match reconcile(pass, &child_ctx, &mut live.children, &node.children) {
        Ok(()) => Ok(live),
        Err(err) => Err((Some(live), err)),
    }
}

fn patch<E, S, T>(
    pass: &mut Pass<'_, E, S, T>,
    ctx: &HandleContext,
    live: &mut Live,
    node: &SceneNode,
) -> Result<(), SceneError>
where
    E: MapEngine + ?Sized,
    S: ViewSink + ?Sized,
    T: SceneTrace + ?Sized,
{
    let engine = &mut *pass.engine;
    let patch = match (&mut live.node, &node.descriptor) {
        (LiveNode::View(view), NodeDescriptor::View(desc)) => {
            Some(view.update(engine, ctx.map(), desc))
                .filter(|c| !c.is_empty())
                .map(Patch::View)
        }
        (LiveNode::Group(group), NodeDescriptor::Group(desc)) => {
            Some(group.update(engine, ctx, desc))
                .filter(|c| !c.is_empty())
                .map(Patch::Group)
        }
        (LiveNode::Layer(layer), NodeDescriptor::Layer(desc)) => {
            match layer.update(engine, ctx, desc) {
                Ok(c) => Some(c).filter(|c| !c.is_empty()).map(Patch::Layer),
                Err(source) => {
                    return Err(SceneError::Engine {
                        key: node.key.clone(),
                        source,
                    });
                }
            }
        }
        (LiveNode::Overlay(overlay), NodeDescriptor::Overlay(desc)) => {
            Some(overlay.update(engine, ctx, desc))
                .filter(|c| !c.is_empty())
                .map(Patch::Overlay)
        }
        (LiveNode::Blocker(blocker), NodeDescriptor::Blocker(class)) => blocker
            .update(engine, ctx.map(), *class)
            .then_some(Patch::Blocker),
        // Kinds are matched by the caller.
        _ => None,
    };
    if let Some(patch) = patch {
        pass.trace.patched(&node.key, patch);
    }
    let child_ctx = child_context(ctx, &live.node);
    reconcile(pass, &child_ctx, &mut live.children, &node.children)
}

fn unmount<E, S, T>(pass: &mut Pass<'_, E, S, T>, live: Live)
where
    E: MapEngine + ?Sized,
    S: ViewSink + ?Sized,
    T: SceneTrace + ?Sized,
{
    for child in live.children {
        unmount(pass, child);
    }
    let kind = live.node.kind();
    let engine = &mut *pass.engine;
    match live.node {
        LiveNode::View(view) => view.unmount(engine, &mut *pass.sink),
        LiveNode::Group(group) => group.unmount(engine),
        LiveNode::Layer(layer) => layer.unmount(engine),
        LiveNode::Overlay(overlay) => overlay.unmount(engine),
        LiveNode::Blocker(blocker) => blocker.unmount(engine),
    }
    pass.trace.unmounted(&live.key, kind);
}

fn child_context(ctx: &HandleContext, node: &LiveNode) -> HandleContext {
    match node {
        LiveNode::View(view) => ctx.with_view(view.handle()),
        LiveNode::Group(group) => ctx.with_layer_group(group.handle()),
        LiveNode::Layer(_) | LiveNode::Overlay(_) | LiveNode::Blocker(_) => *ctx,
    }
}

fn route<E, S>(nodes: &mut [Live], engine: &mut E, event: &EngineEvent, now: u64, sink: &mut S) -> bool
where
    E: MapEngine + ?Sized,
    S: ViewSink + ?Sized,
{
    for live in nodes {
        let handled = match &mut live.node {
            LiveNode::View(view) => view.handle_event(engine, event, now, sink),
            LiveNode::Overlay(overlay) => overlay.handle_event(engine, event),
            LiveNode::Group(_) | LiveNode::Layer(_) | LiveNode::Blocker(_) => false,
        };
        if handled || route(&mut live.children, engine, event, now, sink) {
            return true;
        }
    }
    false
}

fn visit(nodes: &[Live], f: &mut impl FnMut(&Live)) {
    for live in nodes {
        f(live);
        visit(&live.children, f);
    }
}

fn visit_mut(nodes: &mut [Live], f: &mut impl FnMut(&mut Live)) {
    for live in nodes {
        f(live);
        visit_mut(&mut live.children, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::GroupDescriptor;
    use crate::trace::{PatchRecorder, TraceEntry};
    use kurbo::Size;
    use strata_engine::HeadlessEngine;

    #[test]
    fn duplicate_keys_are_rejected_before_any_engine_call() {
        let mut engine = HeadlessEngine::new();
        let map = engine.create_map(Size::new(10.0, 10.0));
        engine.clear_mutations();
        let mut tree = SceneTree::new(SceneConfig::default());
        let nodes = vec![
            SceneNode::group("g", GroupDescriptor::default()),
            SceneNode::group("g", GroupDescriptor::default()),
        ];
        let err = tree.render(&mut engine, Some(map), &nodes, &mut (), &mut ());
        assert_eq!(err, Err(SceneError::DuplicateKey { key: "g".into() }));
        assert_eq!(engine.mutation_count(), 0);
        assert!(tree.is_empty());
    }

    #[test]
    fn kind_change_remounts_under_the_same_key() {
        let mut engine = HeadlessEngine::new();
        let map = engine.create_map(Size::new(10.0, 10.0));
        let mut tree = SceneTree::new(SceneConfig::default());
        let mut rec = PatchRecorder::new();
        let group = vec![SceneNode::group("n", GroupDescriptor::default())];
        tree.render(&mut engine, Some(map), &group, &mut (), &mut rec)
            .unwrap();
        let blocker = vec![SceneNode::blocker(
            "n",
            strata_engine::InteractionClass::DragPan,
        )];
        rec.clear();
        tree.render(&mut engine, Some(map), &blocker, &mut (), &mut rec)
            .unwrap();
        assert_eq!(
            rec.entries(),
            &[
                TraceEntry::Unmounted("n".into(), NodeKind::Group),
                TraceEntry::Mounted("n".into(), NodeKind::Blocker),
            ]
        );
        assert_eq!(tree.len(), 1);
        assert!(tree.owned_handles().is_empty());
    }

    #[test]
    fn nested_nodes_are_counted() {
        let mut engine = HeadlessEngine::new();
        let map = engine.create_map(Size::new(10.0, 10.0));
        let mut tree = SceneTree::new(SceneConfig::default());
        let nodes = vec![
            SceneNode::group("outer", GroupDescriptor::default()).with_children(vec![
                SceneNode::group("inner", GroupDescriptor::default()),
            ]),
        ];
        tree.render(&mut engine, Some(map), &nodes, &mut (), &mut ())
            .unwrap();
        assert_eq!(tree.len(), 2);
        let handles = tree.owned_handles();
        assert_eq!(engine.parent_of(handles[1].1), Some(handles[0].1));
        tree.unmount_all(&mut engine, &mut ());
        assert!(tree.is_empty());
        assert!(handles.iter().all(|(_, h)| !engine.is_alive(*h)));
    }
}
