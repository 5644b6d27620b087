// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tests for `strata_scene::SceneTree` against the headless engine.
//!
//! Each test renders a declarative scene, drives the engine the way a user
//! would, and checks what the engine ends up holding.

use std::cell::RefCell;
use std::rc::Rc;

use kurbo::{Point, Size};
use strata_engine::{
    FeatureStyle, GeoPoint, HandleId, HandleKind, HeadlessEngine, InteractionClass, MapEngine,
    MutationOp, Projection, RenderEvent, RenderHook, RenderPhase, StyleFn,
};
use strata_raster::{RampPayload, colorize};
use strata_scene::{
    GroupDescriptor, HandleContext, LayerChanges, LayerDescriptor, LayerNode, LayerProps,
    LayerSource, NodeKey, OverlayDescriptor, Patch, PatchRecorder, SceneConfig, SceneError,
    SceneNode, SceneTree, TraceEntry,
};
use strata_view::{ViewDescriptor, ViewState, ViewUpdate};

const TILES: &str = "https://tile.example.org/{z}/{x}/{y}.png";
const DEM: &str = "https://dem.example.org/{z}/{x}/{y}.png";

fn camera(center: GeoPoint, zoom: f64) -> ViewDescriptor {
    ViewDescriptor::new(ViewState::new(center, zoom))
}

fn tiles() -> LayerDescriptor {
    LayerDescriptor::new(LayerSource::Tile {
        url: TILES.into(),
        projection: None,
    })
}

fn elevation(ramp: RampPayload) -> LayerDescriptor {
    LayerDescriptor::new(LayerSource::ColorizedRaster {
        inputs: vec![DEM.into()],
        ramp,
    })
}

fn setup() -> (HeadlessEngine, HandleId, SceneTree) {
    let mut engine = HeadlessEngine::new();
    let map = engine.create_map(Size::new(800.0, 600.0));
    (engine, map, SceneTree::new(SceneConfig::default()))
}

fn handle_of(tree: &SceneTree, key: &str) -> HandleId {
    tree.owned_handles()
        .into_iter()
        .find(|(k, _)| k.as_str() == key)
        .map(|(_, h)| h)
        .unwrap()
}

fn drag_pan_active(engine: &HeadlessEngine, map: HandleId) -> bool {
    engine
        .interactions(map, InteractionClass::DragPan)
        .into_iter()
        .all(|id| engine.interaction_active(map, id))
}

/// A scene with one node of every kind.
fn full_scene(style: &StyleFn, on_commit: &Rc<dyn Fn(GeoPoint)>) -> Vec<SceneNode> {
    let vector = LayerDescriptor::new(LayerSource::Vector {
        url: "https://example.org/parcels.json".into(),
        projection: Some(Projection::WebMercator),
        style: Some(style.clone()),
    });
    vec![
        SceneNode::view("camera", camera(GeoPoint::new(2.35, 48.85), 12.0)).with_children(vec![
            SceneNode::group("base", GroupDescriptor::default()).with_children(vec![
                SceneNode::layer("osm", tiles()),
                SceneNode::layer("dem", elevation(RampPayload::new(0.2, 0.8, 0.9))),
            ]),
            SceneNode::layer("parcels", vector),
            SceneNode::overlay(
                "pin",
                OverlayDescriptor::new(GeoPoint::new(2.35, 48.85)).draggable(on_commit.clone()),
            ),
            SceneNode::blocker("no-dblclick", InteractionClass::DoubleClickZoom),
        ]),
    ]
}

#[test]
fn rerendering_the_same_scene_makes_no_engine_calls() {
    let (mut engine, map, mut tree) = setup();
    let style: StyleFn = Rc::new(|_, _| FeatureStyle::default());
    let on_commit: Rc<dyn Fn(GeoPoint)> = Rc::new(|_| {});
    let scene = full_scene(&style, &on_commit);
    let mut reports: Vec<ViewUpdate> = Vec::new();

    tree.render(&mut engine, Some(map), &scene, &mut reports, &mut ())
        .unwrap();
    tree.dispatch_pending(&mut engine, 0, &mut reports);
    engine.clear_mutations();

    let mut trace = PatchRecorder::new();
    tree.render(&mut engine, Some(map), &scene, &mut reports, &mut trace)
        .unwrap();
    assert_eq!(engine.mutation_count(), 0, "{:?}", engine.mutations());
    assert!(trace.is_empty(), "{:?}", trace.entries());
    assert!(reports.is_empty());
}

#[test]
fn every_handle_has_exactly_one_owner() {
    let (mut engine, map, mut tree) = setup();
    let style: StyleFn = Rc::new(|_, _| FeatureStyle::default());
    let on_commit: Rc<dyn Fn(GeoPoint)> = Rc::new(|_| {});
    let scene = full_scene(&style, &on_commit);
    tree.render(&mut engine, Some(map), &scene, &mut (), &mut ())
        .unwrap();

    let owned = tree.owned_handles();
    let mut handles: Vec<HandleId> = owned.iter().map(|(_, h)| *h).collect();
    handles.sort();
    handles.dedup();
    assert_eq!(handles.len(), owned.len(), "a handle has two owners");

    let live: usize = [
        HandleKind::View,
        HandleKind::Group,
        HandleKind::Layer,
        HandleKind::Source,
        HandleKind::Overlay,
    ]
    .into_iter()
    .map(|kind| engine.live_count(kind))
    .sum();
    assert_eq!(live, owned.len(), "engine holds handles nobody owns");
}

#[test]
fn unmount_all_releases_every_handle_and_listener() {
    let (mut engine, map, mut tree) = setup();
    let style: StyleFn = Rc::new(|_, _| FeatureStyle::default());
    let on_commit: Rc<dyn Fn(GeoPoint)> = Rc::new(|_| {});
    let scene = full_scene(&style, &on_commit);
    let mut reports: Vec<ViewUpdate> = Vec::new();
    tree.render(&mut engine, Some(map), &scene, &mut reports, &mut ())
        .unwrap();

    tree.unmount_all(&mut engine, &mut reports);
    assert!(tree.is_empty());
    for kind in [
        HandleKind::View,
        HandleKind::Group,
        HandleKind::Layer,
        HandleKind::Source,
        HandleKind::Overlay,
    ] {
        assert_eq!(engine.live_count(kind), 0, "{kind:?} leaked");
    }
    assert_eq!(engine.listener_count(), 0);
    assert!(engine.children(map).is_empty());
    assert_eq!(engine.map_view(map), None);
    // Every interaction is back on.
    let dbl = engine.interactions(map, InteractionClass::DoubleClickZoom);
    assert!(dbl.iter().all(|&id| engine.interaction_active(map, id)));
    // The view flushed its camera exactly once.
    assert_eq!(
        reports
            .iter()
            .filter(|u| matches!(u, ViewUpdate::Flushed { .. }))
            .count(),
        1
    );
}

#[test]
fn user_move_is_reported_once_and_the_store_echo_writes_nothing() {
    let (mut engine, map, mut tree) = setup();
    let mut reports: Vec<ViewUpdate> = Vec::new();
    let scene = vec![SceneNode::view("camera", camera(GeoPoint::new(0.0, 0.0), 4.0))];
    tree.render(&mut engine, Some(map), &scene, &mut reports, &mut ())
        .unwrap();
    tree.dispatch_pending(&mut engine, 0, &mut reports);
    assert!(reports.is_empty());

    let view = handle_of(&tree, "camera");
    engine.user_move(view, Point::new(250_000.0, -125_000.0), 6.0);
    tree.dispatch_pending(&mut engine, 10, &mut reports);
    let [ViewUpdate::Moved { center, zoom }] = reports[..] else {
        panic!("expected one move report, got {reports:?}");
    };
    assert_eq!(zoom, 6.0);

    // The host stores the report and renders with it.
    engine.clear_mutations();
    let echoed = vec![SceneNode::view("camera", camera(center, zoom))];
    tree.render(&mut engine, Some(map), &echoed, &mut reports, &mut ())
        .unwrap();
    tree.dispatch_pending(&mut engine, 20, &mut reports);
    assert_eq!(engine.mutation_count(), 0, "{:?}", engine.mutations());
    assert_eq!(reports.len(), 1);
}

#[test]
fn rotations_are_debounced_through_the_tree() {
    let (mut engine, map, mut tree) = setup();
    let mut reports: Vec<ViewUpdate> = Vec::new();
    let scene = vec![SceneNode::view("camera", camera(GeoPoint::new(0.0, 0.0), 4.0))];
    tree.render(&mut engine, Some(map), &scene, &mut reports, &mut ())
        .unwrap();
    tree.dispatch_pending(&mut engine, 0, &mut reports);
    let view = handle_of(&tree, "camera");

    for i in 1..=10_u32 {
        let now = u64::from(i) * 10;
        engine.user_rotate(view, f64::from(i) * 0.05);
        tree.dispatch_pending(&mut engine, now, &mut reports);
        assert!(!tree.poll(now, &mut reports));
    }
    let deadline = tree.next_deadline().unwrap();
    assert!(tree.poll(deadline, &mut reports));
    assert!(!tree.poll(deadline + 1_000, &mut reports));
    assert_eq!(reports, vec![ViewUpdate::Rotated { rotation: 0.5 }]);
}

#[test]
fn ramp_change_is_visible_on_the_next_frame() {
    let (mut engine, map, mut tree) = setup();
    let first = RampPayload::new(0.0, 1.0, 1.0);
    let second = RampPayload::new(0.4, 0.6, 0.5);
    let pixels = [[128, 128, 128, 255], [10, 200, 30, 255], [0, 0, 0, 0]];

    let scene = |ramp| vec![SceneNode::layer("dem", elevation(ramp))];
    tree.render(&mut engine, Some(map), &scene(first), &mut (), &mut ())
        .unwrap();
    let layer = handle_of(&tree, "dem");
    let source = engine.layer_source(layer).unwrap();

    tree.render(&mut engine, Some(map), &scene(second), &mut (), &mut ())
        .unwrap();
    let frame = engine.render_raster(layer, &pixels).unwrap();
    let expected: Vec<[u8; 4]> = pixels.iter().map(|&p| colorize(p, &second)).collect();
    assert_eq!(frame, expected);
    // Same layer and source; only the side channel moved.
    assert_eq!(handle_of(&tree, "dem"), layer);
    assert_eq!(engine.layer_source(layer), Some(source));
}

#[test]
fn render_hooks_rebind_only_on_a_new_function() {
    let (mut engine, map, mut tree) = setup();
    let hits = Rc::new(RefCell::new(0_u32));
    let counter = hits.clone();
    let hook: RenderHook = Rc::new(move |event: &RenderEvent| {
        if event.phase == RenderPhase::PostRender {
            *counter.borrow_mut() += 1;
        }
    });
    let scene = |hook: &RenderHook, revision| {
        vec![SceneNode::layer(
            "osm",
            tiles()
                .with_revision(revision)
                .with_post_render(Some(hook.clone())),
        )]
    };

    tree.render(&mut engine, Some(map), &scene(&hook, 0), &mut (), &mut ())
        .unwrap();
    let layer = handle_of(&tree, "osm");
    assert_eq!(engine.listeners_on(layer), 1);

    // Same function: nothing to do.
    engine.clear_mutations();
    tree.render(&mut engine, Some(map), &scene(&hook, 0), &mut (), &mut ())
        .unwrap();
    assert_eq!(engine.mutation_count(), 0, "{:?}", engine.mutations());

    // A new source keeps the layer and its hook.
    let source = engine.layer_source(layer);
    tree.render(&mut engine, Some(map), &scene(&hook, 1), &mut (), &mut ())
        .unwrap();
    assert_eq!(handle_of(&tree, "osm"), layer);
    assert_ne!(engine.layer_source(layer), source);
    assert_eq!(engine.listeners_on(layer), 1);
    engine.render_frame();
    assert_eq!(*hits.borrow(), 1);

    // A different function is unbound and rebound, nothing else.
    let other: RenderHook = Rc::new(|_: &RenderEvent| {});
    engine.clear_mutations();
    tree.render(&mut engine, Some(map), &scene(&other, 1), &mut (), &mut ())
        .unwrap();
    let ops: Vec<MutationOp> = engine.mutations().iter().map(|m| m.op).collect();
    assert_eq!(ops, [MutationOp::Unlisten, MutationOp::Listen]);
    assert_eq!(engine.listeners_on(layer), 1);
    engine.render_frame();
    assert_eq!(*hits.borrow(), 1);
}

#[test]
fn colorized_frames_are_deterministic() {
    let (mut engine, map, mut tree) = setup();
    let ramp = RampPayload::from_percentiles(10.0, 90.0, 0.8);
    tree.render(
        &mut engine,
        Some(map),
        &[SceneNode::layer("dem", elevation(ramp))],
        &mut (),
        &mut (),
    )
    .unwrap();
    let layer = handle_of(&tree, "dem");
    let pixels: Vec<[u8; 4]> = (0..=255_u8).map(|v| [v, v, v, 255]).collect();
    let a = engine.render_raster(layer, &pixels).unwrap();
    let b = engine.render_raster(layer, &pixels).unwrap();
    assert_eq!(a, b);
    assert!(
        a.iter()
            .zip(&pixels)
            .all(|(&out, &px)| out == colorize(px, &ramp))
    );
}

fn pin_scene(commits: &Rc<RefCell<Vec<GeoPoint>>>, with_pin: bool) -> Vec<SceneNode> {
    let sink = commits.clone();
    let on_commit: Rc<dyn Fn(GeoPoint)> = Rc::new(move |p| sink.borrow_mut().push(p));
    let mut children = Vec::new();
    if with_pin {
        children.push(SceneNode::overlay(
            "pin",
            OverlayDescriptor::new(GeoPoint::new(0.0, 0.0)).draggable(on_commit),
        ));
    }
    vec![SceneNode::view("camera", camera(GeoPoint::new(0.0, 0.0), 5.0)).with_children(children)]
}

#[test]
fn dragging_a_pin_commits_once_at_release_without_panning() {
    let (mut engine, map, mut tree) = setup();
    let commits = Rc::new(RefCell::new(Vec::new()));
    let scene = pin_scene(&commits, true);
    tree.render(&mut engine, Some(map), &scene, &mut (), &mut ())
        .unwrap();
    tree.dispatch_pending(&mut engine, 0, &mut ());
    let view = handle_of(&tree, "camera");
    let center = engine.view_snapshot(view).unwrap().center;

    // The pin sits in the middle of the map.
    engine.pointer_down(map, Point::new(400.0, 300.0));
    tree.dispatch_pending(&mut engine, 0, &mut ());
    assert!(!drag_pan_active(&engine, map));

    engine.pointer_move(map, Point::new(450.0, 300.0));
    tree.dispatch_pending(&mut engine, 0, &mut ());
    engine.pointer_move(map, Point::new(480.0, 320.0));
    tree.dispatch_pending(&mut engine, 0, &mut ());
    assert!(commits.borrow().is_empty(), "moves must not commit");

    let release = Point::new(500.0, 340.0);
    let expected = engine.coordinate_from_pixel(map, release).unwrap();
    engine.pointer_up(map, release);
    tree.dispatch_pending(&mut engine, 0, &mut ());

    let committed = commits.borrow();
    assert_eq!(committed.len(), 1);
    assert!(committed[0].approx_eq(Projection::WebMercator.unproject(expected), 1e-9));
    let pin = handle_of(&tree, "pin");
    assert_eq!(engine.overlay_position(pin), Some(expected));
    assert_eq!(engine.view_snapshot(view).unwrap().center, center);
    assert!(drag_pan_active(&engine, map));
}

#[test]
fn unmounting_a_pin_mid_drag_never_commits() {
    let (mut engine, map, mut tree) = setup();
    let commits = Rc::new(RefCell::new(Vec::new()));
    tree.render(&mut engine, Some(map), &pin_scene(&commits, true), &mut (), &mut ())
        .unwrap();
    tree.dispatch_pending(&mut engine, 0, &mut ());

    engine.pointer_down(map, Point::new(400.0, 300.0));
    tree.dispatch_pending(&mut engine, 0, &mut ());
    engine.pointer_move(map, Point::new(420.0, 310.0));
    tree.dispatch_pending(&mut engine, 0, &mut ());

    tree.render(&mut engine, Some(map), &pin_scene(&commits, false), &mut (), &mut ())
        .unwrap();
    engine.pointer_up(map, Point::new(430.0, 320.0));
    tree.dispatch_pending(&mut engine, 0, &mut ());

    assert!(commits.borrow().is_empty());
    assert!(drag_pan_active(&engine, map));
    assert_eq!(engine.live_count(HandleKind::Overlay), 0);
    // Only the view's listeners remain.
    assert_eq!(engine.listener_count(), engine.listeners_on(handle_of(&tree, "camera")));
}

#[test]
fn non_draggable_pin_ignores_pointer_down() {
    let (mut engine, map, mut tree) = setup();
    let scene = vec![
        SceneNode::view("camera", camera(GeoPoint::new(0.0, 0.0), 5.0)).with_children(vec![
            SceneNode::overlay("pin", OverlayDescriptor::new(GeoPoint::new(0.0, 0.0))),
        ]),
    ];
    tree.render(&mut engine, Some(map), &scene, &mut (), &mut ())
        .unwrap();
    let pin = handle_of(&tree, "pin");
    assert_eq!(engine.listeners_on(pin), 0);

    engine.pointer_down(map, Point::new(400.0, 300.0));
    tree.dispatch_pending(&mut engine, 0, &mut ());
    assert!(drag_pan_active(&engine, map));
}

#[test]
fn swapping_the_root_map_moves_every_node() {
    let (mut engine, a, mut tree) = setup();
    let b = engine.create_map(Size::new(400.0, 300.0));
    let commits = Rc::new(RefCell::new(Vec::new()));
    let mut scene = pin_scene(&commits, true);
    scene.push(SceneNode::layer("osm", tiles()));
    scene.push(SceneNode::blocker("no-pan", InteractionClass::DragPan));

    tree.render(&mut engine, Some(a), &scene, &mut (), &mut ())
        .unwrap();
    let (view, layer, pin) = (
        handle_of(&tree, "camera"),
        handle_of(&tree, "osm"),
        handle_of(&tree, "pin"),
    );
    assert!(!drag_pan_active(&engine, a));

    tree.render(&mut engine, Some(b), &scene, &mut (), &mut ())
        .unwrap();
    assert_eq!(engine.map_view(a), None);
    assert_eq!(engine.map_view(b), Some(view));
    assert_eq!(engine.parent_of(layer), Some(b));
    assert!(engine.children(a).is_empty());
    assert_eq!(engine.overlay_map(pin), Some(b));
    assert!(drag_pan_active(&engine, a));
    assert!(!drag_pan_active(&engine, b));
    // Nothing was rebuilt.
    assert_eq!(handle_of(&tree, "osm"), layer);
}

#[test]
fn nodes_without_a_map_wait_for_one() {
    let (mut engine, map, mut tree) = setup();
    let scene = vec![
        SceneNode::group("base", GroupDescriptor::default())
            .with_children(vec![SceneNode::layer("osm", tiles())]),
    ];
    tree.render(&mut engine, None, &scene, &mut (), &mut ())
        .unwrap();
    let group = handle_of(&tree, "base");
    let layer = handle_of(&tree, "osm");
    assert_eq!(engine.parent_of(group), None);
    // The layer still attaches to its group.
    assert_eq!(engine.parent_of(layer), Some(group));

    tree.render(&mut engine, Some(map), &scene, &mut (), &mut ())
        .unwrap();
    assert_eq!(engine.parent_of(group), Some(map));
    assert_eq!(engine.render_order(map), vec![layer]);
}

#[test]
fn changing_a_layer_group_moves_the_layer_in_one_step() {
    let mut engine = HeadlessEngine::new();
    let map = engine.create_map(Size::new(256.0, 256.0));
    let (g1, g2) = (engine.create_group(), engine.create_group());
    engine.add_layer(map, g1);
    engine.add_layer(map, g2);
    let root = HandleContext::new(Some(map));

    let mut node = LayerNode::mount(&mut engine, &root.with_layer_group(g1), &tiles()).unwrap();
    engine.clear_mutations();
    let changes = node
        .update(&mut engine, &root.with_layer_group(g2), &tiles())
        .unwrap();
    assert_eq!(changes, LayerChanges::REPARENTED);
    assert!(engine.children(g1).is_empty());
    assert_eq!(engine.children(g2), &[node.handle()]);
    let ops: Vec<MutationOp> = engine.mutations().iter().map(|m| m.op).collect();
    assert_eq!(ops, vec![MutationOp::RemoveLayer, MutationOp::AddLayer]);
}

#[test]
fn rejected_layer_fails_the_pass_without_leaking() {
    let (mut engine, map, mut tree) = setup();
    let broken = LayerDescriptor::new(LayerSource::Tile {
        url: "https://tile.example.org/no-template.png".into(),
        projection: None,
    });
    let scene = vec![
        SceneNode::layer("osm", tiles()),
        SceneNode::layer("broken", broken),
        SceneNode::layer("after", tiles()),
    ];
    let err = tree
        .render(&mut engine, Some(map), &scene, &mut (), &mut ())
        .unwrap_err();
    assert!(matches!(err, SceneError::Engine { ref key, .. } if key.as_str() == "broken"));

    // What was mounted is still owned; nothing else is alive.
    let owned = tree.owned_handles();
    assert_eq!(owned.len(), 2);
    assert!(owned.iter().all(|(k, _)| *k == NodeKey::from("osm")));
    assert_eq!(engine.live_count(HandleKind::Source), 1);
    assert_eq!(engine.live_count(HandleKind::Layer), 1);

    let fixed = vec![
        SceneNode::layer("osm", tiles()),
        SceneNode::layer("after", tiles()),
    ];
    tree.render(&mut engine, Some(map), &fixed, &mut (), &mut ())
        .unwrap();
    assert_eq!(engine.live_count(HandleKind::Layer), 2);
    assert_eq!(engine.children(map).len(), 2);
}

#[test]
fn duplicate_keys_anywhere_are_rejected() {
    let (mut engine, map, mut tree) = setup();
    let scene = vec![
        SceneNode::group("base", GroupDescriptor::default()).with_children(vec![
            SceneNode::layer("osm", tiles()),
            SceneNode::layer("osm", tiles()),
        ]),
    ];
    let err = tree.render(&mut engine, Some(map), &scene, &mut (), &mut ());
    assert_eq!(err, Err(SceneError::DuplicateKey { key: "osm".into() }));
    assert_eq!(engine.live_count(HandleKind::Group), 0);
}

#[test]
fn trace_reports_only_what_changed() {
    let (mut engine, map, mut tree) = setup();
    let mut trace = PatchRecorder::new();
    let scene = |opacity| {
        vec![SceneNode::layer(
            "osm",
            tiles().with_props(LayerProps {
                opacity,
                ..LayerProps::default()
            }),
        )]
    };
    tree.render(&mut engine, Some(map), &scene(1.0), &mut (), &mut trace)
        .unwrap();
    tree.render(&mut engine, Some(map), &scene(0.5), &mut (), &mut trace)
        .unwrap();
    tree.render(&mut engine, Some(map), &scene(0.5), &mut (), &mut trace)
        .unwrap();
    tree.render(&mut engine, Some(map), &[], &mut (), &mut trace)
        .unwrap();

    let osm = NodeKey::from("osm");
    assert_eq!(
        trace.entries(),
        &[
            TraceEntry::Mounted(osm.clone(), strata_scene::NodeKind::Layer),
            TraceEntry::Patched(osm.clone(), Patch::Layer(LayerChanges::OPACITY)),
            TraceEntry::Unmounted(osm.clone(), strata_scene::NodeKind::Layer),
        ]
    );
    assert_eq!(trace.patch_count(&osm), 1);
}
