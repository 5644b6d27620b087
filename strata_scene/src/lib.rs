// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Strata Scene: a declarative map scene over an imperative engine.
//!
//! A host describes the scene it wants as a tree of [`SceneNode`]s on every
//! render, and a [`SceneTree`] turns the difference against the previous
//! description into the fewest engine calls:
//! - [`ViewController`](strata_view::ViewController) nodes own a camera view.
//! - [`LayerGroupNode`]s own a group; their children attach into it.
//! - [`LayerNode`]s own a layer and its source (tiles, vectors, vector
//!   tiles, or a colorized elevation raster).
//! - [`OverlayNode`]s own a pin, optionally draggable.
//! - [`InteractionBlocker`]s suspend one class of native map interaction.
//!
//! Nodes find the handles they attach to through a [`HandleContext`] built
//! fresh on each pass, so a swapped root map or a rebuilt group is followed
//! without remounting. Each engine handle is owned by exactly one live node,
//! and released exactly once when that node unmounts.
//!
//! Engine events are queued by the engine; the host drains them and hands
//! them to [`SceneTree::dispatch`] (or calls
//! [`SceneTree::dispatch_pending`]), and calls [`SceneTree::poll`] to let
//! debounced camera reports through.
//!
//! ## Minimal example
//!
//! ```rust
//! use kurbo::Size;
//! use strata_engine::{GeoPoint, HeadlessEngine, MapEngine};
//! use strata_scene::{
//!     GroupDescriptor, LayerDescriptor, LayerSource, PatchRecorder, SceneConfig, SceneNode,
//!     SceneTree,
//! };
//! use strata_view::{ViewDescriptor, ViewState, ViewUpdate};
//!
//! let mut engine = HeadlessEngine::new();
//! let map = engine.create_map(Size::new(800.0, 600.0));
//! let mut tree = SceneTree::new(SceneConfig::default());
//!
//! let osm = LayerSource::Tile {
//!     url: "https://tile.example.org/{z}/{x}/{y}.png".into(),
//!     projection: None,
//! };
//! let scene = vec![
//!     SceneNode::view("camera", ViewDescriptor::new(ViewState::new(GeoPoint::new(0.0, 0.0), 2.0)))
//!         .with_children(vec![
//!             SceneNode::group("base", GroupDescriptor::default())
//!                 .with_children(vec![SceneNode::layer("osm", LayerDescriptor::new(osm))]),
//!         ]),
//! ];
//!
//! let mut reports: Vec<ViewUpdate> = Vec::new();
//! tree.render(&mut engine, Some(map), &scene, &mut reports, &mut ()).unwrap();
//! assert_eq!(tree.len(), 3);
//!
//! // Rendering the same description again changes nothing.
//! let mut trace = PatchRecorder::new();
//! engine.clear_mutations();
//! tree.render(&mut engine, Some(map), &scene, &mut reports, &mut trace).unwrap();
//! assert_eq!(engine.mutation_count(), 0);
//! assert!(trace.is_empty());
//! ```

mod attach;
mod blocker;
mod context;
mod descriptor;
mod error;
mod group;
mod layer;
mod overlay;
mod trace;
mod tree;

pub use blocker::InteractionBlocker;
pub use context::{Binding, HandleContext};
pub use descriptor::{
    CommitFn, GroupDescriptor, LayerDescriptor, LayerProps, LayerSource, NodeDescriptor, NodeKey,
    NodeKind, OverlayDescriptor, SceneNode,
};
pub use error::SceneError;
pub use group::{GroupChanges, LayerGroupNode};
pub use layer::{LayerChanges, LayerNode};
pub use overlay::{OverlayChanges, OverlayNode};
pub use trace::{Patch, PatchRecorder, SceneTrace, TraceEntry};
pub use tree::{SceneConfig, SceneTree};
