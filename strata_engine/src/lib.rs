// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Strata Engine: the imperative map engine boundary.
//!
//! This crate defines the surface that the Strata scene layer drives:
//! - [`MapEngine`]: a stateful engine owning maps, views, layers, layer
//!   groups, sources, overlays, interactions, and listeners, all addressed by
//!   generational [`HandleId`]s.
//! - Geographic value types ([`GeoPoint`], [`GeoBounds`]) and the
//!   [`Projection`]s an engine may use for its native units.
//! - [`SourceSpec`] and the function-typed hooks an engine stores on its
//!   objects: [`StyleFn`], [`RenderHook`], and [`PixelOperation`].
//! - [`EngineEvent`]: notifications queued by the engine and drained by the
//!   host with [`MapEngine::drain_events`].
//!
//! It also ships [`HeadlessEngine`], an in-memory engine that applies the
//! same rules a rendering engine would and records every mutation. It is the
//! engine used by the tests and benchmarks of the scene crates.
//!
//! ## Minimal example
//!
//! ```rust
//! use kurbo::{Point, Size};
//! use strata_engine::{HeadlessEngine, MapEngine, Projection, ViewOptions};
//!
//! let mut engine = HeadlessEngine::new();
//! let map = engine.create_map(Size::new(800.0, 600.0));
//! let view = engine.create_view(&ViewOptions {
//!     projection: Projection::WebMercator,
//!     center: Point::ZERO,
//!     zoom: 3.0,
//!     rotation: 0.0,
//!     min_zoom: None,
//!     max_zoom: None,
//!     extent: None,
//! });
//! engine.set_map_view(map, Some(view));
//! assert_eq!(engine.map_view(map), Some(view));
//! ```
//!
//! ## Events
//!
//! Engines never call back into the scene layer while a mutation is in
//! progress. Listener notifications and animation completions are queued and
//! handed out in delivery order by [`MapEngine::drain_events`]. Render hooks
//! are the only callbacks an engine invokes synchronously.

mod engine;
mod error;
mod event;
mod geo;
mod headless;
mod id;
mod source;

pub use engine::{FitOptions, LayerProperty, MapEngine, ViewOptions, ViewSnapshot};
pub use error::EngineError;
pub use event::{
    EngineEvent, EventType, InteractionClass, ListenerEvent, PointerEvent, PointerKind,
};
pub use geo::{GeoBounds, GeoPoint, Projection};
pub use headless::{HandleKind, HeadlessEngine, LayerState, Mutation, MutationOp};
pub use id::{AnimationId, HandleId, InteractionId, ListenerKey};
pub use source::{
    FeatureId, FeatureStyle, LayerKind, OperationData, PixelOperation, RenderEvent, RenderHook,
    RenderPhase, SourceSpec, StyleFn,
};
