// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Strata View: bidirectional camera synchronization.
//!
//! A [`ViewController`] owns one engine view and keeps it eventually
//! consistent with an externally supplied [`ViewState`]:
//! - Downward: field changes are pushed with the narrowest engine setter,
//!   and skipped when the engine already holds the value, so in-flight
//!   animations survive re-renders that change nothing.
//! - Upward: user moves are reported on move-end, user rotations after a
//!   [`Debounce`] window. Both go to a [`ViewSink`] as [`ViewUpdate`]s.
//! - Programmatic writes are tagged with [`PendingWrites`] flags so their
//!   change notifications are not mistaken for user input.
//!
//! Camera fits ([`FitRequest`]) that get interrupted are re-issued up to
//! [`ViewConfig::max_fit_retries`] times, then resolved per
//! [`FitFallback`].
//!
//! ## Minimal example
//!
//! ```rust
//! use kurbo::Size;
//! use strata_engine::{GeoPoint, HeadlessEngine, MapEngine};
//! use strata_view::{ViewConfig, ViewController, ViewDescriptor, ViewState, ViewUpdate};
//!
//! let mut engine = HeadlessEngine::new();
//! let map = engine.create_map(Size::new(800.0, 600.0));
//! let desc = ViewDescriptor::new(ViewState::new(GeoPoint::new(2.35, 48.85), 12.0));
//! let mut view = ViewController::mount(&mut engine, Some(map), &desc, ViewConfig::default());
//!
//! // A programmatic move is not reported back.
//! let moved = ViewDescriptor::new(ViewState::new(GeoPoint::new(4.9, 52.37), 12.0));
//! view.update(&mut engine, Some(map), &moved);
//! let mut reports: Vec<ViewUpdate> = Vec::new();
//! for event in engine.drain_events() {
//!     view.handle_event(&mut engine, &event, 0, &mut reports);
//! }
//! assert!(reports.is_empty());
//!
//! // Teardown flushes the last camera once.
//! view.unmount(&mut engine, &mut reports);
//! assert_eq!(reports.len(), 1);
//! ```

mod config;
mod controller;
mod debounce;
mod sink;
mod state;

pub use config::{DEFAULT_MAX_FIT_RETRIES, DEFAULT_ROTATION_DEBOUNCE_MS, FitFallback, ViewConfig};
pub use controller::{PendingWrites, ViewChanges, ViewController};
pub use debounce::Debounce;
pub use sink::{ViewSink, ViewUpdate};
pub use state::{FitRequest, ViewDescriptor, ViewState};
