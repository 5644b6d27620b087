// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors surfaced by a render pass.

use strata_engine::EngineError;

use crate::descriptor::NodeKey;

/// Error returned by [`SceneTree::render`](crate::SceneTree::render).
///
/// The tree stays consistent when a render fails: every handle created so
/// far is still owned by a live node and released on unmount. Missing
/// parents are never errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    /// The engine could not construct an object for a node.
    #[error("node {key}: {source}")]
    Engine {
        /// Key of the failing node.
        key: NodeKey,
        /// Engine error.
        #[source]
        source: EngineError,
    },
    /// Two siblings share a key.
    #[error("duplicate sibling key {key}")]
    DuplicateKey {
        /// The repeated key.
        key: NodeKey,
    },
}
