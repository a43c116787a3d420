// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for Cortex bounded context

pub mod graph_store;
pub mod repository;
pub mod snapshot;

pub use graph_store::{GraphStore, DEFAULT_SNAPSHOT_EVERY_WRITES};
pub use repository::{Direction, EdgeChange, EdgePredicate, GraphRepository, GraphStats, NodePredicate};
pub use snapshot::{GraphSnapshot, JsonFileSnapshotStore, SnapshotStore, SNAPSHOT_FORMAT_VERSION};
