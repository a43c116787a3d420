// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Graph domain
//!
//! Provides the knowledge graph model, its errors and events.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Graph entities, errors, events and text heuristics

pub mod classifier;
pub mod error;
pub mod events;
pub mod graph;
pub mod similarity;

pub use classifier::*;
pub use error::*;
pub use events::*;
pub use graph::*;
