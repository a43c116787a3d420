// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Neurogenesis pipeline, agent hosting and the REST surface of a Synapse node.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Turns unhandled concepts into registered agents and serves the graph API

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
