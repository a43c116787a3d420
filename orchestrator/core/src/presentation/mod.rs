// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`synapse-core`)
//!
//! HTTP surface that translates external requests into application service
//! calls. Real work is delegated to `crate::application` and the cortex.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP/SSE (Axum) | Graph, discovery, Hebbian feedback and neurogenesis endpoints + domain event stream |

pub mod api;

pub use api::{app, ApiError, AppState};
