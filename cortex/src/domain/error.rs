// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;

use super::graph::{EdgeId, EdgeKind, NodeId, NodeLabel};

/// Errors raised by the knowledge graph.
///
/// None of these are retried by the store itself; the calling component
/// decides what to do with them.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("dangling reference: {0} does not exist")]
    DanglingReference(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("{kind} edge cannot connect {from} to {to}")]
    InvalidEndpoint {
        kind: EdgeKind,
        from: NodeLabel,
        to: NodeLabel,
    },

    #[error("invalid node: {0}")]
    InvalidNode(String),

    #[error("invalid edge: {0}")]
    InvalidEdge(String),

    #[error("node {0} still has {1} attached edge(s)")]
    StillReferenced(NodeId, usize),

    #[error("batch guard rejected: {0}")]
    GuardRejected(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    /// Whether the error describes a malformed request rather than a missing entity
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            GraphError::DanglingReference(_)
                | GraphError::InvalidEndpoint { .. }
                | GraphError::InvalidNode(_)
                | GraphError::InvalidEdge(_)
        )
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for GraphError {
    fn from(e: std::io::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
