// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository interfaces for Cortex bounded context
//! Defines the contract for knowledge graph storage

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::GraphError;
use crate::domain::graph::{
    AgentStatus, BatchOutcome, Edge, EdgeId, EdgeKind, EdgeSpec, EdgeUpdate, GraphBatch, Node,
    NodeId, NodeLabel, NodeRef,
};

pub type NodePredicate = dyn Fn(&Node) -> bool + Send + Sync;
pub type EdgePredicate = dyn Fn(&Edge) -> bool + Send + Sync;

/// Which way edges are followed during traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// Result of an atomic edge update
#[derive(Debug, Clone)]
pub struct EdgeChange {
    pub previous_weight: f64,
    pub edge: Edge,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub agents: usize,
    pub concepts: usize,
    pub regions: usize,
    pub edges: usize,
}

impl GraphStats {
    pub fn nodes(&self) -> usize {
        self.agents + self.concepts + self.regions
    }
}

/// Repository for storing and retrieving the knowledge graph
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Insert a node or replace the attributes of the node with the same natural key.
    /// The stored node keeps its original ID and creation time.
    async fn upsert_node(&self, node: Node) -> Result<NodeId, GraphError>;

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>, GraphError>;

    /// Resolve a node by ID or natural key
    async fn resolve(&self, node_ref: &NodeRef) -> Result<Option<Node>, GraphError>;

    async fn find_by_name(&self, label: NodeLabel, name: &str) -> Result<Option<Node>, GraphError>;

    async fn find_nodes(&self, predicate: &NodePredicate) -> Result<Vec<Node>, GraphError>;

    /// Create an edge, or update the existing edge of the same kind between the same pair.
    /// Usage counters survive an update; only fields set on the spec are overwritten.
    async fn add_edge(&self, spec: EdgeSpec) -> Result<EdgeId, GraphError>;

    async fn get_edge(&self, id: EdgeId) -> Result<Option<Edge>, GraphError>;

    async fn edge_between(
        &self,
        from: NodeId,
        to: NodeId,
        kind: EdgeKind,
    ) -> Result<Option<Edge>, GraphError>;

    async fn outgoing_edges(
        &self,
        node: NodeId,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<Edge>, GraphError>;

    async fn incoming_edges(
        &self,
        node: NodeId,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<Edge>, GraphError>;

    async fn all_edges(&self, kind: Option<EdgeKind>) -> Result<Vec<Edge>, GraphError>;

    /// Breadth-first walk from `start` over edges accepted by `follow`.
    /// Returns every reached node (not the start) with its hop distance.
    async fn traverse(
        &self,
        start: NodeId,
        max_depth: usize,
        direction: Direction,
        follow: &EdgePredicate,
    ) -> Result<Vec<(Node, usize)>, GraphError>;

    /// Apply a weight update to one edge under the write lock.
    /// `Ok(None)` when no such edge exists.
    async fn apply_edge_update(
        &self,
        from: NodeId,
        to: NodeId,
        kind: EdgeKind,
        update: EdgeUpdate,
    ) -> Result<Option<EdgeChange>, GraphError>;

    /// Decay every edge of `kind`; when `active_since` is set only edges
    /// updated at or after that instant are touched. Returns the count.
    async fn decay_edges(
        &self,
        kind: EdgeKind,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<usize, GraphError>;

    /// Replace the mutable fields of a stored edge.
    /// Endpoints and kind are immutable; the weight is clamped.
    async fn update_edge(&self, edge: Edge) -> Result<(), GraphError>;

    /// Set an agent's status, returning the previous one
    async fn set_agent_status(
        &self,
        agent: NodeId,
        status: AgentStatus,
    ) -> Result<AgentStatus, GraphError>;

    /// Remove a node that has no attached edges
    async fn remove_node(&self, id: NodeId) -> Result<Node, GraphError>;

    async fn remove_edge(&self, id: EdgeId) -> Result<Edge, GraphError>;

    /// Apply a batch of writes atomically, after checking its guard
    async fn commit(&self, batch: GraphBatch) -> Result<BatchOutcome, GraphError>;

    /// Write the current state to the snapshot store.
    /// Returns false when the graph has no snapshot store configured.
    async fn persist(&self) -> Result<bool, GraphError>;

    async fn stats(&self) -> Result<GraphStats, GraphError>;
}
