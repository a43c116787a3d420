// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory knowledge graph with snapshot persistence
//!
//! All state sits behind one `RwLock`: reads share it, every mutation
//! (including read-modify-write weight updates) holds it exclusively.
//! Snapshots are taken after every N writes and on demand.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::error::GraphError;
use crate::domain::graph::{
    clamp_weight, is_valid_decay_rate, normalize_concept_name, AgentStatus, BatchGuard,
    BatchOutcome, Edge, EdgeId, EdgeKind, EdgeSpec, EdgeUpdate, GraphBatch, Node, NodeId,
    NodeKind, NodeLabel, NodeRef, DEFAULT_DECAY_RATE, MANUAL_INITIAL_WEIGHT,
};
use crate::infrastructure::repository::{
    Direction, EdgeChange, EdgePredicate, GraphRepository, GraphStats, NodePredicate,
};
use crate::infrastructure::snapshot::{GraphSnapshot, SnapshotStore};

pub const DEFAULT_SNAPSHOT_EVERY_WRITES: u64 = 50;

#[derive(Debug, Clone, Default)]
struct GraphState {
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<EdgeId, Edge>,
    by_key: HashMap<(NodeLabel, String), NodeId>,
    by_pair: HashMap<(NodeId, NodeId, EdgeKind), EdgeId>,
}

impl GraphState {
    fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut state = Self::default();

        for (id, mut node) in snapshot.nodes {
            node.id = id;
            if let Err(e) = node.normalize() {
                warn!(node_id = %id, error = %e, "Skipping invalid node in snapshot");
                continue;
            }
            let key = node.natural_key();
            if state.by_key.contains_key(&key) {
                warn!(node_id = %id, name = %key.1, "Skipping duplicate node in snapshot");
                continue;
            }
            state.by_key.insert(key, id);
            state.nodes.insert(id, node);
        }

        for (id, mut edge) in snapshot.edges {
            edge.id = id;
            if !state.nodes.contains_key(&edge.from) || !state.nodes.contains_key(&edge.to) {
                warn!(edge_id = %id, "Skipping dangling edge in snapshot");
                continue;
            }
            let pair = (edge.from, edge.to, edge.kind);
            if state.by_pair.contains_key(&pair) {
                warn!(edge_id = %id, "Skipping duplicate edge in snapshot");
                continue;
            }
            state.by_pair.insert(pair, id);
            state.edges.insert(id, edge);
        }

        state
    }

    fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::new(self.nodes.clone(), self.edges.clone())
    }

    fn resolve(&self, node_ref: &NodeRef) -> Option<NodeId> {
        match node_ref {
            NodeRef::Id(id) => self.nodes.contains_key(id).then_some(*id),
            NodeRef::Key { label, name } => {
                let name = match label {
                    NodeLabel::Concept => normalize_concept_name(name),
                    _ => name.trim().to_string(),
                };
                self.by_key.get(&(*label, name)).copied()
            }
        }
    }

    fn label_of(&self, id: NodeId) -> Result<NodeLabel, GraphError> {
        self.nodes
            .get(&id)
            .map(Node::label)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    fn upsert_node(&mut self, mut node: Node) -> Result<NodeId, GraphError> {
        node.normalize()?;
        let key = node.natural_key();
        let now = Utc::now();

        if let Some(existing_id) = self.by_key.get(&key).copied() {
            let existing = self
                .nodes
                .get_mut(&existing_id)
                .ok_or_else(|| GraphError::NodeNotFound(existing_id.to_string()))?;
            replace_payload(existing, node.kind);
            existing.updated_at = now;
            return Ok(existing_id);
        }

        let id = node.id;
        if let Some(existing) = self.nodes.get_mut(&id) {
            // Same ID under a new name: rename in place
            if existing.label() != node.label() {
                return Err(GraphError::InvalidNode(format!(
                    "node {} is a {}, not a {}",
                    id,
                    existing.label(),
                    node.label()
                )));
            }
            let old_key = existing.natural_key();
            replace_payload(existing, node.kind);
            existing.updated_at = now;
            self.by_key.remove(&old_key);
            self.by_key.insert(key, id);
            return Ok(id);
        }

        node.updated_at = now;
        self.by_key.insert(key, id);
        self.nodes.insert(id, node);
        Ok(id)
    }

    fn insert_if_absent(&mut self, mut node: Node) -> Result<NodeId, GraphError> {
        node.normalize()?;
        if let Some(id) = self.by_key.get(&node.natural_key()) {
            return Ok(*id);
        }
        self.upsert_node(node)
    }

    /// `decay_rate` applies to a new edge whose spec names none
    fn add_edge(&mut self, spec: EdgeSpec, decay_rate: f64) -> Result<EdgeId, GraphError> {
        let from = self
            .resolve(&spec.from)
            .ok_or_else(|| GraphError::DanglingReference(spec.from.to_string()))?;
        let to = self
            .resolve(&spec.to)
            .ok_or_else(|| GraphError::DanglingReference(spec.to.to_string()))?;

        if from == to {
            return Err(GraphError::InvalidEdge(format!(
                "{} edge cannot loop on node {}",
                spec.kind, from
            )));
        }

        let (from_label, to_label) = (self.label_of(from)?, self.label_of(to)?);
        if !spec.kind.allows(from_label, to_label) {
            return Err(GraphError::InvalidEndpoint {
                kind: spec.kind,
                from: from_label,
                to: to_label,
            });
        }

        if let Some(weight) = spec.weight {
            if !(0.0..=1.0).contains(&weight) {
                return Err(GraphError::InvalidEdge(format!(
                    "weight must be within [0, 1], got {}",
                    weight
                )));
            }
        }
        if let Some(rate) = spec.decay_rate {
            check_decay_rate(rate)?;
        }

        let now = Utc::now();
        if let Some(edge_id) = self.by_pair.get(&(from, to, spec.kind)).copied() {
            let edge = self
                .edges
                .get_mut(&edge_id)
                .ok_or(GraphError::EdgeNotFound(edge_id))?;
            if let Some(weight) = spec.weight {
                edge.weight = clamp_weight(weight);
            }
            if let Some(rate) = spec.decay_rate {
                edge.decay_rate = rate;
            }
            edge.properties.extend(spec.properties);
            edge.last_updated = now;
            return Ok(edge_id);
        }

        let mut edge = Edge::new(
            from,
            to,
            spec.kind,
            spec.weight.unwrap_or(MANUAL_INITIAL_WEIGHT),
        );
        edge.decay_rate = spec.decay_rate.unwrap_or(decay_rate);
        edge.properties = spec.properties;

        let edge_id = edge.id;
        self.by_pair.insert((from, to, spec.kind), edge_id);
        self.edges.insert(edge_id, edge);
        Ok(edge_id)
    }

    fn check_guard(&self, guard: &BatchGuard) -> Result<(), GraphError> {
        match guard {
            BatchGuard::NoNewHandlersSince { concept, since } => {
                let Some(concept_id) = self.resolve(&NodeRef::concept(concept)) else {
                    return Ok(());
                };
                let recent = self.edges.values().find(|e| {
                    e.kind == EdgeKind::HandlesConcept
                        && e.to == concept_id
                        && e.created_at >= *since
                });
                if let Some(edge) = recent {
                    let agent = self
                        .nodes
                        .get(&edge.from)
                        .map(|n| n.name().to_string())
                        .unwrap_or_else(|| edge.from.to_string());
                    return Err(GraphError::GuardRejected(format!(
                        "concept '{}' gained handler '{}' at {}",
                        concept, agent, edge.created_at
                    )));
                }
                Ok(())
            }
        }
    }

    fn attached_edges(&self, id: NodeId) -> usize {
        self.edges
            .values()
            .filter(|e| e.from == id || e.to == id)
            .count()
    }

    fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            edges: self.edges.len(),
            ..GraphStats::default()
        };
        for node in self.nodes.values() {
            match node.label() {
                NodeLabel::Agent => stats.agents += 1,
                NodeLabel::Concept => stats.concepts += 1,
                NodeLabel::Region => stats.regions += 1,
            }
        }
        stats
    }
}

/// Knowledge graph store
pub struct GraphStore {
    state: RwLock<GraphState>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    snapshot_every_writes: u64,
    writes_since_snapshot: AtomicU64,
    dirty: AtomicBool,
    default_decay_rate: f64,
}

impl GraphStore {
    /// Volatile store with no snapshot backing
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            snapshots: None,
            snapshot_every_writes: 0,
            writes_since_snapshot: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
            default_decay_rate: DEFAULT_DECAY_RATE,
        }
    }

    /// Open a store backed by `snapshots`, loading the latest snapshot if any.
    /// `snapshot_every_writes == 0` disables write-triggered snapshots.
    pub async fn open(
        snapshots: Arc<dyn SnapshotStore>,
        snapshot_every_writes: u64,
    ) -> Result<Self, GraphError> {
        let state = match snapshots.load().await? {
            Some(snapshot) => {
                let taken_at = snapshot.taken_at;
                let state = GraphState::from_snapshot(snapshot);
                info!(
                    location = %snapshots.location(),
                    %taken_at,
                    nodes = state.nodes.len(),
                    edges = state.edges.len(),
                    "Loaded knowledge graph snapshot"
                );
                state
            }
            None => {
                info!(
                    location = %snapshots.location(),
                    "No graph snapshot found, starting with an empty graph"
                );
                GraphState::default()
            }
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshots: Some(snapshots),
            snapshot_every_writes,
            writes_since_snapshot: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
            default_decay_rate: DEFAULT_DECAY_RATE,
        })
    }

    /// Decay rate given to new edges that do not carry their own
    pub fn with_default_decay_rate(mut self, rate: f64) -> Result<Self, GraphError> {
        check_decay_rate(rate)?;
        self.default_decay_rate = rate;
        Ok(self)
    }

    /// Whether there are writes not yet captured by a snapshot
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Consistent copy of the whole graph
    pub async fn snapshot(&self) -> GraphSnapshot {
        self.state.read().await.to_snapshot()
    }

    async fn record_writes(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.dirty.store(true, Ordering::SeqCst);
        metrics::counter!("synapse_graph_writes_total").increment(count);

        let pending = self.writes_since_snapshot.fetch_add(count, Ordering::SeqCst) + count;
        if self.snapshots.is_some()
            && self.snapshot_every_writes > 0
            && pending >= self.snapshot_every_writes
        {
            if let Err(e) = self.persist().await {
                warn!(error = %e, "Write-triggered snapshot failed, in-memory state kept");
            }
        }
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[async_trait]
impl GraphRepository for GraphStore {
    async fn upsert_node(&self, node: Node) -> Result<NodeId, GraphError> {
        let id = self.state.write().await.upsert_node(node)?;
        self.record_writes(1).await;
        Ok(id)
    }

    async fn get_node(&self, id: NodeId) -> Result<Option<Node>, GraphError> {
        Ok(self.state.read().await.nodes.get(&id).cloned())
    }

    async fn resolve(&self, node_ref: &NodeRef) -> Result<Option<Node>, GraphError> {
        let state = self.state.read().await;
        Ok(state
            .resolve(node_ref)
            .and_then(|id| state.nodes.get(&id).cloned()))
    }

    async fn find_by_name(&self, label: NodeLabel, name: &str) -> Result<Option<Node>, GraphError> {
        self.resolve(&NodeRef::Key {
            label,
            name: name.to_string(),
        })
        .await
    }

    async fn find_nodes(&self, predicate: &NodePredicate) -> Result<Vec<Node>, GraphError> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .values()
            .filter(|n| predicate(n))
            .cloned()
            .collect())
    }

    async fn add_edge(&self, spec: EdgeSpec) -> Result<EdgeId, GraphError> {
        let id = self
            .state
            .write()
            .await
            .add_edge(spec, self.default_decay_rate)?;
        self.record_writes(1).await;
        Ok(id)
    }

    async fn get_edge(&self, id: EdgeId) -> Result<Option<Edge>, GraphError> {
        Ok(self.state.read().await.edges.get(&id).cloned())
    }

    async fn edge_between(
        &self,
        from: NodeId,
        to: NodeId,
        kind: EdgeKind,
    ) -> Result<Option<Edge>, GraphError> {
        let state = self.state.read().await;
        Ok(state
            .by_pair
            .get(&(from, to, kind))
            .and_then(|id| state.edges.get(id).cloned()))
    }

    async fn outgoing_edges(
        &self,
        node: NodeId,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<Edge>, GraphError> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .values()
            .filter(|e| e.from == node && kind.is_none_or(|k| e.kind == k))
            .cloned()
            .collect())
    }

    async fn incoming_edges(
        &self,
        node: NodeId,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<Edge>, GraphError> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .values()
            .filter(|e| e.to == node && kind.is_none_or(|k| e.kind == k))
            .cloned()
            .collect())
    }

    async fn all_edges(&self, kind: Option<EdgeKind>) -> Result<Vec<Edge>, GraphError> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .values()
            .filter(|e| kind.is_none_or(|k| e.kind == k))
            .cloned()
            .collect())
    }

    async fn traverse(
        &self,
        start: NodeId,
        max_depth: usize,
        direction: Direction,
        follow: &EdgePredicate,
    ) -> Result<Vec<(Node, usize)>, GraphError> {
        let state = self.state.read().await;
        if !state.nodes.contains_key(&start) {
            return Err(GraphError::NodeNotFound(start.to_string()));
        }

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut reached = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for edge in state.edges.values().filter(|e| follow(e)) {
                let next = match direction {
                    Direction::Outgoing if edge.from == current => edge.to,
                    Direction::Incoming if edge.to == current => edge.from,
                    Direction::Both if edge.from == current => edge.to,
                    Direction::Both if edge.to == current => edge.from,
                    _ => continue,
                };
                if visited.insert(next) {
                    if let Some(node) = state.nodes.get(&next) {
                        reached.push((node.clone(), depth + 1));
                    }
                    queue.push_back((next, depth + 1));
                }
            }
        }

        reached.sort_by(|(a, da), (b, db)| da.cmp(db).then_with(|| a.name().cmp(b.name())));
        Ok(reached)
    }

    async fn apply_edge_update(
        &self,
        from: NodeId,
        to: NodeId,
        kind: EdgeKind,
        update: EdgeUpdate,
    ) -> Result<Option<EdgeChange>, GraphError> {
        let change = {
            let mut state = self.state.write().await;
            let Some(edge_id) = state.by_pair.get(&(from, to, kind)).copied() else {
                return Ok(None);
            };
            let edge = state
                .edges
                .get_mut(&edge_id)
                .ok_or(GraphError::EdgeNotFound(edge_id))?;
            let previous_weight = edge.weight;
            update.apply(edge);
            EdgeChange {
                previous_weight,
                edge: edge.clone(),
            }
        };
        self.record_writes(1).await;
        Ok(Some(change))
    }

    async fn decay_edges(
        &self,
        kind: EdgeKind,
        active_since: Option<DateTime<Utc>>,
    ) -> Result<usize, GraphError> {
        let decayed = {
            let mut state = self.state.write().await;
            let mut decayed = 0;
            for edge in state.edges.values_mut() {
                if edge.kind != kind {
                    continue;
                }
                if active_since.is_some_and(|since| !edge.is_active_since(since)) {
                    continue;
                }
                edge.apply_time_decay();
                decayed += 1;
            }
            decayed
        };
        debug!(%kind, decayed, "Decayed edges");
        self.record_writes(u64::from(decayed > 0)).await;
        Ok(decayed)
    }

    async fn update_edge(&self, edge: Edge) -> Result<(), GraphError> {
        {
            let mut state = self.state.write().await;
            let stored = state
                .edges
                .get_mut(&edge.id)
                .ok_or(GraphError::EdgeNotFound(edge.id))?;
            if (stored.from, stored.to, stored.kind) != (edge.from, edge.to, edge.kind) {
                return Err(GraphError::InvalidEdge(format!(
                    "edge {} cannot change its endpoints or kind",
                    edge.id
                )));
            }
            if edge.success_count + edge.failure_count != edge.usage_count {
                return Err(GraphError::InvalidEdge(format!(
                    "edge {} usage count must equal successes plus failures",
                    edge.id
                )));
            }
            check_decay_rate(edge.decay_rate)?;
            stored.weight = clamp_weight(edge.weight);
            stored.usage_count = edge.usage_count;
            stored.success_count = edge.success_count;
            stored.failure_count = edge.failure_count;
            stored.decay_rate = edge.decay_rate;
            stored.properties = edge.properties;
            stored.last_updated = Utc::now();
        }
        self.record_writes(1).await;
        Ok(())
    }

    async fn set_agent_status(
        &self,
        agent: NodeId,
        status: AgentStatus,
    ) -> Result<AgentStatus, GraphError> {
        let previous = {
            let mut state = self.state.write().await;
            let node = state
                .nodes
                .get_mut(&agent)
                .ok_or_else(|| GraphError::NodeNotFound(agent.to_string()))?;
            let agent_node = node
                .as_agent_mut()
                .ok_or_else(|| GraphError::NodeNotFound(format!("agent {}", agent)))?;
            let previous = agent_node.status;
            if previous != status {
                agent_node.status = status;
                node.updated_at = Utc::now();
            }
            previous
        };
        if previous != status {
            self.record_writes(1).await;
        }
        Ok(previous)
    }

    async fn remove_node(&self, id: NodeId) -> Result<Node, GraphError> {
        let node = {
            let mut state = self.state.write().await;
            if !state.nodes.contains_key(&id) {
                return Err(GraphError::NodeNotFound(id.to_string()));
            }
            let attached = state.attached_edges(id);
            if attached > 0 {
                return Err(GraphError::StillReferenced(id, attached));
            }
            let node = state
                .nodes
                .remove(&id)
                .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
            state.by_key.remove(&node.natural_key());
            node
        };
        self.record_writes(1).await;
        Ok(node)
    }

    async fn remove_edge(&self, id: EdgeId) -> Result<Edge, GraphError> {
        let edge = {
            let mut state = self.state.write().await;
            let edge = state.edges.remove(&id).ok_or(GraphError::EdgeNotFound(id))?;
            state.by_pair.remove(&(edge.from, edge.to, edge.kind));
            edge
        };
        self.record_writes(1).await;
        Ok(edge)
    }

    async fn commit(&self, batch: GraphBatch) -> Result<BatchOutcome, GraphError> {
        let writes = (batch.nodes.len() + batch.nodes_if_absent.len() + batch.edges.len()) as u64;
        let outcome = {
            let mut state = self.state.write().await;
            if let Some(guard) = &batch.guard {
                state.check_guard(guard)?;
            }

            // Stage on a copy so a failing write leaves nothing behind
            let mut staged = state.clone();
            let mut outcome = BatchOutcome::default();
            for node in batch.nodes {
                outcome.node_ids.push(staged.upsert_node(node)?);
            }
            for node in batch.nodes_if_absent {
                outcome.node_ids.push(staged.insert_if_absent(node)?);
            }
            for spec in batch.edges {
                outcome
                    .edge_ids
                    .push(staged.add_edge(spec, self.default_decay_rate)?);
            }
            *state = staged;
            outcome
        };
        self.record_writes(writes).await;
        Ok(outcome)
    }

    async fn persist(&self) -> Result<bool, GraphError> {
        let Some(store) = &self.snapshots else {
            return Ok(false);
        };

        let snapshot = {
            let state = self.state.read().await;
            self.writes_since_snapshot.store(0, Ordering::SeqCst);
            self.dirty.store(false, Ordering::SeqCst);
            state.to_snapshot()
        };

        match store.save(&snapshot).await {
            Ok(()) => {
                metrics::counter!("synapse_graph_snapshots_total").increment(1);
                Ok(true)
            }
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                metrics::counter!("synapse_graph_snapshot_failures_total").increment(1);
                Err(e)
            }
        }
    }

    async fn stats(&self) -> Result<GraphStats, GraphError> {
        Ok(self.state.read().await.stats())
    }
}

/// Agent status belongs to the health monitor (`set_agent_status`);
/// re-registering an agent leaves it alone.
fn replace_payload(existing: &mut Node, mut kind: NodeKind) {
    if let (NodeKind::Agent(stored), NodeKind::Agent(incoming)) = (&existing.kind, &mut kind) {
        incoming.status = stored.status;
    }
    existing.kind = kind;
}

fn check_decay_rate(rate: f64) -> Result<(), GraphError> {
    if is_valid_decay_rate(rate) {
        Ok(())
    } else {
        Err(GraphError::InvalidEdge(format!(
            "decay_rate must be within (0, 1), got {}",
            rate
        )))
    }
}
