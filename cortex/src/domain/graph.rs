// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Knowledge Graph entities for the Cortex
//!
//! Nodes are a tagged union over agents, concepts and regions. The only edge
//! that carries learned state is `HandlesConcept` (Agent -> Concept): its
//! weight is the Hebbian routing signal used by discovery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::GraphError;

/// Initial weight for edges registered by an operator
pub const MANUAL_INITIAL_WEIGHT: f64 = 0.5;

/// Initial weight for edges created by neurogenesis (provisional trust)
pub const PROVISIONAL_INITIAL_WEIGHT: f64 = 0.7;

/// Default fraction of weight lost per decay interval
pub const DEFAULT_DECAY_RATE: f64 = 0.01;

/// Success rate reported for an edge that has never been used
pub const NEUTRAL_SUCCESS_RATE: f64 = 0.5;

/// Node identifier in the knowledge graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Edge identifier in the knowledge graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub Uuid);

impl EdgeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind tag of a node, half of its natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeLabel {
    Agent,
    Concept,
    Region,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Agent => "Agent",
            NodeLabel::Concept => "Concept",
            NodeLabel::Region => "Region",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeLabel {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agent" => Ok(NodeLabel::Agent),
            "concept" => Ok(NodeLabel::Concept),
            "region" => Ok(NodeLabel::Region),
            other => Err(GraphError::InvalidNode(format!("unknown node label '{}'", other))),
        }
    }
}

/// Health of an agent as last observed by the host pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AgentStatus {
    #[default]
    Healthy,
    Degraded,
    Failed,
}

impl AgentStatus {
    /// Availability sub-score used by discovery
    pub fn availability(&self) -> f64 {
        match self {
            AgentStatus::Healthy => 1.0,
            AgentStatus::Degraded => 0.3,
            AgentStatus::Failed => 0.0,
        }
    }
}

/// How an agent came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentOrigin {
    /// Registered by an operator or seed file
    #[default]
    Static,
    /// Created by the neurogenesis pipeline
    Neurogenesis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentNode {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub origin: AgentOrigin,
}

impl AgentNode {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            capabilities: BTreeSet::new(),
            status: AgentStatus::Healthy,
            domain: None,
            origin: AgentOrigin::Static,
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_origin(mut self, origin: AgentOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNode {
    pub name: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

fn default_domain() -> String {
    "general".to_string()
}

impl ConceptNode {
    pub fn new(name: &str, domain: impl Into<String>) -> Self {
        Self {
            name: normalize_concept_name(name),
            domain: domain.into(),
            definition: None,
        }
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionNode {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl RegionNode {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Variant payload of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "label")]
pub enum NodeKind {
    Agent(AgentNode),
    Concept(ConceptNode),
    Region(RegionNode),
}

impl NodeKind {
    pub fn label(&self) -> NodeLabel {
        match self {
            NodeKind::Agent(_) => NodeLabel::Agent,
            NodeKind::Concept(_) => NodeLabel::Concept,
            NodeKind::Region(_) => NodeLabel::Region,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NodeKind::Agent(agent) => &agent.name,
            NodeKind::Concept(concept) => &concept.name,
            NodeKind::Region(region) => &region.name,
        }
    }
}

/// Node in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        let now = Utc::now();
        Self {
            id: NodeId::new(),
            kind,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn agent(agent: AgentNode) -> Self {
        Self::new(NodeKind::Agent(agent))
    }

    pub fn concept(concept: ConceptNode) -> Self {
        Self::new(NodeKind::Concept(concept))
    }

    pub fn region(region: RegionNode) -> Self {
        Self::new(NodeKind::Region(region))
    }

    pub fn label(&self) -> NodeLabel {
        self.kind.label()
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// Natural key: names are unique within a label
    pub fn natural_key(&self) -> (NodeLabel, String) {
        (self.label(), self.name().to_string())
    }

    pub fn as_agent(&self) -> Option<&AgentNode> {
        match &self.kind {
            NodeKind::Agent(agent) => Some(agent),
            _ => None,
        }
    }

    pub fn as_agent_mut(&mut self) -> Option<&mut AgentNode> {
        match &mut self.kind {
            NodeKind::Agent(agent) => Some(agent),
            _ => None,
        }
    }

    pub fn as_concept(&self) -> Option<&ConceptNode> {
        match &self.kind {
            NodeKind::Concept(concept) => Some(concept),
            _ => None,
        }
    }

    /// Canonicalize the natural key and reject unusable payloads
    pub fn normalize(&mut self) -> Result<(), GraphError> {
        match &mut self.kind {
            NodeKind::Concept(concept) => {
                concept.name = normalize_concept_name(&concept.name);
                if concept.domain.trim().is_empty() {
                    concept.domain = default_domain();
                }
            }
            NodeKind::Agent(agent) => {
                agent.name = agent.name.trim().to_string();
                agent.capabilities = agent
                    .capabilities
                    .iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
            }
            NodeKind::Region(region) => {
                region.name = region.name.trim().to_string();
            }
        }

        if self.name().is_empty() {
            return Err(GraphError::InvalidNode(format!(
                "{} name cannot be empty",
                self.label()
            )));
        }
        Ok(())
    }
}

/// Canonical concept spelling: trimmed, lower-case, separators folded to `_`
pub fn normalize_concept_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        let mapped = if ch.is_whitespace() || ch == '-' { '_' } else { ch };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.extend(mapped.to_lowercase());
    }
    out.trim_matches('_').to_string()
}

/// Reference to a node either by ID or by natural key (`Label:Name`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Id(NodeId),
    Key { label: NodeLabel, name: String },
}

impl NodeRef {
    pub fn concept(name: &str) -> Self {
        NodeRef::Key {
            label: NodeLabel::Concept,
            name: normalize_concept_name(name),
        }
    }

    pub fn agent(name: impl Into<String>) -> Self {
        NodeRef::Key {
            label: NodeLabel::Agent,
            name: name.into(),
        }
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        NodeRef::Id(id)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Id(id) => write!(f, "{}", id),
            NodeRef::Key { label, name } => write!(f, "{}:{}", label, name),
        }
    }
}

impl FromStr for NodeRef {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<NodeId>() {
            return Ok(NodeRef::Id(id));
        }

        let (label, name) = s.split_once(':').ok_or_else(|| {
            GraphError::InvalidNode(format!(
                "node reference '{}' is neither a UUID nor Label:Name",
                s
            ))
        })?;
        let label: NodeLabel = label.parse()?;
        let name = match label {
            NodeLabel::Concept => normalize_concept_name(name),
            _ => name.trim().to_string(),
        };
        if name.is_empty() {
            return Err(GraphError::InvalidNode(format!("node reference '{}' has no name", s)));
        }
        Ok(NodeRef::Key { label, name })
    }
}

/// Type of edge in the knowledge graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Agent can answer for a concept (carries the Hebbian weight)
    HandlesConcept,
    /// Concept is related to another concept
    RelatedTo,
    /// Agent or concept belongs to a region
    MemberOf,
}

impl EdgeKind {
    /// Whether an edge of this kind may connect the given endpoint labels
    pub fn allows(&self, from: NodeLabel, to: NodeLabel) -> bool {
        match self {
            EdgeKind::HandlesConcept => from == NodeLabel::Agent && to == NodeLabel::Concept,
            EdgeKind::RelatedTo => from == NodeLabel::Concept && to == NodeLabel::Concept,
            EdgeKind::MemberOf => from != NodeLabel::Region && to == NodeLabel::Region,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::HandlesConcept => "HANDLES_CONCEPT",
            EdgeKind::RelatedTo => "RELATED_TO",
            EdgeKind::MemberOf => "MEMBER_OF",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "handlesconcept" => Ok(EdgeKind::HandlesConcept),
            "relatedto" => Ok(EdgeKind::RelatedTo),
            "memberof" => Ok(EdgeKind::MemberOf),
            _ => Err(GraphError::InvalidEdge(format!("unknown edge type '{}'", s))),
        }
    }
}

/// Edge in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    pub weight: f64,
    pub usage_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub decay_rate: f64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decayed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, kind: EdgeKind, weight: f64) -> Self {
        let now = Utc::now();
        Self {
            id: EdgeId::new(),
            from,
            to,
            kind,
            weight: clamp_weight(weight),
            usage_count: 0,
            success_count: 0,
            failure_count: 0,
            decay_rate: DEFAULT_DECAY_RATE,
            created_at: now,
            last_updated: now,
            last_decayed_at: None,
            properties: HashMap::new(),
        }
    }

    /// Derived success rate, neutral until the edge has been used
    pub fn success_rate(&self) -> f64 {
        if self.usage_count == 0 {
            NEUTRAL_SUCCESS_RATE
        } else {
            self.success_count as f64 / self.usage_count as f64
        }
    }

    /// Successful use: count it and move the weight up
    pub fn reinforce(&mut self, delta: f64) {
        self.usage_count += 1;
        self.success_count += 1;
        self.weight = clamp_weight(self.weight + delta.abs());
        self.last_updated = Utc::now();
    }

    /// Failed use: count it and move the weight down
    pub fn weaken(&mut self, delta: f64) {
        self.usage_count += 1;
        self.failure_count += 1;
        self.weight = clamp_weight(self.weight - delta.abs());
        self.last_updated = Utc::now();
    }

    /// Multiply the weight by `1 - decay_rate`.
    ///
    /// `last_updated` is left alone so an edge that stops being used
    /// eventually falls out of the active window.
    pub fn apply_time_decay(&mut self) {
        self.weight = clamp_weight(self.weight * (1.0 - self.decay_rate));
        self.last_decayed_at = Some(Utc::now());
    }

    pub fn is_active_since(&self, since: DateTime<Utc>) -> bool {
        self.last_updated >= since
    }
}

/// Decay rates live in the open interval (0, 1): zero never decays and one
/// wipes the edge in a single sweep.
pub fn is_valid_decay_rate(rate: f64) -> bool {
    rate > 0.0 && rate < 1.0
}

/// Clamp to [0, 1]; NaN collapses to 0
pub fn clamp_weight(weight: f64) -> f64 {
    if weight.is_nan() {
        0.0
    } else {
        weight.clamp(0.0, 1.0)
    }
}

/// Atomic single-edge mutation applied under the store's write lock
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeUpdate {
    Reinforce { delta: f64 },
    Weaken { delta: f64 },
    Decay,
}

impl EdgeUpdate {
    pub fn apply(&self, edge: &mut Edge) {
        match *self {
            EdgeUpdate::Reinforce { delta } => edge.reinforce(delta),
            EdgeUpdate::Weaken { delta } => edge.weaken(delta),
            EdgeUpdate::Decay => edge.apply_time_decay(),
        }
    }
}

/// Request to create an edge or update it in place
#[derive(Debug, Clone)]
pub struct EdgeSpec {
    pub from: NodeRef,
    pub to: NodeRef,
    pub kind: EdgeKind,
    /// Initial weight on insert; overwrites the weight on update when set
    pub weight: Option<f64>,
    pub decay_rate: Option<f64>,
    pub properties: HashMap<String, Value>,
}

impl EdgeSpec {
    pub fn new(from: impl Into<NodeRef>, to: impl Into<NodeRef>, kind: EdgeKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            weight: None,
            decay_rate: None,
            properties: HashMap::new(),
        }
    }

    pub fn handles_concept(agent: impl Into<NodeRef>, concept: impl Into<NodeRef>) -> Self {
        Self::new(agent, concept, EdgeKind::HandlesConcept)
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_decay_rate(mut self, decay_rate: f64) -> Self {
        self.decay_rate = Some(decay_rate);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Precondition checked under the exclusive lock before a batch is applied
#[derive(Debug, Clone)]
pub enum BatchGuard {
    /// Reject if a `HandlesConcept` edge into `concept` was created at or after `since`
    NoNewHandlersSince {
        concept: String,
        since: DateTime<Utc>,
    },
}

/// Group of writes applied all together or not at all
#[derive(Debug, Clone, Default)]
pub struct GraphBatch {
    pub guard: Option<BatchGuard>,
    pub nodes: Vec<Node>,
    /// Only insert these nodes when their natural key is not already present
    pub nodes_if_absent: Vec<Node>,
    pub edges: Vec<EdgeSpec>,
}

impl GraphBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guarded(mut self, guard: BatchGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn upsert(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn insert_if_absent(mut self, node: Node) -> Self {
        self.nodes_if_absent.push(node);
        self
    }

    pub fn edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }
}

/// IDs resolved by a committed batch, in submission order
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub node_ids: Vec<NodeId>,
    pub edge_ids: Vec<EdgeId>,
}
