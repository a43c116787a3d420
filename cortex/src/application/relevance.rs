// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # RelevanceScorer: Agent Discovery
//!
//! Ranks the agents able to answer for a concept. Candidates come from, in
//! order of preference:
//!
//! 1. Direct `HANDLES_CONCEPT` edges into the concept node.
//! 2. Handlers of concepts reachable over `RELATED_TO` edges (bounded BFS),
//!    when the concept has no direct handler.
//! 3. Agents whose own name or capabilities match the concept, when the
//!    concept node does not exist yet. These get neutral edge statistics.
//!
//! Each candidate gets a weighted sum of six sub-scores (see
//! [`ScoringWeights`]). Discovery is read-only and never provisions.

use anyhow::{bail, Result as AnyResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::domain::classifier::{DomainClassifier, GENERAL_DOMAIN};
use crate::domain::error::GraphError;
use crate::domain::graph::{
    normalize_concept_name, AgentNode, AgentStatus, Edge, EdgeKind, Node, NodeId, NodeLabel,
    NEUTRAL_SUCCESS_RATE,
};
use crate::domain::similarity::{term_similarity, tokens};
use crate::infrastructure::repository::{Direction, GraphRepository};

/// Hebbian weight assumed for capability-matched agents with no edge yet
const NEUTRAL_EDGE_WEIGHT: f64 = 0.5;

/// Intent words that never say anything about capabilities
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "how", "does", "what", "why", "who", "when", "where", "which", "with",
    "are", "was", "can", "you", "this", "that", "about", "from", "into", "work", "works",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub expertise: f64,
    pub capability: f64,
    pub domain: f64,
    pub performance: f64,
    pub availability: f64,
    pub hebbian: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            expertise: 0.28,
            capability: 0.22,
            domain: 0.18,
            performance: 0.14,
            availability: 0.08,
            hebbian: 0.10,
        }
    }
}

impl ScoringWeights {
    fn entries(&self) -> [(&'static str, f64); 6] {
        [
            ("expertise", self.expertise),
            ("capability", self.capability),
            ("domain", self.domain),
            ("performance", self.performance),
            ("availability", self.availability),
            ("hebbian", self.hebbian),
        ]
    }

    /// Weights must be non-negative and sum to 1.0 (±1e-6)
    pub fn validate(&self) -> AnyResult<()> {
        for (name, weight) in self.entries() {
            if !weight.is_finite() || weight < 0.0 {
                bail!("scoring weight '{}' must be a non-negative number, got {}", name, weight);
            }
        }
        let sum: f64 = self.entries().iter().map(|(_, w)| w).sum();
        if (sum - 1.0).abs() > 1e-6 {
            bail!("scoring weights must sum to 1.0, got {}", sum);
        }
        Ok(())
    }

    pub fn combine(&self, b: &ScoreBreakdown) -> f64 {
        self.expertise * b.expertise
            + self.capability * b.capability
            + self.domain * b.domain
            + self.performance * b.performance
            + self.availability * b.availability
            + self.hebbian * b.hebbian
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    /// Maximum number of agents returned by discovery
    pub max_agents: usize,
    /// Hops over RELATED_TO edges when a concept has no direct handler
    pub traversal_depth: usize,
    /// Minimum expertise for a capability-matched agent of an unknown concept
    pub capability_fallback_threshold: f64,
    /// Minimum similarity for an intent token to count as matched
    pub capability_match_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            max_agents: 5,
            traversal_depth: 2,
            capability_fallback_threshold: 0.75,
            capability_match_threshold: 0.8,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> AnyResult<()> {
        self.weights.validate()?;
        if self.max_agents == 0 {
            bail!("scoring.max_agents must be at least 1");
        }
        for (name, value) in [
            ("capability_fallback_threshold", self.capability_fallback_threshold),
            ("capability_match_threshold", self.capability_match_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("scoring.{} must be within [0, 1], got {}", name, value);
            }
        }
        Ok(())
    }
}

/// Sub-scores of one candidate, each in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub expertise: f64,
    pub capability: f64,
    pub domain: f64,
    pub performance: f64,
    pub availability: f64,
    pub hebbian: f64,
}

/// How a candidate was found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateSource {
    Direct,
    Related { concept: String, hops: usize },
    CapabilityMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredAgent {
    pub agent_id: NodeId,
    pub name: String,
    pub endpoint: String,
    pub status: AgentStatus,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub weight: f64,
    pub success_rate: f64,
    pub usage_count: u64,
    pub source: CandidateSource,
}

/// Direct handler of a concept, as listed by `agents_for_concept`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptHandler {
    pub agent_id: NodeId,
    pub name: String,
    pub endpoint: String,
    pub status: AgentStatus,
    pub weight: f64,
    pub success_rate: f64,
    pub usage_count: u64,
}

struct Candidate {
    id: NodeId,
    agent: AgentNode,
    weight: f64,
    success_rate: f64,
    usage_count: u64,
    source: CandidateSource,
}

impl Candidate {
    fn from_edge(node: Node, edge: &Edge, source: CandidateSource) -> Option<Self> {
        let id = node.id;
        let agent = node.as_agent()?.clone();
        Some(Self {
            id,
            agent,
            weight: edge.weight,
            success_rate: edge.success_rate(),
            usage_count: edge.usage_count,
            source,
        })
    }
}

pub struct RelevanceScorer {
    graph: Arc<dyn GraphRepository>,
    classifier: Arc<DomainClassifier>,
    config: ScoringConfig,
}

impl RelevanceScorer {
    pub fn new(
        graph: Arc<dyn GraphRepository>,
        classifier: Arc<DomainClassifier>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            graph,
            classifier,
            config,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Rank agents for `concept`, best first.
    ///
    /// `context` may carry `keywords` (array of strings or one string) that
    /// count as extra intent tokens, and `domain` used when the concept node
    /// has none.
    pub async fn discover(
        &self,
        concept: &str,
        intent: &str,
        context: &HashMap<String, Value>,
    ) -> Result<Vec<ScoredAgent>, GraphError> {
        let concept_name = normalize_concept_name(concept);
        metrics::counter!("synapse_discover_total").increment(1);

        let concept_node = self
            .graph
            .find_by_name(NodeLabel::Concept, &concept_name)
            .await?;

        let concept_domain = concept_node
            .as_ref()
            .and_then(Node::as_concept)
            .map(|c| c.domain.clone())
            .or_else(|| {
                context
                    .get("domain")
                    .and_then(Value::as_str)
                    .map(str::to_lowercase)
            })
            .unwrap_or_else(|| self.classifier.classify(&concept_name));

        let candidates = match &concept_node {
            Some(node) => self.graph_candidates(node).await?,
            None => self.capability_candidates(&concept_name).await?,
        };

        let intent_tokens = intent_tokens(intent, context);
        let mut scored: Vec<ScoredAgent> = candidates
            .into_iter()
            .map(|c| self.score(c, &concept_name, &concept_domain, &intent_tokens))
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.usage_count.cmp(&a.usage_count))
                .then_with(|| a.name.cmp(&b.name))
        });
        scored.truncate(self.config.max_agents);

        debug!(
            concept = %concept_name,
            domain = %concept_domain,
            found = scored.len(),
            top_score = scored.first().map(|a| a.score),
            "Discovery complete"
        );
        if scored.is_empty() {
            metrics::counter!("synapse_discover_empty_total").increment(1);
        }

        Ok(scored)
    }

    /// Direct handlers of a known concept, heaviest edge first
    pub async fn agents_for_concept(&self, concept: &str) -> Result<Vec<ConceptHandler>, GraphError> {
        let concept_name = normalize_concept_name(concept);
        let node = self
            .graph
            .find_by_name(NodeLabel::Concept, &concept_name)
            .await?
            .ok_or_else(|| GraphError::NodeNotFound(format!("Concept:{}", concept_name)))?;

        let mut handlers = Vec::new();
        for edge in self
            .graph
            .incoming_edges(node.id, Some(EdgeKind::HandlesConcept))
            .await?
        {
            let Some(agent_node) = self.graph.get_node(edge.from).await? else {
                continue;
            };
            let Some(agent) = agent_node.as_agent() else {
                continue;
            };
            handlers.push(ConceptHandler {
                agent_id: agent_node.id,
                name: agent.name.clone(),
                endpoint: agent.endpoint.clone(),
                status: agent.status,
                weight: edge.weight,
                success_rate: edge.success_rate(),
                usage_count: edge.usage_count,
            });
        }

        handlers.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.name.cmp(&b.name)));
        Ok(handlers)
    }

    async fn graph_candidates(&self, concept: &Node) -> Result<Vec<Candidate>, GraphError> {
        let direct = self
            .graph
            .incoming_edges(concept.id, Some(EdgeKind::HandlesConcept))
            .await?;

        let mut by_agent: HashMap<NodeId, Candidate> = HashMap::new();

        if !direct.is_empty() {
            for edge in &direct {
                if let Some(candidate) = self.load_candidate(edge, CandidateSource::Direct).await? {
                    by_agent.insert(candidate.id, candidate);
                }
            }
        } else {
            let related = |e: &Edge| e.kind == EdgeKind::RelatedTo;
            let reached = self
                .graph
                .traverse(concept.id, self.config.traversal_depth, Direction::Both, &related)
                .await?;

            for (neighbour, hops) in reached {
                let edges = self
                    .graph
                    .incoming_edges(neighbour.id, Some(EdgeKind::HandlesConcept))
                    .await?;
                for edge in &edges {
                    let source = CandidateSource::Related {
                        concept: neighbour.name().to_string(),
                        hops,
                    };
                    let Some(candidate) = self.load_candidate(edge, source).await? else {
                        continue;
                    };
                    // Keep the strongest edge when an agent handles several neighbours
                    let replace = by_agent
                        .get(&candidate.id)
                        .is_none_or(|existing| candidate.weight > existing.weight);
                    if replace {
                        by_agent.insert(candidate.id, candidate);
                    }
                }
            }
        }

        Ok(by_agent.into_values().collect())
    }

    async fn load_candidate(
        &self,
        edge: &Edge,
        source: CandidateSource,
    ) -> Result<Option<Candidate>, GraphError> {
        let Some(node) = self.graph.get_node(edge.from).await? else {
            return Ok(None);
        };
        Ok(Candidate::from_edge(node, edge, source)
            .filter(|c| c.agent.status != AgentStatus::Failed))
    }

    async fn capability_candidates(&self, concept: &str) -> Result<Vec<Candidate>, GraphError> {
        let agents = self
            .graph
            .find_nodes(&|n: &Node| {
                n.as_agent()
                    .is_some_and(|a| a.status != AgentStatus::Failed)
            })
            .await?;

        let threshold = self.config.capability_fallback_threshold;
        Ok(agents
            .into_iter()
            .filter_map(|node| {
                let id = node.id;
                let agent = node.as_agent()?.clone();
                (expertise_match(&agent, concept) >= threshold).then(|| Candidate {
                    id,
                    agent,
                    weight: NEUTRAL_EDGE_WEIGHT,
                    success_rate: NEUTRAL_SUCCESS_RATE,
                    usage_count: 0,
                    source: CandidateSource::CapabilityMatch,
                })
            })
            .collect())
    }

    fn score(
        &self,
        candidate: Candidate,
        concept: &str,
        concept_domain: &str,
        intent_tokens: &[String],
    ) -> ScoredAgent {
        let agent = &candidate.agent;
        let breakdown = ScoreBreakdown {
            expertise: expertise_match(agent, concept),
            capability: capability_match(
                agent,
                intent_tokens,
                self.config.capability_match_threshold,
            ),
            domain: domain_match(agent.domain.as_deref(), concept_domain),
            performance: candidate.success_rate,
            availability: agent.status.availability(),
            hebbian: candidate.weight,
        };

        ScoredAgent {
            agent_id: candidate.id,
            name: agent.name.clone(),
            endpoint: agent.endpoint.clone(),
            status: agent.status,
            score: self.config.weights.combine(&breakdown),
            breakdown,
            weight: candidate.weight,
            success_rate: candidate.success_rate,
            usage_count: candidate.usage_count,
            source: candidate.source,
        }
    }
}

/// Best similarity between the concept and the agent's name or any capability
pub fn expertise_match(agent: &AgentNode, concept: &str) -> f64 {
    std::iter::once(agent.name.as_str())
        .chain(agent.capabilities.iter().map(String::as_str))
        .map(|term| term_similarity(term, concept))
        .fold(0.0, f64::max)
}

/// Fraction of intent tokens covered by a capability token
pub fn capability_match(agent: &AgentNode, intent_tokens: &[String], threshold: f64) -> f64 {
    if agent.capabilities.is_empty() {
        return 0.0;
    }
    if intent_tokens.is_empty() {
        return 0.5;
    }

    let capability_tokens: Vec<String> = agent
        .capabilities
        .iter()
        .flat_map(|c| tokens(c))
        .collect();

    let matched = intent_tokens
        .iter()
        .filter(|t| {
            capability_tokens
                .iter()
                .any(|c| term_similarity(t, c) >= threshold)
        })
        .count();

    matched as f64 / intent_tokens.len() as f64
}

pub fn domain_match(agent_domain: Option<&str>, concept_domain: &str) -> f64 {
    let is_unknown = |d: &str| d.trim().is_empty() || d.eq_ignore_ascii_case(GENERAL_DOMAIN);
    match agent_domain {
        None => 0.5,
        Some(a) if is_unknown(a) || is_unknown(concept_domain) => 0.5,
        Some(a) if a.eq_ignore_ascii_case(concept_domain) => 1.0,
        Some(_) => 0.0,
    }
}

fn intent_tokens(intent: &str, context: &HashMap<String, Value>) -> Vec<String> {
    let mut words = tokens(intent);
    match context.get("keywords") {
        Some(Value::Array(items)) => {
            for item in items.iter().filter_map(Value::as_str) {
                words.extend(tokens(item));
            }
        }
        Some(Value::String(s)) => words.extend(tokens(s)),
        _ => {}
    }

    let mut seen = HashSet::new();
    words
        .into_iter()
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}
