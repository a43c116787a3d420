// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Concept research
//!
//! Asks the agents best placed to know about a concept, all at once, and
//! merges whatever comes back before the per-source timeout. A slow or
//! broken source is recorded and skipped; only when every selected source
//! times out does research fail.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use synapse_cortex::domain::classifier::GENERAL_DOMAIN;
use synapse_cortex::domain::similarity::{term_similarity, tokens};
use synapse_cortex::{AgentNode, AgentStatus, DomainClassifier, GraphRepository, Node};

use crate::domain::config::ResearchConfig;
use crate::domain::knowledge::{KnowledgeSummary, ResearchError, ResearchFindings};

/// Similarity at which a capability token counts as matching a concept token
const CAPABILITY_TOKEN_THRESHOLD: f64 = 0.8;

/// Produces a knowledge summary for a concept
#[async_trait]
pub trait Researcher: Send + Sync {
    async fn research(&self, concept: &str) -> Result<KnowledgeSummary, ResearchError>;
}

/// Transport used to ask one agent about a concept
#[async_trait]
pub trait ResearchClient: Send + Sync {
    async fn query(&self, agent: &AgentNode, concept: &str)
        -> Result<ResearchFindings, ResearchError>;
}

/// An agent picked as a research source, with how well it matches
#[derive(Debug, Clone)]
pub struct ResearchSource {
    pub agent: AgentNode,
    pub strength: f64,
}

enum SourceOutcome {
    Answered(ResearchFindings),
    TimedOut,
    Failed(String),
}

pub struct ConceptResearcher {
    graph: Arc<dyn GraphRepository>,
    client: Arc<dyn ResearchClient>,
    classifier: Arc<DomainClassifier>,
    config: ResearchConfig,
}

impl ConceptResearcher {
    pub fn new(
        graph: Arc<dyn GraphRepository>,
        client: Arc<dyn ResearchClient>,
        classifier: Arc<DomainClassifier>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            graph,
            client,
            classifier,
            config,
        }
    }

    /// Non-failed agents whose domain or capabilities match the concept,
    /// strongest first (ties by name), at most `max_sources`.
    pub async fn select_sources(&self, concept: &str) -> Result<Vec<ResearchSource>, ResearchError> {
        let concept_domain = self.classifier.classify(concept);
        let concept_tokens = tokens(concept);

        let agents = self
            .graph
            .find_nodes(&|n: &Node| n.as_agent().is_some_and(|a| a.status != AgentStatus::Failed))
            .await?;

        let mut sources: Vec<ResearchSource> = agents
            .into_iter()
            .filter_map(|node| node.as_agent().cloned())
            .filter_map(|agent| {
                let strength = match_strength(&agent, &concept_domain, &concept_tokens);
                (strength > 0.0).then_some(ResearchSource { agent, strength })
            })
            .collect();

        sources.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then_with(|| a.agent.name.cmp(&b.agent.name))
        });
        sources.truncate(self.config.max_sources);
        Ok(sources)
    }

    async fn ask(&self, agent: &AgentNode, concept: &str) -> SourceOutcome {
        match tokio::time::timeout(self.config.timeout, self.client.query(agent, concept)).await {
            Ok(Ok(findings)) => SourceOutcome::Answered(findings),
            Ok(Err(e)) => SourceOutcome::Failed(e.to_string()),
            Err(_) => SourceOutcome::TimedOut,
        }
    }
}

/// Domain equality counts 1.0; each concept token matched by a capability
/// token adds its share of the remaining 1.0.
fn match_strength(agent: &AgentNode, concept_domain: &str, concept_tokens: &[String]) -> f64 {
    let domain_score = match agent.domain.as_deref() {
        Some(d) if concept_domain != GENERAL_DOMAIN && d == concept_domain => 1.0,
        _ => 0.0,
    };

    let capability_tokens: Vec<String> = agent.capabilities.iter().flat_map(|c| tokens(c)).collect();
    let overlap = if concept_tokens.is_empty() {
        0.0
    } else {
        let matched = concept_tokens
            .iter()
            .filter(|t| {
                capability_tokens
                    .iter()
                    .any(|c| term_similarity(t, c) >= CAPABILITY_TOKEN_THRESHOLD)
            })
            .count();
        matched as f64 / concept_tokens.len() as f64
    };

    domain_score + overlap
}

#[async_trait]
impl Researcher for ConceptResearcher {
    async fn research(&self, concept: &str) -> Result<KnowledgeSummary, ResearchError> {
        let started = Instant::now();
        let sources = self.select_sources(concept).await?;
        let mut summary = KnowledgeSummary::new(concept);

        if sources.is_empty() {
            info!(concept = %concept, "No research sources match concept");
            return Ok(summary);
        }
        debug!(
            concept = %concept,
            sources = ?sources.iter().map(|s| s.agent.name.as_str()).collect::<Vec<_>>(),
            "Querying research sources"
        );

        // All sources run concurrently; results come back in selection order
        let outcomes = join_all(sources.iter().map(|s| self.ask(&s.agent, concept))).await;

        let mut timed_out = 0usize;
        for (source, outcome) in sources.iter().zip(outcomes) {
            let name = source.agent.name.as_str();
            match outcome {
                SourceOutcome::Answered(findings) => summary.merge(name, findings),
                SourceOutcome::TimedOut => {
                    warn!(concept = %concept, source = name, timeout = ?self.config.timeout, "Research source timed out");
                    metrics::counter!("synapse_research_source_failures_total", "reason" => "timeout").increment(1);
                    timed_out += 1;
                    summary.failed_sources.insert(name.to_string());
                }
                SourceOutcome::Failed(error) => {
                    warn!(concept = %concept, source = name, error = %error, "Research source failed");
                    metrics::counter!("synapse_research_source_failures_total", "reason" => "error").increment(1);
                    summary.failed_sources.insert(name.to_string());
                }
            }
        }

        metrics::histogram!("synapse_research_duration_seconds").record(started.elapsed().as_secs_f64());

        if timed_out == sources.len() {
            return Err(ResearchError::Timeout(concept.to_string()));
        }

        info!(
            concept = %concept,
            facts = summary.facts.len(),
            sources = summary.sources.len(),
            failed = summary.failed_sources.len(),
            "Research completed"
        );
        Ok(summary)
    }
}
