// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Hosted agent service
//!
//! The HTTP surface every generated agent exposes:
//! - `GET /health` liveness
//! - `POST /research` the agent's knowledge about a concept
//! - `POST /query` an answer rendered from the archetype template

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use synapse_cortex::domain::graph::normalize_concept_name;
use synapse_cortex::domain::similarity::term_similarity;

use super::agent_generator::AgentGenerator;
use crate::domain::archetype::AgentBlueprint;
use crate::domain::knowledge::ResearchFindings;

/// Similarity above which a research request is treated as being about this agent's concept
const CONCEPT_MATCH_THRESHOLD: f64 = 0.75;

#[derive(Clone)]
pub struct HostedAgent {
    blueprint: Arc<AgentBlueprint>,
    generator: Arc<AgentGenerator>,
}

#[derive(Debug, Deserialize)]
struct ResearchRequest {
    concept: String,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
}

impl HostedAgent {
    pub fn new(blueprint: AgentBlueprint, generator: Arc<AgentGenerator>) -> Self {
        Self {
            blueprint: Arc::new(blueprint),
            generator,
        }
    }

    pub fn blueprint(&self) -> &AgentBlueprint {
        &self.blueprint
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/research", post(research_handler))
            .route("/query", post(query_handler))
            .with_state(self.clone())
    }

    /// Serve until `shutdown` is cancelled
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let name = self.blueprint.name.clone();
        let addr = listener.local_addr()?;
        info!(agent = %name, addr = %addr, "Hosted agent listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!(agent = %name, "Hosted agent stopped");
        Ok(())
    }

    /// What this agent knows about `concept`
    pub fn findings_for(&self, concept: &str) -> ResearchFindings {
        let concept = normalize_concept_name(concept);
        let own = &self.blueprint.knowledge;
        let relevant = term_similarity(&concept, &self.blueprint.concept) >= CONCEPT_MATCH_THRESHOLD
            || own.related_concepts.contains(&concept);

        if !relevant {
            return ResearchFindings::default();
        }

        let mut related: Vec<String> = own.related_concepts.iter().cloned().collect();
        if concept != self.blueprint.concept {
            related.push(self.blueprint.concept.clone());
        }
        ResearchFindings {
            facts: own.facts.clone(),
            related_concepts: related,
            sources: vec![self.blueprint.name.clone()],
        }
    }
}

async fn health_handler(State(agent): State<HostedAgent>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "agent": agent.blueprint.name,
        "timestamp": Utc::now(),
    }))
}

async fn research_handler(
    State(agent): State<HostedAgent>,
    Json(request): Json<ResearchRequest>,
) -> Json<ResearchFindings> {
    Json(agent.findings_for(&request.concept))
}

async fn query_handler(
    State(agent): State<HostedAgent>,
    Json(request): Json<QueryRequest>,
) -> Response {
    match agent.generator.answer(&agent.blueprint, &request.question) {
        Ok(answer) => Json(json!({ "answer": answer })).into_response(),
        Err(e) => {
            error!(agent = %agent.blueprint.name, error = %e, "Failed to render answer");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string(), "code": "render_failed" })),
            )
                .into_response()
        }
    }
}
