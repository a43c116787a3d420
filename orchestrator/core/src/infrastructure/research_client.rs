// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP research client
//!
//! Asks an agent what it knows about a concept via `POST {endpoint}/research`.
//! Timeouts are enforced by the caller; this client only carries a
//! connect timeout so a dead host fails fast.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use synapse_cortex::AgentNode;

use crate::application::research::ResearchClient;
use crate::domain::knowledge::{ResearchError, ResearchFindings};

#[derive(Debug, Serialize)]
struct ResearchRequest<'a> {
    concept: &'a str,
}

pub struct HttpResearchClient {
    client: Client,
}

impl HttpResearchClient {
    pub fn new() -> Result<Self, ResearchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| ResearchError::Source {
                source_name: "http".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResearchClient for HttpResearchClient {
    async fn query(
        &self,
        agent: &AgentNode,
        concept: &str,
    ) -> Result<ResearchFindings, ResearchError> {
        let url = format!("{}/research", agent.endpoint.trim_end_matches('/'));
        let source_error = |message: String| ResearchError::Source {
            source_name: agent.name.clone(),
            message,
        };

        let response = self
            .client
            .post(&url)
            .json(&ResearchRequest { concept })
            .send()
            .await
            .map_err(|e| source_error(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(source_error(format!("{} returned {}", url, status)));
        }

        response
            .json::<ResearchFindings>()
            .await
            .map_err(|e| source_error(format!("invalid research response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_query_parses_findings() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/research")
            .match_body(mockito::Matcher::Json(json!({"concept": "quantum_computer"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "facts": {"qubits": "superposition"},
                    "related_concepts": ["qubit"],
                    "sources": ["textbook"]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let agent = AgentNode::new("PhysicsAgent", server.url());
        let client = HttpResearchClient::new().unwrap();
        let findings = client.query(&agent, "quantum_computer").await.unwrap();

        mock.assert_async().await;
        assert_eq!(findings.facts["qubits"], json!("superposition"));
        assert_eq!(findings.related_concepts, vec!["qubit".to_string()]);
    }

    #[tokio::test]
    async fn test_error_status_is_source_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/research")
            .with_status(500)
            .create_async()
            .await;

        let agent = AgentNode::new("BrokenAgent", server.url());
        let client = HttpResearchClient::new().unwrap();
        let err = client.query(&agent, "x").await.unwrap_err();

        assert!(matches!(err, ResearchError::Source { ref source_name, .. } if source_name == "BrokenAgent"));
    }
}
