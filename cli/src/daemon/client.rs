// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for communicating with a node's REST API

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use synapse_core::domain::lifecycle::{ProvisionOutcome, ProvisioningAttempt};
use synapse_core::presentation::api::{AgentsForConceptResponse, DiscoverResponse, FeedbackResponse};

use super::base_url;

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

/// Error body returned by the node
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

#[derive(Debug, Serialize)]
struct DiscoverRequest<'a> {
    concept: &'a str,
    intent: &'a str,
    provision: bool,
}

#[derive(Debug, Clone)]
pub struct NodeClient {
    client: Client,
    base_url: String,
}

impl NodeClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        // No global timeout: provisioning may legitimately take a while
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url(host, port),
        })
    }

    /// Client for an explicit base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build().context("Failed to create HTTP client")?,
            base_url: base_url.into(),
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => anyhow::bail!("Failed to {}: {} ({}, HTTP {})", action, body.error, body.code, status.as_u16()),
                Err(_) => anyhow::bail!("Failed to {}: HTTP {} {}", action, status.as_u16(), text),
            }
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", action))
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize, action: &str) -> Result<T> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to {}", action))?;
        Self::parse(response, action).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, action: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .with_context(|| format!("Failed to {}", action))?;
        Self::parse(response, action).await
    }

    pub async fn health(&self) -> Result<Value> {
        self.get("/health", "check node health").await
    }

    pub async fn create_node(&self, label: &str, properties: Map<String, Value>) -> Result<String> {
        let response: IdResponse = self
            .post(
                "/create_node",
                &json!({ "label": label, "properties": properties }),
                "create node",
            )
            .await?;
        Ok(response.id)
    }

    pub async fn create_relationship(
        &self,
        from_ref: &str,
        to_ref: &str,
        kind: &str,
        properties: Map<String, Value>,
    ) -> Result<String> {
        let response: IdResponse = self
            .post(
                "/create_relationship",
                &json!({
                    "fromRef": from_ref,
                    "toRef": to_ref,
                    "type": kind,
                    "properties": properties,
                }),
                "create relationship",
            )
            .await?;
        Ok(response.id)
    }

    pub async fn get_node(&self, id: &str) -> Result<Value> {
        self.get(&format!("/nodes/{}", id), "get node").await
    }

    pub async fn agents_for_concept(&self, concept: &str) -> Result<AgentsForConceptResponse> {
        self.get(
            &format!("/get_agents_for_concept/{}", concept),
            "list agents for concept",
        )
        .await
    }

    pub async fn discover(&self, concept: &str, intent: &str, provision: bool) -> Result<DiscoverResponse> {
        self.post(
            "/discover",
            &DiscoverRequest {
                concept,
                intent,
                provision,
            },
            "discover agents",
        )
        .await
    }

    pub async fn feedback(&self, agent: &str, concept: &str, success: bool) -> Result<FeedbackResponse> {
        self.post(
            "/hebbian/strengthen",
            &json!({ "agentId": agent, "concept": concept, "success": success }),
            "record feedback",
        )
        .await
    }

    pub async fn decay(&self) -> Result<Value> {
        self.post("/hebbian/decay", &json!({}), "run decay sweep").await
    }

    pub async fn snapshot(&self) -> Result<Value> {
        self.post("/graph/snapshot", &json!({}), "snapshot graph").await
    }

    pub async fn create_concept(&self, concept: &str, intent: &str) -> Result<ProvisionOutcome> {
        self.post(
            "/lifecycle/create_concept",
            &json!({ "concept": concept, "intent": intent }),
            "provision concept",
        )
        .await
    }

    pub async fn attempts(&self) -> Result<Vec<ProvisioningAttempt>> {
        self.get("/lifecycle/attempts", "list provisioning attempts").await
    }
}
