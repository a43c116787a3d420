// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! REST surface of a Synapse node
//!
//! Graph writes, discovery, Hebbian feedback, neurogenesis and the domain
//! event stream. Handlers only translate; errors map to `{error, code}`
//! bodies through [`ApiError`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use synapse_cortex::application::{ConceptHandler, DecayReport, HebbianLearner, RelevanceScorer, ScoredAgent};
use synapse_cortex::{
    normalize_concept_name, DomainClassifier, EdgeKind, EdgeSpec, GraphError, GraphRepository,
    Node, NodeId, NodeKind, NodeLabel, NodeRef,
};

use crate::application::lifecycle::ProvisioningService;
use crate::domain::lifecycle::{NeurogenesisError, ProvisionOutcome, ProvisioningAttempt};
use crate::infrastructure::event_bus::DomainEventBus;

pub struct AppState {
    pub node_name: String,
    pub graph: Arc<dyn GraphRepository>,
    pub scorer: Arc<RelevanceScorer>,
    pub learner: Arc<HebbianLearner>,
    pub lifecycle: Arc<dyn ProvisioningService>,
    pub classifier: Arc<DomainClassifier>,
    pub events: DomainEventBus,
    /// Weight of HANDLES_CONCEPT edges registered through the API without one
    pub manual_edge_weight: f64,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/create_node", post(create_node))
        .route("/create_relationship", post(create_relationship))
        .route("/get_agents_for_concept/{concept}", get(agents_for_concept))
        .route("/discover", post(discover))
        .route("/nodes/{id}", get(get_node))
        .route("/hebbian/strengthen", post(hebbian_feedback))
        .route("/hebbian/decay", post(hebbian_decay))
        .route("/lifecycle/create_concept", post(create_concept))
        .route("/lifecycle/attempts", get(list_attempts))
        .route("/graph/snapshot", post(snapshot))
        .route("/events", get(stream_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Unprocessable(_) => "invalid_request",
            ApiError::Unavailable(_) => "no_capacity",
            ApiError::Upstream(_) => "research_failed",
            ApiError::Internal(_) => "internal",
        }
    }

    /// Same status, different message
    fn with_message(self, message: String) -> Self {
        match self {
            ApiError::NotFound(_) => ApiError::NotFound(message),
            ApiError::Conflict(_) => ApiError::Conflict(message),
            ApiError::Unprocessable(_) => ApiError::Unprocessable(message),
            ApiError::Unavailable(_) => ApiError::Unavailable(message),
            ApiError::Upstream(_) => ApiError::Upstream(message),
            ApiError::Internal(_) => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string(), "code": self.code() }))).into_response()
    }
}

impl From<GraphError> for ApiError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::NodeNotFound(_) | GraphError::EdgeNotFound(_) => ApiError::NotFound(e.to_string()),
            GraphError::GuardRejected(_) => ApiError::Conflict(e.to_string()),
            ref caller if caller.is_caller_error() => ApiError::Unprocessable(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<NeurogenesisError> for ApiError {
    fn from(e: NeurogenesisError) -> Self {
        match e {
            NeurogenesisError::NoCapacity => ApiError::Unavailable(e.to_string()),
            NeurogenesisError::Conflict(_) => ApiError::Conflict(e.to_string()),
            NeurogenesisError::ResearchFailed { .. } | NeurogenesisError::ResearchTimeout(_) => {
                ApiError::Upstream(e.to_string())
            }
            NeurogenesisError::Graph(graph) => graph.into(),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "agent": state.node_name,
        "timestamp": Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateNodeRequest {
    pub label: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdResponse {
    pub id: String,
}

/// Node payload from a label and free-form properties
fn node_from_request(req: CreateNodeRequest, classifier: &DomainClassifier) -> Result<Node, ApiError> {
    let label: NodeLabel = req.label.parse()?;
    let mut fields = req.properties;
    fields.insert("label".to_string(), json!(label.as_str()));

    if label == NodeLabel::Concept && !fields.contains_key("domain") {
        let name = fields.get("name").and_then(Value::as_str).unwrap_or_default();
        fields.insert("domain".to_string(), json!(classifier.classify(name)));
    }

    let kind: NodeKind = serde_json::from_value(Value::Object(fields))
        .map_err(|e| ApiError::Unprocessable(format!("invalid {} properties: {}", label, e)))?;
    Ok(Node::new(kind))
}

async fn create_node(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateNodeRequest>,
) -> ApiResult<IdResponse> {
    let status_given = req.properties.contains_key("status");
    let node = node_from_request(req, &state.classifier)?;
    // Upserts keep a known agent's status; only an explicit one replaces it
    let status = node.as_agent().filter(|_| status_given).map(|a| a.status);
    let id = state.graph.upsert_node(node).await?;
    if let Some(status) = status {
        state.graph.set_agent_status(id, status).await?;
    }
    Ok(Json(IdResponse { id: id.to_string() }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRelationshipRequest {
    pub from_ref: String,
    pub to_ref: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

async fn create_relationship(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRelationshipRequest>,
) -> ApiResult<IdResponse> {
    let from: NodeRef = req.from_ref.parse()?;
    let to: NodeRef = req.to_ref.parse()?;
    let kind: EdgeKind = req.kind.parse()?;

    let mut properties = req.properties;
    let mut spec = EdgeSpec::new(from, to, kind);
    match properties.remove("weight").map(|w| w.as_f64()) {
        Some(Some(weight)) => spec = spec.with_weight(weight),
        Some(None) => return Err(ApiError::Unprocessable("weight must be a number".to_string())),
        None if kind == EdgeKind::HandlesConcept => spec = spec.with_weight(state.manual_edge_weight),
        None => {}
    }
    match properties.remove("decay_rate").map(|r| r.as_f64()) {
        Some(Some(rate)) => spec = spec.with_decay_rate(rate),
        Some(None) => return Err(ApiError::Unprocessable("decay_rate must be a number".to_string())),
        None => {}
    }
    spec.properties = properties.into_iter().collect();

    let id = state.graph.add_edge(spec).await?;
    Ok(Json(IdResponse { id: id.to_string() }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentsForConceptResponse {
    pub concept: String,
    pub agents: Vec<ConceptHandler>,
}

async fn agents_for_concept(
    State(state): State<Arc<AppState>>,
    Path(concept): Path<String>,
) -> ApiResult<AgentsForConceptResponse> {
    let agents = state.scorer.agents_for_concept(&concept).await?;
    Ok(Json(AgentsForConceptResponse {
        concept: normalize_concept_name(&concept),
        agents,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub concept: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    /// Run neurogenesis when no agent is found
    #[serde(default)]
    pub provision: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoverResponse {
    pub agents: Vec<ScoredAgent>,
    pub provisioned: Option<ProvisionOutcome>,
}

async fn discover(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DiscoverRequest>,
) -> ApiResult<DiscoverResponse> {
    let agents = state.scorer.discover(&req.concept, &req.intent, &req.context).await?;
    if !agents.is_empty() || !req.provision {
        return Ok(Json(DiscoverResponse {
            agents,
            provisioned: None,
        }));
    }

    match state.lifecycle.provision(&req.concept, &req.intent).await {
        Ok(outcome) => {
            let agents = state.scorer.discover(&req.concept, &req.intent, &req.context).await?;
            Ok(Json(DiscoverResponse {
                agents,
                provisioned: Some(outcome),
            }))
        }
        Err(e) => {
            let message = format!(
                "no agent available for concept {}, provisioning failed: {}",
                normalize_concept_name(&req.concept),
                e
            );
            Err(ApiError::from(e).with_message(message))
        }
    }
}

async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Node> {
    let node_ref: NodeRef = id.parse()?;
    state
        .graph
        .resolve(&node_ref)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("node not found: {}", node_ref)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    /// Node id, `Agent:Name`, or a bare agent name
    pub agent_id: String,
    pub concept: String,
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    /// False when no HANDLES_CONCEPT edge connects the pair
    pub applied: bool,
    pub new_weight: Option<f64>,
    pub success_rate: Option<f64>,
    pub usage_count: Option<u64>,
}

async fn resolve_agent(graph: &dyn GraphRepository, raw: &str) -> Result<Node, ApiError> {
    let node_ref = if raw.contains(':') || raw.parse::<NodeId>().is_ok() {
        raw.parse::<NodeRef>()?
    } else {
        NodeRef::agent(raw.trim())
    };
    graph
        .resolve(&node_ref)
        .await?
        .filter(|n| n.label() == NodeLabel::Agent)
        .ok_or_else(|| ApiError::NotFound(format!("agent not found: {}", raw)))
}

async fn hebbian_feedback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FeedbackRequest>,
) -> ApiResult<FeedbackResponse> {
    let agent = resolve_agent(state.graph.as_ref(), &req.agent_id).await?;
    let concept_name = normalize_concept_name(&req.concept);
    let concept = state
        .graph
        .find_by_name(NodeLabel::Concept, &concept_name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("concept not found: {}", concept_name)))?;

    let edge = if req.success {
        state.learner.strengthen(agent.id, concept.id).await?
    } else {
        state.learner.weaken(agent.id, concept.id).await?
    };

    Ok(Json(match edge {
        Some(edge) => FeedbackResponse {
            applied: true,
            new_weight: Some(edge.weight),
            success_rate: Some(edge.success_rate()),
            usage_count: Some(edge.usage_count),
        },
        None => FeedbackResponse {
            applied: false,
            new_weight: None,
            success_rate: None,
            usage_count: None,
        },
    }))
}

async fn hebbian_decay(State(state): State<Arc<AppState>>) -> ApiResult<DecayReport> {
    Ok(Json(state.learner.decay_sweep().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateConceptRequest {
    pub concept: String,
    #[serde(default)]
    pub intent: String,
}

async fn create_concept(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConceptRequest>,
) -> ApiResult<ProvisionOutcome> {
    info!(concept = %req.concept, "Neurogenesis requested");
    Ok(Json(state.lifecycle.provision(&req.concept, &req.intent).await?))
}

async fn list_attempts(State(state): State<Arc<AppState>>) -> Json<Vec<ProvisioningAttempt>> {
    Json(state.lifecycle.attempts())
}

async fn snapshot(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    let written = state.graph.persist().await?;
    let stats = state.graph.stats().await?;
    Ok(Json(json!({
        "persisted": written,
        "nodes": stats.nodes(),
        "edges": stats.edges,
    })))
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.events.raw_receiver()).filter_map(|received| {
        // Lagged receivers skip what they missed
        let event = received.ok()?;
        Event::default()
            .event(event.name())
            .json_data(&event)
            .ok()
            .map(Ok)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use synapse_cortex::application::{HebbianConfig, ScoringConfig};
    use synapse_cortex::{AgentNode, AgentStatus, ConceptNode, EdgeId, GraphStore};
    use tower::ServiceExt;

    use crate::domain::lifecycle::AttemptId;

    struct StubProvisioner(fn() -> Result<ProvisionOutcome, NeurogenesisError>);

    #[async_trait]
    impl ProvisioningService for StubProvisioner {
        async fn provision(&self, _concept: &str, _intent: &str) -> Result<ProvisionOutcome, NeurogenesisError> {
            (self.0)()
        }

        fn attempts(&self) -> Vec<ProvisioningAttempt> {
            vec![ProvisioningAttempt::new("lightbulb", "")]
        }

        fn attempt(&self, _id: AttemptId) -> Option<ProvisioningAttempt> {
            None
        }
    }

    fn state_with(provision: fn() -> Result<ProvisionOutcome, NeurogenesisError>) -> (Arc<GraphStore>, Arc<AppState>) {
        let graph = Arc::new(GraphStore::in_memory());
        let classifier = Arc::new(DomainClassifier::default());
        let events = DomainEventBus::new(16);
        let state = Arc::new(AppState {
            node_name: "synapse-test".to_string(),
            graph: graph.clone(),
            scorer: Arc::new(RelevanceScorer::new(
                graph.clone(),
                classifier.clone(),
                ScoringConfig::default(),
            )),
            learner: Arc::new(HebbianLearner::new(
                graph.clone(),
                Arc::new(events.clone()),
                HebbianConfig::default(),
            )),
            lifecycle: Arc::new(StubProvisioner(provision)),
            classifier,
            events,
            manual_edge_weight: 0.5,
        });
        (graph, state)
    }

    fn test_state() -> (Arc<GraphStore>, Arc<AppState>) {
        state_with(|| Err(NeurogenesisError::NoCapacity))
    }

    async fn call(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn seed_lightbulb(state: &Arc<AppState>) {
        call(state, "POST", "/create_node", Some(json!({
            "label": "Agent",
            "properties": {"name": "Lightbulb_AI", "endpoint": "http://127.0.0.1:9001", "capabilities": ["lightbulb"]}
        })))
        .await;
        call(state, "POST", "/create_node", Some(json!({
            "label": "Concept",
            "properties": {"name": "Lightbulb"}
        })))
        .await;
        let (status, _) = call(state, "POST", "/create_relationship", Some(json!({
            "fromRef": "Agent:Lightbulb_AI",
            "toRef": "Concept:lightbulb",
            "type": "HANDLES_CONCEPT",
            "properties": {}
        })))
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health() {
        let (_, state) = test_state();
        let (status, body) = call(&state, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["agent"], "synapse-test");
    }

    #[tokio::test]
    async fn test_create_node_classifies_concept_domain() {
        let (graph, state) = test_state();
        let (status, body) = call(&state, "POST", "/create_node", Some(json!({
            "label": "concept",
            "properties": {"name": "Quantum Computer"}
        })))
        .await;
        assert_eq!(status, StatusCode::OK);

        let id: NodeId = body["id"].as_str().unwrap().parse().unwrap();
        let node = graph.get_node(id).await.unwrap().unwrap();
        let concept = node.as_concept().unwrap();
        assert_eq!(concept.name, "quantum_computer");
        assert_eq!(concept.domain, "computing");
    }

    #[tokio::test]
    async fn test_create_node_rejects_bad_label_and_properties() {
        let (_, state) = test_state();
        let (status, body) = call(&state, "POST", "/create_node", Some(json!({"label": "Planet", "properties": {}}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "invalid_request");

        let (status, _) = call(&state, "POST", "/create_node", Some(json!({"label": "Agent", "properties": {"name": "NoEndpoint"}}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_reregistering_agent_keeps_status_unless_given() {
        let (graph, state) = test_state();
        seed_lightbulb(&state).await;
        let agent = graph
            .find_by_name(NodeLabel::Agent, "Lightbulb_AI")
            .await
            .unwrap()
            .unwrap();
        graph.set_agent_status(agent.id, AgentStatus::Failed).await.unwrap();

        let (status, _) = call(&state, "POST", "/create_node", Some(json!({
            "label": "Agent",
            "properties": {"name": "Lightbulb_AI", "endpoint": "http://127.0.0.1:9002"}
        })))
        .await;
        assert_eq!(status, StatusCode::OK);
        let stored = graph.get_node(agent.id).await.unwrap().unwrap();
        assert_eq!(stored.as_agent().unwrap().status, AgentStatus::Failed);
        assert_eq!(stored.as_agent().unwrap().endpoint, "http://127.0.0.1:9002");

        call(&state, "POST", "/create_node", Some(json!({
            "label": "Agent",
            "properties": {"name": "Lightbulb_AI", "endpoint": "http://127.0.0.1:9002", "status": "Degraded"}
        })))
        .await;
        let stored = graph.get_node(agent.id).await.unwrap().unwrap();
        assert_eq!(stored.as_agent().unwrap().status, AgentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_dangling_relationship_is_unprocessable() {
        let (graph, state) = test_state();
        let (status, _) = call(&state, "POST", "/create_relationship", Some(json!({
            "fromRef": "Agent:Ghost",
            "toRef": "Concept:nothing",
            "type": "HANDLES_CONCEPT"
        })))
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(graph.stats().await.unwrap().edges, 0);
    }

    #[tokio::test]
    async fn test_relationship_decay_rate_must_be_a_fraction() {
        let (graph, state) = test_state();
        seed_lightbulb(&state).await;

        for rate in [json!(0.0), json!(1.0), json!(1.5), json!("fast")] {
            let (status, body) = call(&state, "POST", "/create_relationship", Some(json!({
                "fromRef": "Agent:Lightbulb_AI",
                "toRef": "Concept:lightbulb",
                "type": "HANDLES_CONCEPT",
                "properties": {"decay_rate": rate}
            })))
            .await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "rate {}", rate);
            assert_eq!(body["code"], "invalid_request");
        }
        assert_eq!(graph.stats().await.unwrap().edges, 1);

        let (status, body) = call(&state, "POST", "/create_relationship", Some(json!({
            "fromRef": "Agent:Lightbulb_AI",
            "toRef": "Concept:lightbulb",
            "type": "HANDLES_CONCEPT",
            "properties": {"decay_rate": 0.2}
        })))
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = EdgeId(body["id"].as_str().unwrap().parse().unwrap());
        assert_eq!(graph.get_edge(id).await.unwrap().unwrap().decay_rate, 0.2);
    }

    #[tokio::test]
    async fn test_agents_for_concept_and_feedback() {
        let (_, state) = test_state();
        seed_lightbulb(&state).await;

        let (status, body) = call(&state, "GET", "/get_agents_for_concept/lightbulb", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agents"][0]["name"], "Lightbulb_AI");
        assert_eq!(body["agents"][0]["weight"], 0.5);

        for _ in 0..3 {
            call(&state, "POST", "/hebbian/strengthen", Some(json!({
                "agentId": "Lightbulb_AI", "concept": "lightbulb", "success": true
            })))
            .await;
        }
        let (status, body) = call(&state, "POST", "/hebbian/strengthen", Some(json!({
            "agentId": "Agent:Lightbulb_AI", "concept": "lightbulb", "success": false
        })))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["applied"].as_bool().unwrap());
        assert!((body["newWeight"].as_f64().unwrap() - 0.63).abs() < 1e-9);
        assert_eq!(body["successRate"], 0.75);
        assert_eq!(body["usageCount"], 4);
    }

    #[tokio::test]
    async fn test_feedback_for_unknown_agent_is_not_found() {
        let (_, state) = test_state();
        seed_lightbulb(&state).await;
        let (status, body) = call(&state, "POST", "/hebbian/strengthen", Some(json!({
            "agentId": "Nobody_AI", "concept": "lightbulb", "success": true
        })))
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn test_unknown_concept_listing_is_not_found() {
        let (_, state) = test_state();
        let (status, _) = call(&state, "GET", "/get_agents_for_concept/unicorn", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_discover_with_failed_provisioning_reports_reason() {
        let (_, state) = test_state();
        let (status, body) = call(&state, "POST", "/discover", Some(json!({
            "concept": "Quantum Computer", "provision": true
        })))
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body["error"],
            "no agent available for concept quantum_computer, provisioning failed: no agent host capacity available"
        );
    }

    #[tokio::test]
    async fn test_discover_without_provision_returns_empty() {
        let (_, state) = test_state();
        let (status, body) = call(&state, "POST", "/discover", Some(json!({"concept": "unicorn"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["agents"].as_array().unwrap().is_empty());
        assert!(body["provisioned"].is_null());
    }

    #[tokio::test]
    async fn test_create_concept_error_mapping() {
        let (_, state) = state_with(|| Err(NeurogenesisError::Conflict("taken".to_string())));
        let (status, body) = call(&state, "POST", "/lifecycle/create_concept", Some(json!({"concept": "x"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "conflict");

        let (_, state) = state_with(|| Err(NeurogenesisError::ResearchEmpty("x".to_string())));
        let (status, _) = call(&state, "POST", "/lifecycle/create_concept", Some(json!({"concept": "x"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (_, state) = state_with(|| {
            Err(NeurogenesisError::ResearchFailed {
                source_name: "PhysicsAgent".to_string(),
                message: "connection refused".to_string(),
            })
        });
        let (status, body) = call(&state, "POST", "/lifecycle/create_concept", Some(json!({"concept": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "research_failed");
        assert!(body["error"].as_str().unwrap().contains("PhysicsAgent"));
    }

    #[tokio::test]
    async fn test_get_node_and_attempts() {
        let (graph, state) = test_state();
        let id = graph
            .upsert_node(Node::concept(ConceptNode::new("lightbulb", "electrical")))
            .await
            .unwrap();
        graph
            .upsert_node(Node::agent(AgentNode::new("Other_AI", "http://x")))
            .await
            .unwrap();

        let (status, body) = call(&state, "GET", &format!("/nodes/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"]["name"], "lightbulb");

        let (status, body) = call(&state, "GET", "/nodes/Concept:Lightbulb", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!(id.to_string()));

        let (status, _) = call(&state, "GET", "/nodes/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(&state, "GET", &format!("/nodes/{}", NodeId::new()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&state, "GET", "/lifecycle/attempts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["concept"], "lightbulb");
    }

    #[tokio::test]
    async fn test_decay_and_snapshot() {
        let (_, state) = test_state();
        seed_lightbulb(&state).await;

        let (status, body) = call(&state, "POST", "/hebbian/decay", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["decayedCount"], 1);

        let (status, body) = call(&state, "POST", "/graph/snapshot", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nodes"], 2);
        assert_eq!(body["edges"], 1);
        assert_eq!(body["persisted"], false);
    }
}
