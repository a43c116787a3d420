// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end neurogenesis over real HTTP: a seeded research agent answers
//! `/research`, the new agent is served in-process, health-checked, and
//! registered in a snapshot-backed graph.

use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use synapse_cortex::application::{RelevanceScorer, ScoringConfig};
use synapse_cortex::{
    AgentNode, AgentOrigin, DomainClassifier, GraphRepository, GraphStore, JsonFileSnapshotStore,
    Node, NodeLabel,
};
use synapse_core::application::{
    AgentHostPool, ConceptResearcher, LifecycleManager, ProvisioningService,
};
use synapse_core::domain::archetype::Archetype;
use synapse_core::domain::config::{AcquireMode, HostPoolConfig, LifecycleConfig, ResearchConfig};
use synapse_core::domain::events::{DomainEvent, LifecycleEvent};
use synapse_core::domain::knowledge::KnowledgeSummary;
use synapse_core::domain::lifecycle::LifecycleState;
use synapse_core::infrastructure::{
    AgentGenerator, DomainEventBus, EventBusError, HostedAgent, HttpHealthProbe, HttpResearchClient,
    InProcessAgentFactory,
};

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Serves a computing agent that knows about quantum computers
async fn start_research_agent(generator: Arc<AgentGenerator>, shutdown: CancellationToken) -> AgentNode {
    let mut knowledge = KnowledgeSummary::new("computer_science");
    knowledge.facts.insert(
        "definition".to_string(),
        json!("A machine that computes with quantum states"),
    );
    knowledge
        .facts
        .insert("qubit".to_string(), json!("the basic unit of quantum information"));
    knowledge.related_concepts = BTreeSet::from(["quantum_computer".to_string()]);

    let blueprint = generator
        .generate("computer_science", "computing", Archetype::FactBase, &knowledge)
        .unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());

    let agent = AgentNode::new(&blueprint.name, &endpoint)
        .with_capabilities(blueprint.capabilities.iter().cloned())
        .with_domain("computing");
    tokio::spawn(HostedAgent::new(blueprint, generator).serve(listener, shutdown));
    agent
}

struct TestNode {
    graph: Arc<GraphStore>,
    events: DomainEventBus,
    pool: Arc<AgentHostPool>,
    manager: Arc<LifecycleManager>,
}

async fn build_node(graph: Arc<GraphStore>, generator: Arc<AgentGenerator>) -> TestNode {
    let classifier = Arc::new(DomainClassifier::default());
    let events = DomainEventBus::new(256);
    let scorer = Arc::new(RelevanceScorer::new(
        graph.clone(),
        classifier.clone(),
        ScoringConfig::default(),
    ));
    let researcher = Arc::new(ConceptResearcher::new(
        graph.clone(),
        Arc::new(HttpResearchClient::new().unwrap()),
        classifier.clone(),
        ResearchConfig::default(),
    ));
    let pool = Arc::new(AgentHostPool::new(
        &HostPoolConfig {
            host: "127.0.0.1".to_string(),
            base_port: free_port().await,
            size: 1,
            acquire: AcquireMode::FailFast,
        },
        Arc::new(HttpHealthProbe::new()),
    ));
    let factory = Arc::new(InProcessAgentFactory::new(generator.clone()).with_bind_address("127.0.0.1"));
    let lifecycle = LifecycleConfig {
        health_attempts: 20,
        health_interval: Duration::from_millis(50),
        ..LifecycleConfig::default()
    };
    let manager = Arc::new(LifecycleManager::new(
        graph.clone(),
        scorer,
        researcher,
        generator,
        pool.clone(),
        factory,
        classifier,
        events.clone(),
        lifecycle,
        0.7,
    ));
    TestNode {
        graph,
        events,
        pool,
        manager,
    }
}

#[tokio::test]
async fn test_quantum_computer_neurogenesis_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("graph.json");
    let graph = Arc::new(
        GraphStore::open(Arc::new(JsonFileSnapshotStore::new(&snapshot_path)), 0)
            .await
            .unwrap(),
    );
    let generator = Arc::new(AgentGenerator::new());
    let shutdown = CancellationToken::new();

    let research_agent = start_research_agent(generator.clone(), shutdown.clone()).await;
    graph.upsert_node(Node::agent(research_agent)).await.unwrap();

    let node = build_node(graph.clone(), generator).await;
    let mut events = node.events.subscribe();

    let outcome = node.manager.provision("Quantum Computer", "").await.unwrap();
    assert!(outcome.created);
    assert_eq!(node.pool.available(), 0);

    // Registered agent, concept and 0.7 edge
    let agent = node.graph.get_node(outcome.agent_id).await.unwrap().unwrap();
    let agent = agent.as_agent().unwrap();
    assert_eq!(agent.name, "Quantum_Computer_AI");
    assert_eq!(agent.origin, AgentOrigin::Neurogenesis);
    assert_eq!(agent.domain.as_deref(), Some("computing"));
    let concept = node
        .graph
        .find_by_name(NodeLabel::Concept, "quantum_computer")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        concept.as_concept().unwrap().definition.as_deref(),
        Some("A machine that computes with quantum states")
    );

    // The new agent answers over HTTP
    let client = reqwest::Client::new();
    let answer: serde_json::Value = client
        .post(format!("{}/query", outcome.endpoint))
        .json(&json!({"question": "What is a qubit?"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let answer = answer["answer"].as_str().unwrap();
    assert!(answer.contains("quantum_computer"));
    assert!(answer.contains("qubit is the basic unit of quantum information"));

    // Registration was persisted
    let reopened = GraphStore::open(Arc::new(JsonFileSnapshotStore::new(&snapshot_path)), 0)
        .await
        .unwrap();
    assert!(reopened
        .find_by_name(NodeLabel::Agent, "Quantum_Computer_AI")
        .await
        .unwrap()
        .is_some());

    // Known concept now: no second agent, no second slot
    let again = node.manager.provision("quantum_computer", "").await.unwrap();
    assert!(!again.created);
    assert_eq!(again.agent_id, outcome.agent_id);
    assert_eq!(node.graph.stats().await.unwrap().agents, 2);

    let mut names = Vec::new();
    loop {
        match events.try_recv() {
            Ok(DomainEvent::Lifecycle(event)) => names.push(lifecycle_name(&event)),
            Ok(_) => {}
            Err(EventBusError::Empty) => break,
            Err(e) => panic!("unexpected event bus error: {}", e),
        }
    }
    assert!(names.contains(&"research_completed"));
    assert!(names.contains(&"agent_deployed"));
    assert!(names.contains(&"agent_registered"));

    let attempts = node.manager.attempts();
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|a| a.state == LifecycleState::Registered));

    node.manager.shutdown().await;
    assert_eq!(node.pool.available(), 1);
    shutdown.cancel();
}

#[tokio::test]
async fn test_unknown_concept_without_sources_fails_cleanly() {
    let graph = Arc::new(GraphStore::in_memory());
    let node = build_node(graph.clone(), Arc::new(AgentGenerator::new())).await;

    let err = node.manager.provision("zxqv_widget", "").await.unwrap_err();
    assert!(err.to_string().contains("no facts"));
    assert_eq!(node.graph.stats().await.unwrap().nodes(), 0);
    assert_eq!(node.pool.available(), 1);
    assert!(node.manager.running_agents().is_empty());
}

fn lifecycle_name(event: &LifecycleEvent) -> &'static str {
    DomainEvent::Lifecycle(event.clone()).name()
}
