// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Node HTTP server implementation
//!
//! Builds every service from a validated [`SynapseConfig`], starts the
//! background loops (decay sweep, snapshots, agent health) and serves the
//! REST API until Ctrl+C or SIGTERM. On the way out generated agents are
//! stopped and a final graph snapshot is written.

use anyhow::{Context, Result};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use synapse_core::application::{
    AgentHostPool, ConceptResearcher, HealthMonitor, LifecycleManager,
};
use synapse_core::domain::config::{FactoryKind, GraphConfig, SynapseConfig};
use synapse_core::domain::runtime::AgentFactory;
use synapse_core::domain::seed::GraphSeed;
use synapse_core::infrastructure::{
    AgentGenerator, DomainEventBus, HttpHealthProbe, HttpResearchClient, InProcessAgentFactory,
    SubprocessAgentFactory,
};
use synapse_core::presentation::{app, AppState};
use synapse_cortex::application::{
    DecaySweeper, EventBus, HebbianLearner, RelevanceScorer, SnapshotScheduler,
};
use synapse_cortex::{DomainClassifier, GraphRepository, GraphStore, JsonFileSnapshotStore};

/// A fully wired node, not yet serving
pub struct SynapseNode {
    pub state: Arc<AppState>,
    pub graph: Arc<GraphStore>,
    lifecycle: Arc<LifecycleManager>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SynapseNode {
    /// Build services and start background loops
    pub async fn build(config: &SynapseConfig) -> Result<Self> {
        let spec = &config.spec;
        let events = DomainEventBus::with_default_capacity();
        let cortex_bus: Arc<dyn EventBus> = Arc::new(events.clone());

        let graph = Arc::new(
            open_graph(&spec.graph)
                .await?
                .with_default_decay_rate(spec.hebbian.decay_rate)?,
        );
        seed_if_empty(&graph, &spec.graph).await?;

        let classifier = Arc::new(DomainClassifier::default());
        let scorer = Arc::new(RelevanceScorer::new(
            graph.clone(),
            classifier.clone(),
            spec.scoring.clone(),
        ));
        let learner = Arc::new(HebbianLearner::new(
            graph.clone(),
            cortex_bus.clone(),
            spec.hebbian.clone(),
        ));

        let generator = Arc::new(AgentGenerator::new());
        let probe = Arc::new(HttpHealthProbe::new());
        let pool = Arc::new(AgentHostPool::new(&spec.host_pool, probe.clone()));
        let factory: Arc<dyn AgentFactory> = match spec.factory.kind {
            FactoryKind::InProcess => Arc::new(
                InProcessAgentFactory::new(generator.clone())
                    .with_bind_address(spec.server.bind_address.clone()),
            ),
            FactoryKind::Subprocess => match &spec.factory.command {
                Some(command) => Arc::new(SubprocessAgentFactory::new(
                    command,
                    spec.factory.args.clone(),
                    &spec.factory.manifest_dir,
                )),
                None => Arc::new(
                    SubprocessAgentFactory::current_exe(
                        spec.factory.args.clone(),
                        &spec.factory.manifest_dir,
                    )
                    .context("Failed to configure subprocess agent factory")?,
                ),
            },
        };
        let researcher = Arc::new(ConceptResearcher::new(
            graph.clone(),
            Arc::new(HttpResearchClient::new().context("Failed to create research client")?),
            classifier.clone(),
            spec.research.clone(),
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            graph.clone(),
            scorer.clone(),
            researcher,
            generator,
            pool,
            factory,
            classifier.clone(),
            events.clone(),
            spec.lifecycle.clone(),
            spec.graph.provisional_edge_weight,
        ));

        let shutdown = CancellationToken::new();
        let tasks = vec![
            Arc::new(DecaySweeper::new(learner.clone(), shutdown.child_token())).start(),
            Arc::new(SnapshotScheduler::new(
                graph.clone(),
                cortex_bus,
                spec.graph.snapshots.clone(),
                shutdown.child_token(),
            ))
            .start(),
            Arc::new(HealthMonitor::new(
                graph.clone(),
                probe,
                events.clone(),
                spec.health.clone(),
                shutdown.child_token(),
            ))
            .start(),
        ];

        let state = Arc::new(AppState {
            node_name: config.metadata.name.clone(),
            graph: graph.clone(),
            scorer,
            learner,
            lifecycle: lifecycle.clone(),
            classifier,
            events,
            manual_edge_weight: spec.graph.manual_edge_weight,
        });

        Ok(Self {
            state,
            graph,
            lifecycle,
            shutdown,
            tasks,
        })
    }

    pub fn router(&self) -> Router {
        app(self.state.clone())
    }

    /// Stop generated agents and background loops; the snapshot loop flushes on exit
    pub async fn shutdown(self) {
        self.lifecycle.shutdown().await;
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
    }
}

async fn open_graph(config: &GraphConfig) -> Result<GraphStore> {
    match &config.snapshot_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create snapshot directory {:?}", parent))?;
            }
            GraphStore::open(
                Arc::new(JsonFileSnapshotStore::new(path)),
                config.snapshot_every_writes,
            )
            .await
            .with_context(|| format!("Failed to load graph snapshot {:?}", path))
        }
        None => {
            warn!("No snapshot path configured; the graph lives in memory only");
            Ok(GraphStore::in_memory())
        }
    }
}

/// Load the seed file into an empty graph
async fn seed_if_empty(graph: &GraphStore, config: &GraphConfig) -> Result<()> {
    let Some(seed_file) = &config.seed_file else {
        return Ok(());
    };
    if graph.stats().await?.nodes() > 0 {
        info!(seed = ?seed_file, "Graph already populated, skipping seed file");
        return Ok(());
    }

    let seed = GraphSeed::from_yaml_file(seed_file)
        .with_context(|| format!("Failed to read seed file {:?}", seed_file))?;
    let batch = seed.into_batch(config.manual_edge_weight)?;
    let outcome = graph.commit(batch).await.context("Failed to apply seed file")?;
    info!(
        seed = ?seed_file,
        nodes = outcome.node_ids.len(),
        edges = outcome.edge_ids.len(),
        "Seeded knowledge graph"
    );
    Ok(())
}

pub async fn start_node(config: SynapseConfig) -> Result<()> {
    config
        .validate()
        .context("Configuration validation failed")?;
    info!("Configuration loaded: name={}", config.metadata.name);

    let metrics = &config.spec.observability.metrics;
    if metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], metrics.port)))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port = metrics.port, "Prometheus metrics exporter listening");
    }

    let node = SynapseNode::build(&config).await?;

    let server = &config.spec.server;
    let addr = format!("{}:{}", server.bind_address, server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Synapse node listening on {}", addr);

    let served = axum::serve(listener, node.router())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Synapse node shutting down");
    node.shutdown().await;
    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::NodeClient;
    use synapse_core::domain::config::{GraphConfig, HealthMonitorConfig};
    use synapse_cortex::{EdgeKind, NodeLabel};

    const SEED: &str = r#"
agents:
  - name: Lightbulb_AI
    endpoint: http://127.0.0.1:9001
    capabilities: [lightbulb, lighting]
    domain: electrical
concepts:
  - name: lightbulb
    domain: electrical
edges:
  - from: Agent:Lightbulb_AI
    to: Concept:lightbulb
    type: HANDLES_CONCEPT
"#;

    fn test_config(dir: &std::path::Path) -> SynapseConfig {
        let seed = dir.join("seed.yaml");
        std::fs::write(&seed, SEED).unwrap();

        let mut config = SynapseConfig::default();
        config.spec.graph = GraphConfig {
            snapshot_path: Some(dir.join("graph.json")),
            seed_file: Some(seed),
            ..GraphConfig::default()
        };
        config.spec.health = HealthMonitorConfig {
            enabled: false,
            ..HealthMonitorConfig::default()
        };
        config
    }

    async fn serve(node: &SynapseNode) -> (String, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let stop = CancellationToken::new();
        let token = stop.clone();
        let router = node.router();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
                .unwrap();
        });
        (url, stop)
    }

    #[tokio::test]
    async fn test_seeded_node_serves_api_and_snapshots_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let node = SynapseNode::build(&config).await.unwrap();
        assert_eq!(node.graph.stats().await.unwrap().edges, 1);

        let (url, stop) = serve(&node).await;
        let client = NodeClient::with_base_url(url).unwrap();

        let health = client.health().await.unwrap();
        assert_eq!(health["agent"], "synapse");

        let listing = client.agents_for_concept("lightbulb").await.unwrap();
        assert_eq!(listing.agents.len(), 1);
        assert_eq!(listing.agents[0].weight, 0.5);

        let feedback = client.feedback("Lightbulb_AI", "lightbulb", true).await.unwrap();
        assert!(feedback.applied);
        assert!((feedback.new_weight.unwrap() - 0.55).abs() < 1e-9);

        stop.cancel();
        node.shutdown().await;

        // Reopening keeps the learned weight and does not seed twice
        let reopened = SynapseNode::build(&config).await.unwrap();
        let stats = reopened.graph.stats().await.unwrap();
        assert_eq!((stats.agents, stats.concepts, stats.edges), (1, 1, 1));
        let handlers = reopened.state.scorer.agents_for_concept("lightbulb").await.unwrap();
        assert!((handlers[0].weight - 0.55).abs() < 1e-9);
        reopened.shutdown().await;
    }

    #[tokio::test]
    async fn test_configured_decay_rate_reaches_seeded_edges() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.spec.graph.snapshot_path = None;
        config.spec.hebbian.decay_rate = 0.05;
        let node = SynapseNode::build(&config).await.unwrap();

        let agent = node
            .graph
            .find_by_name(NodeLabel::Agent, "Lightbulb_AI")
            .await
            .unwrap()
            .unwrap();
        let concept = node
            .graph
            .find_by_name(NodeLabel::Concept, "lightbulb")
            .await
            .unwrap()
            .unwrap();
        let edge = node
            .graph
            .edge_between(agent.id, concept.id, EdgeKind::HandlesConcept)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edge.decay_rate, 0.05);
        node.shutdown().await;
    }
}
