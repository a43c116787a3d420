// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Neurogenesis lifecycle manager
//!
//! Turns an unhandled concept into a registered, healthy agent:
//! Detecting → Researching → Templating → Generating → Deploying → Registered.
//!
//! Runs for the same concept are serialized by a per-concept async mutex,
//! so the second caller sees the first caller's agent during detection.
//! Registration is one guarded batch: if some other path registered a
//! handler for the concept after detection began, nothing is written and
//! the attempt ends in `Conflict`. Every failure after deployment stops the
//! instance and returns its slot before the error is reported.
//!
//! A caller may drop a `provision` future at any await point (an HTTP client
//! disconnecting, a timeout). The guards below make that equivalent to a
//! failure: a started instance is stopped in the background, its slot goes
//! back to the pool and the attempt ends in `Failed`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use synapse_cortex::application::RelevanceScorer;
use synapse_cortex::domain::graph::normalize_concept_name;
use synapse_cortex::{
    AgentNode, AgentOrigin, AgentStatus, BatchGuard, ConceptNode, DomainClassifier, EdgeKind, EdgeSpec,
    GraphBatch, GraphError, GraphRepository, Node, NodeId, NodeLabel, NodeRef,
};

use super::host_pool::{AgentHostPool, HealthPolicy};
use super::research::Researcher;
use crate::domain::archetype::{AgentBlueprint, Archetype};
use crate::domain::config::LifecycleConfig;
use crate::domain::events::LifecycleEvent;
use crate::domain::knowledge::KnowledgeSummary;
use crate::domain::lifecycle::{
    AttemptId, LifecycleState, NeurogenesisError, ProvisionOutcome, ProvisioningAttempt,
};
use crate::domain::runtime::{AgentFactory, RunningInstance, RuntimeError, Slot};
use crate::infrastructure::agent_generator::AgentGenerator;
use crate::infrastructure::event_bus::DomainEventBus;

/// Entry point used by the API and CLI to request a new agent
#[async_trait]
pub trait ProvisioningService: Send + Sync {
    /// Make sure an adequate agent handles `concept`, creating one if needed
    async fn provision(
        &self,
        concept: &str,
        intent: &str,
    ) -> Result<ProvisionOutcome, NeurogenesisError>;

    /// Known attempts, newest first
    fn attempts(&self) -> Vec<ProvisioningAttempt>;

    fn attempt(&self, id: AttemptId) -> Option<ProvisioningAttempt>;
}

/// A generated agent that this node started and still owns
struct Deployment {
    instance: RunningInstance,
    slot: Slot,
}

/// An instance this manager started but has not handed to `deployments`.
/// Dropped without `keep` or `stop`, it stops the instance on a background
/// task and returns the slot afterwards.
struct StartedAgent {
    factory: Arc<dyn AgentFactory>,
    parts: Option<(RunningInstance, Slot)>,
}

impl StartedAgent {
    fn new(factory: Arc<dyn AgentFactory>, instance: RunningInstance, slot: Slot) -> Self {
        Self {
            factory,
            parts: Some((instance, slot)),
        }
    }

    fn endpoint(&self) -> &str {
        self.parts.as_ref().map(|(i, _)| i.endpoint.as_str()).unwrap_or_default()
    }

    fn keep(mut self) -> Option<(RunningInstance, Slot)> {
        self.parts.take()
    }

    async fn stop(mut self) {
        if let Some((instance, slot)) = self.parts.take() {
            stop_instance(self.factory.as_ref(), &instance).await;
            drop(slot);
        }
    }
}

impl Drop for StartedAgent {
    fn drop(&mut self) {
        let Some((instance, slot)) = self.parts.take() else {
            return;
        };
        warn!(instance = instance.id.as_str(), "Provisioning abandoned; stopping agent instance");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let factory = self.factory.clone();
                handle.spawn(async move {
                    stop_instance(factory.as_ref(), &instance).await;
                    drop(slot);
                });
            }
            Err(_) => error!(
                instance = instance.id.as_str(),
                "No runtime to stop abandoned agent instance"
            ),
        }
    }
}

async fn stop_instance(factory: &dyn AgentFactory, instance: &RunningInstance) {
    if let Err(e) = factory.terminate(instance).await {
        warn!(instance = instance.id.as_str(), error = %e, "Failed to stop agent instance");
    }
}

/// Holds the per-concept mutex; the map entry goes away with the last holder
struct ConceptLease<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    concept: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<'a> ConceptLease<'a> {
    async fn acquire(
        locks: &'a DashMap<String, Arc<Mutex<()>>>,
        concept: &str,
    ) -> ConceptLease<'a> {
        let lock = locks.entry(concept.to_string()).or_default().clone();
        let mut lease = ConceptLease {
            locks,
            concept: concept.to_string(),
            guard: None,
        };
        lease.guard = Some(lock.lock_owned().await);
        lease
    }
}

impl Drop for ConceptLease<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold their own clone, so a count of one means only the map is left
        self.locks
            .remove_if(&self.concept, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Fails an attempt whose `provision` future was dropped mid-run
struct AttemptGuard<'a> {
    manager: &'a LifecycleManager,
    id: AttemptId,
    concept: String,
    armed: bool,
}

impl AttemptGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.manager.abandon(self.id, &self.concept);
        }
    }
}

pub struct LifecycleManager {
    graph: Arc<dyn GraphRepository>,
    scorer: Arc<RelevanceScorer>,
    researcher: Arc<dyn Researcher>,
    generator: Arc<AgentGenerator>,
    pool: Arc<AgentHostPool>,
    factory: Arc<dyn AgentFactory>,
    classifier: Arc<DomainClassifier>,
    events: DomainEventBus,
    config: LifecycleConfig,
    provisional_weight: f64,
    concept_locks: DashMap<String, Arc<Mutex<()>>>,
    attempts: DashMap<AttemptId, ProvisioningAttempt>,
    finished: SyncMutex<VecDeque<AttemptId>>,
    deployments: DashMap<NodeId, Deployment>,
}

impl LifecycleManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: Arc<dyn GraphRepository>,
        scorer: Arc<RelevanceScorer>,
        researcher: Arc<dyn Researcher>,
        generator: Arc<AgentGenerator>,
        pool: Arc<AgentHostPool>,
        factory: Arc<dyn AgentFactory>,
        classifier: Arc<DomainClassifier>,
        events: DomainEventBus,
        config: LifecycleConfig,
        provisional_weight: f64,
    ) -> Self {
        Self {
            graph,
            scorer,
            researcher,
            generator,
            pool,
            factory,
            classifier,
            events,
            config,
            provisional_weight,
            concept_locks: DashMap::new(),
            attempts: DashMap::new(),
            finished: SyncMutex::new(VecDeque::new()),
            deployments: DashMap::new(),
        }
    }

    /// Instances started by this manager that are still running
    pub fn running_agents(&self) -> Vec<RunningInstance> {
        self.deployments
            .iter()
            .map(|d| d.value().instance.clone())
            .collect()
    }

    /// Stop every agent this manager started and return their slots
    pub async fn shutdown(&self) {
        let ids: Vec<NodeId> = self.deployments.iter().map(|d| *d.key()).collect();
        for id in ids {
            if let Some((_, deployment)) = self.deployments.remove(&id) {
                StartedAgent::new(self.factory.clone(), deployment.instance, deployment.slot)
                    .stop()
                    .await;
            }
        }
    }

    /// Concepts with a provisioning run in flight or queued
    pub fn locked_concepts(&self) -> usize {
        self.concept_locks.len()
    }

    fn advance(
        &self,
        id: AttemptId,
        next: LifecycleState,
        detail: Option<String>,
    ) -> Result<(), NeurogenesisError> {
        let (concept, from) = {
            let mut attempt =
                self.attempts
                    .get_mut(&id)
                    .ok_or(NeurogenesisError::InvalidTransition {
                        from: LifecycleState::Failed,
                        to: next,
                    })?;
            let from = attempt.state;
            attempt.transition(next, detail)?;
            (attempt.concept.clone(), from)
        };

        self.events.publish_lifecycle_event(LifecycleEvent::StateChanged {
            attempt_id: id,
            concept,
            from,
            to: next,
            changed_at: Utc::now(),
        });
        if next.is_terminal() {
            self.retire(id);
        }
        Ok(())
    }

    /// Keep only the newest finished attempts
    fn retire(&self, id: AttemptId) {
        let mut finished = self.finished.lock();
        finished.push_back(id);
        while finished.len() > self.config.attempt_history {
            if let Some(old) = finished.pop_front() {
                self.attempts.remove(&old);
            }
        }
    }

    fn update_attempt(&self, id: AttemptId, f: impl FnOnce(&mut ProvisioningAttempt)) {
        if let Some(mut attempt) = self.attempts.get_mut(&id) {
            f(&mut attempt);
        }
    }

    /// Record a failed attempt: terminal state, history bookkeeping, event
    fn fail_attempt(&self, id: AttemptId, concept: &str, error: &NeurogenesisError) {
        let state = match self.attempts.get(&id) {
            Some(attempt) if attempt.state.is_terminal() => return,
            Some(attempt) => attempt.state,
            None => return,
        };
        self.update_attempt(id, |a| a.fail(error));
        self.retire(id);
        self.events.publish_lifecycle_event(LifecycleEvent::ProvisioningFailed {
            attempt_id: id,
            concept: concept.to_string(),
            state,
            reason: error.to_string(),
            failed_at: Utc::now(),
        });
        warn!(concept, state = %state, error = %error, "Provisioning failed");
    }

    fn abandon(&self, id: AttemptId, concept: &str) {
        metrics::counter!("synapse_provisioning_total", "outcome" => "cancelled").increment(1);
        self.fail_attempt(id, concept, &NeurogenesisError::Cancelled);
    }

    /// Detecting: an existing candidate scoring at least `adequate_score`
    async fn detect(&self, concept: &str, intent: &str) -> Result<Option<ProvisionOutcome>, NeurogenesisError> {
        let candidates = self.scorer.discover(concept, intent, &HashMap::new()).await?;
        Ok(candidates
            .into_iter()
            .find(|c| c.score >= self.config.adequate_score)
            .map(|c| ProvisionOutcome {
                agent_id: c.agent_id,
                endpoint: c.endpoint,
                created: false,
            }))
    }

    async fn research(&self, id: AttemptId, concept: &str) -> Result<KnowledgeSummary, NeurogenesisError> {
        let summary = self.researcher.research(concept).await?;
        self.events.publish_lifecycle_event(LifecycleEvent::ResearchCompleted {
            attempt_id: id,
            concept: concept.to_string(),
            fact_count: summary.facts.len(),
            sources: summary.sources.iter().cloned().collect(),
            failed_sources: summary.failed_sources.iter().cloned().collect(),
            completed_at: Utc::now(),
        });
        if summary.is_empty() {
            return Err(NeurogenesisError::ResearchEmpty(concept.to_string()));
        }
        Ok(summary)
    }

    /// Domain recorded on the concept node, else the classifier's guess
    async fn concept_domain(&self, concept: &str) -> Result<String, NeurogenesisError> {
        let existing = self.graph.find_by_name(NodeLabel::Concept, concept).await?;
        Ok(existing
            .as_ref()
            .and_then(|n| n.as_concept())
            .map(|c| c.domain.clone())
            .unwrap_or_else(|| self.classifier.classify(concept)))
    }

    /// Instantiate on a slot and wait for health; on failure nothing is left running
    async fn deploy(
        &self,
        blueprint: &AgentBlueprint,
        slot: Slot,
    ) -> Result<StartedAgent, NeurogenesisError> {
        // An early return drops the slot, which hands the port back
        let spawned = tokio::time::timeout(
            self.config.build_timeout,
            self.factory.instantiate(blueprint, &slot),
        )
        .await;
        let instance = match spawned {
            Ok(Ok(instance)) => instance,
            Ok(Err(e)) => return Err(NeurogenesisError::Instantiation(e)),
            Err(_) => {
                return Err(NeurogenesisError::Instantiation(RuntimeError::Timeout(
                    self.config.build_timeout,
                )))
            }
        };
        let started = StartedAgent::new(self.factory.clone(), instance, slot);

        let policy = HealthPolicy {
            attempts: self.config.health_attempts,
            interval: self.config.health_interval,
            probe_timeout: self.config.probe_timeout,
        };
        if !self.pool.await_healthy(started.endpoint(), policy).await {
            let endpoint = started.endpoint().to_string();
            started.stop().await;
            return Err(NeurogenesisError::DeploymentHealthCheckFailed {
                endpoint,
                attempts: policy.attempts,
            });
        }
        Ok(started)
    }

    /// Agent, concept (if absent) and the provisional edge, in one guarded batch
    async fn register(
        &self,
        blueprint: &AgentBlueprint,
        endpoint: &str,
        since: DateTime<Utc>,
    ) -> Result<NodeId, NeurogenesisError> {
        let agent = AgentNode::new(&blueprint.name, endpoint)
            .with_capabilities(blueprint.capabilities.iter().cloned())
            .with_domain(&blueprint.domain)
            .with_origin(AgentOrigin::Neurogenesis);
        let mut concept = ConceptNode::new(&blueprint.concept, &blueprint.domain);
        if let Some(definition) = blueprint.knowledge.definition() {
            concept = concept.with_definition(definition);
        }

        let batch = GraphBatch::new()
            .guarded(BatchGuard::NoNewHandlersSince {
                concept: blueprint.concept.clone(),
                since,
            })
            .upsert(Node::agent(agent))
            .insert_if_absent(Node::concept(concept))
            .edge(
                EdgeSpec::handles_concept(
                    NodeRef::agent(&blueprint.name),
                    NodeRef::concept(&blueprint.concept),
                )
                .with_weight(self.provisional_weight)
                .with_property("origin", serde_json::json!("neurogenesis")),
            );

        let outcome = self.graph.commit(batch).await?;
        outcome.node_ids.first().copied().ok_or_else(|| {
            NeurogenesisError::Graph(GraphError::InvalidNode(
                "registration batch returned no agent id".to_string(),
            ))
        })
    }

    /// Best-effort RELATED_TO edges to research neighbours already in the graph
    async fn link_related(&self, concept: &str, knowledge: &KnowledgeSummary) {
        for related in &knowledge.related_concepts {
            let related = normalize_concept_name(related);
            if related.is_empty() || related == concept {
                continue;
            }
            match self.graph.find_by_name(NodeLabel::Concept, &related).await {
                Ok(Some(_)) => {
                    let spec = EdgeSpec::new(
                        NodeRef::concept(concept),
                        NodeRef::concept(&related),
                        EdgeKind::RelatedTo,
                    );
                    if let Err(e) = self.graph.add_edge(spec).await {
                        warn!(concept, related = %related, error = %e, "Failed to link related concept");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(concept, related = %related, error = %e, "Failed to look up related concept"),
            }
        }
    }

    async fn run(
        &self,
        id: AttemptId,
        concept: &str,
        intent: &str,
        since: DateTime<Utc>,
    ) -> Result<ProvisionOutcome, NeurogenesisError> {
        if let Some(existing) = self.detect(concept, intent).await? {
            info!(concept, agent_id = %existing.agent_id, "Concept already handled; nothing to provision");
            self.update_attempt(id, |a| {
                a.agent_id = Some(existing.agent_id);
                a.endpoint = Some(existing.endpoint.clone());
            });
            self.advance(id, LifecycleState::Registered, Some("existing agent".to_string()))?;
            return Ok(existing);
        }

        self.advance(id, LifecycleState::Researching, None)?;
        let knowledge = self.research(id, concept).await?;

        self.advance(id, LifecycleState::Templating, None)?;
        let domain = self.concept_domain(concept).await?;
        let archetype = Archetype::select(concept, &domain, &knowledge, self.config.dense_fact_threshold);
        self.update_attempt(id, |a| a.archetype = Some(archetype));
        self.events.publish_lifecycle_event(LifecycleEvent::ArchetypeSelected {
            attempt_id: id,
            concept: concept.to_string(),
            archetype,
            selected_at: Utc::now(),
        });

        self.advance(id, LifecycleState::Generating, Some(archetype.to_string()))?;
        let blueprint = self
            .generator
            .generate(concept, &domain, archetype, &knowledge)
            .map_err(|e| NeurogenesisError::Generation(e.to_string()))?;

        self.advance(id, LifecycleState::Deploying, Some(blueprint.name.clone()))?;
        let slot = self.pool.acquire().await?;
        let started = self.deploy(&blueprint, slot).await?;
        let endpoint = started.endpoint().to_string();
        self.events.publish_lifecycle_event(LifecycleEvent::AgentDeployed {
            attempt_id: id,
            agent_name: blueprint.name.clone(),
            endpoint: endpoint.clone(),
            deployed_at: Utc::now(),
        });

        let agent_id = match self.register(&blueprint, &endpoint, since).await {
            Ok(agent_id) => agent_id,
            Err(e) => {
                started.stop().await;
                return Err(e);
            }
        };

        // Committed: the instance belongs to the node from here on
        let previous = started
            .keep()
            .and_then(|(instance, slot)| self.deployments.insert(agent_id, Deployment { instance, slot }))
            .map(|old| StartedAgent::new(self.factory.clone(), old.instance, old.slot));

        self.update_attempt(id, |a| {
            a.agent_id = Some(agent_id);
            a.endpoint = Some(endpoint.clone());
        });
        self.advance(id, LifecycleState::Registered, None)?;
        self.events.publish_lifecycle_event(LifecycleEvent::AgentRegistered {
            attempt_id: id,
            agent_id,
            agent_name: blueprint.name.clone(),
            concept: concept.to_string(),
            weight: self.provisional_weight,
            registered_at: Utc::now(),
        });

        // An upsert keeps a re-provisioned agent's old status; this instance just passed its checks
        if let Err(e) = self.graph.set_agent_status(agent_id, AgentStatus::Healthy).await {
            warn!(agent_id = %agent_id, error = %e, "Failed to mark new agent healthy");
        }

        if let Some(previous) = previous {
            // Same agent name re-provisioned; the old instance is no longer addressed
            previous.stop().await;
        }

        if let Err(e) = self.graph.persist().await {
            // Memory stays authoritative; the next snapshot retries
            error!(error = %e, "Failed to persist graph after registering agent");
        }
        self.link_related(concept, &blueprint.knowledge).await;

        Ok(ProvisionOutcome {
            agent_id,
            endpoint,
            created: true,
        })
    }
}

#[async_trait]
impl ProvisioningService for LifecycleManager {
    async fn provision(
        &self,
        concept: &str,
        intent: &str,
    ) -> Result<ProvisionOutcome, NeurogenesisError> {
        let concept = normalize_concept_name(concept);
        if concept.is_empty() {
            return Err(NeurogenesisError::Graph(GraphError::InvalidNode(
                "concept name is empty".to_string(),
            )));
        }

        let _lease = ConceptLease::acquire(&self.concept_locks, &concept).await;

        let started = Instant::now();
        let attempt = ProvisioningAttempt::new(&concept, intent);
        let id = attempt.id;
        let since = attempt.started_at;
        self.attempts.insert(id, attempt);
        let mut guard = AttemptGuard {
            manager: self,
            id,
            concept: concept.clone(),
            armed: true,
        };
        self.events.publish_lifecycle_event(LifecycleEvent::ProvisioningStarted {
            attempt_id: id,
            concept: concept.clone(),
            intent: intent.to_string(),
            started_at: since,
        });
        info!(concept = %concept, attempt_id = %id, "Provisioning started");

        let result = self.run(id, &concept, intent, since).await;
        guard.disarm();
        metrics::histogram!("synapse_provisioning_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                let label = if outcome.created { "created" } else { "existing" };
                metrics::counter!("synapse_provisioning_total", "outcome" => label).increment(1);
                info!(
                    concept = %concept,
                    agent_id = %outcome.agent_id,
                    endpoint = %outcome.endpoint,
                    created = outcome.created,
                    "Provisioning finished"
                );
            }
            Err(e) => {
                metrics::counter!("synapse_provisioning_total", "outcome" => "failed").increment(1);
                self.fail_attempt(id, &concept, e);
            }
        }
        result
    }

    fn attempts(&self) -> Vec<ProvisioningAttempt> {
        let mut attempts: Vec<ProvisioningAttempt> =
            self.attempts.iter().map(|a| a.value().clone()).collect();
        attempts.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        attempts
    }

    fn attempt(&self, id: AttemptId) -> Option<ProvisioningAttempt> {
        self.attempts.get(&id).map(|a| a.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{AcquireMode, HostPoolConfig};
    use crate::domain::knowledge::ResearchError;
    use crate::domain::runtime::HealthProbe;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use synapse_cortex::application::ScoringConfig;
    use synapse_cortex::GraphStore;

    struct StubResearcher {
        facts: Vec<(&'static str, serde_json::Value)>,
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Researcher for StubResearcher {
        async fn research(&self, concept: &str) -> Result<KnowledgeSummary, ResearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let mut summary = KnowledgeSummary::new(concept);
            for (k, v) in &self.facts {
                summary.facts.insert(k.to_string(), v.clone());
            }
            summary.sources.insert("PhysicsAgent".to_string());
            Ok(summary)
        }
    }

    #[derive(Default)]
    struct StubFactory {
        started: AtomicUsize,
        stopped: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl AgentFactory for StubFactory {
        async fn instantiate(
            &self,
            blueprint: &AgentBlueprint,
            slot: &Slot,
        ) -> Result<RunningInstance, RuntimeError> {
            if self.fail {
                return Err(RuntimeError::SpawnFailed("no runtime".to_string()));
            }
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(RunningInstance {
                id: crate::domain::runtime::InstanceId::new(format!("stub-{}", slot.port)),
                agent_name: blueprint.name.clone(),
                endpoint: slot.endpoint(),
                port: slot.port,
                started_at: Utc::now(),
            })
        }

        async fn terminate(&self, _instance: &RunningInstance) -> Result<(), RuntimeError> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FixedProbe(bool);

    #[async_trait]
    impl HealthProbe for FixedProbe {
        async fn probe(&self, _endpoint: &str, _timeout: Duration) -> bool {
            self.0
        }
    }

    /// Healthy, but only after a delay
    struct SlowHealth(Duration);

    #[async_trait]
    impl HealthProbe for SlowHealth {
        async fn probe(&self, _endpoint: &str, _timeout: Duration) -> bool {
            tokio::time::sleep(self.0).await;
            true
        }
    }

    struct Harness {
        graph: Arc<GraphStore>,
        researcher: Arc<StubResearcher>,
        factory: Arc<StubFactory>,
        pool: Arc<AgentHostPool>,
        manager: Arc<LifecycleManager>,
    }

    fn harness(facts: Vec<(&'static str, serde_json::Value)>, factory: StubFactory, healthy: bool) -> Harness {
        harness_with_health(facts, factory, Arc::new(FixedProbe(healthy)))
    }

    fn harness_with_health(
        facts: Vec<(&'static str, serde_json::Value)>,
        factory: StubFactory,
        health: Arc<dyn HealthProbe>,
    ) -> Harness {
        let graph = Arc::new(GraphStore::in_memory());
        let classifier = Arc::new(DomainClassifier::default());
        let scorer = Arc::new(RelevanceScorer::new(
            graph.clone(),
            classifier.clone(),
            ScoringConfig::default(),
        ));
        let researcher = Arc::new(StubResearcher {
            facts,
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(20),
        });
        let factory = Arc::new(factory);
        let pool = Arc::new(AgentHostPool::new(
            &HostPoolConfig {
                host: "127.0.0.1".to_string(),
                base_port: 9300,
                size: 2,
                acquire: AcquireMode::FailFast,
            },
            health,
        ));
        let config = LifecycleConfig {
            health_attempts: 3,
            health_interval: Duration::from_millis(1),
            ..Default::default()
        };
        let manager = Arc::new(LifecycleManager::new(
            graph.clone(),
            scorer,
            researcher.clone(),
            Arc::new(AgentGenerator::new()),
            pool.clone(),
            factory.clone(),
            classifier,
            DomainEventBus::new(64),
            config,
            0.7,
        ));
        Harness {
            graph,
            researcher,
            factory,
            pool,
            manager,
        }
    }

    fn quantum_facts() -> Vec<(&'static str, serde_json::Value)> {
        vec![
            ("qubits", json!("units of quantum information")),
            ("definition", json!("A computer exploiting superposition")),
        ]
    }

    #[tokio::test]
    async fn test_provision_registers_agent_concept_and_edge() {
        let h = harness(quantum_facts(), StubFactory::default(), true);

        let outcome = h.manager.provision("Quantum Computer", "").await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.endpoint, "http://127.0.0.1:9300");

        let agent = h.graph.get_node(outcome.agent_id).await.unwrap().unwrap();
        assert_eq!(agent.name(), "Quantum_Computer_AI");
        assert_eq!(agent.as_agent().unwrap().origin, AgentOrigin::Neurogenesis);

        let concept = h
            .graph
            .find_by_name(NodeLabel::Concept, "quantum_computer")
            .await
            .unwrap()
            .unwrap();
        let concept_node = concept.as_concept().unwrap();
        assert_eq!(concept_node.domain, "computing");
        assert_eq!(
            concept_node.definition.as_deref(),
            Some("A computer exploiting superposition")
        );

        let edge = h
            .graph
            .edge_between(outcome.agent_id, concept.id, EdgeKind::HandlesConcept)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edge.weight, 0.7);

        let attempts = h.manager.attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].state, LifecycleState::Registered);
        assert_eq!(attempts[0].archetype, Some(Archetype::Specialist));
        assert_eq!(attempts[0].history.len(), 6);
        assert_eq!(h.manager.running_agents().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_create_exactly_one_agent() {
        let h = harness(quantum_facts(), StubFactory::default(), true);

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let manager = h.manager.clone();
                tokio::spawn(async move { manager.provision("quantum_computer", "").await })
            })
            .collect();

        let mut created = 0;
        let mut agent_ids = Vec::new();
        for task in tasks {
            let outcome = task.await.unwrap().unwrap();
            if outcome.created {
                created += 1;
            }
            agent_ids.push(outcome.agent_id);
        }

        assert_eq!(created, 1);
        assert!(agent_ids.iter().all(|id| *id == agent_ids[0]));
        assert_eq!(h.researcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.factory.started.load(Ordering::SeqCst), 1);
        assert_eq!(h.graph.stats().await.unwrap().agents, 1);
        assert_eq!(h.manager.locked_concepts(), 0);
    }

    #[tokio::test]
    async fn test_empty_research_fails_without_writes() {
        let h = harness(vec![], StubFactory::default(), true);

        let err = h.manager.provision("quantum_computer", "").await.unwrap_err();
        assert!(matches!(err, NeurogenesisError::ResearchEmpty(_)));
        assert_eq!(h.graph.stats().await.unwrap().nodes(), 0);
        assert_eq!(h.factory.started.load(Ordering::SeqCst), 0);

        let attempt = &h.manager.attempts()[0];
        assert_eq!(attempt.state, LifecycleState::Failed);
        assert!(attempt.error.is_some());
    }

    #[tokio::test]
    async fn test_unhealthy_agent_is_torn_down() {
        let h = harness(quantum_facts(), StubFactory::default(), false);

        let err = h.manager.provision("quantum_computer", "").await.unwrap_err();
        assert!(matches!(
            err,
            NeurogenesisError::DeploymentHealthCheckFailed { attempts: 3, .. }
        ));
        assert_eq!(h.factory.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(h.pool.available(), 2);
        assert_eq!(h.graph.stats().await.unwrap().nodes(), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_returns_slot() {
        let factory = StubFactory {
            fail: true,
            ..Default::default()
        };
        let h = harness(quantum_facts(), factory, true);

        let err = h.manager.provision("quantum_computer", "").await.unwrap_err();
        assert!(matches!(err, NeurogenesisError::Instantiation(RuntimeError::SpawnFailed(_))));
        assert_eq!(h.pool.available(), 2);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_is_no_capacity() {
        let h = harness(quantum_facts(), StubFactory::default(), true);
        h.manager.provision("volcano", "").await.unwrap();
        h.manager.provision("sonnet", "").await.unwrap();

        let err = h.manager.provision("glacier", "").await.unwrap_err();
        assert!(matches!(err, NeurogenesisError::NoCapacity));
    }

    #[tokio::test]
    async fn test_handler_registered_elsewhere_is_conflict() {
        let h = harness(quantum_facts(), StubFactory::default(), true);

        // Registers a competing handler while research is in flight
        let graph = h.graph.clone();
        let competitor = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            graph
                .upsert_node(Node::agent(AgentNode::new("Competitor", "http://c")))
                .await
                .unwrap();
            graph
                .upsert_node(Node::concept(ConceptNode::new("quantum_computer", "computing")))
                .await
                .unwrap();
            graph
                .add_edge(EdgeSpec::handles_concept(
                    NodeRef::agent("Competitor"),
                    NodeRef::concept("quantum_computer"),
                ))
                .await
                .unwrap();
        });

        let err = h.manager.provision("quantum_computer", "").await.unwrap_err();
        competitor.await.unwrap();

        assert!(matches!(err, NeurogenesisError::Conflict(_)));
        assert_eq!(h.factory.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(h.pool.available(), 2);
        assert!(h
            .graph
            .find_by_name(NodeLabel::Agent, "Quantum_Computer_AI")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_dropped_provision_stops_agent_and_returns_slot() {
        let h = harness_with_health(
            quantum_facts(),
            StubFactory::default(),
            Arc::new(SlowHealth(Duration::from_millis(300))),
        );

        let task = {
            let manager = h.manager.clone();
            tokio::spawn(async move { manager.provision("volcano", "").await })
        };
        // Research takes 20ms, so the agent is up and waiting on its health check
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.factory.started.load(Ordering::SeqCst), 1);
        assert_eq!(h.pool.available(), 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        // The instance is stopped on a background task
        for _ in 0..100 {
            if h.factory.stopped.load(Ordering::SeqCst) == 1 && h.pool.available() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.factory.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(h.pool.available(), 2);
        assert!(h.manager.running_agents().is_empty());
        assert_eq!(h.manager.locked_concepts(), 0);
        assert_eq!(h.graph.stats().await.unwrap().nodes(), 0);

        let attempt = &h.manager.attempts()[0];
        assert_eq!(attempt.state, LifecycleState::Failed);
        assert!(attempt.error.as_deref().unwrap().contains("cancelled"));

        // Both slots are usable again
        h.manager.provision("sonnet", "").await.unwrap();
        h.manager.provision("glacier", "").await.unwrap();
        assert_eq!(h.pool.available(), 0);
        assert!(h.manager.attempts().iter().all(|a| a.state.is_terminal()));
    }

    #[tokio::test]
    async fn test_dropped_provision_during_research_fails_attempt() {
        let h = harness(quantum_facts(), StubFactory::default(), true);

        let pending = h.manager.provision("quantum_computer", "");
        assert!(tokio::time::timeout(Duration::from_millis(5), pending).await.is_err());

        let attempt = &h.manager.attempts()[0];
        assert_eq!(attempt.state, LifecycleState::Failed);
        assert_eq!(h.factory.started.load(Ordering::SeqCst), 0);
        assert_eq!(h.pool.available(), 2);
        assert_eq!(h.manager.locked_concepts(), 0);

        // The concept is free for the next caller
        assert!(h.manager.provision("quantum_computer", "").await.unwrap().created);
    }

    #[tokio::test]
    async fn test_reprovisioning_failed_agent_marks_it_healthy() {
        let h = harness(quantum_facts(), StubFactory::default(), true);
        let first = h.manager.provision("volcano", "").await.unwrap();
        h.graph
            .set_agent_status(first.agent_id, AgentStatus::Failed)
            .await
            .unwrap();

        // Failed agents are not candidates, so the concept is provisioned again
        let second = h.manager.provision("volcano", "").await.unwrap();
        assert!(second.created);
        assert_eq!(second.agent_id, first.agent_id);

        let agent = h.graph.get_node(second.agent_id).await.unwrap().unwrap();
        assert_eq!(agent.as_agent().unwrap().status, AgentStatus::Healthy);
        assert_eq!(agent.as_agent().unwrap().endpoint, second.endpoint);
        // The replaced instance is stopped and its slot returned
        assert_eq!(h.factory.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(h.pool.available(), 1);
        assert_eq!(h.manager.running_agents().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_deployments() {
        let h = harness(quantum_facts(), StubFactory::default(), true);
        h.manager.provision("quantum_computer", "").await.unwrap();
        h.manager.shutdown().await;
        assert_eq!(h.factory.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(h.pool.available(), 2);
        assert!(h.manager.running_agents().is_empty());
    }
}
