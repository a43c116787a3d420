// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use synapse_cortex::{CortexEvent, NodeId};

use super::archetype::Archetype;
use super::lifecycle::{AttemptId, LifecycleState};

/// Events emitted by the neurogenesis pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ProvisioningStarted {
        attempt_id: AttemptId,
        concept: String,
        intent: String,
        started_at: DateTime<Utc>,
    },
    StateChanged {
        attempt_id: AttemptId,
        concept: String,
        from: LifecycleState,
        to: LifecycleState,
        changed_at: DateTime<Utc>,
    },
    ResearchCompleted {
        attempt_id: AttemptId,
        concept: String,
        fact_count: usize,
        sources: Vec<String>,
        failed_sources: Vec<String>,
        completed_at: DateTime<Utc>,
    },
    ArchetypeSelected {
        attempt_id: AttemptId,
        concept: String,
        archetype: Archetype,
        selected_at: DateTime<Utc>,
    },
    AgentDeployed {
        attempt_id: AttemptId,
        agent_name: String,
        endpoint: String,
        deployed_at: DateTime<Utc>,
    },
    AgentRegistered {
        attempt_id: AttemptId,
        agent_id: NodeId,
        agent_name: String,
        concept: String,
        weight: f64,
        registered_at: DateTime<Utc>,
    },
    ProvisioningFailed {
        attempt_id: AttemptId,
        concept: String,
        state: LifecycleState,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn attempt_id(&self) -> AttemptId {
        match self {
            LifecycleEvent::ProvisioningStarted { attempt_id, .. }
            | LifecycleEvent::StateChanged { attempt_id, .. }
            | LifecycleEvent::ResearchCompleted { attempt_id, .. }
            | LifecycleEvent::ArchetypeSelected { attempt_id, .. }
            | LifecycleEvent::AgentDeployed { attempt_id, .. }
            | LifecycleEvent::AgentRegistered { attempt_id, .. }
            | LifecycleEvent::ProvisioningFailed { attempt_id, .. } => *attempt_id,
        }
    }
}

/// Unified domain event carried on the node's event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "context", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Cortex(CortexEvent),
    Lifecycle(LifecycleEvent),
}

impl DomainEvent {
    /// Short name for SSE `event:` fields and logs
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::Cortex(e) => e.event_type(),
            DomainEvent::Lifecycle(e) => match e {
                LifecycleEvent::ProvisioningStarted { .. } => "provisioning_started",
                LifecycleEvent::StateChanged { .. } => "state_changed",
                LifecycleEvent::ResearchCompleted { .. } => "research_completed",
                LifecycleEvent::ArchetypeSelected { .. } => "archetype_selected",
                LifecycleEvent::AgentDeployed { .. } => "agent_deployed",
                LifecycleEvent::AgentRegistered { .. } => "agent_registered",
                LifecycleEvent::ProvisioningFailed { .. } => "provisioning_failed",
            },
        }
    }
}

impl From<CortexEvent> for DomainEvent {
    fn from(event: CortexEvent) -> Self {
        DomainEvent::Cortex(event)
    }
}

impl From<LifecycleEvent> for DomainEvent {
    fn from(event: LifecycleEvent) -> Self {
        DomainEvent::Lifecycle(event)
    }
}
