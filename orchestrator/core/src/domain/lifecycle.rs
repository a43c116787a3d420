// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning lifecycle of a neurogenesis attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use synapse_cortex::{GraphError, NodeId};

use super::archetype::Archetype;
use super::knowledge::ResearchError;
use super::runtime::{HostPoolError, RuntimeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Detecting,
    Researching,
    Templating,
    Generating,
    Deploying,
    Registered,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Registered | LifecycleState::Failed)
    }

    /// Linear pipeline, plus Failed from any non-terminal state.
    /// Detecting may finish straight into Registered when a handler already exists.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Detecting, Researching)
            | (Detecting, Registered)
            | (Researching, Templating)
            | (Templating, Generating)
            | (Generating, Deploying)
            | (Deploying, Registered) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Detecting => "detecting",
            LifecycleState::Researching => "researching",
            LifecycleState::Templating => "templating",
            LifecycleState::Generating => "generating",
            LifecycleState::Deploying => "deploying",
            LifecycleState::Registered => "registered",
            LifecycleState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum NeurogenesisError {
    #[error("research timed out for concept '{0}'")]
    ResearchTimeout(String),

    #[error("research found no facts for concept '{0}'")]
    ResearchEmpty(String),

    #[error("research source {source_name} failed: {message}")]
    ResearchFailed { source_name: String, message: String },

    #[error("no agent host capacity available")]
    NoCapacity,

    #[error("agent generation failed: {0}")]
    Generation(String),

    #[error("agent instantiation failed: {0}")]
    Instantiation(#[from] RuntimeError),

    #[error("agent at {endpoint} failed health checks after {attempts} attempts")]
    DeploymentHealthCheckFailed { endpoint: String, attempts: u32 },

    #[error("provisioning conflict: {0}")]
    Conflict(String),

    #[error("invalid lifecycle transition {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("provisioning was cancelled before it finished")]
    Cancelled,

    #[error(transparent)]
    Graph(GraphError),
}

impl From<GraphError> for NeurogenesisError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::GuardRejected(concept) => NeurogenesisError::Conflict(concept),
            other => NeurogenesisError::Graph(other),
        }
    }
}

impl From<ResearchError> for NeurogenesisError {
    fn from(err: ResearchError) -> Self {
        match err {
            ResearchError::Timeout(concept) => NeurogenesisError::ResearchTimeout(concept),
            ResearchError::Graph(e) => NeurogenesisError::from(e),
            ResearchError::Source { source_name, message } => {
                NeurogenesisError::ResearchFailed { source_name, message }
            }
        }
    }
}

impl From<HostPoolError> for NeurogenesisError {
    fn from(err: HostPoolError) -> Self {
        match err {
            HostPoolError::NoCapacity => NeurogenesisError::NoCapacity,
        }
    }
}

/// One entry of an attempt's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub state: LifecycleState,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A single run of the provisioning pipeline for one concept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningAttempt {
    pub id: AttemptId,
    pub concept: String,
    pub intent: String,
    pub state: LifecycleState,
    pub history: Vec<StateTransition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archetype: Option<Archetype>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProvisioningAttempt {
    pub fn new(concept: impl Into<String>, intent: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AttemptId::new(),
            concept: concept.into(),
            intent: intent.into(),
            state: LifecycleState::Detecting,
            history: vec![StateTransition {
                state: LifecycleState::Detecting,
                at: now,
                detail: None,
            }],
            archetype: None,
            agent_id: None,
            endpoint: None,
            error: None,
            started_at: now,
            finished_at: None,
        }
    }

    pub fn transition(
        &mut self,
        next: LifecycleState,
        detail: Option<String>,
    ) -> Result<(), NeurogenesisError> {
        if !self.state.can_transition_to(next) {
            return Err(NeurogenesisError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        let now = Utc::now();
        self.state = next;
        self.history.push(StateTransition {
            state: next,
            at: now,
            detail,
        });
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// Move to Failed and record the reason. No-op on a finished attempt.
    pub fn fail(&mut self, error: &NeurogenesisError) {
        if self.state.is_terminal() {
            return;
        }
        let reason = error.to_string();
        self.error = Some(reason.clone());
        // Failed is reachable from every non-terminal state
        let _ = self.transition(LifecycleState::Failed, Some(reason));
    }
}

/// What a successful `provision` call hands back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionOutcome {
    pub agent_id: NodeId,
    pub endpoint: String,
    /// False when an adequate agent already existed
    pub created: bool,
}
