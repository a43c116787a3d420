// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OwnedSemaphorePermit;

use super::archetype::AgentBlueprint;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Takes back a slot's port and capacity
pub trait PortReturn: Send + Sync {
    /// Called exactly once, when a pooled slot goes away
    fn return_port(&self, port: u16, permit: OwnedSemaphorePermit);
}

pub(crate) struct SlotLease {
    pub(crate) pool: Arc<dyn PortReturn>,
    pub(crate) permit: OwnedSemaphorePermit,
}

/// A reserved port in the agent host pool.
/// Holding a slot holds one unit of pool capacity; dropping it gives the
/// port back, however the holder went away.
pub struct Slot {
    pub host: String,
    pub port: u16,
    pub(crate) lease: Option<SlotLease>,
}

impl Slot {
    /// Slot outside any pool, for factories driven directly
    pub fn detached(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            lease: None,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn is_pooled(&self) -> bool {
        self.lease.is_some()
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.pool.return_port(self.port, lease.permit);
        }
    }
}

/// A started agent as seen by its factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningInstance {
    pub id: InstanceId,
    pub agent_name: String,
    pub endpoint: String,
    pub port: u16,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to spawn agent instance: {0}")]
    SpawnFailed(String),

    #[error("Failed to terminate instance: {0}")]
    TerminationFailed(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostPoolError {
    #[error("no free agent host slot")]
    NoCapacity,
}

/// Starts and stops agent instances from blueprints
#[async_trait]
pub trait AgentFactory: Send + Sync {
    /// Start an instance listening on the slot's port.
    /// Returns once the process or task is launched, not once it is healthy.
    async fn instantiate(
        &self,
        blueprint: &AgentBlueprint,
        slot: &Slot,
    ) -> Result<RunningInstance, RuntimeError>;

    async fn terminate(&self, instance: &RunningInstance) -> Result<(), RuntimeError>;
}

/// Checks whether an agent endpoint answers its health route
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, endpoint: &str, timeout: Duration) -> bool;
}
