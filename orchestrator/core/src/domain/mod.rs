// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Neurogenesis domain
//!
//! Provides the types shared by the provisioning pipeline and the node configuration.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Configuration, research knowledge, archetypes and the provisioning lifecycle

pub mod archetype;
pub mod config;
pub mod events;
pub mod knowledge;
pub mod lifecycle;
pub mod runtime;
pub mod seed;

pub use archetype::{agent_name_for, AgentBlueprint, Archetype};
pub use events::{DomainEvent, LifecycleEvent};
pub use knowledge::{KnowledgeSummary, ResearchError, ResearchFindings};
pub use lifecycle::{
    AttemptId, LifecycleState, NeurogenesisError, ProvisionOutcome, ProvisioningAttempt,
};
pub use runtime::{
    AgentFactory, HealthProbe, HostPoolError, InstanceId, RunningInstance, RuntimeError, Slot,
};
