// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod health_monitor;
pub mod host_pool;
pub mod lifecycle;
pub mod research;

// Re-export services for convenience
pub use health_monitor::HealthMonitor;
pub use host_pool::{AgentHostPool, HealthPolicy};
pub use lifecycle::{LifecycleManager, ProvisioningService};
pub use research::{ConceptResearcher, ResearchClient, ResearchSource, Researcher};
