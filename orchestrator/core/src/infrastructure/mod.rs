// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_generator;
pub mod event_bus;
pub mod factory;
pub mod health_probe;
pub mod hosted_agent;
pub mod research_client;

pub use agent_generator::AgentGenerator;
pub use event_bus::{DomainEventBus, EventBusError, EventReceiver};
pub use factory::{InProcessAgentFactory, SubprocessAgentFactory};
pub use health_probe::HttpHealthProbe;
pub use hosted_agent::HostedAgent;
pub use research_client::HttpResearchClient;
