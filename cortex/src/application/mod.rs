// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application layer for Cortex bounded context

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::CortexEvent;

pub mod decay_sweeper;
pub mod hebbian;
pub mod relevance;
pub mod snapshot_scheduler;

pub use decay_sweeper::DecaySweeper;
pub use hebbian::{DecayPolicy, DecayReport, HebbianConfig, HebbianLearner};
pub use relevance::{
    CandidateSource, ConceptHandler, RelevanceScorer, ScoreBreakdown, ScoredAgent, ScoringConfig,
    ScoringWeights,
};
pub use snapshot_scheduler::{SnapshotScheduler, SnapshotSchedulerConfig};

/// Event bus trait for publishing domain events
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: CortexEvent) -> Result<()>;
}

/// Event bus that drops everything, for wiring without observers
pub struct NoopEventBus;

#[async_trait]
impl EventBus for NoopEventBus {
    async fn publish(&self, _event: CortexEvent) -> Result<()> {
        Ok(())
    }
}
