// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the Cortex bounded context

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::graph::{AgentStatus, EdgeId, NodeId};

/// Cortex domain events
/// These events are published to the EventBus for observability and integration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CortexEvent {
    /// A successful outcome strengthened an agent -> concept edge
    EdgeReinforced {
        edge_id: EdgeId,
        agent_id: NodeId,
        concept_id: NodeId,
        old_weight: f64,
        new_weight: f64,
        success_rate: f64,
        timestamp: DateTime<Utc>,
    },

    /// A failed outcome weakened an agent -> concept edge
    EdgeWeakened {
        edge_id: EdgeId,
        agent_id: NodeId,
        concept_id: NodeId,
        old_weight: f64,
        new_weight: f64,
        success_rate: f64,
        timestamp: DateTime<Utc>,
    },

    /// Feedback arrived for an edge that does not exist
    FeedbackIgnored {
        agent_id: NodeId,
        concept_id: NodeId,
        timestamp: DateTime<Utc>,
    },

    /// Periodic or manual decay sweep finished
    DecaySweepCompleted {
        decayed_count: usize,
        active_window_secs: Option<i64>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Health polling moved an agent to a new status
    AgentStatusChanged {
        agent_id: NodeId,
        agent_name: String,
        old_status: AgentStatus,
        new_status: AgentStatus,
        timestamp: DateTime<Utc>,
    },

    /// Graph state was written to the snapshot store
    SnapshotWritten {
        nodes: usize,
        edges: usize,
        timestamp: DateTime<Utc>,
    },
}

impl CortexEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CortexEvent::EdgeReinforced { timestamp, .. } => *timestamp,
            CortexEvent::EdgeWeakened { timestamp, .. } => *timestamp,
            CortexEvent::FeedbackIgnored { timestamp, .. } => *timestamp,
            CortexEvent::DecaySweepCompleted { timestamp, .. } => *timestamp,
            CortexEvent::AgentStatusChanged { timestamp, .. } => *timestamp,
            CortexEvent::SnapshotWritten { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            CortexEvent::EdgeReinforced { .. } => "edge_reinforced",
            CortexEvent::EdgeWeakened { .. } => "edge_weakened",
            CortexEvent::FeedbackIgnored { .. } => "feedback_ignored",
            CortexEvent::DecaySweepCompleted { .. } => "decay_sweep_completed",
            CortexEvent::AgentStatusChanged { .. } => "agent_status_changed",
            CortexEvent::SnapshotWritten { .. } => "snapshot_written",
        }
    }
}
