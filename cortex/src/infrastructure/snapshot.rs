// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Graph snapshot persistence
//!
//! A snapshot is the whole graph as one JSON document. Writes go to a
//! sibling temp file and are renamed over the target, so a crash mid-write
//! leaves the previous snapshot intact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::error::GraphError;
use crate::domain::graph::{Edge, EdgeId, Node, NodeId};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub version: u32,
    pub taken_at: DateTime<Utc>,
    pub nodes: HashMap<NodeId, Node>,
    pub edges: HashMap<EdgeId, Edge>,
}

impl GraphSnapshot {
    pub fn new(nodes: HashMap<NodeId, Node>, edges: HashMap<EdgeId, Edge>) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            taken_at: Utc::now(),
            nodes,
            edges,
        }
    }
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Latest snapshot, or `None` when nothing has been written yet
    async fn load(&self) -> Result<Option<GraphSnapshot>, GraphError>;

    async fn save(&self, snapshot: &GraphSnapshot) -> Result<(), GraphError>;

    /// Human readable location, for logs
    fn location(&self) -> String;
}

pub struct JsonFileSnapshotStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "graph.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn load(&self) -> Result<Option<GraphSnapshot>, GraphError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: GraphSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(GraphError::Persistence(format!(
                "unsupported snapshot version {} in {}",
                snapshot.version,
                self.path.display()
            )));
        }
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &GraphSnapshot) -> Result<(), GraphError> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            "Graph snapshot written"
        );
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{AgentNode, ConceptNode, EdgeKind};

    #[tokio::test]
    async fn test_missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSnapshotStore::new(dir.path().join("graph.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSnapshotStore::new(dir.path().join("nested/graph.json"));

        let agent = Node::agent(AgentNode::new("Lightbulb_AI", "http://127.0.0.1:9100"));
        let concept = Node::concept(ConceptNode::new("lightbulb", "electrical"));
        let edge = Edge::new(agent.id, concept.id, EdgeKind::HandlesConcept, 0.5);

        let snapshot = GraphSnapshot::new(
            HashMap::from([(agent.id, agent.clone()), (concept.id, concept.clone())]),
            HashMap::from([(edge.id, edge.clone())]),
        );
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.nodes[&agent.id], agent);
        assert_eq!(loaded.edges[&edge.id], edge);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = JsonFileSnapshotStore::new(&path);
        assert!(matches!(store.load().await, Err(GraphError::Serialization(_))));
    }
}
