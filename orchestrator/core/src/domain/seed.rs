// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! YAML seed files describing an initial graph

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use synapse_cortex::{
    AgentNode, ConceptNode, EdgeKind, EdgeSpec, GraphBatch, Node, NodeRef, RegionNode,
};
use synapse_cortex::domain::classifier::GENERAL_DOMAIN;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSeed {
    #[serde(default)]
    pub agents: Vec<SeedAgent>,
    #[serde(default)]
    pub concepts: Vec<SeedConcept>,
    #[serde(default)]
    pub regions: Vec<SeedRegion>,
    #[serde(default)]
    pub edges: Vec<SeedEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedAgent {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConcept {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRegion {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Edge between two `Label:Name` references (or UUIDs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEdge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub weight: Option<f64>,
}

impl GraphSeed {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// One batch with every node and edge; HANDLES_CONCEPT edges without an
    /// explicit weight start at `manual_weight`.
    pub fn into_batch(self, manual_weight: f64) -> anyhow::Result<GraphBatch> {
        let mut batch = GraphBatch::new();

        for region in self.regions {
            batch = batch.upsert(Node::region(RegionNode::new(region.name, region.description)));
        }
        for concept in self.concepts {
            let domain = concept.domain.unwrap_or_else(|| GENERAL_DOMAIN.to_string());
            let mut node = ConceptNode::new(&concept.name, domain);
            if let Some(definition) = concept.definition {
                node = node.with_definition(definition);
            }
            batch = batch.upsert(Node::concept(node));
        }
        for agent in self.agents {
            let mut node =
                AgentNode::new(agent.name, agent.endpoint).with_capabilities(agent.capabilities);
            if let Some(domain) = agent.domain {
                node = node.with_domain(domain);
            }
            batch = batch.upsert(Node::agent(node));
        }
        for edge in self.edges {
            let kind: EdgeKind = edge.kind.parse()?;
            let from: NodeRef = edge.from.parse()?;
            let to: NodeRef = edge.to.parse()?;
            let mut spec = EdgeSpec::new(from, to, kind);
            match edge.weight {
                Some(weight) => spec = spec.with_weight(weight),
                None if kind == EdgeKind::HandlesConcept => spec = spec.with_weight(manual_weight),
                None => {}
            }
            batch = batch.edge(spec);
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_cortex::{GraphRepository, GraphStore};

    const SEED: &str = r#"
agents:
  - name: ElectricalAgent
    endpoint: http://localhost:9001
    capabilities: [circuits, lightbulb]
    domain: electrical
concepts:
  - name: Light Bulb
    domain: electrical
edges:
  - from: Agent:ElectricalAgent
    to: Concept:Light Bulb
    type: HANDLES_CONCEPT
"#;

    #[tokio::test]
    async fn test_seed_commits_as_one_batch() {
        let seed = GraphSeed::from_yaml_str(SEED).unwrap();
        let store = GraphStore::in_memory();
        store.commit(seed.into_batch(0.5).unwrap()).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.agents, 1);
        assert_eq!(stats.concepts, 1);
        assert_eq!(stats.edges, 1);

        let edges = store.all_edges(Some(EdgeKind::HandlesConcept)).await.unwrap();
        assert_eq!(edges[0].weight, 0.5);
        let concept = store.get_node(edges[0].to).await.unwrap().unwrap();
        assert_eq!(concept.name(), "light_bulb");
    }

    #[test]
    fn test_bad_edge_kind_is_rejected() {
        let seed = GraphSeed {
            edges: vec![SeedEdge {
                from: "Agent:A".into(),
                to: "Concept:b".into(),
                kind: "LIKES".into(),
                weight: None,
            }],
            ..Default::default()
        };
        assert!(seed.into_batch(0.5).is_err());
    }
}
