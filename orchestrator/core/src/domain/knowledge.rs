// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Knowledge gathered about a concept by the research stage

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use synapse_cortex::GraphError;

/// Merged answers of every research source that responded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSummary {
    pub concept: String,
    pub facts: BTreeMap<String, Value>,
    pub related_concepts: BTreeSet<String>,
    pub sources: BTreeSet<String>,
    /// Sources that timed out or errored; none of their data is merged
    pub failed_sources: BTreeSet<String>,
}

impl KnowledgeSummary {
    pub fn new(concept: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Fold one source's findings in. Facts already present keep their value.
    pub fn merge(&mut self, source: &str, findings: ResearchFindings) {
        for (key, value) in findings.facts {
            self.facts.entry(key).or_insert(value);
        }
        self.related_concepts.extend(findings.related_concepts);
        self.sources.insert(source.to_string());
        self.sources.extend(findings.sources);
    }

    /// Share of facts whose value is a JSON number
    pub fn numeric_ratio(&self) -> f64 {
        if self.facts.is_empty() {
            return 0.0;
        }
        let numeric = self.facts.values().filter(|v| v.is_number()).count();
        numeric as f64 / self.facts.len() as f64
    }

    /// Short human-readable definition taken from the facts, if one exists
    pub fn definition(&self) -> Option<String> {
        ["definition", "description", "summary"]
            .iter()
            .find_map(|key| self.facts.get(*key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

/// Response body of an agent's `/research` endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchFindings {
    #[serde(default)]
    pub facts: BTreeMap<String, Value>,
    #[serde(default)]
    pub related_concepts: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("every research source timed out for concept '{0}'")]
    Timeout(String),

    #[error("research source {source_name} failed: {message}")]
    Source { source_name: String, message: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_fact_wins() {
        let mut summary = KnowledgeSummary::new("quantum_computer");
        summary.merge(
            "PhysicsAgent",
            ResearchFindings {
                facts: BTreeMap::from([("qubits".to_string(), json!("superposition"))]),
                related_concepts: vec!["qubit".to_string()],
                sources: vec![],
            },
        );
        summary.merge(
            "ComputingAgent",
            ResearchFindings {
                facts: BTreeMap::from([
                    ("qubits".to_string(), json!("bits")),
                    ("gates".to_string(), json!(12)),
                ]),
                related_concepts: vec!["qubit".to_string(), "algorithm".to_string()],
                sources: vec!["arxiv".to_string()],
            },
        );

        assert_eq!(summary.facts["qubits"], json!("superposition"));
        assert_eq!(summary.facts.len(), 2);
        assert_eq!(summary.related_concepts.len(), 2);
        assert!(summary.sources.contains("PhysicsAgent"));
        assert!(summary.sources.contains("arxiv"));
        assert_eq!(summary.numeric_ratio(), 0.5);
    }

    #[test]
    fn test_definition_lookup() {
        let mut summary = KnowledgeSummary::new("x");
        assert!(summary.definition().is_none());
        summary
            .facts
            .insert("description".to_string(), json!("A thing"));
        assert_eq!(summary.definition().as_deref(), Some("A thing"));
    }
}
