// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent archetypes and the blueprint a generated agent is built from

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use synapse_cortex::domain::classifier::GENERAL_DOMAIN;

use super::knowledge::KnowledgeSummary;

/// Concept words that mark a computational agent
const COMPUTATIONAL_CUES: &[&str] = &[
    "calculator",
    "calculate",
    "calculation",
    "compute",
    "computation",
    "convert",
    "converter",
    "conversion",
    "formula",
    "equation",
    "solver",
    "estimate",
    "estimator",
];

/// Share of numeric facts above which a summary counts as numeric-dominant
const NUMERIC_DOMINANCE: f64 = 0.5;

/// Template family a generated agent is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    /// Answers lookups from a table of facts
    FactBase,
    /// Answers with values derived from numeric facts
    Function,
    /// Domain expert that frames answers within its field
    Specialist,
}

impl Archetype {
    /// Deterministic archetype for a concept and its research summary.
    ///
    /// Rules are checked in order: computational cues or numeric-dominant
    /// facts give `Function`, a dense summary gives `FactBase`, a specific
    /// domain gives `Specialist`, anything else falls back to `FactBase`.
    pub fn select(
        concept: &str,
        domain: &str,
        knowledge: &KnowledgeSummary,
        dense_fact_threshold: usize,
    ) -> Self {
        let has_cue = synapse_cortex::domain::similarity::tokens(concept)
            .iter()
            .any(|t| COMPUTATIONAL_CUES.contains(&t.as_str()));
        if has_cue || knowledge.numeric_ratio() > NUMERIC_DOMINANCE {
            return Archetype::Function;
        }
        if knowledge.facts.len() >= dense_fact_threshold {
            return Archetype::FactBase;
        }
        if domain != GENERAL_DOMAIN && !domain.is_empty() {
            return Archetype::Specialist;
        }
        Archetype::FactBase
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Archetype::FactBase => "fact_base",
            Archetype::Function => "function",
            Archetype::Specialist => "specialist",
        }
    }

    /// Capabilities every agent of this archetype advertises
    pub fn base_capabilities(&self) -> &'static [&'static str] {
        match self {
            Archetype::FactBase => &["lookup", "explain"],
            Archetype::Function => &["compute", "explain"],
            Archetype::Specialist => &["explain", "advise"],
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to stand up a new agent instance.
/// Serialized as YAML when handed to a subprocess host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBlueprint {
    pub name: String,
    pub concept: String,
    pub domain: String,
    pub archetype: Archetype,
    pub capabilities: BTreeSet<String>,
    pub knowledge: KnowledgeSummary,
    /// Handlebars template rendered for each `/query`
    pub answer_template: String,
    pub created_at: DateTime<Utc>,
}

/// `quantum_computer` becomes `Quantum_Computer_AI`
pub fn agent_name_for(concept: &str) -> String {
    let mut name: Vec<String> = concept
        .split('_')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    name.push("AI".to_string());
    name.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary_with(facts: &[(&str, serde_json::Value)]) -> KnowledgeSummary {
        let mut summary = KnowledgeSummary::new("c");
        for (k, v) in facts {
            summary.facts.insert(k.to_string(), v.clone());
        }
        summary
    }

    #[test]
    fn test_agent_name() {
        assert_eq!(agent_name_for("quantum_computer"), "Quantum_Computer_AI");
        assert_eq!(agent_name_for("lightbulb"), "Lightbulb_AI");
    }

    #[test]
    fn test_computational_cue_selects_function() {
        let summary = summary_with(&[("a", json!("text"))]);
        assert_eq!(
            Archetype::select("mortgage_calculator", "finance", &summary, 5),
            Archetype::Function
        );
    }

    #[test]
    fn test_numeric_facts_select_function() {
        let summary = summary_with(&[("mass", json!(1.5)), ("charge", json!(-1)), ("n", json!("x"))]);
        assert_eq!(Archetype::select("electron", "physics", &summary, 5), Archetype::Function);
    }

    #[test]
    fn test_dense_then_specialist_then_fallback() {
        let dense = summary_with(&[
            ("a", json!("1")),
            ("b", json!("2")),
            ("c", json!("3")),
            ("d", json!("4")),
            ("e", json!("5")),
        ]);
        assert_eq!(Archetype::select("qubit", "physics", &dense, 5), Archetype::FactBase);

        let sparse = summary_with(&[("a", json!("1"))]);
        assert_eq!(
            Archetype::select("quantum_computer", "computing", &sparse, 5),
            Archetype::Specialist
        );
        assert_eq!(Archetype::select("thing", GENERAL_DOMAIN, &sparse, 5), Archetype::FactBase);
    }
}
