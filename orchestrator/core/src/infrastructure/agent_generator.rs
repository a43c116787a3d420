// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Generator
//!
//! Builds agent blueprints from research knowledge and renders the answers
//! a hosted agent gives, using Handlebars templates per archetype.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Turn a concept plus knowledge summary into a runnable agent definition
//! - **Integration:** LifecycleManager Generating stage → AgentFactory
//!
//! # Template Placeholders
//!
//! - `{{agent}}` - Generated agent name
//! - `{{concept}}` / `{{domain}}` - What the agent handles
//! - `{{question}}` - Question being answered
//! - `{{facts}}` - Every known fact as `{key, value}`
//! - `{{matched}}` - Facts whose key overlaps the question
//! - `{{numeric}}` - Facts with numeric values
//! - `{{related}}` - Related concept names

use anyhow::{Context, Result};
use chrono::Utc;
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use synapse_cortex::domain::classifier::GENERAL_DOMAIN;
use synapse_cortex::domain::similarity::{term_similarity, tokens};

use crate::domain::archetype::{agent_name_for, AgentBlueprint, Archetype};
use crate::domain::knowledge::KnowledgeSummary;

const FACT_BASE_TEMPLATE: &str = "{{agent}} on {{concept}}:\
{{#if matched}}{{#each matched}}\n- {{this.key}}: {{this.value}}{{/each}}\
{{else}}{{#each facts}}\n- {{this.key}}: {{this.value}}{{/each}}{{/if}}";

const FUNCTION_TEMPLATE: &str = "{{agent}} computes over {{concept}}.\
{{#if numeric}}{{#each numeric}}\n{{this.key}} = {{this.value}}{{/each}}\
{{else}}\nNo numeric parameters are known for {{concept}}.{{/if}}";

const SPECIALIST_TEMPLATE: &str = "As a {{domain}} specialist on {{concept}}: \
{{#if matched}}{{#each matched}}{{this.key}} is {{this.value}}. {{/each}}\
{{else}}{{#each facts}}{{this.key}} is {{this.value}}. {{/each}}{{/if}}\
{{#if related}}See also: {{#each related}}{{this}}{{#unless @last}}, {{/unless}}{{/each}}.{{/if}}";

/// Minimum term similarity for a question word to match a fact key
const FACT_MATCH_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Serialize)]
struct FactEntry {
    key: String,
    value: String,
}

/// Data a blueprint's answer template is rendered against
#[derive(Debug, Clone, Serialize)]
pub struct AnswerContext {
    agent: String,
    concept: String,
    domain: String,
    question: String,
    facts: Vec<FactEntry>,
    matched: Vec<FactEntry>,
    numeric: Vec<FactEntry>,
    related: Vec<String>,
}

impl AnswerContext {
    pub fn new(blueprint: &AgentBlueprint, question: &str) -> Self {
        let question_tokens = tokens(question);
        let facts: Vec<FactEntry> = blueprint
            .knowledge
            .facts
            .iter()
            .map(|(key, value)| FactEntry {
                key: key.clone(),
                value: display_value(value),
            })
            .collect();

        let matched = facts
            .iter()
            .filter(|fact| {
                tokens(&fact.key).iter().any(|k| {
                    question_tokens
                        .iter()
                        .any(|q| term_similarity(q, k) >= FACT_MATCH_THRESHOLD)
                })
            })
            .cloned()
            .collect();

        let numeric = blueprint
            .knowledge
            .facts
            .iter()
            .filter(|(_, v)| v.is_number())
            .map(|(key, value)| FactEntry {
                key: key.clone(),
                value: display_value(value),
            })
            .collect();

        Self {
            agent: blueprint.name.clone(),
            concept: blueprint.concept.clone(),
            domain: blueprint.domain.clone(),
            question: question.to_string(),
            facts,
            matched,
            numeric,
            related: blueprint.knowledge.related_concepts.iter().cloned().collect(),
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct AgentGenerator {
    handlebars: Handlebars<'static>,
    templates: HashMap<Archetype, String>,
}

impl AgentGenerator {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        // Missing placeholders render empty instead of failing
        handlebars.set_strict_mode(false);
        // Answers are plain text, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        let templates = HashMap::from([
            (Archetype::FactBase, FACT_BASE_TEMPLATE.to_string()),
            (Archetype::Function, FUNCTION_TEMPLATE.to_string()),
            (Archetype::Specialist, SPECIALIST_TEMPLATE.to_string()),
        ]);

        Self {
            handlebars,
            templates,
        }
    }

    /// Replace the answer template of one archetype
    pub fn with_template(mut self, archetype: Archetype, template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        self.validate_template(&template)?;
        self.templates.insert(archetype, template);
        Ok(self)
    }

    /// Build the blueprint of a new agent for `concept`
    pub fn generate(
        &self,
        concept: &str,
        domain: &str,
        archetype: Archetype,
        knowledge: &KnowledgeSummary,
    ) -> Result<AgentBlueprint> {
        let answer_template = self
            .templates
            .get(&archetype)
            .cloned()
            .with_context(|| format!("No template registered for archetype {}", archetype))?;
        self.validate_template(&answer_template)?;

        let mut capabilities: BTreeSet<String> = BTreeSet::new();
        capabilities.insert(concept.to_string());
        capabilities.extend(tokens(concept).into_iter().filter(|t| t.len() >= 3));
        capabilities.extend(archetype.base_capabilities().iter().map(|c| c.to_string()));
        if domain != GENERAL_DOMAIN {
            capabilities.insert(domain.to_string());
        }

        Ok(AgentBlueprint {
            name: agent_name_for(concept),
            concept: concept.to_string(),
            domain: domain.to_string(),
            archetype,
            capabilities,
            knowledge: knowledge.clone(),
            answer_template,
            created_at: Utc::now(),
        })
    }

    /// Answer a question the way the blueprint's agent would
    pub fn answer(&self, blueprint: &AgentBlueprint, question: &str) -> Result<String> {
        let context = AnswerContext::new(blueprint, question);
        self.handlebars
            .render_template(&blueprint.answer_template, &context)
            .context("Failed to render answer template")
    }

    /// Validate template syntax without rendering
    pub fn validate_template(&self, template: &str) -> Result<()> {
        handlebars::template::Template::compile(template)
            .map(|_| ())
            .context("Invalid Handlebars template syntax")
    }
}

impl Default for AgentGenerator {
    fn default() -> Self {
        Self::new()
    }
}
