// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Keyword domain classifier
//!
//! Assigns a coarse domain to a concept name or a piece of text by counting
//! keyword hits. Shared by concept categorization (neurogenesis), research
//! source selection and domain scoring, so all three agree on what a
//! concept's domain is.

use super::similarity::tokens;

pub const GENERAL_DOMAIN: &str = "general";

#[derive(Debug, Clone)]
pub struct DomainClassifier {
    /// Ordered table; earlier domains win ties
    domains: Vec<(String, Vec<String>)>,
}

impl DomainClassifier {
    pub fn empty() -> Self {
        Self { domains: Vec::new() }
    }

    /// Add (or extend) a domain with its keywords
    pub fn with_domain<I, S>(mut self, domain: &str, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords.into_iter().map(|k| k.into().to_lowercase());
        if let Some((_, existing)) = self.domains.iter_mut().find(|(d, _)| d.as_str() == domain) {
            existing.extend(keywords);
        } else {
            self.domains.push((domain.to_lowercase(), keywords.collect()));
        }
        self
    }

    /// Best matching domain, or `general` when nothing matches
    pub fn classify(&self, text: &str) -> String {
        let words = tokens(text);
        let mut best: Option<(&str, usize)> = None;

        for (domain, keywords) in &self.domains {
            let hits = words
                .iter()
                .filter(|w| keywords.iter().any(|k| keyword_matches(w, k)))
                .count();
            if hits > 0 && best.is_none_or(|(_, top)| hits > top) {
                best = Some((domain.as_str(), hits));
            }
        }

        best.map(|(d, _)| d.to_string())
            .unwrap_or_else(|| GENERAL_DOMAIN.to_string())
    }

    /// Whether any token of `text` is a keyword of `domain`
    pub fn mentions_domain(&self, text: &str, domain: &str) -> bool {
        let Some((_, keywords)) = self.domains.iter().find(|(d, _)| d.as_str() == domain) else {
            return false;
        };
        tokens(text)
            .iter()
            .any(|w| keywords.iter().any(|k| keyword_matches(w, k)))
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(|(d, _)| d.as_str())
    }
}

fn keyword_matches(word: &str, keyword: &str) -> bool {
    // Plurals and simple suffixes: "computers" matches "computer"
    word == keyword || (keyword.len() >= 4 && word.starts_with(keyword))
}

impl Default for DomainClassifier {
    fn default() -> Self {
        Self::empty()
            .with_domain(
                "computing",
                [
                    "computer", "computing", "software", "algorithm", "network", "data", "code",
                    "program", "processor", "database", "ai", "compiler", "internet",
                ],
            )
            .with_domain(
                "electrical",
                [
                    "circuit", "voltage", "current", "lightbulb", "bulb", "battery", "resistor",
                    "electricity", "electric", "led", "lamp", "transistor", "wire",
                ],
            )
            .with_domain(
                "physics",
                [
                    "quantum", "particle", "energy", "gravity", "photon", "relativity", "force",
                    "wave", "atom", "atomic", "light", "magnet", "thermodynamics",
                ],
            )
            .with_domain(
                "chemistry",
                ["molecule", "chemical", "reaction", "compound", "acid", "element", "polymer"],
            )
            .with_domain(
                "biology",
                ["cell", "gene", "protein", "organism", "species", "dna", "enzyme", "bacteria"],
            )
            .with_domain(
                "mathematics",
                [
                    "equation", "theorem", "number", "algebra", "geometry", "calculus", "matrix",
                    "formula", "integral", "prime",
                ],
            )
            .with_domain(
                "medicine",
                ["disease", "drug", "symptom", "treatment", "diagnosis", "therapy", "vaccine"],
            )
            .with_domain(
                "finance",
                ["market", "stock", "price", "interest", "loan", "currency", "investment", "tax"],
            )
            .with_domain(
                "mechanical",
                ["engine", "gear", "motor", "turbine", "pump", "bearing", "piston"],
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_concepts() {
        let classifier = DomainClassifier::default();
        assert_eq!(classifier.classify("lightbulb"), "electrical");
        assert_eq!(classifier.classify("quantum_computer"), "computing");
        assert_eq!(classifier.classify("prime numbers"), "mathematics");
    }

    #[test]
    fn test_unknown_falls_back_to_general() {
        let classifier = DomainClassifier::default();
        assert_eq!(classifier.classify("zxqv"), GENERAL_DOMAIN);
        assert_eq!(classifier.classify(""), GENERAL_DOMAIN);
    }

    #[test]
    fn test_custom_domain() {
        let classifier = DomainClassifier::empty().with_domain("cooking", ["recipe", "bake"]);
        assert_eq!(classifier.classify("bakery recipes"), "cooking");
        assert!(classifier.mentions_domain("a recipe", "cooking"));
        assert!(!classifier.mentions_domain("a recipe", "physics"));
    }
}
