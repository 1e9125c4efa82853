//! Deterministic, rule-based intent resolution.
//!
//! Resolution is a single pass over the lowercased query:
//!
//! 1. any security override phrase forces the low-severity `general` intent;
//! 2. otherwise the first rule (declaration order) with a trigger substring wins;
//! 3. otherwise the configured fallback intent is returned.
//!
//! Triggers match as substrings, not tokens, so multi-word phrases work as configured. The
//! override check always runs before the rules.

use serde::{Deserialize, Serialize};

use crate::deployment::IntentsConfig;

pub const SECURITY_OVERRIDE_INTENT: &str = "general";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Provenance of an intent result. Not a probability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Fallback,
    SecurityOverride,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Fallback => "fallback",
            Self::SecurityOverride => "security_override",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    pub severity: Severity,
    pub confidence: Confidence,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentRule {
    pub name: String,
    pub triggers: Vec<String>,
    pub severity: Severity,
}

#[derive(Clone, Debug)]
pub struct IntentResolver {
    rules: Vec<IntentRule>,
    security_overrides: Vec<String>,
    fallback_intent: String,
}

impl IntentResolver {
    pub fn new(config: &IntentsConfig) -> Self {
        let rules = config
            .intents
            .iter()
            .map(|intent| IntentRule {
                name: intent.name.clone(),
                triggers: normalize_phrases(
                    intent.primary_triggers.iter().chain(intent.secondary_triggers.iter()),
                ),
                severity: intent.severity,
            })
            .collect::<Vec<_>>();
        let security_overrides =
            normalize_phrases(config.intent_resolution.security_triggers.force_general.iter());

        Self {
            rules,
            security_overrides,
            fallback_intent: config.intent_resolution.fallback_intent.clone(),
        }
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    pub fn fallback_intent(&self) -> &str {
        &self.fallback_intent
    }

    pub fn resolve(&self, query: &str) -> IntentResult {
        let query = query.to_lowercase();

        if self.security_overrides.iter().any(|phrase| query.contains(phrase.as_str())) {
            return IntentResult {
                intent: SECURITY_OVERRIDE_INTENT.to_string(),
                severity: Severity::Low,
                confidence: Confidence::SecurityOverride,
            };
        }

        for rule in &self.rules {
            if rule.triggers.iter().any(|trigger| query.contains(trigger.as_str())) {
                return IntentResult {
                    intent: rule.name.clone(),
                    severity: rule.severity,
                    confidence: Confidence::High,
                };
            }
        }

        IntentResult {
            intent: self.fallback_intent.clone(),
            severity: Severity::Low,
            confidence: Confidence::Fallback,
        }
    }
}

/// Lowercases phrases and drops empty ones, which would otherwise match every query.
fn normalize_phrases<'a>(phrases: impl Iterator<Item = &'a String>) -> Vec<String> {
    phrases.map(|phrase| phrase.to_lowercase()).filter(|phrase| !phrase.trim().is_empty()).collect()
}
