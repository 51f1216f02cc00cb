//! Input guardrail: screens raw user text before it enters the pipeline.
//!
//! Three checks, all evaluated so the caller sees every violated rule:
//! 1. length, in characters
//! 2. whole-token match against a sensitive-word set (case-insensitive)
//! 3. substring match against prompt-injection phrases (case-insensitive,
//!    first hit only)

use llmcraft_config::GuardrailConfig;
use serde::Serialize;
use std::collections::BTreeSet;

/// Outcome of a validation call. `safe` is true iff `failures` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardrailResult {
    pub safe: bool,
    pub failures: Vec<String>,
}

impl GuardrailResult {
    fn from_failures(failures: Vec<String>) -> Self {
        Self {
            safe: failures.is_empty(),
            failures,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafetyGuard {
    max_length: usize,
    sensitive_words: BTreeSet<String>,
    /// Stored lowercased, in configured order.
    dangerous_patterns: Vec<String>,
}

impl SafetyGuard {
    pub fn new(
        max_length: usize,
        sensitive_words: impl IntoIterator<Item = String>,
        dangerous_patterns: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            max_length,
            sensitive_words: sensitive_words.into_iter().map(|w| w.to_lowercase()).collect(),
            dangerous_patterns: dangerous_patterns
                .into_iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &GuardrailConfig) -> Self {
        Self::new(
            config.max_length,
            config.sensitive_words.iter().cloned(),
            config.dangerous_patterns.iter().cloned(),
        )
    }

    /// Screen `text`. Never fails; an unsafe result carries its reasons.
    pub fn validate(&self, text: &str) -> GuardrailResult {
        let mut failures = Vec::new();
        let lowered = text.to_lowercase();

        if text.chars().count() > self.max_length {
            failures.push(format!("input too long (max {} characters)", self.max_length));
        }

        let found: BTreeSet<&str> = lowered
            .split_whitespace()
            .filter(|token| self.sensitive_words.contains(*token))
            .collect();
        if !found.is_empty() {
            let words: Vec<&str> = found.into_iter().collect();
            failures.push(format!("contains sensitive words: {}", words.join(", ")));
        }

        if let Some(pattern) = self.dangerous_patterns.iter().find(|p| lowered.contains(p.as_str())) {
            failures.push(format!("contains dangerous pattern: {pattern}"));
        }

        if !failures.is_empty() {
            tracing::info!(failures = failures.len(), "Input rejected by guardrail");
        }
        GuardrailResult::from_failures(failures)
    }
}

impl Default for SafetyGuard {
    fn default() -> Self {
        Self::from_config(&GuardrailConfig::default())
    }
}
