//! Input and output guardrails.
//!
//! Pre-checks run on the user question before any retrieval or LLM call:
//! harmful content and jailbreak attempts produce blocking verdicts;
//! off-topic questions produce a non-blocking warning attached to the
//! answer. Post-checks run on the generated answer against the retrieved
//! context: unsupported numeric claims and weak word overlap produce
//! warnings, never blocks.
//!
//! All checks are keyword and overlap heuristics, deterministic and
//! offline. Keyword lists are overridable in configuration; empty lists
//! fall back to the built-ins here.

use std::collections::HashSet;

use crate::config::GuardrailConfig;
use crate::models::{GuardrailVerdict, Severity, VerdictKind};

const HARMFUL_KEYWORDS: &[&str] = &[
    "weapon",
    "bomb",
    "attack",
    "kill",
    "harm",
    "illegal",
    "hack",
    "exploit",
    "steal",
    "fraud",
    "poison",
    "dangerous",
];

const JAILBREAK_PATTERNS: &[&str] = &[
    "ignore previous instructions",
    "ignore all instructions",
    "disregard",
    "forget everything",
    "act as",
    "pretend you are",
    "roleplay as",
    "simulate",
    "you are now",
    "new instructions",
    "system:",
    "override",
];

const OFF_TOPIC_PATTERNS: &[&str] = &[
    "weather",
    "joke",
    "recipe",
    "game",
    "movie",
    "sports",
    "write code",
    "create program",
    "build app",
    "homework",
    "translate",
    "what is the time",
    "news",
    "stock",
    "price",
];

const RESEARCH_KEYWORDS: &[&str] = &[
    "paper",
    "research",
    "study",
    "finding",
    "method",
    "result",
    "analysis",
    "data",
    "experiment",
    "hypothesis",
    "conclusion",
    "author",
    "cite",
    "reference",
    "abstract",
    "introduction",
    "discussion",
    "figure",
    "table",
    "section",
    "algorithm",
    "model",
    "approach",
    "technique",
    "evaluation",
    "compare",
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "must", "can", "this", "that", "these",
    "those", "i", "you", "he", "she", "it", "we", "they", "what", "which", "who", "when",
    "where", "why", "how",
];

/// Deterministic guardrail rule engine, configured once at startup.
pub struct GuardrailEngine {
    harmful: Vec<String>,
    jailbreak: Vec<String>,
    off_topic: Vec<String>,
    research: Vec<String>,
    hallucination_number_threshold: usize,
    grounding_overlap_threshold: usize,
}

fn or_builtin(configured: &[String], builtin: &[&str]) -> Vec<String> {
    if configured.is_empty() {
        builtin.iter().map(|s| s.to_string()).collect()
    } else {
        configured.to_vec()
    }
}

impl GuardrailEngine {
    pub fn new(config: &GuardrailConfig) -> Self {
        Self {
            harmful: or_builtin(&config.harmful_keywords, HARMFUL_KEYWORDS),
            jailbreak: or_builtin(&config.jailbreak_patterns, JAILBREAK_PATTERNS),
            off_topic: or_builtin(&config.off_topic_patterns, OFF_TOPIC_PATTERNS),
            research: or_builtin(&config.research_keywords, RESEARCH_KEYWORDS),
            hallucination_number_threshold: config.hallucination_number_threshold,
            grounding_overlap_threshold: config.grounding_overlap_threshold,
        }
    }

    /// Check the question before retrieval.
    ///
    /// Harmful content and jailbreak attempts return blocking verdicts, and
    /// the blocking checks run first so an off-topic harmful question still
    /// blocks. An off-topic question returns a warning verdict; the pipeline
    /// answers it anyway and attaches the warning.
    pub fn pre_check(&self, question: &str) -> Option<GuardrailVerdict> {
        let lower = question.to_lowercase();

        if self.harmful.iter().any(|kw| lower.contains(kw.as_str())) {
            return Some(GuardrailVerdict {
                kind: VerdictKind::Harmful,
                severity: Severity::Error,
                message: "I'm designed to help with scientific research questions. \
                    I cannot assist with harmful, unethical, or dangerous content. \
                    Please ask a question related to your research papers."
                    .to_string(),
            });
        }

        if self.jailbreak.iter().any(|p| lower.contains(p.as_str())) {
            return Some(GuardrailVerdict {
                kind: VerdictKind::Jailbreak,
                severity: Severity::Error,
                message: "I notice you're trying to bypass my guidelines. I'm here to \
                    help with scientific research questions only."
                    .to_string(),
            });
        }

        if self.is_off_topic(&lower) {
            return Some(GuardrailVerdict {
                kind: VerdictKind::OffTopic,
                severity: Severity::Warning,
                message: "This question seems outside the scope of your research papers. \
                    Answering anyway, but results may be unreliable."
                    .to_string(),
            });
        }

        None
    }

    /// Check the generated answer against the retrieved context.
    ///
    /// Post-check verdicts are warnings attached to the delivered answer,
    /// never blocks.
    pub fn post_check(&self, answer: &str, context: &[String]) -> Option<GuardrailVerdict> {
        if context.is_empty() {
            return Some(GuardrailVerdict {
                kind: VerdictKind::NotGrounded,
                severity: Severity::Warning,
                message: "No relevant papers were found for this question, so the answer \
                    is not grounded in your library."
                    .to_string(),
            });
        }

        let combined = context.join(" ").to_lowercase();
        let answer_lower = answer.to_lowercase();

        if self.looks_hallucinated(&answer_lower, &combined) {
            return Some(GuardrailVerdict {
                kind: VerdictKind::Hallucination,
                severity: Severity::Warning,
                message: "The response may contain information not supported by your \
                    papers. Please verify this information against the original sources."
                    .to_string(),
            });
        }

        if !self.is_well_grounded(&answer_lower, &combined) {
            return Some(GuardrailVerdict {
                kind: VerdictKind::NotGrounded,
                severity: Severity::Warning,
                message: "While I can provide some information, the answer may not be \
                    fully supported by your processed papers. Please take this response \
                    with caution."
                    .to_string(),
            });
        }

        None
    }

    fn is_off_topic(&self, lower: &str) -> bool {
        if self.off_topic.iter().any(|p| lower.contains(p.as_str())) {
            return true;
        }

        let word_count = lower.split_whitespace().count();
        let mentions_research = self.research.iter().any(|kw| lower.contains(kw.as_str()));

        // Very short questions without research context, or longer ones
        // that never touch a research term, are flagged.
        if word_count < 3 {
            return !mentions_research;
        }
        if word_count >= 5 && !mentions_research {
            return true;
        }

        false
    }

    /// An answer citing more than N numeric values absent from the context
    /// is flagged as a likely hallucination.
    fn looks_hallucinated(&self, answer_lower: &str, context_lower: &str) -> bool {
        let answer_numbers = numeric_tokens(answer_lower);
        let context_numbers = numeric_tokens(context_lower);
        let unsupported = answer_numbers.difference(&context_numbers).count();
        unsupported > self.hallucination_number_threshold
    }

    fn is_well_grounded(&self, answer_lower: &str, context_lower: &str) -> bool {
        let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();
        let answer_words: HashSet<&str> = answer_lower.split_whitespace().collect();
        let context_words: HashSet<&str> = context_lower.split_whitespace().collect();

        let overlap = answer_words
            .intersection(&context_words)
            .filter(|w| !stop.contains(**w))
            .count();

        if overlap > self.grounding_overlap_threshold {
            return true;
        }
        // Short answers get a lower bar.
        answer_words.len() < 50 && overlap > self.grounding_overlap_threshold / 2
    }
}

/// Extract numeric tokens: runs of digits with an optional decimal part and
/// an optional trailing percent sign (`42`, `3.14`, `95%`). Digits glued to
/// letters ("v2", "gpt-4o", "llama3") name a thing rather than state a
/// quantity and are not extracted.
fn numeric_tokens(text: &str) -> HashSet<String> {
    let mut tokens = HashSet::new();
    let mut chars = text.chars().peekable();
    let mut prev: Option<char> = None;

    while let Some(c) = chars.next() {
        if !c.is_ascii_digit() {
            prev = Some(c);
            continue;
        }
        let mut embedded = prev.is_some_and(|p| p.is_ascii_alphanumeric());
        let mut token = String::new();
        token.push(c);
        let mut seen_dot = false;
        while let Some(&next) = chars.peek() {
            if next.is_ascii_digit() {
                token.push(next);
                chars.next();
            } else if next == '.' && !seen_dot {
                // Only consume the dot if a digit follows (avoid "42.").
                let mut ahead = chars.clone();
                ahead.next();
                if ahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                    seen_dot = true;
                    token.push('.');
                    chars.next();
                } else {
                    break;
                }
            } else if next == '%' {
                token.push('%');
                chars.next();
                break;
            } else {
                break;
            }
        }
        if !token.ends_with('%') && chars.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
            embedded = true;
        }
        prev = token.chars().last();
        if !embedded {
            tokens.insert(token);
        }
    }

    tokens
}
