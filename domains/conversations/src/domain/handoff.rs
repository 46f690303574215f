//! Handoff detection pipeline
//!
//! Classifies customer messages to decide whether a conversation
//! should escalate to a human agent. Stages are pure functions over a
//! shared input contract, evaluated in fixed order; the first stage
//! that fires wins. New stages (sentiment, for instance) slot into
//! the pipeline without changing callers.

use serde::Serialize;

use crate::domain::entities::{Message, SenderType};

/// Keywords that escalate immediately, checked as case-insensitive
/// substrings in pipeline order.
const DEFAULT_KEYWORDS: &[&str] = &[
    "speak to human",
    "talk to agent",
    "representative",
    "escalate",
    "supervisor",
    "manager",
    "complaint",
    "human",
    "person",
];

/// Messages pulled from the ledger for the repeated-failure stage.
pub const DETECTION_WINDOW: i64 = 6;

/// Low-confidence LLM responses in the window before escalation fires.
const LOW_CONFIDENCE_THRESHOLD: usize = 3;

/// Minimum LLM responses in the window before the repeated-failure
/// stage can fire at all.
const MIN_LLM_MESSAGES: usize = 3;

/// What caused a handoff decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffTrigger {
    Keyword,
    Confidence,
}

/// A positive escalation decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoffSignal {
    pub trigger: HandoffTrigger,
    pub reason: String,
}

/// Shared input contract for all detection stages
#[derive(Debug)]
pub struct DetectorInput<'a> {
    /// Content of the customer message being classified
    pub content: &'a str,
    /// Most recent ledger window, oldest first
    pub recent: &'a [Message],
}

/// One classification stage in the pipeline
pub trait HandoffStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns a signal when this stage decides to escalate.
    fn evaluate(&self, input: &DetectorInput<'_>) -> Option<HandoffSignal>;
}

/// Stage 1: case-insensitive keyword matching on the message content
pub struct KeywordStage {
    keywords: Vec<String>,
}

impl KeywordStage {
    pub fn new(keywords: Vec<String>) -> Self {
        Self { keywords }
    }
}

impl Default for KeywordStage {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect())
    }
}

impl HandoffStage for KeywordStage {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn evaluate(&self, input: &DetectorInput<'_>) -> Option<HandoffSignal> {
        let content = input.content.to_lowercase();
        let keyword = self
            .keywords
            .iter()
            .find(|kw| content.contains(&kw.to_lowercase()))?;

        Some(HandoffSignal {
            trigger: HandoffTrigger::Keyword,
            reason: format!("Customer requested human agent (keyword: \"{}\")", keyword),
        })
    }
}

/// Stage 2: repeated low-confidence LLM responses in the recent window
#[derive(Default)]
pub struct RepeatedFailureStage;

impl HandoffStage for RepeatedFailureStage {
    fn name(&self) -> &'static str {
        "repeated_failure"
    }

    fn evaluate(&self, input: &DetectorInput<'_>) -> Option<HandoffSignal> {
        let llm_count = input
            .recent
            .iter()
            .filter(|m| m.sender_type == SenderType::Llm)
            .count();
        if llm_count < MIN_LLM_MESSAGES {
            return None;
        }

        let low_confidence = input
            .recent
            .iter()
            .filter(|m| m.is_low_confidence_llm())
            .count();
        if low_confidence < LOW_CONFIDENCE_THRESHOLD {
            return None;
        }

        Some(HandoffSignal {
            trigger: HandoffTrigger::Confidence,
            reason: "Multiple low-confidence responses detected".to_string(),
        })
    }
}

/// The ordered detection pipeline
pub struct HandoffDetector {
    stages: Vec<Box<dyn HandoffStage>>,
}

impl HandoffDetector {
    pub fn new(stages: Vec<Box<dyn HandoffStage>>) -> Self {
        Self { stages }
    }

    /// Run the pipeline; the first stage that fires wins.
    pub fn detect(&self, input: &DetectorInput<'_>) -> Option<HandoffSignal> {
        for stage in &self.stages {
            if let Some(signal) = stage.evaluate(input) {
                tracing::info!(stage = stage.name(), reason = %signal.reason, "handoff detected");
                return Some(signal);
            }
        }
        None
    }
}

impl Default for HandoffDetector {
    fn default() -> Self {
        Self::new(vec![
            Box::new(KeywordStage::default()),
            Box::new(RepeatedFailureStage),
        ])
    }
}
