//! Pipeline trace events (§4.12, §6): `ThinkingStep`s emitted by
//! `process_with_thinking`, and the `StreamEvent` wire shape emitted by
//! `process_with_streaming`'s lazy event sequence.
//!
//! Named phases follow §4.12 verbatim: `classify`, `fan_out_branches`,
//! `council_deliberate`, `validate`, `persist`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validator::ValidationOutcome;

/// A pipeline phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Classify,
    FanOutBranches,
    CouncilDeliberate,
    Validate,
    Persist,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Classify => "classify",
            Phase::FanOutBranches => "fan_out_branches",
            Phase::CouncilDeliberate => "council_deliberate",
            Phase::Validate => "validate",
            Phase::Persist => "persist",
        };
        write!(f, "{s}")
    }
}

/// One step of the "thinking" trace returned by `process_with_thinking`
/// and streamed by `process_with_streaming`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingStep {
    pub phase: Phase,
    pub thought: String,
    pub ts: DateTime<Utc>,
}

impl ThinkingStep {
    pub fn new(phase: Phase, thought: impl Into<String>) -> Self {
        Self {
            phase,
            thought: thought.into(),
            ts: Utc::now(),
        }
    }

    /// Format as a single-line log entry, for debug output alongside
    /// `tracing` spans rather than in place of them.
    pub fn as_log_line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.ts.format("%H:%M:%S%.3f"),
            self.phase,
            self.thought.lines().next().unwrap_or("")
        )
    }
}

/// One SSE message emitted by `process_with_streaming` (§6): a finite
/// sequence of `thinking` events terminated by exactly one `response` or
/// `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    Thinking {
        phase: Phase,
        thought: String,
        ts: DateTime<Utc>,
    },
    Response {
        #[serde(flatten)]
        response: Box<crate::pipeline::YggdrasilResponse>,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn thinking(step: &ThinkingStep) -> Self {
        StreamEvent::Thinking {
            phase: step.phase,
            thought: step.thought.clone(),
            ts: step.ts,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Response { .. } | StreamEvent::Error { .. })
    }
}

/// Convenience constructors tying a `ThinkingStep` to its natural
/// human-readable summary for a given phase outcome.
pub fn classify_step(summary: impl Into<String>) -> ThinkingStep {
    ThinkingStep::new(Phase::Classify, summary)
}

pub fn fan_out_step(summary: impl Into<String>) -> ThinkingStep {
    ThinkingStep::new(Phase::FanOutBranches, summary)
}

pub fn council_step(summary: impl Into<String>) -> ThinkingStep {
    ThinkingStep::new(Phase::CouncilDeliberate, summary)
}

pub fn validate_step(outcome: &ValidationOutcome) -> ThinkingStep {
    let summary = if outcome.is_valid {
        "validator approved".to_string()
    } else {
        format!("validator refused: {:?}", outcome.refusal_reason)
    };
    ThinkingStep::new(Phase::Validate, summary)
}

pub fn persist_step(summary: impl Into<String>) -> ThinkingStep {
    ThinkingStep::new(Phase::Persist, summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display_matches_spec_names() {
        assert_eq!(Phase::Classify.to_string(), "classify");
        assert_eq!(Phase::FanOutBranches.to_string(), "fan_out_branches");
        assert_eq!(Phase::CouncilDeliberate.to_string(), "council_deliberate");
        assert_eq!(Phase::Validate.to_string(), "validate");
        assert_eq!(Phase::Persist.to_string(), "persist");
    }

    #[test]
    fn stream_event_response_and_error_are_terminal() {
        assert!(StreamEvent::Error { message: "x".into() }.is_terminal());
        assert!(!StreamEvent::Thinking {
            phase: Phase::Classify,
            thought: "x".into(),
            ts: Utc::now(),
        }
        .is_terminal());
    }

    #[test]
    fn thinking_step_log_line_contains_phase_and_thought() {
        let step = classify_step("query classified as factual");
        let line = step.as_log_line();
        assert!(line.contains("classify"));
        assert!(line.contains("query classified as factual"));
    }
}
