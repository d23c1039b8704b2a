//! Validator "Odin" (§4.11): the sole gate between a deliberation and a
//! delivered answer. It never rewrites content — only accepts or
//! refuses.

use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::branches::BranchEvidence;
use crate::council::{CouncilVerdict, VerdictKind};
use crate::domain::Source;

/// Current validator build identifier, surfaced in every trace.
pub const ODIN_VERSION: &str = "odin-1";

/// One recorded step in a validation trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub step_number: u32,
    pub phase: String,
    pub action: String,
    pub result: String,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Final decision recorded in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FinalDecision {
    Approved,
    Rejected,
}

/// `{requestId, odinVersion, steps[], finalDecision, processingTimeMs}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationTrace {
    pub request_id: String,
    pub odin_version: String,
    pub steps: Vec<TraceStep>,
    pub final_decision: FinalDecision,
    pub processing_time_ms: u64,
}

/// Reason a request was refused, surfaced verbatim in `YggdrasilResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefusalReason {
    NoSource,
    NoConsensus,
    BranchViolation,
    Timeout,
    Internal,
}

/// Inputs to one validation pass.
pub struct ValidationRequest<'a> {
    pub content: &'a str,
    pub request_id: &'a str,
    pub require_mimir_anchor: bool,
    pub sources: &'a [Source],
    pub council_verdict: &'a CouncilVerdict,
    pub branch_results: &'a [BranchEvidence],
}

/// Outcome of a validation pass.
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub confidence: u8,
    pub refusal_reason: Option<RefusalReason>,
    pub sources: Vec<Source>,
    pub trace: ValidationTrace,
}

/// Runs the fixed four-step decision procedure (§4.11). Always produces
/// a trace, whether the outcome is an approval or a refusal.
#[instrument(skip(request))]
pub fn validate(request: &ValidationRequest<'_>) -> ValidationOutcome {
    let started = Instant::now();
    let mut steps = Vec::new();
    let mut step_number = 0;

    let mut record = |phase: &str, action: &str, result: &str, steps: &mut Vec<TraceStep>, n: &mut u32| {
        *n += 1;
        steps.push(TraceStep {
            step_number: *n,
            phase: phase.to_string(),
            action: action.to_string(),
            result: result.to_string(),
            timestamp: Utc::now(),
        });
    };

    if request.require_mimir_anchor && !request.sources.iter().any(|s| s.is_anchor()) {
        record(
            "validate",
            "check_anchor_source",
            "no source meets trustScore >= 80",
            &mut steps,
            &mut step_number,
        );
        return reject(request.request_id, steps, started, RefusalReason::NoSource);
    }
    record("validate", "check_anchor_source", "anchor present", &mut steps, &mut step_number);

    if matches!(request.council_verdict.kind, VerdictKind::Deadlock | VerdictKind::Split) {
        record(
            "validate",
            "check_council_verdict",
            &format!("verdict is {:?}", request.council_verdict.kind),
            &mut steps,
            &mut step_number,
        );
        return reject(request.request_id, steps, started, RefusalReason::NoConsensus);
    }
    record(
        "validate",
        "check_council_verdict",
        &format!("verdict is {:?}", request.council_verdict.kind),
        &mut steps,
        &mut step_number,
    );

    if let Some(violation) = request
        .branch_results
        .iter()
        .find(|r| !r.branch.accepts(r.confidence))
    {
        record(
            "validate",
            "check_branch_ceiling",
            &format!("{} exceeded its branch ceiling", violation.branch),
            &mut steps,
            &mut step_number,
        );
        return reject(request.request_id, steps, started, RefusalReason::BranchViolation);
    }
    record("validate", "check_branch_ceiling", "all branch results within ceiling", &mut steps, &mut step_number);

    record("validate", "approve", "APPROVED", &mut steps, &mut step_number);
    let processing_time_ms = started.elapsed().as_millis() as u64;
    let trace = ValidationTrace {
        request_id: request.request_id.to_string(),
        odin_version: ODIN_VERSION.to_string(),
        steps,
        final_decision: FinalDecision::Approved,
        processing_time_ms,
    };

    info!(request_id = %request.request_id, "validation approved");
    ValidationOutcome {
        is_valid: true,
        confidence: 100,
        refusal_reason: None,
        sources: request.sources.to_vec(),
        trace,
    }
}

fn reject(
    request_id: &str,
    steps: Vec<TraceStep>,
    started: Instant,
    reason: RefusalReason,
) -> ValidationOutcome {
    let processing_time_ms = started.elapsed().as_millis() as u64;
    info!(request_id = %request_id, reason = ?reason, "validation rejected");
    ValidationOutcome {
        is_valid: false,
        confidence: 0,
        refusal_reason: Some(reason),
        sources: Vec::new(),
        trace: ValidationTrace {
            request_id: request_id.to_string(),
            odin_version: ODIN_VERSION.to_string(),
            steps,
            final_decision: FinalDecision::Rejected,
            processing_time_ms,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::council::VoteCounts;
    use crate::domain::{Branch, SourceType};
    use pretty_assertions::assert_eq;

    fn anchor() -> Source {
        Source::new("s1", SourceType::Arxiv, "123", 90)
    }

    fn verdict(kind: VerdictKind) -> CouncilVerdict {
        CouncilVerdict {
            kind,
            vote_counts: VoteCounts::default(),
            reasoning: String::new(),
            dissent: vec![],
        }
    }

    #[test]
    fn missing_anchor_rejects_with_no_source() {
        let request = ValidationRequest {
            content: "the speed of light is 299,792,458 m/s",
            request_id: "r1",
            require_mimir_anchor: true,
            sources: &[],
            council_verdict: &verdict(VerdictKind::Consensus),
            branch_results: &[],
        };
        let outcome = validate(&request);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.refusal_reason, Some(RefusalReason::NoSource));
    }

    #[test]
    fn deadlock_verdict_rejects_with_no_consensus() {
        let sources = vec![anchor()];
        let request = ValidationRequest {
            content: "claim",
            request_id: "r1",
            require_mimir_anchor: true,
            sources: &sources,
            council_verdict: &verdict(VerdictKind::Deadlock),
            branch_results: &[],
        };
        let outcome = validate(&request);
        assert_eq!(outcome.refusal_reason, Some(RefusalReason::NoConsensus));
    }

    #[test]
    fn branch_ceiling_violation_rejects() {
        let sources = vec![anchor()];
        let branch_results = vec![BranchEvidence {
            branch: Branch::Mimir,
            content: "claim".into(),
            confidence: 80,
            sources: vec![],
        }];
        let request = ValidationRequest {
            content: "claim",
            request_id: "r1",
            require_mimir_anchor: true,
            sources: &sources,
            council_verdict: &verdict(VerdictKind::Consensus),
            branch_results: &branch_results,
        };
        let outcome = validate(&request);
        assert_eq!(outcome.refusal_reason, Some(RefusalReason::BranchViolation));
    }

    #[test]
    fn clean_request_is_approved_with_confidence_100() {
        let sources = vec![anchor()];
        let branch_results = vec![BranchEvidence {
            branch: Branch::Mimir,
            content: "claim".into(),
            confidence: 100,
            sources: vec![],
        }];
        let request = ValidationRequest {
            content: "claim",
            request_id: "r1",
            require_mimir_anchor: true,
            sources: &sources,
            council_verdict: &verdict(VerdictKind::Consensus),
            branch_results: &branch_results,
        };
        let outcome = validate(&request);
        assert!(outcome.is_valid);
        assert_eq!(outcome.confidence, 100);
        assert_eq!(outcome.trace.final_decision, FinalDecision::Approved);
    }

    #[test]
    fn validator_never_rewrites_content() {
        let sources = vec![anchor()];
        let request = ValidationRequest {
            content: "original content",
            request_id: "r1",
            require_mimir_anchor: true,
            sources: &sources,
            council_verdict: &verdict(VerdictKind::Consensus),
            branch_results: &[],
        };
        let outcome = validate(&request);
        assert_eq!(request.content, "original content");
        assert!(outcome.is_valid);
    }
}
