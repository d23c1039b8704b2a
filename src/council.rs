//! Council deliberation (§4.5): fan-out, collect, adversarial challenge,
//! arbitration, and proposal synthesis over a set of model adapters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::adapters::{AdapterRegistry, ILLMAdapter};
use crate::domain::CouncilMember;
use crate::error::Result;

/// Severity of an adversarial challenge raised by LOKI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChallengeSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// One response collected from a council member's model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilResponse {
    pub member: CouncilMember,
    pub content: String,
    pub confidence: u8,
    pub reasoning: Option<String>,
    pub duration_ms: u64,
    pub ts: DateTime<Utc>,
}

/// A challenge LOKI raises against another member's response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LokiChallenge {
    pub id: String,
    pub target_member: CouncilMember,
    pub text: String,
    pub severity: ChallengeSeverity,
    pub resolved: bool,
    pub ts: DateTime<Utc>,
}

/// The arbitrated verdict kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictKind {
    Consensus,
    Majority,
    Split,
    Deadlock,
}

/// Multiset of votes derived from each response's confidence bucket.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VoteCounts {
    pub yes: u32,
    pub partial: u32,
    pub no: u32,
}

/// TYR's arbitrated verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilVerdict {
    pub kind: VerdictKind,
    pub vote_counts: VoteCounts,
    pub reasoning: String,
    pub dissent: Vec<CouncilMember>,
}

/// The full record of one deliberation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilDeliberation {
    pub id: String,
    pub request_id: String,
    pub query: String,
    pub responses: Vec<CouncilResponse>,
    pub challenges: Vec<LokiChallenge>,
    pub verdict: CouncilVerdict,
    pub final_proposal: String,
    pub total_duration_ms: u64,
    pub ts: DateTime<Utc>,
}

/// A vote bucket derived from a response's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vote {
    Yes,
    Partial,
    No,
}

fn vote_for(confidence: u8) -> Vote {
    if confidence >= 70 {
        Vote::Yes
    } else if confidence >= 50 {
        Vote::Partial
    } else {
        Vote::No
    }
}

/// Fan-out + collect (§4.5 steps 1-2): queries every available adapter
/// for the requested members concurrently, bounded by `deadline`.
/// Adapters that do not respond within the deadline contribute nothing —
/// partial responses are a normal outcome, not a failure.
#[instrument(skip(registry, query))]
pub async fn fan_out_and_collect(
    registry: &AdapterRegistry,
    members: &[CouncilMember],
    query: &str,
    deadline: Duration,
) -> Vec<CouncilResponse> {
    let adapters = registry.available(members);
    let mut pending: FuturesUnordered<_> = adapters
        .into_iter()
        .map(|adapter| query_one(adapter, query.to_string()))
        .collect();

    let mut responses = Vec::new();
    let sleep = tokio::time::sleep(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            biased;
            _ = &mut sleep => {
                if !pending.is_empty() {
                    warn!(remaining = pending.len(), "council collection deadline elapsed");
                }
                break;
            }
            next = pending.next() => {
                match next {
                    Some(Some(response)) => responses.push(response),
                    Some(None) => {}
                    None => break,
                }
            }
        }
    }

    // §5: response ordering must be stable (sorted by member enum order) so
    // that I5 determinism holds regardless of which adapter happened to
    // answer first.
    responses.sort_by_key(|r| r.member);
    responses
}

async fn query_one(adapter: Arc<dyn ILLMAdapter>, query: String) -> Option<CouncilResponse> {
    let started = Instant::now();
    match adapter.query(&query).await {
        Ok(resp) => Some(CouncilResponse {
            member: adapter.member(),
            content: resp.content,
            confidence: resp.confidence,
            reasoning: resp.reasoning,
            duration_ms: started.elapsed().as_millis() as u64,
            ts: Utc::now(),
        }),
        Err(err) => {
            warn!(member = %adapter.member(), error = %err, "council member did not respond");
            None
        }
    }
}

/// Challenge (§4.5 step 3): LOKI's adapter receives the collected
/// responses and emits zero or more challenges. LOKI itself never
/// appears among `responses` (it is not asked the query); its adapter is
/// repurposed here to critique, driven by a caller-supplied collaborator
/// so this crate does not hardcode a prompt-parsing contract.
#[async_trait::async_trait]
pub trait ChallengeCollaborator: Send + Sync {
    async fn challenge(&self, responses: &[CouncilResponse]) -> Result<Vec<LokiChallenge>>;
}

pub async fn run_challenge_phase(
    collaborator: &dyn ChallengeCollaborator,
    responses: &[CouncilResponse],
) -> Result<Vec<LokiChallenge>> {
    if responses.is_empty() {
        return Ok(Vec::new());
    }
    collaborator.challenge(responses).await
}

/// Arbitrate (§4.5 step 4): derive votes from confidence buckets and
/// compute the verdict kind.
///
/// An empty response set is a deadlock by definition — there is nothing
/// to form consensus over, and ties are only reported as a genuine
/// `SPLIT` when consensus wasn't required; a tie under a consensus
/// requirement is itself a failure to reach one, hence `DEADLOCK`.
pub fn arbitrate(responses: &[CouncilResponse], require_consensus: bool) -> CouncilVerdict {
    let n = responses.len();
    let mut counts = VoteCounts::default();
    let mut dissent = Vec::new();

    for response in responses {
        match vote_for(response.confidence) {
            Vote::Yes => counts.yes += 1,
            Vote::Partial => counts.partial += 1,
            Vote::No => {
                counts.no += 1;
                dissent.push(response.member);
            }
        }
    }

    let consensus_threshold = (n as u32).div_ceil(2) + 1;

    let kind = if n == 0 {
        VerdictKind::Deadlock
    } else if counts.no == 0 && counts.yes >= consensus_threshold {
        VerdictKind::Consensus
    } else if require_consensus && counts.no >= counts.yes {
        VerdictKind::Deadlock
    } else if counts.yes > counts.no {
        VerdictKind::Majority
    } else if counts.yes == counts.no {
        VerdictKind::Split
    } else {
        VerdictKind::Majority
    };

    let reasoning = format!(
        "{n} responses: {} yes, {} partial, {} no -> {kind:?}",
        counts.yes, counts.partial, counts.no
    );

    CouncilVerdict {
        kind,
        vote_counts: counts,
        reasoning,
        dissent,
    }
}

/// Propose (§4.5 step 5): concatenate the top-voted contents with their
/// attributions. "Top-voted" means `Yes`-bucket responses, highest
/// confidence first; falls back to all responses if none voted yes.
pub fn propose(responses: &[CouncilResponse]) -> String {
    let mut top_voted: Vec<&CouncilResponse> = responses
        .iter()
        .filter(|r| vote_for(r.confidence) == Vote::Yes)
        .collect();
    if top_voted.is_empty() {
        top_voted = responses.iter().collect();
    }
    top_voted.sort_by(|a, b| b.confidence.cmp(&a.confidence).then_with(|| a.member.cmp(&b.member)));

    top_voted
        .iter()
        .map(|r| format!("[{}] {}", r.member, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Run the full deliberation protocol end-to-end.
#[instrument(skip(registry, challenge_collaborator, query))]
pub async fn deliberate(
    registry: &AdapterRegistry,
    challenge_collaborator: &dyn ChallengeCollaborator,
    request_id: &str,
    query: &str,
    members: &[CouncilMember],
    require_consensus: bool,
    collect_deadline: Duration,
) -> Result<CouncilDeliberation> {
    let started = Instant::now();
    let responses = fan_out_and_collect(registry, members, query, collect_deadline).await;
    let challenges = run_challenge_phase(challenge_collaborator, &responses).await?;
    let verdict = arbitrate(&responses, require_consensus);
    let final_proposal = propose(&responses);

    let deliberation = CouncilDeliberation {
        id: uuid::Uuid::new_v4().to_string(),
        request_id: request_id.to_string(),
        query: query.to_string(),
        responses,
        challenges,
        verdict,
        final_proposal,
        total_duration_ms: started.elapsed().as_millis() as u64,
        ts: Utc::now(),
    };

    info!(
        deliberation_id = %deliberation.id,
        verdict = ?deliberation.verdict.kind,
        responses = deliberation.responses.len(),
        "council deliberation complete"
    );

    Ok(deliberation)
}
