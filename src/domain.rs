//! Shared domain types: branches, states, confidence math, and velocity.
//!
//! `Branch` partitions confidence into three disjoint cells and every
//! `KnowledgeNode` must keep its `branch` and `confidence` consistent (I1).
//! Builder-pattern constructors follow the corpus convention of consuming
//! `self` and returning `Self` for optional fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// Maximum statement length: 4 KiB.
pub const MAX_STATEMENT_BYTES: usize = 4 * 1024;

/// One of the three epistemic partitions, mapping strictly to a confidence
/// range: `HUGIN` = `[0,49]`, `VOLVA` = `[50,99]`, `MIMIR` = `{100}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Branch {
    Mimir,
    Volva,
    Hugin,
}

impl Branch {
    /// The branch a given confidence value belongs to; confidence is
    /// expected to already be clamped to `0..=100`.
    pub fn for_confidence(confidence: u8) -> Self {
        match confidence {
            100 => Branch::Mimir,
            50..=99 => Branch::Volva,
            _ => Branch::Hugin,
        }
    }

    /// Whether `confidence` belongs to this branch's partition cell.
    pub fn accepts(self, confidence: u8) -> bool {
        Branch::for_confidence(confidence) == self
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Branch::Mimir => "MIMIR",
            Branch::Volva => "VOLVA",
            Branch::Hugin => "HUGIN",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of a knowledge node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    PendingProof,
    Watching,
    Verified,
    Rejected,
    Deprecated,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::PendingProof => "PENDING_PROOF",
            NodeState::Watching => "WATCHING",
            NodeState::Verified => "VERIFIED",
            NodeState::Rejected => "REJECTED",
            NodeState::Deprecated => "DEPRECATED",
        };
        write!(f, "{s}")
    }
}

/// Watcher priority queue a node is scheduled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriorityQueue {
    Hot,
    Warm,
    Cold,
}

impl PriorityQueue {
    /// Demote one level: HOT -> WARM -> COLD -> COLD.
    pub fn demote(self) -> Self {
        match self {
            PriorityQueue::Hot => PriorityQueue::Warm,
            PriorityQueue::Warm => PriorityQueue::Cold,
            PriorityQueue::Cold => PriorityQueue::Cold,
        }
    }
}

impl fmt::Display for PriorityQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriorityQueue::Hot => "HOT",
            PriorityQueue::Warm => "WARM",
            PriorityQueue::Cold => "COLD",
        };
        write!(f, "{s}")
    }
}

/// Trend of confidence change used to derive the priority queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VelocityTrend {
    Increasing,
    Decreasing,
    Stable,
}

/// Classify a velocity (confidence delta per millisecond) into a trend.
/// `|v| > 0.02 => INCREASING/DECREASING by sign, else STABLE`.
pub fn trend_of(velocity: f64) -> VelocityTrend {
    if velocity > 0.02 {
        VelocityTrend::Increasing
    } else if velocity < -0.02 {
        VelocityTrend::Decreasing
    } else {
        VelocityTrend::Stable
    }
}

/// Derive the priority queue from velocity per §4.7:
/// `|v| > 0.05 ⇒ HOT`; trend `STABLE` ⇒ `COLD`; else `WARM`.
pub fn queue_of(velocity: f64) -> PriorityQueue {
    if velocity.abs() > 0.05 {
        PriorityQueue::Hot
    } else if trend_of(velocity) == VelocityTrend::Stable {
        PriorityQueue::Cold
    } else {
        PriorityQueue::Warm
    }
}

/// Provenance source type, e.g. an indexed paper repository or the open web.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    Arxiv,
    Pubmed,
    Web,
    Other,
}

/// A citable external source backing a claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub identifier: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub trust_score: u8,
    pub retrieved_at: DateTime<Utc>,
}

impl Source {
    pub fn new(
        id: impl Into<String>,
        source_type: SourceType,
        identifier: impl Into<String>,
        trust_score: u8,
    ) -> Self {
        Self {
            id: id.into(),
            source_type,
            identifier: identifier.into(),
            url: None,
            title: None,
            authors: Vec::new(),
            trust_score: trust_score.min(100),
            retrieved_at: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    /// Identity is the `(type, identifier)` pair.
    pub fn identity(&self) -> (SourceType, &str) {
        (self.source_type, self.identifier.as_str())
    }

    /// Whether this source qualifies as an anchor for `VERIFIED` (I3):
    /// `trustScore >= 80`.
    pub fn is_anchor(&self) -> bool {
        self.trust_score >= 80
    }
}

/// One entry in a node's append-only audit trail (I2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub ts: DateTime<Utc>,
    pub action: String,
    pub from_state: Option<NodeState>,
    pub to_state: Option<NodeState>,
    pub trigger: String,
    pub agent: String,
    pub reason: Option<String>,
    pub confidence_delta: Option<i16>,
    pub vote_record: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>, trigger: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            action: action.into(),
            from_state: None,
            to_state: None,
            trigger: trigger.into(),
            agent: agent.into(),
            reason: None,
            confidence_delta: None,
            vote_record: None,
        }
    }

    pub fn with_transition(mut self, from: Option<NodeState>, to: NodeState) -> Self {
        self.from_state = from;
        self.to_state = Some(to);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_confidence_delta(mut self, delta: i16) -> Self {
        self.confidence_delta = Some(delta);
        self
    }

    pub fn with_vote_record(mut self, record: serde_json::Value) -> Self {
        self.vote_record = Some(record);
        self
    }
}

/// The central entity of the Knowledge Ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: String,
    pub statement: String,
    pub domain: Option<String>,
    pub tags: Vec<String>,
    pub branch: Branch,
    pub state: NodeState,
    pub confidence: u8,
    pub velocity: f64,
    pub priority_queue: PriorityQueue,
    pub last_scan: Option<DateTime<Utc>>,
    pub next_scan: Option<DateTime<Utc>>,
    pub idle_cycles: u32,
    pub audit_trail: Vec<AuditEntry>,
    pub shapley_attribution: HashMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeNode {
    /// Construct a new node at `PENDING_PROOF`, validating the statement
    /// length and the branch/confidence partition (I1).
    pub fn new(
        id: impl Into<String>,
        statement: impl Into<String>,
        confidence: u8,
    ) -> Result<Self> {
        let statement = statement.into().trim().to_string();
        if statement.len() > MAX_STATEMENT_BYTES {
            return Err(Error::branch_violation(format!(
                "statement exceeds {MAX_STATEMENT_BYTES} bytes"
            )));
        }
        let branch = Branch::for_confidence(confidence);
        let now = Utc::now();
        let mut node = Self {
            id: id.into(),
            statement,
            domain: None,
            tags: Vec::new(),
            branch,
            state: NodeState::PendingProof,
            confidence,
            velocity: 0.0,
            priority_queue: PriorityQueue::Warm,
            last_scan: None,
            next_scan: None,
            idle_cycles: 0,
            audit_trail: Vec::new(),
            shapley_attribution: HashMap::new(),
            created_at: now,
            updated_at: now,
        };
        node.audit_trail.push(
            AuditEntry::new("CREATE", "system", "ledger")
                .with_transition(None, NodeState::PendingProof),
        );
        Ok(node)
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Validate that `branch` and `confidence` are in the same partition
    /// cell (I1). Callers must invoke this before committing any write.
    pub fn check_branch_consistency(&self) -> Result<()> {
        if self.branch.accepts(self.confidence) {
            Ok(())
        } else {
            Err(Error::branch_violation(format!(
                "confidence {} is not valid for branch {}",
                self.confidence, self.branch
            )))
        }
    }
}

/// Relation semantics between two knowledge nodes; affects future weight
/// tuning but not the cascade topology, which always traverses
/// `source -> target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyRelation {
    DerivedFrom,
    Assumes,
    Supports,
    Contradicts,
}

/// A directed, strength-weighted dependency edge. Unique per `(source,
/// target)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    pub relation: DependencyRelation,
    pub strength: f64,
}

impl DependencyEdge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: DependencyRelation,
        strength: f64,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation,
            strength: strength.clamp(0.0, 1.0),
        }
    }
}

/// A snapshot of a single node's mutable state, captured by a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node_id: String,
    pub state: NodeState,
    pub branch: Branch,
    pub confidence: u8,
    pub velocity: f64,
    pub priority_queue: PriorityQueue,
    pub audit_trail_length: usize,
}

/// A labeled, restorable snapshot of selected nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub user_id: String,
    pub label: String,
    pub description: Option<String>,
    pub state_hash: String,
    pub member_node_ids: Vec<String>,
    pub snapshots: Vec<NodeSnapshot>,
    pub created_at: DateTime<Utc>,
}

/// Named council member roles, each backed by one model adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CouncilMember {
    Kvasir,
    Bragi,
    Nornes,
    Saga,
    Syn,
    Loki,
    Tyr,
}

impl CouncilMember {
    /// All members in their stable enum order, used to satisfy I5
    /// (deterministic verdict given identical inputs).
    pub const ALL: [CouncilMember; 7] = [
        CouncilMember::Kvasir,
        CouncilMember::Bragi,
        CouncilMember::Nornes,
        CouncilMember::Saga,
        CouncilMember::Syn,
        CouncilMember::Loki,
        CouncilMember::Tyr,
    ];

    fn ordinal(self) -> u8 {
        CouncilMember::ALL
            .iter()
            .position(|m| *m == self)
            .expect("CouncilMember::ALL is exhaustive") as u8
    }
}

impl PartialOrd for CouncilMember {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CouncilMember {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl fmt::Display for CouncilMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CouncilMember::Kvasir => "KVASIR",
            CouncilMember::Bragi => "BRAGI",
            CouncilMember::Nornes => "NORNES",
            CouncilMember::Saga => "SAGA",
            CouncilMember::Syn => "SYN",
            CouncilMember::Loki => "LOKI",
            CouncilMember::Tyr => "TYR",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn branch_boundaries_match_spec() {
        assert_eq!(Branch::for_confidence(0), Branch::Hugin);
        assert_eq!(Branch::for_confidence(49), Branch::Hugin);
        assert_eq!(Branch::for_confidence(50), Branch::Volva);
        assert_eq!(Branch::for_confidence(99), Branch::Volva);
        assert_eq!(Branch::for_confidence(100), Branch::Mimir);
    }

    #[test]
    fn node_rejects_inconsistent_branch() {
        let mut node = KnowledgeNode::new("n1", "the sky is blue", 60).unwrap();
        node.branch = Branch::Mimir;
        assert!(node.check_branch_consistency().is_err());
    }

    #[test]
    fn node_create_appends_single_audit_entry() {
        let node = KnowledgeNode::new("n1", "water boils at 100C at sea level", 100).unwrap();
        assert_eq!(node.audit_trail.len(), 1);
        assert_eq!(node.audit_trail[0].action, "CREATE");
        assert_eq!(node.branch, Branch::Mimir);
    }

    #[test]
    fn statement_over_limit_is_rejected() {
        let huge = "x".repeat(MAX_STATEMENT_BYTES + 1);
        assert!(KnowledgeNode::new("n1", huge, 50).is_err());
    }

    #[test]
    fn queue_derivation_matches_spec_thresholds() {
        assert_eq!(queue_of(0.06), PriorityQueue::Hot);
        assert_eq!(queue_of(-0.06), PriorityQueue::Hot);
        assert_eq!(queue_of(0.0), PriorityQueue::Cold);
        assert_eq!(queue_of(0.03), PriorityQueue::Warm);
    }

    #[test]
    fn council_member_order_is_stable() {
        let mut members = vec![CouncilMember::Tyr, CouncilMember::Kvasir, CouncilMember::Loki];
        members.sort();
        assert_eq!(
            members,
            vec![CouncilMember::Kvasir, CouncilMember::Loki, CouncilMember::Tyr]
        );
    }

    proptest::proptest! {
        /// I1: every confidence value maps into exactly one branch cell,
        /// and that branch always accepts the confidence it was derived from.
        #[test]
        fn branch_confidence_partition_holds_for_all_confidences(confidence in 0u8..=100u8) {
            let branch = Branch::for_confidence(confidence);
            proptest::prop_assert!(branch.accepts(confidence));

            let others: Vec<Branch> = [Branch::Mimir, Branch::Volva, Branch::Hugin]
                .into_iter()
                .filter(|b| *b != branch)
                .collect();
            for other in others {
                proptest::prop_assert!(!other.accepts(confidence));
            }
        }

        /// A node constructed at any valid confidence is internally
        /// consistent (I1) by construction.
        #[test]
        fn constructed_node_is_always_branch_consistent(confidence in 0u8..=100u8) {
            let node = KnowledgeNode::new("n", "a statement", confidence).unwrap();
            proptest::prop_assert!(node.check_branch_consistency().is_ok());
        }
    }
}
