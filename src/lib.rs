//! # yggdrasil-core
//!
//! A validation and memory pipeline wrapped around a federation of
//! external LLM endpoints: a query classifier, three epistemic branch
//! handlers (MIMIR/VOLVA/HUGIN), a council deliberation protocol with
//! Shapley-attributed credit, the "Odin" validator gate, an append-only
//! Knowledge Ledger, cascade invalidation, checkpoint/rollback, and a
//! background watcher that rescans nodes by epistemic velocity.
//!
//! ## Core components
//!
//! - **Classifier**: pure query -> `Classification` triage
//! - **Branches**: MIMIR/VOLVA/HUGIN evidence handlers, fanned out concurrently
//! - **Council**: fan-out/collect/challenge/arbitrate/propose deliberation
//! - **Validator**: the sole accept/refuse gate; never rewrites content
//! - **Ledger**: the persistent, append-only Knowledge Ledger
//! - **Pipeline**: orchestrates the above end to end
//!
//! ## Example
//!
//! ```rust,ignore
//! use yggdrasil_core::{Pipeline, PipelineRequest, PipelineOptions, YggdrasilConfig};
//!
//! let config = YggdrasilConfig::default();
//! let request = PipelineRequest::new(
//!     "what is the speed of light?",
//!     "user-1",
//!     PipelineOptions::from_config(&config),
//! );
//! // let response = pipeline.process(&request).await?;
//! ```

pub mod adapters;
pub mod branches;
pub mod cascade;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod council;
pub mod disinformation;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod shapley;
pub mod trajectory;
pub mod validator;
pub mod watcher;

// Re-exports for convenience
pub use adapters::{AdapterRegistry, ClientConfig, CouncilMemberResponse, HttpModelAdapter, ILLMAdapter};
pub use branches::{fan_out, BranchEvidence, EvidenceCollaborator, RawEvidence};
pub use cascade::{cascade_invalidate, CascadeResult};
pub use checkpoint::{RollbackResult};
pub use classifier::{classify, Classification, Complexity, Domain, QueryType};
pub use config::{AdapterConfig, YggdrasilConfig};
pub use council::{
    deliberate, ChallengeCollaborator, ChallengeSeverity, CouncilDeliberation, CouncilResponse,
    CouncilVerdict, LokiChallenge, VerdictKind, VoteCounts,
};
pub use disinformation::{
    analyze, ContentMetadata, DetectedType, DisinformationAnalysis, Recommendation, Severity,
};
pub use domain::{
    AuditEntry, Branch, Checkpoint, CouncilMember, DependencyEdge, DependencyRelation,
    KnowledgeNode, NodeSnapshot, NodeState, PriorityQueue, Source, SourceType, VelocityTrend,
    MAX_STATEMENT_BYTES,
};
pub use error::{Error, Result};
pub use ledger::{KnowledgeLedger, TransitionOptions};
pub use pipeline::{Pipeline, PipelineOptions, PipelineRequest, YggdrasilResponse, ANSWERING_MEMBERS};
pub use shapley::{attribute, MemberAttribution, ShapleyAttribution};
pub use trajectory::{Phase, StreamEvent, ThinkingStep};
pub use validator::{
    validate, FinalDecision, RefusalReason, TraceStep, ValidationOutcome, ValidationRequest,
    ValidationTrace, ODIN_VERSION,
};
pub use watcher::{Alert, AlertBuffer, AlertKind, AlertSeverity, WatchCollaborator, WatchObservation, Watcher, WatcherStats};
