//! Branch handlers (§4.2): MIMIR, VOLVA, HUGIN.
//!
//! Each handler returns sourced evidence for its branch, or an empty
//! evidence set. Cross-branch contamination is prevented by separate write
//! paths: no handler may write to a branch it does not own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::disinformation::{self, ContentMetadata, Recommendation};
use crate::domain::{Branch, Source, SourceType};
use crate::error::Result;

/// A raw candidate passage fetched by an external collaborator, prior to
/// branch-specific acceptance rules.
#[derive(Debug, Clone)]
pub struct RawEvidence {
    pub content: String,
    pub source: Source,
    pub confidence: u8,
}

/// The narrow external interface each branch handler calls into to obtain
/// candidate evidence. The real implementation (web search, an indexed
/// corpus of papers) is an out-of-scope collaborator; this crate only
/// depends on the shape of what it returns.
#[async_trait]
pub trait EvidenceCollaborator: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<Vec<RawEvidence>>;
}

/// Evidence accepted by a branch handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchEvidence {
    pub branch: Branch,
    pub content: String,
    pub confidence: u8,
    pub sources: Vec<Source>,
}

impl BranchEvidence {
    fn empty(branch: Branch) -> Self {
        Self {
            branch,
            content: String::new(),
            confidence: 0,
            sources: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Validated-provider source types accepted by MIMIR.
const MIMIR_VALIDATED_TYPES: [SourceType; 2] = [SourceType::Arxiv, SourceType::Pubmed];

/// MIMIR: accepts only entries linked to a source with `trustScore = 100`
/// and a validated provider type.
pub async fn mimir_fetch(
    collaborator: &dyn EvidenceCollaborator,
    query: &str,
) -> Result<BranchEvidence> {
    let candidates = collaborator.fetch(query).await?;
    let mut sources = Vec::new();
    let mut content = String::new();

    for candidate in candidates {
        if candidate.source.trust_score == 100
            && MIMIR_VALIDATED_TYPES.contains(&candidate.source.source_type)
        {
            if content.is_empty() {
                content = candidate.content.clone();
            }
            sources.push(candidate.source);
        }
    }

    if sources.is_empty() {
        return Ok(BranchEvidence::empty(Branch::Mimir));
    }

    Ok(BranchEvidence {
        branch: Branch::Mimir,
        content,
        confidence: 100,
        sources,
    })
}

/// VOLVA: accepts `50 <= confidence <= 99` with at least one source.
pub async fn volva_fetch(
    collaborator: &dyn EvidenceCollaborator,
    query: &str,
) -> Result<BranchEvidence> {
    let candidates = collaborator.fetch(query).await?;
    let mut sources = Vec::new();
    let mut content = String::new();
    let mut confidence: u8 = 0;

    for candidate in candidates {
        if (50..=99).contains(&candidate.confidence) {
            if content.is_empty() {
                content = candidate.content.clone();
                confidence = candidate.confidence;
            }
            sources.push(candidate.source);
        }
    }

    if sources.is_empty() {
        return Ok(BranchEvidence::empty(Branch::Volva));
    }

    Ok(BranchEvidence {
        branch: Branch::Volva,
        content,
        confidence,
        sources,
    })
}

/// HUGIN: fetches web snippets, passes each through the disinformation
/// filter, and caps `confidence <= 49`.
pub async fn hugin_fetch(
    collaborator: &dyn EvidenceCollaborator,
    query: &str,
) -> Result<BranchEvidence> {
    let candidates = collaborator.fetch(query).await?;
    let mut sources = Vec::new();
    let mut content = String::new();
    let mut confidence: u8 = 0;

    for candidate in candidates {
        let url = candidate.source.url.clone().unwrap_or_default();
        let analysis = disinformation::analyze(&url, &candidate.content, None::<&ContentMetadata>);
        if analysis.recommendation == Recommendation::Block {
            continue;
        }
        if content.is_empty() {
            content = candidate.content.clone();
            confidence = candidate.confidence.min(49);
        }
        sources.push(candidate.source);
    }

    if sources.is_empty() {
        return Ok(BranchEvidence::empty(Branch::Hugin));
    }

    Ok(BranchEvidence {
        branch: Branch::Hugin,
        content,
        confidence: confidence.min(49),
        sources,
    })
}

/// Run all three branch handlers concurrently and join their outputs, per
/// the §5 parallelism contract ("branch handlers execute concurrently;
/// their outputs are joined").
pub async fn fan_out(
    collaborator: &dyn EvidenceCollaborator,
    query: &str,
) -> Result<Vec<BranchEvidence>> {
    let (mimir, volva, hugin) = tokio::join!(
        mimir_fetch(collaborator, query),
        volva_fetch(collaborator, query),
        hugin_fetch(collaborator, query),
    );
    Ok(vec![mimir?, volva?, hugin?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct FakeCollaborator {
        evidence: Vec<RawEvidence>,
    }

    #[async_trait]
    impl EvidenceCollaborator for FakeCollaborator {
        async fn fetch(&self, _query: &str) -> Result<Vec<RawEvidence>> {
            Ok(self.evidence.clone())
        }
    }

    fn source(trust: u8, source_type: SourceType) -> Source {
        Source {
            id: "s1".into(),
            source_type,
            identifier: "id".into(),
            url: Some("https://arxiv.org/abs/1".into()),
            title: None,
            authors: vec![],
            trust_score: trust,
            retrieved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mimir_accepts_only_trust_100_validated_sources() {
        let collaborator = FakeCollaborator {
            evidence: vec![
                RawEvidence {
                    content: "c=299792458 m/s".into(),
                    source: source(100, SourceType::Arxiv),
                    confidence: 95,
                },
                RawEvidence {
                    content: "low trust".into(),
                    source: source(90, SourceType::Web),
                    confidence: 80,
                },
            ],
        };
        let evidence = mimir_fetch(&collaborator, "speed of light").await.unwrap();
        assert_eq!(evidence.sources.len(), 1);
        assert_eq!(evidence.confidence, 100);
    }

    #[tokio::test]
    async fn volva_requires_confidence_band() {
        let collaborator = FakeCollaborator {
            evidence: vec![RawEvidence {
                content: "plausible".into(),
                source: source(60, SourceType::Web),
                confidence: 65,
            }],
        };
        let evidence = volva_fetch(&collaborator, "q").await.unwrap();
        assert_eq!(evidence.confidence, 65);
        assert_eq!(evidence.branch, Branch::Volva);
    }

    #[tokio::test]
    async fn hugin_caps_confidence_at_49() {
        let collaborator = FakeCollaborator {
            evidence: vec![RawEvidence {
                content: "a web snippet".into(),
                source: source(30, SourceType::Web),
                confidence: 90,
            }],
        };
        let evidence = hugin_fetch(&collaborator, "q").await.unwrap();
        assert!(evidence.confidence <= 49);
    }

    #[tokio::test]
    async fn hugin_rejects_blocked_content() {
        let mut src = source(10, SourceType::Web);
        src.url = Some("https://infowars.com/story".into());
        let collaborator = FakeCollaborator {
            evidence: vec![RawEvidence {
                content: "neutral text".into(),
                source: src,
                confidence: 40,
            }],
        };
        let evidence = hugin_fetch(&collaborator, "q").await.unwrap();
        assert!(evidence.is_empty());
    }

    #[tokio::test]
    async fn empty_evidence_set_when_no_candidates_qualify() {
        let collaborator = FakeCollaborator { evidence: vec![] };
        let evidence = mimir_fetch(&collaborator, "q").await.unwrap();
        assert!(evidence.is_empty());
    }
}
