//! Shapley attribution (§4.6): fair per-member credit for a council
//! deliberation's outcome, via exhaustive coalition enumeration.
//!
//! `|N| <= 8` per the council's own member roster, so the `2^|N|`
//! coalition space (<= 256 subsets) is cheap to enumerate exactly —
//! no need for Monte Carlo approximation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::council::{ChallengeSeverity, CouncilDeliberation, LokiChallenge, VerdictKind};
use crate::domain::CouncilMember;

/// Per-member attribution, alongside the raw coalition-game `phi`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberAttribution {
    pub member: CouncilMember,
    pub phi: f64,
    pub percentage: f64,
    pub response_quality: f64,
    pub challenge_impact: f64,
    pub consensus_alignment: f64,
}

/// Full attribution result for a deliberation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapleyAttribution {
    pub deliberation_id: String,
    pub members: Vec<MemberAttribution>,
}

fn verdict_factor(kind: VerdictKind) -> f64 {
    match kind {
        VerdictKind::Consensus => 1.0,
        VerdictKind::Majority => 0.8,
        VerdictKind::Split => 0.5,
        VerdictKind::Deadlock => 0.3,
    }
}

fn avg(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn agreement_score(confidences: &[f64]) -> f64 {
    if confidences.len() <= 1 {
        return 100.0;
    }
    let mean = avg(confidences);
    let variance = confidences.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / confidences.len() as f64;
    (100.0 - variance.sqrt()).max(0.0)
}

/// Coalition value `v(S)` per §4.6.
fn coalition_value(confidences: &[f64], verdict: VerdictKind) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    let avg_confidence = avg(confidences);
    let agreement = agreement_score(confidences);
    let alignment = avg_confidence * verdict_factor(verdict);
    0.3 * avg_confidence + 0.3 * agreement + 0.4 * alignment
}

fn factorial(n: u64) -> f64 {
    (1..=n).fold(1.0, |acc, x| acc * x as f64)
}

/// `min(100, confidence + (reasoning length > 100 ? 10 : 0))`.
fn response_quality(confidence: u8, reasoning: Option<&str>) -> f64 {
    let bonus = if reasoning.map(|r| r.len() > 100).unwrap_or(false) { 10.0 } else { 0.0 };
    (confidence as f64 + bonus).min(100.0)
}

fn severity_penalty(severity: ChallengeSeverity) -> f64 {
    match severity {
        ChallengeSeverity::Critical => 40.0,
        ChallengeSeverity::High => 25.0,
        ChallengeSeverity::Medium => 15.0,
        ChallengeSeverity::Low => 5.0,
    }
}

/// Challenge impact per §4.6: non-LOKI members lose points per challenge
/// severity leveled at them; LOKI is scored on how many severe
/// challenges it raised.
fn challenge_impact(member: CouncilMember, challenges: &[LokiChallenge]) -> f64 {
    if member == CouncilMember::Loki {
        let severe = challenges
            .iter()
            .filter(|c| matches!(c.severity, ChallengeSeverity::High | ChallengeSeverity::Critical))
            .count();
        if challenges.is_empty() {
            return 50.0;
        }
        return (50.0 + 20.0 * severe as f64).min(100.0);
    }
    let penalty: f64 = challenges
        .iter()
        .filter(|c| c.target_member == member)
        .map(|c| severity_penalty(c.severity))
        .sum();
    (100.0 - penalty).max(0.0)
}

/// Consensus alignment: how closely a member's own confidence matched
/// the deliberation's overall verdict strength.
fn consensus_alignment(confidence: u8, verdict: VerdictKind) -> f64 {
    (confidence as f64 * verdict_factor(verdict)).min(100.0)
}

/// Compute the full Shapley attribution for a completed deliberation.
pub fn attribute(deliberation: &CouncilDeliberation) -> ShapleyAttribution {
    let members: Vec<CouncilMember> = deliberation.responses.iter().map(|r| r.member).collect();
    let n = members.len();
    let verdict = deliberation.verdict.kind;

    let confidence_of: HashMap<CouncilMember, f64> = deliberation
        .responses
        .iter()
        .map(|r| (r.member, r.confidence as f64))
        .collect();

    let value_of = |subset: &[CouncilMember]| -> f64 {
        if subset.is_empty() {
            return 0.0;
        }
        let confidences: Vec<f64> = subset.iter().filter_map(|m| confidence_of.get(m).copied()).collect();
        coalition_value(&confidences, verdict)
    };

    let mut phis: HashMap<CouncilMember, f64> = HashMap::new();
    let n_factorial = factorial(n as u64);

    for &member in &members {
        let rest: Vec<CouncilMember> = members.iter().copied().filter(|m| *m != member).collect();
        let mut phi = 0.0;

        // Exhaustive powerset of `rest` (n-1 members, so at most 2^7 = 128).
        for mask in 0u32..(1u32 << rest.len()) {
            let subset: Vec<CouncilMember> = rest
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, m)| *m)
                .collect();

            let with_member: Vec<CouncilMember> =
                subset.iter().copied().chain(std::iter::once(member)).collect();

            let weight = factorial(subset.len() as u64) * factorial((n - subset.len() - 1) as u64) / n_factorial;
            phi += weight * (value_of(&with_member) - value_of(&subset));
        }
        phis.insert(member, phi);
    }

    let total_phi: f64 = phis.values().sum();

    let attributions = deliberation
        .responses
        .iter()
        .map(|response| {
            let phi = *phis.get(&response.member).unwrap_or(&0.0);
            let percentage = if total_phi.abs() > f64::EPSILON {
                phi / total_phi * 100.0
            } else {
                100.0 / n as f64
            };
            MemberAttribution {
                member: response.member,
                phi,
                percentage,
                response_quality: response_quality(response.confidence, response.reasoning.as_deref()),
                challenge_impact: challenge_impact(response.member, &deliberation.challenges),
                consensus_alignment: consensus_alignment(response.confidence, verdict),
            }
        })
        .collect();

    ShapleyAttribution {
        deliberation_id: deliberation.id.clone(),
        members: attributions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::council::{CouncilResponse, CouncilVerdict};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn response(member: CouncilMember, confidence: u8) -> CouncilResponse {
        CouncilResponse {
            member,
            content: "answer".into(),
            confidence,
            reasoning: None,
            duration_ms: 10,
            ts: Utc::now(),
        }
    }

    fn deliberation(members_confidence: &[(CouncilMember, u8)], verdict: VerdictKind) -> CouncilDeliberation {
        CouncilDeliberation {
            id: "d1".into(),
            request_id: "r1".into(),
            query: "q".into(),
            responses: members_confidence.iter().map(|(m, c)| response(*m, *c)).collect(),
            challenges: vec![],
            verdict: CouncilVerdict {
                kind: verdict,
                vote_counts: Default::default(),
                reasoning: String::new(),
                dissent: vec![],
            },
            final_proposal: String::new(),
            total_duration_ms: 10,
            ts: Utc::now(),
        }
    }

    #[test]
    fn phi_sums_to_v_n_minus_v_empty() {
        let d = deliberation(
            &[
                (CouncilMember::Kvasir, 90),
                (CouncilMember::Bragi, 85),
                (CouncilMember::Nornes, 70),
            ],
            VerdictKind::Consensus,
        );
        let attribution = attribute(&d);
        let confidences: Vec<f64> = d.responses.iter().map(|r| r.confidence as f64).collect();
        let v_n = coalition_value(&confidences, VerdictKind::Consensus);
        let sum_phi: f64 = attribution.members.iter().map(|m| m.phi).sum();
        assert!((sum_phi - v_n).abs() < 1e-6);
    }

    #[test]
    fn percentages_sum_to_100() {
        let d = deliberation(
            &[(CouncilMember::Kvasir, 90), (CouncilMember::Bragi, 40)],
            VerdictKind::Majority,
        );
        let attribution = attribute(&d);
        let total: f64 = attribution.members.iter().map(|m| m.percentage).sum();
        assert!((total - 100.0).abs() < 0.5);
    }

    #[test]
    fn single_member_gets_full_credit() {
        let d = deliberation(&[(CouncilMember::Kvasir, 80)], VerdictKind::Consensus);
        let attribution = attribute(&d);
        assert_eq!(attribution.members.len(), 1);
        assert!((attribution.members[0].percentage - 100.0).abs() < 1e-6);
    }

    #[test]
    fn response_quality_rewards_long_reasoning() {
        let short = response_quality(80, Some("brief"));
        let long = response_quality(80, Some(&"x".repeat(200)));
        assert!(long > short);
        assert_eq!(long, 90.0);
    }

    #[test]
    fn loki_challenge_impact_scales_with_severe_challenges() {
        let challenges = vec![
            LokiChallenge {
                id: "c1".into(),
                target_member: CouncilMember::Bragi,
                text: "unsupported".into(),
                severity: ChallengeSeverity::High,
                resolved: false,
                ts: Utc::now(),
            },
            LokiChallenge {
                id: "c2".into(),
                target_member: CouncilMember::Saga,
                text: "contradiction".into(),
                severity: ChallengeSeverity::Critical,
                resolved: false,
                ts: Utc::now(),
            },
        ];
        let impact = challenge_impact(CouncilMember::Loki, &challenges);
        assert_eq!(impact, 90.0);
    }

    proptest::proptest! {
        /// Efficiency property (§8): for any response set and verdict,
        /// `Sum(phi_i) == v(N) - v(empty)` within epsilon, regardless of
        /// how many members responded or what confidences they gave.
        #[test]
        fn shapley_values_sum_to_total_coalition_value(
            confidences in proptest::collection::vec(0u8..=100u8, 1..=7),
            verdict_idx in 0u8..4u8,
        ) {
            let verdict = match verdict_idx {
                0 => VerdictKind::Consensus,
                1 => VerdictKind::Majority,
                2 => VerdictKind::Split,
                _ => VerdictKind::Deadlock,
            };
            let members: Vec<CouncilMember> = CouncilMember::ALL
                .iter()
                .copied()
                .take(confidences.len())
                .collect();
            let members_confidence: Vec<(CouncilMember, u8)> =
                members.iter().copied().zip(confidences.iter().copied()).collect();
            let d = deliberation(&members_confidence, verdict);

            let attribution = attribute(&d);
            let all_confidences: Vec<f64> = confidences.iter().map(|c| *c as f64).collect();
            let v_n = coalition_value(&all_confidences, verdict);
            let sum_phi: f64 = attribution.members.iter().map(|m| m.phi).sum();

            proptest::prop_assert!((sum_phi - v_n).abs() < 1e-6);
        }
    }
}
