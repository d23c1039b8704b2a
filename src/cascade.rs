//! Cascade invalidation (§4.8): a breadth-first walk over dependency
//! edges rooted at an invalidated node.
//!
//! Traversal direction is frozen by an Open Question decision: edges are
//! walked `source -> target`, i.e. a node that *depends on* the root (the
//! root is its `source`) is the one reconsidered, not the other way
//! round. Every popped node — the root included — is itself deprecated;
//! strong edges (`strength >= 0.8`) enqueue their target for the same
//! treatment, weaker edges only flag the target for review.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::domain::{NodeState, PriorityQueue};
use crate::error::Result;
use crate::ledger::{KnowledgeLedger, TransitionOptions};

/// Strength at or above which a dependent is invalidated directly rather
/// than merely flagged for review.
pub const DIRECT_INVALIDATION_THRESHOLD: f64 = 0.8;

/// Outcome of a cascade run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeResult {
    pub root_id: String,
    pub invalidated: Vec<String>,
    pub flagged_for_review: Vec<String>,
    pub visited_count: usize,
    pub duration_ms: u64,
}

/// `cascadeInvalidate(rootId, invalidator, reason)` (§4.8): BFS over
/// `source -> target` edges. Visits each node at most once; runs in
/// `O(V + E)` over the reachable subgraph.
#[instrument(skip(ledger, reason))]
pub fn cascade_invalidate(
    ledger: &KnowledgeLedger,
    root_id: &str,
    invalidator: &str,
    reason: &str,
) -> Result<CascadeResult> {
    let started = Instant::now();

    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut invalidated = Vec::new();
    let mut flagged = Vec::new();

    visited.insert(root_id.to_string());
    queue.push_back(root_id.to_string());

    while let Some(current) = queue.pop_front() {
        ledger.transition_state(
            &current,
            NodeState::Deprecated,
            TransitionOptions {
                trigger: "CASCADE".into(),
                agent: invalidator.into(),
                reason: Some(format!("cascaded from {root_id}: {reason}")),
                ..Default::default()
            },
        )?;
        invalidated.push(current.clone());

        for edge in ledger.get_dependents(&current)? {
            if visited.contains(&edge.target) {
                continue;
            }
            if edge.strength >= DIRECT_INVALIDATION_THRESHOLD {
                visited.insert(edge.target.clone());
                queue.push_back(edge.target);
            } else {
                flagged.push(edge.target);
            }
        }
    }

    // A node can be flagged via a weak edge before a later strong edge
    // (possibly through a different path) pulls it into `visited` and
    // invalidates it outright. Invalidation wins: drop anything that ended
    // up invalidated, and dedup the rest, before scheduling review.
    let mut flagged_seen: HashSet<String> = HashSet::new();
    flagged.retain(|id| !visited.contains(id) && flagged_seen.insert(id.clone()));

    for node_id in &flagged {
        ledger.schedule_review(node_id, PriorityQueue::Hot)?;
    }

    let result = CascadeResult {
        root_id: root_id.to_string(),
        invalidated,
        flagged_for_review: flagged,
        visited_count: visited.len(),
        duration_ms: started.elapsed().as_millis() as u64,
    };

    info!(
        root = %root_id,
        invalidated = result.invalidated.len(),
        flagged = result.flagged_for_review.len(),
        at = %Utc::now(),
        "cascade invalidation complete"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DependencyRelation;
    use pretty_assertions::assert_eq;

    fn setup() -> (KnowledgeLedger, String, String, String) {
        let ledger = KnowledgeLedger::in_memory().unwrap();
        let root = ledger.create_node("root claim", 20, None, vec![]).unwrap();
        let strong_dep = ledger.create_node("strongly dependent claim", 20, None, vec![]).unwrap();
        let weak_dep = ledger.create_node("weakly dependent claim", 20, None, vec![]).unwrap();
        ledger
            .add_dependency(&crate::domain::DependencyEdge::new(
                &root.id,
                &strong_dep.id,
                DependencyRelation::DerivedFrom,
                0.9,
            ))
            .unwrap();
        ledger
            .add_dependency(&crate::domain::DependencyEdge::new(
                &root.id,
                &weak_dep.id,
                DependencyRelation::Supports,
                0.3,
            ))
            .unwrap();
        (ledger, root.id, strong_dep.id, weak_dep.id)
    }

    #[test]
    fn root_and_strong_dependents_are_deprecated() {
        let (ledger, root, strong_dep, weak_dep) = setup();
        let result = cascade_invalidate(&ledger, &root, "tester", "root retracted").unwrap();

        assert_eq!(result.invalidated.len(), 2);
        assert!(result.invalidated.contains(&root));
        assert!(result.invalidated.contains(&strong_dep));
        assert_eq!(result.flagged_for_review, vec![weak_dep.clone()]);

        let root_node = ledger.get_node(&root).unwrap().unwrap();
        assert_eq!(root_node.state, NodeState::Deprecated);

        let strong_node = ledger.get_node(&strong_dep).unwrap().unwrap();
        assert_eq!(strong_node.state, NodeState::Deprecated);

        let weak_node = ledger.get_node(&weak_dep).unwrap().unwrap();
        assert_ne!(weak_node.state, NodeState::Deprecated);
        assert_eq!(weak_node.priority_queue, PriorityQueue::Hot);
    }

    #[test]
    fn node_reachable_via_both_weak_and_strong_edge_is_invalidated_not_flagged() {
        // 0 -> 2 (0.3), 0 -> 1 (0.9), 1 -> 2 (0.9): node 2 is first seen
        // through the weak edge from 0, then reached again through the
        // strong edge from 1. The strong path must win: 2 ends up
        // invalidated and is never also left in the review set.
        let ledger = KnowledgeLedger::in_memory().unwrap();
        let n0 = ledger.create_node("root", 20, None, vec![]).unwrap();
        let n1 = ledger.create_node("mid", 20, None, vec![]).unwrap();
        let n2 = ledger.create_node("leaf", 20, None, vec![]).unwrap();

        ledger
            .add_dependency(&crate::domain::DependencyEdge::new(&n0.id, &n2.id, DependencyRelation::Supports, 0.3))
            .unwrap();
        ledger
            .add_dependency(&crate::domain::DependencyEdge::new(&n0.id, &n1.id, DependencyRelation::DerivedFrom, 0.9))
            .unwrap();
        ledger
            .add_dependency(&crate::domain::DependencyEdge::new(&n1.id, &n2.id, DependencyRelation::DerivedFrom, 0.9))
            .unwrap();

        let result = cascade_invalidate(&ledger, &n0.id, "tester", "diamond").unwrap();

        assert!(result.invalidated.contains(&n2.id));
        assert!(!result.flagged_for_review.contains(&n2.id));

        let leaf = ledger.get_node(&n2.id).unwrap().unwrap();
        assert_eq!(leaf.state, NodeState::Deprecated);
    }

    #[test]
    fn cascade_visits_each_node_at_most_once() {
        let (ledger, root, strong_dep, _weak_dep) = setup();
        // Introduce a cycle back to root; BFS must not loop forever.
        ledger
            .add_dependency(&crate::domain::DependencyEdge::new(
                &strong_dep,
                &root,
                DependencyRelation::Assumes,
                0.95,
            ))
            .unwrap();
        let result = cascade_invalidate(&ledger, &root, "tester", "cycle test").unwrap();
        assert!(result.visited_count <= 3);
    }

    #[test]
    fn no_dependents_yields_only_root_invalidated() {
        let ledger = KnowledgeLedger::in_memory().unwrap();
        let node = ledger.create_node("isolated claim", 20, None, vec![]).unwrap();
        let result = cascade_invalidate(&ledger, &node.id, "tester", "no-op").unwrap();
        assert_eq!(result.invalidated, vec![node.id.clone()]);
        assert!(result.flagged_for_review.is_empty());
        assert_eq!(result.visited_count, 1);
    }

    proptest::proptest! {
        /// I4 / §8: cascade BFS over an arbitrary directed graph (cycles
        /// included) visits each node at most once and never double-counts
        /// a node between the invalidated and flagged-for-review sets.
        #[test]
        fn cascade_visits_each_node_at_most_once_on_random_graphs(
            node_count in 2usize..8,
            edges in proptest::collection::vec((0usize..8, 0usize..8, 0.0f64..1.0f64), 0..16),
        ) {
            let ledger = KnowledgeLedger::in_memory().unwrap();
            let ids: Vec<String> = (0..node_count)
                .map(|i| ledger.create_node(&format!("claim {i}"), 20, None, vec![]).unwrap().id)
                .collect();

            for (src, dst, strength) in &edges {
                let src = src % node_count;
                let dst = dst % node_count;
                if src == dst {
                    continue;
                }
                let _ = ledger.add_dependency(&crate::domain::DependencyEdge::new(
                    &ids[src],
                    &ids[dst],
                    DependencyRelation::DerivedFrom,
                    *strength,
                ));
            }

            let result = cascade_invalidate(&ledger, &ids[0], "tester", "proptest cycle check").unwrap();

            proptest::prop_assert!(result.invalidated.len() <= node_count);
            proptest::prop_assert!(result.visited_count <= node_count);
            proptest::prop_assert_eq!(result.visited_count, result.invalidated.len());

            // The visited set dedups the invalidated set: no duplicates.
            let invalidated_unique: std::collections::HashSet<&String> =
                result.invalidated.iter().collect();
            proptest::prop_assert_eq!(invalidated_unique.len(), result.invalidated.len());

            // A node already invalidated is never also flagged for review.
            for id in &result.flagged_for_review {
                proptest::prop_assert!(!result.invalidated.contains(id));
            }
        }
    }
}
