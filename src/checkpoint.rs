//! Checkpoint / rollback (§4.9): a labeled, content-hashed snapshot of a
//! selected set of nodes, and the ability to restore them.

use chrono::Utc;
use rusqlite::params;
use sha2::{Digest, Sha256};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{Checkpoint, NodeSnapshot, NodeState, PriorityQueue};
use crate::error::{Error, Result};
use crate::ledger::{KnowledgeLedger, TransitionOptions};

/// Outcome of a rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackResult {
    pub invalidated_count: usize,
    pub restored_count: usize,
}

/// `create(userId, label, memberIds, opts)` (§4.9): sorts member ids for
/// a stable hash, captures a per-node snapshot of each member, and
/// persists the checkpoint.
#[instrument(skip(ledger, label, description))]
pub fn create(
    ledger: &KnowledgeLedger,
    user_id: &str,
    label: &str,
    description: Option<&str>,
    member_ids: &[String],
) -> Result<Checkpoint> {
    let mut sorted_ids = member_ids.to_vec();
    sorted_ids.sort();

    let mut snapshots = Vec::with_capacity(sorted_ids.len());
    let mut hasher = Sha256::new();
    for id in &sorted_ids {
        let node = ledger
            .get_node(id)?
            .ok_or_else(|| Error::not_found("node", id))?;
        hasher.update(id.as_bytes());
        hasher.update(node.state.to_string().as_bytes());
        hasher.update(node.confidence.to_le_bytes());
        snapshots.push(NodeSnapshot {
            node_id: node.id.clone(),
            state: node.state,
            branch: node.branch,
            confidence: node.confidence,
            velocity: node.velocity,
            priority_queue: node.priority_queue,
            audit_trail_length: node.audit_trail.len(),
        });
    }
    let state_hash = format!("{:x}", hasher.finalize());

    let checkpoint = Checkpoint {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        label: label.to_string(),
        description: description.map(|s| s.to_string()),
        state_hash,
        member_node_ids: sorted_ids,
        snapshots,
        created_at: Utc::now(),
    };

    persist(ledger, &checkpoint)?;
    info!(checkpoint_id = %checkpoint.id, members = checkpoint.member_node_ids.len(), "checkpoint created");
    Ok(checkpoint)
}

fn persist(ledger: &KnowledgeLedger, checkpoint: &Checkpoint) -> Result<()> {
    ledger.with_conn_pub(|conn| {
        conn.execute(
            "INSERT INTO checkpoints (id, user_id, label, description, state_hash,
                member_node_ids, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                checkpoint.id,
                checkpoint.user_id,
                checkpoint.label,
                checkpoint.description,
                checkpoint.state_hash,
                serde_json::to_string(&checkpoint.member_node_ids).unwrap_or_default(),
                checkpoint.created_at.to_rfc3339(),
            ],
        )?;
        for snap in &checkpoint.snapshots {
            conn.execute(
                "INSERT INTO checkpoint_snapshots (checkpoint_id, node_id, state, branch,
                    confidence, velocity, priority_queue, audit_trail_length)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    checkpoint.id,
                    snap.node_id,
                    snap.state.to_string(),
                    snap.branch.to_string(),
                    snap.confidence,
                    snap.velocity,
                    snap.priority_queue.to_string(),
                    snap.audit_trail_length as i64,
                ],
            )?;
        }
        Ok(())
    })
}

/// `rollback(checkpointId, userId)` (§4.9): nodes created after the
/// checkpoint (and absent from its snapshot set) are deprecated; each
/// snapshotted node is transitioned back to its captured state, with a
/// `ROLLBACK` audit entry.
#[instrument(skip(ledger))]
pub fn rollback(ledger: &KnowledgeLedger, checkpoint_id: &str, user_id: &str) -> Result<RollbackResult> {
    let (checkpoint, created_at) = load(ledger, checkpoint_id)?;

    let snapshotted: std::collections::HashSet<&str> =
        checkpoint.member_node_ids.iter().map(String::as_str).collect();

    let mut restored_count = 0;
    for snap in &checkpoint.snapshots {
        ledger.transition_state(
            &snap.node_id,
            snap.state,
            TransitionOptions {
                trigger: "ROLLBACK".into(),
                agent: user_id.into(),
                reason: Some(format!("restored from checkpoint {checkpoint_id}")),
                new_confidence: Some(snap.confidence),
                anchor_sources: if snap.state == NodeState::Verified {
                    vec![crate::domain::Source::new("rollback-anchor", crate::domain::SourceType::Other, "checkpoint", 100)]
                } else {
                    vec![]
                },
                ..Default::default()
            },
        )?;
        // `transitionState` re-derives velocity/queue from the rollback-time
        // confidence delta, which is not the snapshotted value; write the
        // snapshot's queue placement back explicitly (§4.9, §8 round-trip).
        ledger.restore_velocity_and_queue(&snap.node_id, snap.velocity, snap.priority_queue)?;
        restored_count += 1;
    }

    let created_after: Vec<String> = ledger.nodes_created_after(created_at)?
        .into_iter()
        .filter(|id| !snapshotted.contains(id.as_str()))
        .collect();

    let mut invalidated_count = 0;
    for node_id in &created_after {
        ledger.transition_state(
            node_id,
            NodeState::Deprecated,
            TransitionOptions {
                trigger: "ROLLBACK".into(),
                agent: user_id.into(),
                reason: Some(format!("created after checkpoint {checkpoint_id}")),
                ..Default::default()
            },
        )?;
        invalidated_count += 1;
    }

    info!(checkpoint_id, restored_count, invalidated_count, "rollback complete");
    Ok(RollbackResult {
        invalidated_count,
        restored_count,
    })
}

fn load(ledger: &KnowledgeLedger, checkpoint_id: &str) -> Result<(Checkpoint, chrono::DateTime<Utc>)> {
    use rusqlite::OptionalExtension;

    let header: Option<(String, String, Option<String>, String, String, String)> = ledger
        .with_conn_pub(|conn| {
            conn.query_row(
                "SELECT user_id, label, description, state_hash, member_node_ids, created_at
                 FROM checkpoints WHERE id = ?1",
                [checkpoint_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()
        })?;
    let Some((user_id, label, description, state_hash, member_ids_json, created_at)) = header
    else {
        return Err(Error::not_found("checkpoint", checkpoint_id));
    };

    ledger.with_conn_pub(|conn| {
        let mut stmt = conn.prepare(
            "SELECT node_id, state, branch, confidence, velocity, priority_queue,
                    audit_trail_length FROM checkpoint_snapshots WHERE checkpoint_id = ?1",
        )?;
        let snapshots = stmt
            .query_map([checkpoint_id], |row| {
                let state: String = row.get(1)?;
                let branch: String = row.get(2)?;
                let queue: String = row.get(5)?;
                Ok(NodeSnapshot {
                    node_id: row.get(0)?,
                    state: parse_state(&state),
                    branch: parse_branch(&branch),
                    confidence: row.get(3)?,
                    velocity: row.get(4)?,
                    priority_queue: parse_queue(&queue),
                    audit_trail_length: row.get::<_, i64>(6)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let member_node_ids: Vec<String> =
            serde_json::from_str(&member_ids_json).unwrap_or_default();
        let created_at_dt = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok((
            Checkpoint {
                id: checkpoint_id.to_string(),
                user_id,
                label,
                description,
                state_hash,
                member_node_ids,
                snapshots,
                created_at: created_at_dt,
            },
            created_at_dt,
        ))
    })
}

fn parse_state(s: &str) -> NodeState {
    match s {
        "WATCHING" => NodeState::Watching,
        "VERIFIED" => NodeState::Verified,
        "REJECTED" => NodeState::Rejected,
        "DEPRECATED" => NodeState::Deprecated,
        _ => NodeState::PendingProof,
    }
}

fn parse_branch(s: &str) -> crate::domain::Branch {
    match s {
        "MIMIR" => crate::domain::Branch::Mimir,
        "VOLVA" => crate::domain::Branch::Volva,
        _ => crate::domain::Branch::Hugin,
    }
}

fn parse_queue(s: &str) -> crate::domain::PriorityQueue {
    match s {
        "HOT" => crate::domain::PriorityQueue::Hot,
        "COLD" => crate::domain::PriorityQueue::Cold,
        _ => crate::domain::PriorityQueue::Warm,
    }
}
