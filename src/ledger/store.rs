//! The Knowledge Ledger (§4.7): node CRUD, transitions, audit,
//! dependencies — realized over an embedded SQLite store.
//!
//! Follows the corpus's `Arc<Mutex<Connection>>` + `with_conn` idiom: a
//! single connection guarded by a mutex serializes all mutations on a
//! node (§5 "Ordering & serialization"), and every public method maps
//! `rusqlite::Error` into the crate's own `Error::PersistenceFailure`.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::schema::initialize_schema;
use crate::domain::{
    queue_of, AuditEntry, Branch, DependencyEdge, DependencyRelation, KnowledgeNode, NodeState,
    PriorityQueue, Source, SourceType,
};
use crate::error::{Error, Result};

/// Options accepted by `transition_state`.
#[derive(Debug, Clone, Default)]
pub struct TransitionOptions {
    pub trigger: String,
    pub agent: String,
    pub reason: Option<String>,
    pub new_confidence: Option<u8>,
    pub vote_record: Option<serde_json::Value>,
    /// Sources offered as anchors for this transition; checked against I3
    /// when the target state is `VERIFIED`.
    pub anchor_sources: Vec<Source>,
}

/// The embedded, persistent Knowledge Ledger.
pub struct KnowledgeLedger {
    conn: Arc<Mutex<Connection>>,
}

impl KnowledgeLedger {
    /// Open (or create) a ledger at a filesystem path.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        if !super::schema::is_initialized(&conn) {
            initialize_schema(&conn)?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an ephemeral in-memory ledger, primarily for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::persistence_failure("ledger connection lock poisoned"))?;
        f(&conn).map_err(|e| Error::persistence_failure(e.to_string()))
    }

    /// Exposes the connection to sibling modules (cascade, checkpoint)
    /// that need direct access to tables the ledger's own API does not
    /// cover (checkpoints and their snapshots).
    pub fn with_conn_pub<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        self.with_conn(f)
    }

    /// Ids of nodes created strictly after `since`, in no particular
    /// order. Used by rollback to find nodes absent from a checkpoint.
    pub fn nodes_created_after(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM knowledge_nodes WHERE created_at > ?1")?;
            let rows = stmt.query_map([since.to_rfc3339()], |row| row.get::<_, String>(0))?;
            rows.collect()
        })
    }

    /// `createNode(statement, opts) -> Node` (§4.7): initializes with a
    /// branch-consistent state and appends a `CREATE` audit entry.
    #[instrument(skip(self, statement))]
    pub fn create_node(
        &self,
        statement: &str,
        confidence: u8,
        domain: Option<&str>,
        tags: Vec<String>,
    ) -> Result<KnowledgeNode> {
        let id = Uuid::new_v4().to_string();
        let mut node = KnowledgeNode::new(&id, statement, confidence)?;
        if let Some(d) = domain {
            node = node.with_domain(d);
        }
        node = node.with_tags(tags);
        node.check_branch_consistency()?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO knowledge_nodes (id, statement, domain, tags, branch, state,
                    confidence, velocity, priority_queue, idle_cycles, shapley_attribution,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    node.id,
                    node.statement,
                    node.domain,
                    serde_json::to_string(&node.tags).unwrap_or_default(),
                    node.branch.to_string(),
                    node.state.to_string(),
                    node.confidence,
                    node.velocity,
                    node.priority_queue.to_string(),
                    node.idle_cycles,
                    "{}",
                    node.created_at.to_rfc3339(),
                    node.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;

        self.append_audit(&node.id, &node.audit_trail[0])?;
        info!(node_id = %node.id, branch = %node.branch, "node created");
        Ok(node)
    }

    /// Fetch a node by id.
    pub fn get_node(&self, id: &str) -> Result<Option<KnowledgeNode>> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, statement, domain, tags, branch, state, confidence, velocity,
                        priority_queue, last_scan, next_scan, idle_cycles, shapley_attribution,
                        created_at, updated_at
                 FROM knowledge_nodes WHERE id = ?1",
                [id],
                row_to_partial_node,
            )
            .optional()
        })?;

        let Some(mut node) = row else { return Ok(None) };
        node.audit_trail = self.get_audit_trail(id)?;
        Ok(Some(node))
    }

    fn get_audit_trail(&self, node_id: &str) -> Result<Vec<AuditEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT ts, action, from_state, to_state, trigger, agent, reason,
                        confidence_delta, vote_record
                 FROM audit_trail WHERE node_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([node_id], |row| {
                let ts: String = row.get(0)?;
                let from_state: Option<String> = row.get(2)?;
                let to_state: Option<String> = row.get(3)?;
                let vote_record: Option<String> = row.get(8)?;
                Ok(AuditEntry {
                    ts: DateTime::parse_from_rfc3339(&ts)
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                    action: row.get(1)?,
                    from_state: from_state.and_then(|s| parse_state(&s)),
                    to_state: to_state.and_then(|s| parse_state(&s)),
                    trigger: row.get(4)?,
                    agent: row.get(5)?,
                    reason: row.get(6)?,
                    confidence_delta: row.get(7)?,
                    vote_record: vote_record.and_then(|v| serde_json::from_str(&v).ok()),
                })
            })?;
            rows.collect()
        })
    }

    fn append_audit(&self, node_id: &str, entry: &AuditEntry) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audit_trail (node_id, ts, action, from_state, to_state, trigger,
                    agent, reason, confidence_delta, vote_record)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    node_id,
                    entry.ts.to_rfc3339(),
                    entry.action,
                    entry.from_state.map(|s| s.to_string()),
                    entry.to_state.map(|s| s.to_string()),
                    entry.trigger,
                    entry.agent,
                    entry.reason,
                    entry.confidence_delta,
                    entry
                        .vote_record
                        .as_ref()
                        .map(|v| v.to_string()),
                ],
            )?;
            Ok(())
        })
    }

    /// `transitionState` (§4.7): on confidence change recomputes velocity
    /// and re-derives the queue, appends exactly one `TRANSITION` audit
    /// entry, and enforces I3.
    #[instrument(skip(self, opts))]
    pub fn transition_state(
        &self,
        id: &str,
        new_state: NodeState,
        opts: TransitionOptions,
    ) -> Result<KnowledgeNode> {
        let mut node = self
            .get_node(id)?
            .ok_or_else(|| Error::not_found("node", id))?;

        if new_state == NodeState::Verified {
            self.enforce_verification_invariant(&node, &opts)?;
        }

        let from_state = node.state;
        let mut confidence_delta: Option<i16> = None;

        if let Some(new_confidence) = opts.new_confidence {
            let now = Utc::now();
            let dt_ms = (now - node.updated_at).num_milliseconds().max(1) as f64;
            let velocity = (new_confidence as f64 - node.confidence as f64) / dt_ms;
            confidence_delta = Some(new_confidence as i16 - node.confidence as i16);

            node.confidence = new_confidence;
            node.branch = Branch::for_confidence(new_confidence);
            node.velocity = velocity;
            node.priority_queue = queue_of(velocity);
            node.check_branch_consistency()?;
            node.updated_at = now;
        }

        node.state = new_state;

        self.with_conn(|conn| {
            conn.execute(
                "UPDATE knowledge_nodes SET state = ?1, confidence = ?2, branch = ?3,
                    velocity = ?4, priority_queue = ?5, updated_at = ?6 WHERE id = ?7",
                rusqlite::params![
                    node.state.to_string(),
                    node.confidence,
                    node.branch.to_string(),
                    node.velocity,
                    node.priority_queue.to_string(),
                    node.updated_at.to_rfc3339(),
                    node.id,
                ],
            )?;
            Ok(())
        })?;

        let mut entry = AuditEntry::new("TRANSITION", &opts.trigger, &opts.agent)
            .with_transition(Some(from_state), new_state);
        if let Some(reason) = &opts.reason {
            entry = entry.with_reason(reason.clone());
        }
        if let Some(delta) = confidence_delta {
            entry = entry.with_confidence_delta(delta);
        }
        if let Some(vote_record) = opts.vote_record.clone() {
            entry = entry.with_vote_record(vote_record);
        }
        self.append_audit(id, &entry)?;
        node.audit_trail.push(entry);

        Ok(node)
    }

    /// I3: a transition to `VERIFIED` requires at least one anchored
    /// source (`trustScore >= 80`) with branch compatibility, and a HUGIN
    /// node may never transition directly to `VERIFIED` without first
    /// passing through `VOLVA` with fresh evidence.
    fn enforce_verification_invariant(
        &self,
        node: &KnowledgeNode,
        opts: &TransitionOptions,
    ) -> Result<()> {
        if node.branch == Branch::Hugin {
            return Err(Error::verification_unsupported(
                "HUGIN nodes must pass through VOLVA with fresh evidence before VERIFIED",
            ));
        }
        let has_anchor = opts.anchor_sources.iter().any(|s| s.is_anchor());
        if !has_anchor {
            return Err(Error::verification_unsupported(
                "VERIFIED requires at least one source with trustScore >= 80",
            ));
        }
        Ok(())
    }

    /// `addDependency(src, tgt, relation, strength)` — upserts on `(src,
    /// tgt)`.
    pub fn add_dependency(&self, edge: &DependencyEdge) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO knowledge_dependencies (source_id, target_id, relation, strength)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (source_id, target_id) DO UPDATE SET
                    relation = excluded.relation, strength = excluded.strength",
                rusqlite::params![
                    edge.source,
                    edge.target,
                    relation_to_str(edge.relation),
                    edge.strength,
                ],
            )?;
            Ok(())
        })
    }

    /// Edges whose `source` is `node_id` (the direction cascade traverses).
    pub fn get_dependents(&self, node_id: &str) -> Result<Vec<DependencyEdge>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT source_id, target_id, relation, strength FROM knowledge_dependencies
                 WHERE source_id = ?1",
            )?;
            let rows = stmt.query_map([node_id], |row| {
                let relation: String = row.get(2)?;
                Ok(DependencyEdge {
                    source: row.get(0)?,
                    target: row.get(1)?,
                    relation: parse_relation(&relation),
                    strength: row.get(3)?,
                })
            })?;
            rows.collect()
        })
    }

    /// `scheduleReview(id, queue)` — moves node into queue, zeros
    /// `idleCycles`, appends a `QUEUE_CHANGE` audit entry.
    pub fn schedule_review(&self, id: &str, queue: PriorityQueue) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE knowledge_nodes SET priority_queue = ?1, idle_cycles = 0,
                    updated_at = ?2 WHERE id = ?3",
                rusqlite::params![queue.to_string(), Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })?;
        self.append_audit(
            id,
            &AuditEntry::new("QUEUE_CHANGE", "scheduler", "ledger")
                .with_reason(format!("scheduled into {queue}")),
        )
    }

    /// Overwrites `velocity`/`priority_queue` in place with no audit entry
    /// and no recomputation. Used by checkpoint rollback (§4.9) to restore
    /// a snapshot's queue placement after `transitionState` has already
    /// re-derived (and thereby clobbered) it from the rollback-time delta.
    pub fn restore_velocity_and_queue(
        &self,
        id: &str,
        velocity: f64,
        queue: PriorityQueue,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE knowledge_nodes SET velocity = ?1, priority_queue = ?2 WHERE id = ?3",
                rusqlite::params![velocity, queue.to_string(), id],
            )?;
            Ok(())
        })
    }

    /// `updateScanStatus(id, {changed, newConfidence?})` (§4.7): if not
    /// changed, increments `idleCycles`; at `idleCycles >= 3`, demotes the
    /// queue and resets `idleCycles`.
    pub fn update_scan_status(
        &self,
        id: &str,
        changed: bool,
        next_scan: DateTime<Utc>,
    ) -> Result<KnowledgeNode> {
        let node = self.get_node(id)?.ok_or_else(|| Error::not_found("node", id))?;

        let (idle_cycles, queue) = if changed {
            (0, node.priority_queue)
        } else {
            let cycles = node.idle_cycles + 1;
            if cycles >= 3 {
                (0, node.priority_queue.demote())
            } else {
                (cycles, node.priority_queue)
            }
        };

        self.with_conn(|conn| {
            conn.execute(
                "UPDATE knowledge_nodes SET idle_cycles = ?1, priority_queue = ?2,
                    last_scan = ?3, next_scan = ?4, updated_at = ?5 WHERE id = ?6",
                rusqlite::params![
                    idle_cycles,
                    queue.to_string(),
                    Utc::now().to_rfc3339(),
                    next_scan.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                    id,
                ],
            )?;
            Ok(())
        })?;

        self.get_node(id)?.ok_or_else(|| Error::not_found("node", id))
    }

    /// `updateShapleyAttribution(id, map)`.
    pub fn update_shapley_attribution(&self, id: &str, map: &HashMap<String, f64>) -> Result<()> {
        let json = serde_json::to_string(map)?;
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE knowledge_nodes SET shapley_attribution = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![json, Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
    }

    /// Nodes currently in `queue` whose `next_scan` has elapsed, excluding
    /// terminal states, ordered by `next_scan ASC NULLS FIRST`, capped at
    /// `limit`.
    pub fn due_for_scan(&self, queue: PriorityQueue, limit: usize) -> Result<Vec<KnowledgeNode>> {
        let ids: Vec<String> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM knowledge_nodes
                 WHERE priority_queue = ?1
                   AND state NOT IN ('DEPRECATED', 'REJECTED')
                   AND (next_scan IS NULL OR next_scan <= ?2)
                 ORDER BY (next_scan IS NOT NULL), next_scan ASC
                 LIMIT ?3",
            )?;
            let now = Utc::now().to_rfc3339();
            let rows = stmt.query_map(rusqlite::params![queue.to_string(), now, limit as i64], |row| {
                row.get::<_, String>(0)
            })?;
            rows.collect()
        })?;

        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(node) = self.get_node(&id)? {
                nodes.push(node);
            } else {
                warn!(node_id = %id, "due-for-scan node vanished between query and fetch");
            }
        }
        Ok(nodes)
    }

    /// Count of nodes, used by diagnostics/tests.
    pub fn count_nodes(&self) -> Result<i64> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM knowledge_nodes", [], |r| r.get(0)))
    }

    /// Upserts a source into the `sources` table, keyed on `(source_type,
    /// identifier)`. Called whenever a source is offered as evidence, so
    /// repeated citations of the same source accumulate no duplicates.
    pub fn record_source(&self, source: &Source) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sources (id, source_type, identifier, url, title, authors,
                    trust_score, retrieved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (source_type, identifier) DO UPDATE SET
                    url = excluded.url, title = excluded.title, authors = excluded.authors,
                    trust_score = excluded.trust_score, retrieved_at = excluded.retrieved_at",
                rusqlite::params![
                    source.id,
                    source_type_to_str(source.source_type),
                    source.identifier,
                    source.url,
                    source.title,
                    serde_json::to_string(&source.authors).unwrap_or_default(),
                    source.trust_score,
                    source.retrieved_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Records a completed council deliberation, serialized whole as its
    /// `payload` (the council's own shape is rich enough that a column per
    /// field would just duplicate `CouncilDeliberation`'s own schema).
    pub fn record_deliberation(
        &self,
        id: &str,
        request_id: &str,
        query: &str,
        payload: &serde_json::Value,
        total_duration_ms: i64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO deliberations (id, request_id, query, payload, total_duration_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (id) DO NOTHING",
                rusqlite::params![id, request_id, query, payload.to_string(), total_duration_ms],
            )?;
            Ok(())
        })
    }

    /// Records per-member Shapley rows alongside the node's own
    /// `shapley_attribution` JSON column (`update_shapley_attribution`),
    /// so per-member history survives even if a later deliberation
    /// overwrites the node's own summary column.
    pub fn record_shapley_attribution(&self, attribution: &crate::shapley::ShapleyAttribution) -> Result<()> {
        self.with_conn(|conn| {
            for member in &attribution.members {
                conn.execute(
                    "INSERT INTO shapley_attributions (deliberation_id, member, phi, percentage)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (deliberation_id, member) DO UPDATE SET
                        phi = excluded.phi, percentage = excluded.percentage",
                    rusqlite::params![
                        attribution.deliberation_id,
                        member.member.to_string(),
                        member.phi,
                        member.percentage,
                    ],
                )?;
            }
            Ok(())
        })
    }

    /// Records an alert raised by the watcher, mirroring the in-process
    /// `AlertBuffer` into durable storage.
    pub fn record_alert(&self, alert: &crate::watcher::Alert) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO alerts (node_id, kind, severity, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    alert.node_id,
                    alert_kind_to_str(alert.kind),
                    alert_severity_to_str(alert.severity),
                    alert.message,
                    alert.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }
}

fn source_type_to_str(source_type: crate::domain::SourceType) -> &'static str {
    use crate::domain::SourceType;
    match source_type {
        SourceType::Arxiv => "ARXIV",
        SourceType::Pubmed => "PUBMED",
        SourceType::Web => "WEB",
        SourceType::Other => "OTHER",
    }
}

fn alert_kind_to_str(kind: crate::watcher::AlertKind) -> &'static str {
    use crate::watcher::AlertKind;
    match kind {
        AlertKind::VelocitySpike => "VELOCITY_SPIKE",
        AlertKind::Contradiction => "CONTRADICTION",
        AlertKind::ConfidenceDrop => "CONFIDENCE_DROP",
    }
}

fn alert_severity_to_str(severity: crate::watcher::AlertSeverity) -> &'static str {
    use crate::watcher::AlertSeverity;
    match severity {
        AlertSeverity::Low => "LOW",
        AlertSeverity::Medium => "MEDIUM",
        AlertSeverity::High => "HIGH",
        AlertSeverity::Critical => "CRITICAL",
    }
}

fn relation_to_str(relation: DependencyRelation) -> &'static str {
    match relation {
        DependencyRelation::DerivedFrom => "DERIVED_FROM",
        DependencyRelation::Assumes => "ASSUMES",
        DependencyRelation::Supports => "SUPPORTS",
        DependencyRelation::Contradicts => "CONTRADICTS",
    }
}

fn parse_relation(s: &str) -> DependencyRelation {
    match s {
        "ASSUMES" => DependencyRelation::Assumes,
        "SUPPORTS" => DependencyRelation::Supports,
        "CONTRADICTS" => DependencyRelation::Contradicts,
        _ => DependencyRelation::DerivedFrom,
    }
}

fn parse_state(s: &str) -> Option<NodeState> {
    Some(match s {
        "PENDING_PROOF" => NodeState::PendingProof,
        "WATCHING" => NodeState::Watching,
        "VERIFIED" => NodeState::Verified,
        "REJECTED" => NodeState::Rejected,
        "DEPRECATED" => NodeState::Deprecated,
        _ => return None,
    })
}

fn parse_branch(s: &str) -> Branch {
    match s {
        "MIMIR" => Branch::Mimir,
        "VOLVA" => Branch::Volva,
        _ => Branch::Hugin,
    }
}

fn parse_queue(s: &str) -> PriorityQueue {
    match s {
        "HOT" => PriorityQueue::Hot,
        "COLD" => PriorityQueue::Cold,
        _ => PriorityQueue::Warm,
    }
}

fn row_to_partial_node(row: &rusqlite::Row) -> rusqlite::Result<KnowledgeNode> {
    let tags: String = row.get(3)?;
    let branch: String = row.get(4)?;
    let state: String = row.get(5)?;
    let queue: String = row.get(8)?;
    let last_scan: Option<String> = row.get(9)?;
    let next_scan: Option<String> = row.get(10)?;
    let shapley: String = row.get(12)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;

    Ok(KnowledgeNode {
        id: row.get(0)?,
        statement: row.get(1)?,
        domain: row.get(2)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        branch: parse_branch(&branch),
        state: parse_state(&state).unwrap_or(NodeState::PendingProof),
        confidence: row.get(6)?,
        velocity: row.get(7)?,
        priority_queue: parse_queue(&queue),
        last_scan: last_scan.and_then(|s| parse_rfc3339(&s)),
        next_scan: next_scan.and_then(|s| parse_rfc3339(&s)),
        idle_cycles: row.get(11)?,
        audit_trail: Vec::new(),
        shapley_attribution: serde_json::from_str(&shapley).unwrap_or_default(),
        created_at: parse_rfc3339(&created_at).unwrap_or_else(Utc::now),
        updated_at: parse_rfc3339(&updated_at).unwrap_or_else(Utc::now),
    })
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn anchor_source() -> Source {
        Source {
            id: "s1".into(),
            source_type: SourceType::Arxiv,
            identifier: "1234".into(),
            url: None,
            title: None,
            authors: vec![],
            trust_score: 90,
            retrieved_at: Utc::now(),
        }
    }

    #[test]
    fn create_and_get_node_round_trips() {
        let ledger = KnowledgeLedger::in_memory().unwrap();
        let node = ledger.create_node("the sky is blue", 70, None, vec![]).unwrap();
        let fetched = ledger.get_node(&node.id).unwrap().unwrap();
        assert_eq!(fetched.statement, "the sky is blue");
        assert_eq!(fetched.confidence, 70);
        assert_eq!(fetched.audit_trail.len(), 1);
    }

    #[test]
    fn transition_to_verified_without_anchor_fails() {
        let ledger = KnowledgeLedger::in_memory().unwrap();
        let node = ledger.create_node("claim", 60, None, vec![]).unwrap();
        let result = ledger.transition_state(
            &node.id,
            NodeState::Verified,
            TransitionOptions {
                trigger: "test".into(),
                agent: "test".into(),
                new_confidence: Some(100),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::VerificationUnsupported { .. })));
    }

    #[test]
    fn transition_to_verified_with_anchor_succeeds() {
        let ledger = KnowledgeLedger::in_memory().unwrap();
        let node = ledger.create_node("claim", 60, None, vec![]).unwrap();
        let updated = ledger
            .transition_state(
                &node.id,
                NodeState::Verified,
                TransitionOptions {
                    trigger: "test".into(),
                    agent: "test".into(),
                    new_confidence: Some(100),
                    anchor_sources: vec![anchor_source()],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.state, NodeState::Verified);
        assert_eq!(updated.branch, Branch::Mimir);
    }

    #[test]
    fn hugin_node_cannot_verify_directly() {
        let ledger = KnowledgeLedger::in_memory().unwrap();
        let node = ledger.create_node("web claim", 20, None, vec![]).unwrap();
        let result = ledger.transition_state(
            &node.id,
            NodeState::Verified,
            TransitionOptions {
                trigger: "test".into(),
                agent: "test".into(),
                anchor_sources: vec![anchor_source()],
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::VerificationUnsupported { .. })));
    }

    #[test]
    fn audit_trail_is_append_only_and_non_decreasing() {
        let ledger = KnowledgeLedger::in_memory().unwrap();
        let node = ledger.create_node("claim", 60, None, vec![]).unwrap();
        let before = ledger.get_node(&node.id).unwrap().unwrap().audit_trail.len();
        ledger
            .transition_state(
                &node.id,
                NodeState::Watching,
                TransitionOptions {
                    trigger: "test".into(),
                    agent: "test".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        let after = ledger.get_node(&node.id).unwrap().unwrap().audit_trail.len();
        assert!(after > before);
    }

    #[test]
    fn idle_cycles_demote_queue_after_three() {
        let ledger = KnowledgeLedger::in_memory().unwrap();
        let node = ledger.create_node("claim", 60, None, vec![]).unwrap();
        ledger
            .schedule_review(&node.id, PriorityQueue::Hot)
            .unwrap();
        let now = Utc::now();
        for _ in 0..3 {
            ledger.update_scan_status(&node.id, false, now).unwrap();
        }
        let updated = ledger.get_node(&node.id).unwrap().unwrap();
        assert_eq!(updated.priority_queue, PriorityQueue::Warm);
        assert_eq!(updated.idle_cycles, 0);
    }

    #[test]
    fn add_dependency_upserts() {
        let ledger = KnowledgeLedger::in_memory().unwrap();
        let a = ledger.create_node("a", 60, None, vec![]).unwrap();
        let b = ledger.create_node("b", 60, None, vec![]).unwrap();
        let edge = DependencyEdge::new(&a.id, &b.id, DependencyRelation::Supports, 0.5);
        ledger.add_dependency(&edge).unwrap();
        let edge2 = DependencyEdge::new(&a.id, &b.id, DependencyRelation::Contradicts, 0.9);
        ledger.add_dependency(&edge2).unwrap();
        let deps = ledger.get_dependents(&a.id).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].relation, DependencyRelation::Contradicts);
        assert_eq!(deps[0].strength, 0.9);
    }

    #[test]
    fn record_source_upserts_on_type_and_identifier() {
        let ledger = KnowledgeLedger::in_memory().unwrap();
        let mut source = anchor_source();
        ledger.record_source(&source).unwrap();
        source.trust_score = 42;
        ledger.record_source(&source).unwrap();

        let count: i64 = ledger
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM sources", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 1);

        let trust_score: u8 = ledger
            .with_conn(|conn| {
                conn.query_row("SELECT trust_score FROM sources WHERE id = ?1", [&source.id], |r| r.get(0))
            })
            .unwrap();
        assert_eq!(trust_score, 42);
    }

    #[test]
    fn record_alert_persists_row() {
        let ledger = KnowledgeLedger::in_memory().unwrap();
        let node = ledger.create_node("claim", 60, None, vec![]).unwrap();
        ledger
            .record_alert(&crate::watcher::Alert {
                node_id: node.id.clone(),
                kind: crate::watcher::AlertKind::VelocitySpike,
                severity: crate::watcher::AlertSeverity::Medium,
                message: "spike".into(),
                created_at: Utc::now(),
            })
            .unwrap();
        let count: i64 = ledger
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM alerts WHERE node_id = ?1", [&node.id], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 1);
    }
}
