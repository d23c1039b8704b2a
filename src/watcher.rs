//! Watcher daemon (§4.10): priority-queued proactive rescanning driven
//! by epistemic velocity, with a bounded in-process alert ring buffer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::domain::{KnowledgeNode, PriorityQueue};
use crate::error::Result;
use crate::ledger::KnowledgeLedger;

/// Nodes fetched per queue firing.
pub const BATCH_SIZE: usize = 50;
/// Upper bound on concurrently in-flight rescans.
pub const MAX_CONCURRENT_CHECKS: usize = 10;
/// Most recent alerts retained in the in-process buffer.
pub const ALERT_BUFFER_CAPACITY: usize = 1000;
/// Maximum single-scan confidence swing, as a fraction of the 0-100 scale.
const MAX_CONFIDENCE_SWING: f64 = 5.0;
/// Contradiction count at or above which a confidence penalty applies.
const CONTRADICTION_PENALTY_THRESHOLD: usize = 2;
const CONTRADICTION_PENALTY: i16 = 20;

fn queue_interval(queue: PriorityQueue) -> Duration {
    match queue {
        PriorityQueue::Hot => Duration::from_secs(3600),
        PriorityQueue::Warm => Duration::from_secs(86_400),
        PriorityQueue::Cold => Duration::from_secs(7 * 86_400),
    }
}

/// What a single rescan observed about a node's continued standing.
#[derive(Debug, Clone, Default)]
pub struct WatchObservation {
    /// Trust scores of sources found corroborating (or not) the statement.
    pub trust_scores: Vec<u8>,
    /// Count of independent contradiction signals found.
    pub contradiction_count: usize,
}

/// The external collaborator a rescan calls into to re-check a claim
/// against fresh evidence (an unverified-search service, out of scope
/// here beyond its shape).
#[async_trait]
pub trait WatchCollaborator: Send + Sync {
    async fn check(&self, node: &KnowledgeNode) -> Result<WatchObservation>;
}

/// Kind of alert raised by a rescan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    VelocitySpike,
    Contradiction,
    ConfidenceDrop,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A single emitted alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub node_id: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Fixed-capacity, most-recent-1000 alert buffer shared between the
/// daemon and the pipeline.
#[derive(Default)]
pub struct AlertBuffer {
    inner: Mutex<VecDeque<Alert>>,
}

impl AlertBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(ALERT_BUFFER_CAPACITY)),
        }
    }

    pub fn push(&self, alert: Alert) {
        let mut buf = self.inner.lock();
        if buf.len() >= ALERT_BUFFER_CAPACITY {
            buf.pop_front();
        }
        buf.push_back(alert);
    }

    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        let buf = self.inner.lock();
        buf.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Atomically-updated scan statistics.
#[derive(Default)]
pub struct WatcherStats {
    pub scans_run: AtomicU64,
    pub scans_failed: AtomicU64,
    pub alerts_emitted: AtomicU64,
}

impl WatcherStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.scans_run.load(Ordering::Relaxed),
            self.scans_failed.load(Ordering::Relaxed),
            self.alerts_emitted.load(Ordering::Relaxed),
        )
    }
}

/// The watcher daemon: one batch-processing pass per queue per firing.
pub struct Watcher {
    ledger: Arc<KnowledgeLedger>,
    collaborator: Arc<dyn WatchCollaborator>,
    alerts: Arc<AlertBuffer>,
    stats: Arc<WatcherStats>,
}

impl Watcher {
    pub fn new(ledger: Arc<KnowledgeLedger>, collaborator: Arc<dyn WatchCollaborator>) -> Self {
        Self {
            ledger,
            collaborator,
            alerts: Arc::new(AlertBuffer::new()),
            stats: Arc::new(WatcherStats::default()),
        }
    }

    pub fn alerts(&self) -> Arc<AlertBuffer> {
        self.alerts.clone()
    }

    pub fn stats(&self) -> Arc<WatcherStats> {
        self.stats.clone()
    }

    /// Run a background timer for one queue; fires at `interval` and
    /// processes a batch each time. Intended to be spawned once per
    /// queue (HOT/WARM/COLD) with differing intervals.
    pub async fn run_timer(&self, queue: PriorityQueue, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.process_batch(queue).await {
                error!(?queue, error = %err, "watcher batch processing failed");
            }
        }
    }

    /// One firing: fetch up to `BATCH_SIZE` due nodes, process in
    /// windows of `MAX_CONCURRENT_CHECKS`, update statistics.
    #[instrument(skip(self))]
    pub async fn process_batch(&self, queue: PriorityQueue) -> Result<()> {
        let nodes = self.ledger.due_for_scan(queue, BATCH_SIZE)?;
        info!(?queue, count = nodes.len(), "watcher batch starting");

        let mut windows = nodes.chunks(MAX_CONCURRENT_CHECKS);
        while let Some(window) = windows.next() {
            let mut pending: FuturesUnordered<_> =
                window.iter().map(|node| self.rescan_one(node.clone())).collect();
            while let Some(result) = pending.next().await {
                self.stats.scans_run.fetch_add(1, Ordering::Relaxed);
                if let Err(err) = result {
                    self.stats.scans_failed.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %err, "single node rescan failed; batch continues");
                }
            }
        }

        Ok(())
    }

    async fn rescan_one(&self, node: KnowledgeNode) -> Result<()> {
        let observation = self.collaborator.check(&node).await?;

        let avg_trust = if observation.trust_scores.is_empty() {
            50.0
        } else {
            observation.trust_scores.iter().map(|&t| t as f64).sum::<f64>()
                / observation.trust_scores.len() as f64
        };

        let mut delta = (avg_trust - 50.0) * 0.001 * 100.0;
        delta = delta.clamp(-MAX_CONFIDENCE_SWING, MAX_CONFIDENCE_SWING);
        if observation.contradiction_count >= CONTRADICTION_PENALTY_THRESHOLD {
            delta -= CONTRADICTION_PENALTY as f64;
        }

        let old_confidence = node.confidence as f64;
        let new_confidence = (old_confidence + delta).clamp(0.0, 100.0).round() as u8;
        let changed = new_confidence != node.confidence;

        if changed {
            let now = Utc::now();
            let dt_ms = (now - node.updated_at).num_milliseconds().max(1) as f64;
            let velocity = (new_confidence as f64 - node.confidence as f64) / dt_ms;

            self.ledger.transition_state(
                &node.id,
                node.state,
                crate::ledger::TransitionOptions {
                    trigger: "WATCHER".into(),
                    agent: "watcher".into(),
                    reason: Some("scheduled rescan".into()),
                    new_confidence: Some(new_confidence),
                    ..Default::default()
                },
            )?;

            self.emit_velocity_alert(&node, velocity);
            self.emit_confidence_drop_alert(&node, old_confidence, new_confidence as f64);
        }

        if observation.contradiction_count >= CONTRADICTION_PENALTY_THRESHOLD {
            self.emit_alert(Alert {
                node_id: node.id.clone(),
                kind: AlertKind::Contradiction,
                severity: AlertSeverity::Critical,
                message: format!("{} contradiction signals found", observation.contradiction_count),
                created_at: Utc::now(),
            });
        }

        let next_scan = Utc::now() + chrono::Duration::from_std(queue_interval(node.priority_queue)).unwrap();
        self.ledger.update_scan_status(&node.id, changed, next_scan)?;

        Ok(())
    }

    fn emit_velocity_alert(&self, node: &KnowledgeNode, velocity: f64) {
        if velocity.abs() > 0.1 {
            self.emit_alert(Alert {
                node_id: node.id.clone(),
                kind: AlertKind::VelocitySpike,
                severity: AlertSeverity::High,
                message: format!("velocity {:.4} exceeds spike threshold", velocity),
                created_at: Utc::now(),
            });
        }
    }

    fn emit_confidence_drop_alert(&self, node: &KnowledgeNode, old_confidence: f64, new_confidence: f64) {
        let drop = old_confidence - new_confidence;
        if drop > 30.0 {
            self.emit_alert(Alert {
                node_id: node.id.clone(),
                kind: AlertKind::ConfidenceDrop,
                severity: AlertSeverity::High,
                message: format!("confidence dropped {drop:.0} points"),
                created_at: Utc::now(),
            });
        }
    }

    fn emit_alert(&self, alert: Alert) {
        self.stats.alerts_emitted.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.ledger.record_alert(&alert) {
            warn!(error = %err, "failed to persist alert; in-process buffer still holds it");
        }
        self.alerts.push(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VelocityTrend as _VT;

    struct StubCollaborator {
        observation: WatchObservation,
    }

    #[async_trait]
    impl WatchCollaborator for StubCollaborator {
        async fn check(&self, _node: &KnowledgeNode) -> Result<WatchObservation> {
            Ok(self.observation.clone())
        }
    }

    fn watcher(observation: WatchObservation) -> Watcher {
        let ledger = Arc::new(KnowledgeLedger::in_memory().unwrap());
        let collaborator = Arc::new(StubCollaborator { observation });
        Watcher::new(ledger, collaborator)
    }

    #[tokio::test]
    async fn high_trust_observation_raises_confidence() {
        let watcher = watcher(WatchObservation {
            trust_scores: vec![95, 90],
            contradiction_count: 0,
        });
        let node = watcher.ledger.create_node("claim", 40, None, vec![]).unwrap();
        watcher.rescan_one(node.clone()).await.unwrap();
        let updated = watcher.ledger.get_node(&node.id).unwrap().unwrap();
        assert!(updated.confidence > 40);
    }

    #[tokio::test]
    async fn contradiction_signals_apply_penalty_and_alert() {
        let watcher = watcher(WatchObservation {
            trust_scores: vec![50],
            contradiction_count: 3,
        });
        let node = watcher.ledger.create_node("claim", 60, None, vec![]).unwrap();
        watcher.rescan_one(node.clone()).await.unwrap();
        let updated = watcher.ledger.get_node(&node.id).unwrap().unwrap();
        assert!(updated.confidence < 60);
        assert!(watcher.alerts().recent(10).iter().any(|a| a.kind == AlertKind::Contradiction));
    }

    #[tokio::test]
    async fn velocity_spike_alert_is_severity_high() {
        // Scenario 6 (§8): a node going 80 -> 20 in 1s yields |v| = 60,
        // which crosses the spike threshold and must alert at HIGH.
        let watcher = watcher(WatchObservation {
            trust_scores: vec![50],
            contradiction_count: 0,
        });
        let node = watcher.ledger.create_node("claim", 80, None, vec![]).unwrap();
        watcher.emit_velocity_alert(&node, 60.0);
        let alerts = watcher.alerts().recent(10);
        let spike = alerts.iter().find(|a| a.kind == AlertKind::VelocitySpike).unwrap();
        assert_eq!(spike.severity, AlertSeverity::High);
    }

    #[test]
    fn alert_buffer_is_bounded() {
        let buffer = AlertBuffer::new();
        for i in 0..(ALERT_BUFFER_CAPACITY + 10) {
            buffer.push(Alert {
                node_id: format!("n{i}"),
                kind: AlertKind::VelocitySpike,
                severity: AlertSeverity::Low,
                message: String::new(),
                created_at: Utc::now(),
            });
        }
        assert_eq!(buffer.len(), ALERT_BUFFER_CAPACITY);
    }

    #[test]
    fn confidence_swing_is_capped_by_const() {
        assert_eq!(MAX_CONFIDENCE_SWING, 5.0);
        let _ = _VT::Stable;
    }
}
