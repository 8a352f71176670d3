//! The audit state machine.
//!
//! [`Auditor`] owns the feed registry, the catch-up table and the expectation
//! ledger, and turns feed notifications, expirations and probe results into
//! [`AuditEvent`]s. It never blocks and never awaits; [`Overwatch`] feeds
//! it from a single task, which is what keeps the ledger free of races.
//!
//! [`Overwatch`]: crate::Overwatch

use crate::catchup::{CatchUpSynchronizer, Readiness};
use crate::change::ChangeEvent;
use crate::event::{AuditEvent, ErrorCause, FulfillReason};
use crate::feed::{Admission, FeedKey, FeedRegistry};
use crate::resolver::{Resolution, Verdict};
use crate::source::FeedNotification;
use crate::topology::Topology;
use crate::tracker::{Expired, FulfillmentTracker, Observation};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditStats {
    /// Changes that reached the fulfillment tracker.
    pub changes_processed: u64,
    /// Expectations armed.
    pub expectations_set: u64,
    /// Expectations fulfilled by a live report.
    pub fulfilled: u64,
    /// Expired expectations the probe showed to be fulfilled.
    pub false_positives: u64,
    /// Expectations confirmed unfulfilled.
    pub unfulfilled: u64,
    /// Probes issued.
    pub probes_issued: u64,
    /// Feed-level errors and protocol violations.
    pub errors: u64,
    /// Databases that went live.
    pub databases_live: u64,
}

/// Single-owner audit state.
#[derive(Debug)]
pub struct Auditor {
    topology: Topology,
    feeds: FeedRegistry,
    catchup: CatchUpSynchronizer,
    tracker: FulfillmentTracker,
    stats: AuditStats,
}

impl Auditor {
    /// Creates an auditor for `topology` with the given fulfillment window.
    pub fn new(topology: Topology, timeout: Duration) -> Self {
        Self {
            topology,
            feeds: FeedRegistry::new(),
            catchup: CatchUpSynchronizer::new(),
            tracker: FulfillmentTracker::new(timeout),
            stats: AuditStats::default(),
        }
    }

    /// The watched topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Feed table.
    pub fn feeds(&self) -> &FeedRegistry {
        &self.feeds
    }

    /// Expectation ledger.
    pub fn tracker(&self) -> &FulfillmentTracker {
        &self.tracker
    }

    /// Counters so far.
    pub fn stats(&self) -> &AuditStats {
        &self.stats
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tracker.next_deadline()
    }

    /// Registers one buffering feed per node for `database` and returns
    /// their keys in topology order.
    pub fn watch_database(&mut self, database: &str) -> Vec<FeedKey> {
        let nodes: Vec<String> = self
            .topology
            .nodes()
            .iter()
            .map(|node| node.url().to_string())
            .collect();

        let keys: Vec<FeedKey> = nodes
            .iter()
            .map(|node| FeedKey::new(database, node.as_str()))
            .collect();
        for key in &keys {
            self.feeds.register(key.clone());
        }
        self.catchup.track(database, nodes);
        keys
    }

    /// Handles one notification from the feed `key`.
    pub fn handle(
        &mut self,
        key: &FeedKey,
        notification: FeedNotification,
        now: Instant,
        out: &mut Vec<AuditEvent>,
    ) {
        match notification {
            FeedNotification::Change(raw) => {
                let change = ChangeEvent::observed(&key.database, &key.node, raw);
                match self.feeds.admit(key, change) {
                    Some(Admission::Buffered) => {
                        trace!(db = %key.database, node = %key.node, "change buffered");
                    }
                    Some(Admission::Live(change)) => self.process(change, now, out),
                    None => debug!(db = %key.database, node = %key.node, "change for unknown feed"),
                }
            }
            FeedNotification::CaughtUp(seq) => {
                if !self.feeds.mark_caught_up(key, seq.clone()) {
                    debug!(db = %key.database, node = %key.node, "catch-up for unknown feed");
                    return;
                }
                out.push(AuditEvent::CaughtUp {
                    db: key.database.clone(),
                    couch: key.node.clone(),
                    seq,
                });
                if self.catchup.observe(&self.feeds, key) == Readiness::Ready {
                    self.go_live(&key.database, now, out);
                }
            }
            FeedNotification::Error(message) => {
                warn!(db = %key.database, node = %key.node, %message, "feed error");
                self.feeds.mark_failed(key);
                self.stats.errors += 1;
                out.push(AuditEvent::Error {
                    cause: ErrorCause::Feed {
                        db: key.database.clone(),
                        couch: key.node.clone(),
                        message,
                    },
                });
                // A failed feed counts as settled for catch-up.
                if self.catchup.observe(&self.feeds, key) == Readiness::Ready {
                    self.go_live(&key.database, now, out);
                }
            }
        }
    }

    /// Removes expired expectations; each must be probed exactly once.
    pub fn expire(&mut self, now: Instant) -> Vec<Expired> {
        let expired = self.tracker.expire(now);
        self.stats.probes_issued += expired.len() as u64;
        expired
    }

    /// Reports the outcome of a probe.
    pub fn resolve(&mut self, resolution: Resolution, out: &mut Vec<AuditEvent>) {
        let Resolution { expired, verdict } = resolution;
        match verdict {
            Verdict::Fulfilled(reason) => {
                self.stats.false_positives += 1;
                out.push(AuditEvent::Fulfilled {
                    db: expired.database,
                    couch: expired.target,
                    rev: expired.key.revision().to_string(),
                    id: expired.key.document_id().to_string(),
                    reason,
                });
            }
            Verdict::Unfulfilled(error) => {
                warn!(
                    db = %expired.database,
                    target = %expired.target,
                    source = %expired.source,
                    key = %expired.key,
                    %error,
                    "replication unfulfilled"
                );
                self.stats.unfulfilled += 1;
                out.push(AuditEvent::Unfulfilled {
                    error,
                    rev: expired.key.revision().to_string(),
                    id: expired.key.document_id().to_string(),
                    db: expired.database,
                    target: expired.target,
                    source: expired.source,
                });
            }
        }
    }

    fn go_live(&mut self, database: &str, now: Instant, out: &mut Vec<AuditEvent>) {
        info!(db = %database, "all feeds caught up, replaying buffered changes");
        out.push(AuditEvent::AuditStarted {
            db: database.to_string(),
        });

        let nodes = self.catchup.nodes(database).to_vec();
        for node in nodes {
            let buffered = self.feeds.go_live(&FeedKey::new(database, node));
            for change in buffered {
                self.process(change, now, out);
            }
        }

        self.stats.databases_live += 1;
        out.push(AuditEvent::Live {
            db: database.to_string(),
        });
    }

    fn process(&mut self, change: ChangeEvent, now: Instant, out: &mut Vec<AuditEvent>) {
        self.stats.changes_processed += 1;
        out.push(AuditEvent::ProcessedChange {
            db: change.database.clone(),
            couch: change.source_node.clone(),
            rev: change.revision.clone(),
            id: change.document_id.clone(),
        });

        let Some(key) = change.key() else {
            self.stats.errors += 1;
            out.push(AuditEvent::Error {
                cause: ErrorCause::MissingRevision {
                    db: change.database,
                    couch: change.source_node,
                    id: change.document_id,
                    seq: change.sequence,
                },
            });
            return;
        };
        let rev = key.revision().to_string();

        match self.tracker.observe(&self.topology, &change, key, now) {
            Observation::Fulfilled { source } => {
                trace!(db = %change.database, node = %change.source_node, %source, "fulfilled");
                self.stats.fulfilled += 1;
                out.push(AuditEvent::Fulfilled {
                    db: change.database,
                    couch: change.source_node,
                    rev,
                    id: change.document_id,
                    reason: FulfillReason::Replicated,
                });
            }
            Observation::ExpectationsSet { targets } if !targets.is_empty() => {
                self.stats.expectations_set += targets.len() as u64;
                out.push(AuditEvent::ExpectationSet {
                    db: change.database,
                    couch: change.source_node,
                    rev,
                    id: change.document_id,
                });
            }
            Observation::ExpectationsSet { .. } | Observation::PullOnly => {}
        }
    }
}
