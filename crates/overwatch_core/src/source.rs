//! Collaborator boundaries.
//!
//! The auditor does not talk to nodes itself. Change feeds are supplied by a
//! [`ChangeFeedSource`], which pushes notifications into a [`FeedSink`];
//! document probes and database enumeration go through a [`NodeClient`].
//! `overwatch_http` provides HTTP implementations of both; the [`mock`]
//! module provides scripted ones for tests.
//!
//! [`mock`]: crate::mock

use crate::change::{RawChange, Sequence};
use crate::config::FollowOptions;
use crate::error::FetchError;
use crate::feed::FeedKey;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::mpsc;

/// What a change feed reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedNotification {
    /// A change was read from the node.
    Change(RawChange),
    /// The feed reached the node's current tip.
    CaughtUp(Sequence),
    /// The feed failed.
    Error(String),
}

/// Everything a feed needs to know to follow one database on one node.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedTarget {
    /// Node base url.
    pub node: String,
    /// Database name.
    pub database: String,
    /// Pass-through options.
    pub options: FollowOptions,
}

/// The sending half handed to a change feed.
///
/// Every method returns false once the auditor has stopped, which is the
/// feed's signal to shut down.
#[derive(Debug, Clone)]
pub struct FeedSink {
    key: FeedKey,
    tx: mpsc::UnboundedSender<(FeedKey, FeedNotification)>,
}

impl FeedSink {
    /// Creates a sink that tags every notification with `key`.
    pub fn new(key: FeedKey, tx: mpsc::UnboundedSender<(FeedKey, FeedNotification)>) -> Self {
        Self { key, tx }
    }

    /// The feed this sink belongs to.
    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    /// Reports a change.
    pub fn change(&self, change: RawChange) -> bool {
        self.send(FeedNotification::Change(change))
    }

    /// Reports that the feed caught up at `seq`.
    pub fn caught_up(&self, seq: Sequence) -> bool {
        self.send(FeedNotification::CaughtUp(seq))
    }

    /// Reports a feed failure.
    pub fn error(&self, cause: impl Into<String>) -> bool {
        self.send(FeedNotification::Error(cause.into()))
    }

    /// Returns true once the auditor has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Completes once the auditor has stopped listening.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    fn send(&self, notification: FeedNotification) -> bool {
        self.tx.send((self.key.clone(), notification)).is_ok()
    }
}

/// Produces change feeds.
pub trait ChangeFeedSource: Send + Sync + 'static {
    /// Starts following `target`, reporting into `sink`.
    ///
    /// Implementations run the feed in the background and must not block.
    /// Dropping every clone of the sink tells the auditor the feed ended.
    fn subscribe(&self, target: FeedTarget, sink: FeedSink);
}

/// One authoritative revision-tree lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeRequest {
    /// Node base url.
    pub node: String,
    /// Database name.
    pub database: String,
    /// Document id.
    pub document_id: String,
}

impl ProbeRequest {
    /// Human-readable url of the probed document, query included.
    pub fn url(&self) -> String {
        format!(
            "{}/{}/{}?revs_info=true&conflicts=true&deleted_conflicts=true",
            self.node, self.database, self.document_id
        )
    }
}

/// Revision entry of `_revs_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevInfo {
    /// Revision id.
    pub rev: String,
    /// `available`, `missing` or `deleted`.
    #[serde(default)]
    pub status: String,
}

/// The parts of a probed document (or error body) the resolver looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeBody {
    /// Revision history of the winning branch.
    #[serde(rename = "_revs_info", default, skip_serializing_if = "Option::is_none")]
    pub revs_info: Option<Vec<RevInfo>>,
    /// Leaf revisions of conflicting branches.
    #[serde(rename = "_conflicts", default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
    /// Deleted leaf revisions of conflicting branches.
    #[serde(rename = "_deleted_conflicts", default, skip_serializing_if = "Vec::is_empty")]
    pub deleted_conflicts: Vec<String>,
    /// Error code of an error body, e.g. `not_found`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Reason of an error body, e.g. `deleted` or `missing`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Status and decoded body of a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded body.
    pub body: ProbeBody,
}

impl ProbeResponse {
    /// A 200 response whose `_revs_info` lists `revs`, newest first.
    pub fn document(revs: &[&str]) -> Self {
        Self {
            status: 200,
            body: ProbeBody {
                revs_info: Some(
                    revs.iter()
                        .map(|rev| RevInfo {
                            rev: rev.to_string(),
                            status: "available".into(),
                        })
                        .collect(),
                ),
                ..ProbeBody::default()
            },
        }
    }

    /// Adds `_conflicts`.
    pub fn with_conflicts(mut self, revs: &[&str]) -> Self {
        self.body.conflicts = revs.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Adds `_deleted_conflicts`.
    pub fn with_deleted_conflicts(mut self, revs: &[&str]) -> Self {
        self.body.deleted_conflicts = revs.iter().map(|r| r.to_string()).collect();
        self
    }

    /// A 404 `not_found` response with `reason`.
    pub fn not_found(reason: &str) -> Self {
        Self {
            status: 404,
            body: ProbeBody {
                error: Some("not_found".into()),
                reason: Some(reason.into()),
                ..ProbeBody::default()
            },
        }
    }

    /// A response with an arbitrary status and empty body.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: ProbeBody::default(),
        }
    }
}

/// Read access to nodes.
pub trait NodeClient: Send + Sync + 'static {
    /// Lists the databases on `node`.
    fn all_dbs(&self, node: &str) -> impl Future<Output = Result<Vec<String>, FetchError>> + Send;

    /// Fetches a document with revision info, conflicts and deleted conflicts.
    fn probe_revisions(
        &self,
        probe: &ProbeRequest,
    ) -> impl Future<Output = Result<ProbeResponse, FetchError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_url() {
        let probe = ProbeRequest {
            node: "http://s2:5984".into(),
            database: "users".into(),
            document_id: "doc1".into(),
        };
        assert_eq!(
            probe.url(),
            "http://s2:5984/users/doc1?revs_info=true&conflicts=true&deleted_conflicts=true"
        );
    }

    #[test]
    fn probe_body_decodes_document_and_error() {
        let body: ProbeBody = serde_json::from_str(
            r#"{"_id":"doc1","_rev":"2-b","_revs_info":[{"rev":"2-b","status":"available"},{"rev":"1-a","status":"missing"}],"_conflicts":["2-c"]}"#,
        )
        .unwrap();
        assert_eq!(body.revs_info.as_ref().unwrap().len(), 2);
        assert_eq!(body.conflicts, vec!["2-c"]);
        assert!(body.deleted_conflicts.is_empty());

        let body: ProbeBody =
            serde_json::from_str(r#"{"error":"not_found","reason":"deleted"}"#).unwrap();
        assert_eq!(body.reason.as_deref(), Some("deleted"));
        assert!(body.revs_info.is_none());
    }

    #[test]
    fn sink_reports_closed_auditor() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = FeedSink::new(FeedKey::new("users", "http://hub:5984"), tx);
        assert!(sink.caught_up(Sequence::Number(3)));
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.error("gone"));
    }
}
