//! Outbound audit events.

use crate::change::Sequence;
use crate::error::ReplicationFailure;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Everything the auditor reports, in processing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum AuditEvent {
    /// A feed reached the tip of its node's change history.
    #[serde(rename = "catchUp")]
    CaughtUp {
        /// Database.
        db: String,
        /// Node whose feed caught up.
        couch: String,
        /// Sequence at the tip.
        seq: Sequence,
    },

    /// Every feed of a database caught up; buffered history is being replayed.
    #[serde(rename = "audit")]
    AuditStarted {
        /// Database.
        db: String,
    },

    /// Buffered history of a database has been replayed; changes are now live.
    Live {
        /// Database.
        db: String,
    },

    /// A change entered the fulfillment tracker.
    #[serde(rename = "processChange")]
    ProcessedChange {
        /// Database.
        db: String,
        /// Node that reported the change.
        couch: String,
        /// Winning revision, if the feed supplied one.
        rev: Option<String>,
        /// Document id.
        id: String,
    },

    /// Expectations were armed on the siblings of `couch`.
    #[serde(rename = "setFulfillment")]
    ExpectationSet {
        /// Database.
        db: String,
        /// Node the change was first seen on.
        couch: String,
        /// Revision.
        rev: String,
        /// Document id.
        id: String,
    },

    /// A node was confirmed to hold a change.
    Fulfilled {
        /// Database.
        db: String,
        /// Node that holds the change.
        couch: String,
        /// Revision.
        rev: String,
        /// Document id.
        id: String,
        /// How the confirmation was obtained.
        reason: FulfillReason,
    },

    /// A node failed to receive a change in time.
    Unfulfilled {
        /// Why the probe judged the change missing.
        #[serde(serialize_with = "serialize_display")]
        error: ReplicationFailure,
        /// Database.
        db: String,
        /// Node that should have received the change.
        target: String,
        /// Node the change was first seen on.
        source: String,
        /// Document id.
        id: String,
        /// Revision.
        rev: String,
    },

    /// A failure not tied to a single expectation.
    Error {
        /// What went wrong.
        cause: ErrorCause,
    },
}

impl AuditEvent {
    /// Database the event concerns.
    pub fn db(&self) -> &str {
        match self {
            AuditEvent::CaughtUp { db, .. }
            | AuditEvent::AuditStarted { db }
            | AuditEvent::Live { db }
            | AuditEvent::ProcessedChange { db, .. }
            | AuditEvent::ExpectationSet { db, .. }
            | AuditEvent::Fulfilled { db, .. }
            | AuditEvent::Unfulfilled { db, .. } => db,
            AuditEvent::Error { cause } => cause.db(),
        }
    }

    /// Short event name, as used in JSON output.
    pub fn name(&self) -> &'static str {
        match self {
            AuditEvent::CaughtUp { .. } => "catchUp",
            AuditEvent::AuditStarted { .. } => "audit",
            AuditEvent::Live { .. } => "live",
            AuditEvent::ProcessedChange { .. } => "processChange",
            AuditEvent::ExpectationSet { .. } => "setFulfillment",
            AuditEvent::Fulfilled { .. } => "fulfilled",
            AuditEvent::Unfulfilled { .. } => "unfulfilled",
            AuditEvent::Error { .. } => "error",
        }
    }
}

/// How a fulfillment was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FulfillReason {
    /// The target's own feed reported the change before the deadline.
    Replicated,
    /// The probe found the revision in the target's revision tree.
    InRevisionTree,
    /// The probe found the document deleted on the target.
    Deleted,
}

impl fmt::Display for FulfillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FulfillReason::Replicated => f.write_str("replicated"),
            FulfillReason::InRevisionTree => f.write_str("in revision tree"),
            FulfillReason::Deleted => f.write_str("deleted"),
        }
    }
}

/// Failures surfaced through [`AuditEvent::Error`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ErrorCause {
    /// The change-feed collaborator reported a failure.
    #[error("feed {couch}/{db} failed: {message}")]
    Feed {
        /// Database.
        db: String,
        /// Node.
        couch: String,
        /// Collaborator's message.
        message: String,
    },

    /// A change arrived with an empty revision list.
    #[error("change for {id} at seq {seq} on {couch}/{db} carries no revision")]
    MissingRevision {
        /// Database.
        db: String,
        /// Node.
        couch: String,
        /// Document id.
        id: String,
        /// Feed sequence.
        seq: Sequence,
    },
}

impl ErrorCause {
    /// Database the failure concerns.
    pub fn db(&self) -> &str {
        match self {
            ErrorCause::Feed { db, .. } | ErrorCause::MissingRevision { db, .. } => db,
        }
    }
}

fn serialize_display<T: fmt::Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_tagged() {
        let event = AuditEvent::Fulfilled {
            db: "users".into(),
            couch: "http://s1:5984".into(),
            rev: "1-a".into(),
            id: "doc1".into(),
            reason: FulfillReason::Deleted,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "fulfilled");
        assert_eq!(json["reason"], "deleted");
        assert_eq!(json["couch"], "http://s1:5984");
    }

    #[test]
    fn unfulfilled_error_serializes_as_message() {
        let event = AuditEvent::Unfulfilled {
            error: ReplicationFailure::NotReplicated,
            db: "users".into(),
            target: "http://s2:5984".into(),
            source: "http://hub:5984".into(),
            id: "doc1".into(),
            rev: "1-a".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["error"], "failed to replicate in a timely manner");
        assert_eq!(event.name(), "unfulfilled");
        assert_eq!(event.db(), "users");
    }

    #[test]
    fn error_cause_display() {
        let cause = ErrorCause::Feed {
            db: "users".into(),
            couch: "http://s1:5984".into(),
            message: "connection reset".into(),
        };
        assert_eq!(
            cause.to_string(),
            "feed http://s1:5984/users failed: connection reset"
        );
        let event = AuditEvent::Error { cause };
        assert_eq!(event.db(), "users");
    }
}
