//! Authoritative re-check of expired expectations.
//!
//! Change feeds do not promise a notification for every revision that lands
//! in a document's tree; conflict resolution in particular can bury a
//! revision without a change ever naming it. Before an expired expectation
//! is reported, the target node is asked for the document's revision info,
//! conflicts and deleted conflicts, and the revision is looked for in all
//! three.

use crate::error::{FetchError, ReplicationFailure};
use crate::event::FulfillReason;
use crate::source::{NodeClient, ProbeRequest, ProbeResponse};
use crate::tracker::Expired;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The target holds the change after all.
    Fulfilled(FulfillReason),
    /// The target does not hold the change.
    Unfulfilled(ReplicationFailure),
}

/// A classified expired expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The expectation that expired.
    pub expired: Expired,
    /// What the probe found.
    pub verdict: Verdict,
}

/// Issues probes through a [`NodeClient`].
#[derive(Debug)]
pub struct UnfulfilledResolver<C> {
    client: Arc<C>,
}

impl<C> Clone for UnfulfilledResolver<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: NodeClient> UnfulfilledResolver<C> {
    /// Creates a resolver.
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Issues exactly one probe for `expired` and classifies the answer.
    pub async fn resolve(&self, expired: Expired) -> Resolution {
        let probe = ProbeRequest {
            node: expired.target.clone(),
            database: expired.database.clone(),
            document_id: expired.key.document_id().to_string(),
        };
        let outcome = self.client.probe_revisions(&probe).await;
        let verdict = classify(&probe, expired.key.revision(), outcome);
        debug!(
            db = %expired.database,
            target = %expired.target,
            key = %expired.key,
            ?verdict,
            "probe classified"
        );
        Resolution { expired, verdict }
    }
}

/// Classifies a probe answer for `revision`.
///
/// A 404 whose reason is neither `deleted` nor `missing` is treated as
/// unfulfilled.
pub fn classify(
    probe: &ProbeRequest,
    revision: &str,
    outcome: Result<ProbeResponse, FetchError>,
) -> Verdict {
    let response = match outcome {
        Ok(response) => response,
        Err(err) => return Verdict::Unfulfilled(err.into()),
    };

    match response.status {
        200..=299 => {}
        404 => {
            return match response.body.reason.as_deref() {
                Some("deleted") => Verdict::Fulfilled(FulfillReason::Deleted),
                Some("missing") => Verdict::Unfulfilled(ReplicationFailure::Missing {
                    url: probe.url(),
                }),
                other => Verdict::Unfulfilled(ReplicationFailure::NotFound {
                    url: probe.url(),
                    reason: other.unwrap_or("unspecified").to_string(),
                }),
            };
        }
        status => return Verdict::Unfulfilled(FetchError::Status { status }.into()),
    }

    let body = response.body;
    let Some(revs_info) = body.revs_info else {
        return Verdict::Unfulfilled(ReplicationFailure::NoRevisionHistory { url: probe.url() });
    };

    let present = revs_info.iter().any(|info| info.rev == revision)
        || body.conflicts.iter().any(|rev| rev == revision)
        || body.deleted_conflicts.iter().any(|rev| rev == revision);

    if present {
        Verdict::Fulfilled(FulfillReason::InRevisionTree)
    } else {
        Verdict::Unfulfilled(ReplicationFailure::NotReplicated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> ProbeRequest {
        ProbeRequest {
            node: "http://s2:5984".into(),
            database: "users".into(),
            document_id: "doc1".into(),
        }
    }

    fn verdict(response: ProbeResponse) -> Verdict {
        classify(&probe(), "1-a", Ok(response))
    }

    #[test]
    fn revision_in_history() {
        assert_eq!(
            verdict(ProbeResponse::document(&["2-b", "1-a"])),
            Verdict::Fulfilled(FulfillReason::InRevisionTree)
        );
    }

    #[test]
    fn revision_in_conflicts() {
        assert_eq!(
            verdict(ProbeResponse::document(&["1-b"]).with_conflicts(&["1-a"])),
            Verdict::Fulfilled(FulfillReason::InRevisionTree)
        );
    }

    #[test]
    fn revision_in_deleted_conflicts() {
        assert_eq!(
            verdict(ProbeResponse::document(&["1-b"]).with_deleted_conflicts(&["1-a"])),
            Verdict::Fulfilled(FulfillReason::InRevisionTree)
        );
    }

    #[test]
    fn revision_absent_everywhere() {
        assert_eq!(
            verdict(ProbeResponse::document(&["2-c", "1-c"]).with_conflicts(&["1-d"])),
            Verdict::Unfulfilled(ReplicationFailure::NotReplicated)
        );
    }

    #[test]
    fn deleted_document_is_fulfilled() {
        assert_eq!(
            verdict(ProbeResponse::not_found("deleted")),
            Verdict::Fulfilled(FulfillReason::Deleted)
        );
    }

    #[test]
    fn missing_document_is_unfulfilled() {
        assert!(matches!(
            verdict(ProbeResponse::not_found("missing")),
            Verdict::Unfulfilled(ReplicationFailure::Missing { .. })
        ));
    }

    #[test]
    fn unknown_not_found_reason_is_unfulfilled() {
        let Verdict::Unfulfilled(ReplicationFailure::NotFound { reason, .. }) =
            verdict(ProbeResponse::not_found("no_db_file"))
        else {
            panic!("expected unfulfilled");
        };
        assert_eq!(reason, "no_db_file");

        assert!(matches!(
            verdict(ProbeResponse::status(404)),
            Verdict::Unfulfilled(ReplicationFailure::NotFound { .. })
        ));
    }

    #[test]
    fn document_without_history_is_unfulfilled() {
        assert_eq!(
            verdict(ProbeResponse::status(200)),
            Verdict::Unfulfilled(ReplicationFailure::NoRevisionHistory {
                url: probe().url()
            })
        );
    }

    #[test]
    fn failed_fetch_is_unfulfilled() {
        assert_eq!(
            verdict(ProbeResponse::status(500)),
            Verdict::Unfulfilled(ReplicationFailure::Probe(FetchError::Status { status: 500 }))
        );

        let err = FetchError::Transport("connection refused".into());
        assert_eq!(
            classify(&probe(), "1-a", Err(err.clone())),
            Verdict::Unfulfilled(ReplicationFailure::Probe(err))
        );
    }
}
