//! Error types for the replication auditor.

use thiserror::Error;

/// Result type for auditor operations.
pub type OverwatchResult<T> = Result<T, OverwatchError>;

/// Errors that stop the auditor from starting or running.
///
/// Per-change failures never surface here; they are reported as
/// [`AuditEvent`](crate::AuditEvent)s and the run continues.
#[derive(Error, Debug)]
pub enum OverwatchError {
    /// The watched topology is malformed.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The hub's database list could not be fetched.
    #[error("failed to enumerate databases on hub {hub}: {source}")]
    Discovery {
        /// Hub url.
        hub: String,
        /// Underlying fetch failure.
        #[source]
        source: FetchError,
    },

    /// The driver task stopped abnormally.
    #[error("auditor task failed: {0}")]
    Task(String),
}

/// Reasons a topology fails validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No nodes were given.
    #[error("at least one couch is required")]
    NoCouches,

    /// No node carries the hub flag.
    #[error("there must be one hub couch")]
    NoHub,

    /// More than one node carries the hub flag.
    #[error("there can be only one hub, found {count}")]
    MultipleHubs {
        /// Number of nodes flagged as hub.
        count: usize,
    },

    /// A node has an empty url.
    #[error("couch at position {index} has an empty url")]
    EmptyUrl {
        /// Position in the configured list.
        index: usize,
    },

    /// Two nodes share a url.
    #[error("couch {0} is listed more than once")]
    DuplicateCouch(String),
}

/// Failures of the authoritative document probe or the hub enumeration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with an unexpected status code.
    #[error("unexpected status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Why an expectation was judged unfulfilled.
///
/// This is the `error` carried by an [`AuditEvent::Unfulfilled`](crate::AuditEvent::Unfulfilled).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplicationFailure {
    /// The probe itself failed.
    #[error("probe failed: {0}")]
    Probe(#[from] FetchError),

    /// The target node has never seen the document.
    #[error("no document at {url}")]
    Missing {
        /// Probed url.
        url: String,
    },

    /// The node answered 404 with a reason other than `missing` or `deleted`.
    #[error("document not found at {url} ({reason})")]
    NotFound {
        /// Probed url.
        url: String,
        /// Reason reported by the node.
        reason: String,
    },

    /// The document came back without `_revs_info`.
    #[error("no revision history at {url}")]
    NoRevisionHistory {
        /// Probed url.
        url: String,
    },

    /// The revision is absent from the whole revision tree.
    #[error("failed to replicate in a timely manner")]
    NotReplicated,
}
