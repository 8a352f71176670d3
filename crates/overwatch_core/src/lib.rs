//! # Overwatch Core
//!
//! Replication fulfillment auditing for hub-and-spoke CouchDB clusters.
//!
//! This crate provides:
//! - Topology validation (one hub, any number of spokes, pull-only spokes)
//! - Per-database, per-node change-feed buffering until every node is caught up
//! - The cross-node expectation ledger with race-free deadlines
//! - Revision-tree probing to filter false positives before reporting
//! - A tokio driver delivering [`AuditEvent`]s over a channel
//!
//! ## Architecture
//!
//! For every watched database, every node's change feed is read from the
//! beginning. Changes are buffered until all feeds of the database have
//! caught up, then replayed in arrival order and processed live from there:
//! 1. A change seen on a node with no expectation for it arms an expectation
//!    on every sibling (unless the node is pull-only)
//! 2. A change seen on a node that carries an expectation fulfils it
//! 3. An expectation that outlives the timeout triggers one probe of the
//!    target's revision tree, conflicts and deleted conflicts
//!
//! ## Key Invariants
//!
//! - Per-feed arrival order survives the buffering→live switch
//! - At most one expectation per (database, node, document@revision)
//! - A cancelled deadline never fires
//! - Exactly one probe per expired expectation
//! - Only configuration errors are fatal

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auditor;
mod catchup;
mod change;
mod config;
mod error;
mod event;
mod feed;
pub mod mock;
mod overwatch;
mod resolver;
mod source;
mod topology;
mod tracker;

pub use auditor::{AuditStats, Auditor};
pub use catchup::{CatchUpSynchronizer, DatabasePhase, Readiness};
pub use change::{ChangeEvent, FulfillmentKey, RawChange, RevisionEntry, Sequence};
pub use config::{AuditConfig, DbFilter, FollowOptions, RetryConfig, DEFAULT_TIMEOUT};
pub use error::{ConfigError, FetchError, OverwatchError, OverwatchResult, ReplicationFailure};
pub use event::{AuditEvent, ErrorCause, FulfillReason};
pub use feed::{Admission, Feed, FeedKey, FeedRegistry, FeedState};
pub use overwatch::{Overwatch, WatchHandle};
pub use resolver::{classify, Resolution, UnfulfilledResolver, Verdict};
pub use source::{
    ChangeFeedSource, FeedNotification, FeedSink, FeedTarget, NodeClient, ProbeBody,
    ProbeRequest, ProbeResponse, RevInfo,
};
pub use topology::{Node, NodeDescriptor, Role, Topology};
pub use tracker::{Expectation, ExpectationKey, Expired, FulfillmentTracker, Observation};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
