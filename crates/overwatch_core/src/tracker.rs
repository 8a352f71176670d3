//! Cross-node fulfillment tracking.
//!
//! Every change observed on a node either fulfils an expectation some other
//! node placed on it, or it is the first sighting and places expectations on
//! every sibling. Which case applies is decided purely by whether an
//! expectation exists for the reporting node, so the protocol does not care
//! in which order nodes' feeds deliver.
//!
//! Deadlines live in a single ordered wheel next to the expectation table.
//! Cancelling removes both entries in the same call that matched the change,
//! so a cancelled deadline can never be returned by [`FulfillmentTracker::expire`].

use crate::change::{ChangeEvent, FulfillmentKey};
use crate::topology::Topology;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// Identity of an expectation: `(database, target node, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpectationKey {
    /// Database name.
    pub database: String,
    /// Node expected to report the change.
    pub target: String,
    /// Change identity.
    pub key: FulfillmentKey,
}

/// A pending "node X should see change Y by time T".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    /// Node the change was first seen on.
    pub source: String,
    /// When the expectation expires.
    pub deadline: Instant,
    timer: u64,
}

/// An expectation whose deadline passed without a matching report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired {
    /// Database name.
    pub database: String,
    /// Node that failed to report the change.
    pub target: String,
    /// Node the change was first seen on.
    pub source: String,
    /// Change identity.
    pub key: FulfillmentKey,
}

/// What observing a live change did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The reporting node fulfilled an expectation placed by `source`.
    Fulfilled {
        /// Node the change was first seen on.
        source: String,
    },
    /// First sighting; expectations were armed on `targets`.
    ///
    /// Siblings that already carried an expectation for the key, or that do
    /// not pull, are left untouched and are not listed.
    ExpectationsSet {
        /// Nodes that received a new expectation.
        targets: Vec<String>,
    },
    /// First sighting on a pull-only node; nothing is expected elsewhere.
    PullOnly,
}

/// The expectation ledger.
#[derive(Debug)]
pub struct FulfillmentTracker {
    timeout: Duration,
    expectations: HashMap<ExpectationKey, Expectation>,
    wheel: BTreeMap<(Instant, u64), ExpectationKey>,
    next_timer: u64,
}

impl FulfillmentTracker {
    /// Creates an empty tracker with the given fulfillment window.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            expectations: HashMap::new(),
            wheel: BTreeMap::new(),
            next_timer: 0,
        }
    }

    /// The fulfillment window.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of pending expectations.
    pub fn pending(&self) -> usize {
        self.expectations.len()
    }

    /// Looks up an expectation.
    pub fn get(&self, key: &ExpectationKey) -> Option<&Expectation> {
        self.expectations.get(key)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.wheel.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Processes a live change reported by `change.source_node`.
    pub fn observe(
        &mut self,
        topology: &Topology,
        change: &ChangeEvent,
        key: FulfillmentKey,
        now: Instant,
    ) -> Observation {
        let own = ExpectationKey {
            database: change.database.clone(),
            target: change.source_node.clone(),
            key,
        };

        if let Some(expectation) = self.cancel(&own) {
            return Observation::Fulfilled {
                source: expectation.source,
            };
        }

        if topology
            .get(&change.source_node)
            .is_some_and(|node| node.is_pull_only())
        {
            return Observation::PullOnly;
        }

        let deadline = now + self.timeout;
        let mut targets = Vec::new();
        for sibling in topology.siblings(&change.source_node) {
            if !sibling.pulls() {
                continue;
            }
            let target = ExpectationKey {
                database: own.database.clone(),
                target: sibling.url().to_string(),
                key: own.key.clone(),
            };
            if self.expectations.contains_key(&target) {
                continue;
            }
            self.arm(target, change.source_node.clone(), deadline);
            targets.push(sibling.url().to_string());
        }

        Observation::ExpectationsSet { targets }
    }

    /// Removes and returns every expectation whose deadline is at or before
    /// `now`, earliest first.
    pub fn expire(&mut self, now: Instant) -> Vec<Expired> {
        let mut expired = Vec::new();
        while let Some(entry) = self.wheel.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let key = entry.remove();
            if let Some(expectation) = self.expectations.remove(&key) {
                expired.push(Expired {
                    database: key.database,
                    target: key.target,
                    source: expectation.source,
                    key: key.key,
                });
            }
        }
        expired
    }

    fn arm(&mut self, key: ExpectationKey, source: String, deadline: Instant) {
        let timer = self.next_timer;
        self.next_timer += 1;
        self.wheel.insert((deadline, timer), key.clone());
        self.expectations.insert(
            key,
            Expectation {
                source,
                deadline,
                timer,
            },
        );
    }

    fn cancel(&mut self, key: &ExpectationKey) -> Option<Expectation> {
        let expectation = self.expectations.remove(key)?;
        self.wheel.remove(&(expectation.deadline, expectation.timer));
        Some(expectation)
    }
}
