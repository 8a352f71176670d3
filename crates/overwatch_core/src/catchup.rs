//! Per-database catch-up tracking.
//!
//! A database switches from buffering to live exactly once, when the last of
//! its feeds has settled: caught up with its node's history, or failed. The
//! check is conjunctive over the other feeds of the database, so the order
//! in which nodes settle does not matter. A failed feed never catches up, so
//! waiting on it would buffer its siblings forever.

use crate::feed::{FeedKey, FeedRegistry};
use std::collections::HashMap;

/// Phase of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabasePhase {
    /// At least one feed is still catching up.
    CatchingUp,
    /// Buffers were drained; changes are processed as they arrive.
    Live,
}

/// Outcome of a catch-up notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The database is not watched.
    Unknown,
    /// Other feeds of the database are still catching up.
    Waiting,
    /// This notification completed the set; the database must go live now.
    Ready,
    /// The database already went live.
    AlreadyLive,
}

#[derive(Debug)]
struct DatabaseProgress {
    nodes: Vec<String>,
    phase: DatabasePhase,
}

/// Decides when each database is ready to go live.
#[derive(Debug, Default)]
pub struct CatchUpSynchronizer {
    databases: HashMap<String, DatabaseProgress>,
}

impl CatchUpSynchronizer {
    /// Creates an empty synchronizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `database` across `nodes`, in drain order.
    pub fn track(&mut self, database: impl Into<String>, nodes: Vec<String>) {
        self.databases
            .entry(database.into())
            .or_insert(DatabaseProgress {
                nodes,
                phase: DatabasePhase::CatchingUp,
            });
    }

    /// Phase of a database.
    pub fn phase(&self, database: &str) -> Option<DatabasePhase> {
        self.databases.get(database).map(|p| p.phase)
    }

    /// Nodes of a database in drain order.
    pub fn nodes(&self, database: &str) -> &[String] {
        self.databases
            .get(database)
            .map(|p| p.nodes.as_slice())
            .unwrap_or(&[])
    }

    /// Evaluates a catch-up or failure notification for `key`.
    ///
    /// The reporting feed must already be marked caught up or failed in
    /// `feeds`; it is excluded from the check. Returns [`Readiness::Ready`] at most once
    /// per database, after which the database is considered live.
    pub fn observe(&mut self, feeds: &FeedRegistry, key: &FeedKey) -> Readiness {
        let Some(progress) = self.databases.get_mut(&key.database) else {
            return Readiness::Unknown;
        };
        if progress.phase == DatabasePhase::Live {
            return Readiness::AlreadyLive;
        }

        let all_settled = progress
            .nodes
            .iter()
            .filter(|node| **node != key.node)
            .all(|node| {
                feeds
                    .get(&FeedKey::new(key.database.clone(), node.clone()))
                    .is_some_and(|feed| feed.is_caught_up() || feed.has_failed())
            });

        if all_settled {
            progress.phase = DatabasePhase::Live;
            Readiness::Ready
        } else {
            Readiness::Waiting
        }
    }
}
