//! Per-(database, node) feed state.
//!
//! Every feed starts out buffering: changes read while the cluster's feeds
//! are still catching up on history are held back, so that the fulfillment
//! tracker only ever sees a database once every node's history is in hand.
//! Switching a feed to live hands back its buffer in arrival order; the feed
//! never buffers again.

use crate::change::{ChangeEvent, Sequence};
use std::collections::{HashMap, VecDeque};

/// Identity of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedKey {
    /// Database name.
    pub database: String,
    /// Node url.
    pub node: String,
}

impl FeedKey {
    /// Creates a feed key.
    pub fn new(database: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            node: node.into(),
        }
    }
}

/// Processing state of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// Changes are held in the buffer.
    Buffering,
    /// Changes go straight to the fulfillment tracker.
    Live,
}

/// What the registry did with an incoming change.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// The change was appended to the feed's buffer.
    Buffered,
    /// The feed is live; the change must be processed now.
    Live(ChangeEvent),
}

/// One feed's state and buffer.
#[derive(Debug)]
pub struct Feed {
    state: FeedState,
    buffer: VecDeque<ChangeEvent>,
    caught_up: Option<Sequence>,
    failed: bool,
}

impl Feed {
    fn new() -> Self {
        Self {
            state: FeedState::Buffering,
            buffer: VecDeque::new(),
            caught_up: None,
            failed: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> FeedState {
        self.state
    }

    /// Number of buffered changes.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Sequence reported at catch-up, if the feed has caught up.
    pub fn caught_up_at(&self) -> Option<&Sequence> {
        self.caught_up.as_ref()
    }

    /// Returns true once the feed has caught up.
    pub fn is_caught_up(&self) -> bool {
        self.caught_up.is_some()
    }

    /// Returns true if the collaborator reported a failure for this feed.
    pub fn has_failed(&self) -> bool {
        self.failed
    }
}

/// Table of feeds keyed by `(database, node)`.
#[derive(Debug, Default)]
pub struct FeedRegistry {
    feeds: HashMap<FeedKey, Feed>,
}

impl FeedRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a buffering feed. Registering an existing key is a no-op.
    pub fn register(&mut self, key: FeedKey) {
        self.feeds.entry(key).or_insert_with(Feed::new);
    }

    /// Looks up a feed.
    pub fn get(&self, key: &FeedKey) -> Option<&Feed> {
        self.feeds.get(key)
    }

    /// Number of registered feeds.
    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    /// Returns true if no feed is registered.
    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Routes a change: buffered while the feed is buffering, handed back
    /// while it is live. Changes for unknown feeds are dropped.
    pub fn admit(&mut self, key: &FeedKey, change: ChangeEvent) -> Option<Admission> {
        let feed = self.feeds.get_mut(key)?;
        match feed.state {
            FeedState::Buffering => {
                feed.buffer.push_back(change);
                Some(Admission::Buffered)
            }
            FeedState::Live => Some(Admission::Live(change)),
        }
    }

    /// Records that a feed caught up. Returns false for unknown feeds.
    pub fn mark_caught_up(&mut self, key: &FeedKey, seq: Sequence) -> bool {
        match self.feeds.get_mut(key) {
            Some(feed) => {
                feed.caught_up = Some(seq);
                true
            }
            None => false,
        }
    }

    /// Records a collaborator failure on a feed.
    pub fn mark_failed(&mut self, key: &FeedKey) {
        if let Some(feed) = self.feeds.get_mut(key) {
            feed.failed = true;
        }
    }

    /// Switches a feed to live and returns its buffer in arrival order.
    ///
    /// Calling this on a live feed returns an empty buffer.
    pub fn go_live(&mut self, key: &FeedKey) -> VecDeque<ChangeEvent> {
        match self.feeds.get_mut(key) {
            Some(feed) => {
                feed.state = FeedState::Live;
                std::mem::take(&mut feed.buffer)
            }
            None => VecDeque::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::RawChange;

    fn change(key: &FeedKey, id: &str, seq: u64) -> ChangeEvent {
        ChangeEvent::observed(&key.database, &key.node, RawChange::new(id, "1-a", seq))
    }

    #[test]
    fn buffers_until_live() {
        let key = FeedKey::new("users", "http://hub:5984");
        let mut registry = FeedRegistry::new();
        registry.register(key.clone());

        assert_eq!(
            registry.admit(&key, change(&key, "a", 1)),
            Some(Admission::Buffered)
        );
        assert_eq!(
            registry.admit(&key, change(&key, "b", 2)),
            Some(Admission::Buffered)
        );
        assert_eq!(registry.get(&key).unwrap().buffered(), 2);

        let drained: Vec<_> = registry
            .go_live(&key)
            .into_iter()
            .map(|c| c.document_id)
            .collect();
        assert_eq!(drained, vec!["a", "b"]);

        let feed = registry.get(&key).unwrap();
        assert_eq!(feed.state(), FeedState::Live);
        assert_eq!(feed.buffered(), 0);

        let live = change(&key, "c", 3);
        assert_eq!(
            registry.admit(&key, live.clone()),
            Some(Admission::Live(live))
        );
        assert!(registry.go_live(&key).is_empty());
    }

    #[test]
    fn unknown_feeds_are_ignored() {
        let key = FeedKey::new("users", "http://hub:5984");
        let mut registry = FeedRegistry::new();
        assert!(registry.admit(&key, change(&key, "a", 1)).is_none());
        assert!(!registry.mark_caught_up(&key, Sequence::Number(1)));
        assert!(registry.go_live(&key).is_empty());
    }

    #[test]
    fn caught_up_and_failed_flags() {
        let key = FeedKey::new("users", "http://s1:5984");
        let mut registry = FeedRegistry::new();
        registry.register(key.clone());
        registry.register(key.clone());
        assert_eq!(registry.len(), 1);

        assert!(!registry.get(&key).unwrap().is_caught_up());
        assert!(registry.mark_caught_up(&key, Sequence::Number(7)));
        assert_eq!(
            registry.get(&key).unwrap().caught_up_at(),
            Some(&Sequence::Number(7))
        );

        registry.mark_failed(&key);
        assert!(registry.get(&key).unwrap().has_failed());
    }
}
