//! Change notifications and the keys derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A change-feed sequence.
///
/// Older nodes use integers, clustered nodes use opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sequence {
    /// Integer sequence.
    Number(u64),
    /// Opaque sequence token.
    Token(String),
}

impl Default for Sequence {
    fn default() -> Self {
        Sequence::Number(0)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sequence::Number(n) => write!(f, "{n}"),
            Sequence::Token(t) => f.write_str(t),
        }
    }
}

impl From<u64> for Sequence {
    fn from(n: u64) -> Self {
        Sequence::Number(n)
    }
}

impl From<&str> for Sequence {
    fn from(token: &str) -> Self {
        Sequence::Token(token.to_string())
    }
}

/// One entry of a change's revision list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionEntry {
    /// Revision id, e.g. `1-967a00dff5e02add41819138abb3284d`.
    pub rev: String,
}

/// A change as delivered by a change-feed collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChange {
    /// Document id.
    pub id: String,
    /// Revisions touched by the change, winning revision first.
    #[serde(default)]
    pub changes: Vec<RevisionEntry>,
    /// Feed sequence of the change.
    pub seq: Sequence,
    /// Whether the change is a deletion.
    #[serde(default)]
    pub deleted: bool,
}

impl RawChange {
    /// Builds a change carrying a single revision.
    pub fn new(id: impl Into<String>, rev: impl Into<String>, seq: impl Into<Sequence>) -> Self {
        Self {
            id: id.into(),
            changes: vec![RevisionEntry { rev: rev.into() }],
            seq: seq.into(),
            deleted: false,
        }
    }

    /// The effective revision: the first entry of the revision list.
    pub fn winning_revision(&self) -> Option<&str> {
        self.changes.first().map(|entry| entry.rev.as_str())
    }
}

/// A change attributed to the database and node it was observed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Database name.
    pub database: String,
    /// Node that reported the change.
    pub source_node: String,
    /// Document id.
    pub document_id: String,
    /// Winning revision, absent when the feed violated its contract.
    pub revision: Option<String>,
    /// Feed sequence.
    pub sequence: Sequence,
}

impl ChangeEvent {
    /// Attributes a raw change to `(database, node)`.
    pub fn observed(database: &str, node: &str, raw: RawChange) -> Self {
        let revision = raw.winning_revision().map(str::to_string);
        Self {
            database: database.to_string(),
            source_node: node.to_string(),
            document_id: raw.id,
            revision,
            sequence: raw.seq,
        }
    }

    /// The fulfillment key, if the change carries a revision.
    pub fn key(&self) -> Option<FulfillmentKey> {
        self.revision
            .as_ref()
            .map(|rev| FulfillmentKey::new(self.document_id.clone(), rev.clone()))
    }
}

/// Identity of one change instance across nodes: `document_id@revision`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FulfillmentKey {
    document_id: String,
    revision: String,
}

impl FulfillmentKey {
    /// Creates a key.
    pub fn new(document_id: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            revision: revision.into(),
        }
    }

    /// Document id.
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Revision.
    pub fn revision(&self) -> &str {
        &self.revision
    }
}

impl fmt::Display for FulfillmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.document_id, self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_change_from_changes_feed_json() {
        let raw: RawChange = serde_json::from_str(
            r#"{"seq":12,"id":"doc1","changes":[{"rev":"2-b"},{"rev":"1-a"}]}"#,
        )
        .unwrap();
        assert_eq!(raw.seq, Sequence::Number(12));
        assert_eq!(raw.winning_revision(), Some("2-b"));
        assert!(!raw.deleted);

        let raw: RawChange = serde_json::from_str(
            r#"{"seq":"13-g1AAAA","id":"doc2","changes":[{"rev":"3-c"}],"deleted":true}"#,
        )
        .unwrap();
        assert_eq!(raw.seq, Sequence::Token("13-g1AAAA".into()));
        assert!(raw.deleted);
    }

    #[test]
    fn change_without_revision_has_no_key() {
        let raw: RawChange = serde_json::from_str(r#"{"seq":1,"id":"doc1"}"#).unwrap();
        let event = ChangeEvent::observed("db", "http://hub:5984", raw);
        assert_eq!(event.revision, None);
        assert_eq!(event.key(), None);
    }

    #[test]
    fn key_display() {
        let key = FulfillmentKey::new("user@example.com", "1-a");
        assert_eq!(key.to_string(), "user@example.com@1-a");
        assert_eq!(key.document_id(), "user@example.com");
        assert_eq!(key.revision(), "1-a");
    }

    #[test]
    fn sequence_display() {
        assert_eq!(Sequence::from(42).to_string(), "42");
        assert_eq!(Sequence::from("7-abc").to_string(), "7-abc");
    }
}
