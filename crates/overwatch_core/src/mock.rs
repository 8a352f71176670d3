//! In-memory collaborators for testing.

use crate::error::FetchError;
use crate::feed::FeedKey;
use crate::source::{
    ChangeFeedSource, FeedSink, FeedTarget, NodeClient, ProbeRequest, ProbeResponse,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// A change-feed source driven by the test.
///
/// Subscriptions are recorded; the test obtains each feed's sink and pushes
/// notifications through it by hand.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFeeds {
    inner: Arc<ScriptedInner>,
}

#[derive(Debug, Default)]
struct ScriptedInner {
    sinks: Mutex<HashMap<FeedKey, FeedSink>>,
    targets: Mutex<Vec<FeedTarget>>,
    subscribed: Notify,
}

impl ScriptedFeeds {
    /// Creates a source with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink of `(database, node)`, if subscribed.
    pub fn sink(&self, database: &str, node: &str) -> Option<FeedSink> {
        self.inner
            .sinks
            .lock()
            .get(&FeedKey::new(database, node))
            .cloned()
    }

    /// Waits until `(database, node)` is subscribed and returns its sink.
    pub async fn wait_for(&self, database: &str, node: &str) -> FeedSink {
        loop {
            let notified = self.inner.subscribed.notified();
            if let Some(sink) = self.sink(database, node) {
                return sink;
            }
            notified.await;
        }
    }

    /// Targets subscribed so far, in subscription order.
    pub fn targets(&self) -> Vec<FeedTarget> {
        self.inner.targets.lock().clone()
    }

    /// Drops every held sink, ending all feeds.
    pub fn close_all(&self) {
        self.inner.sinks.lock().clear();
    }
}

impl ChangeFeedSource for ScriptedFeeds {
    fn subscribe(&self, target: FeedTarget, sink: FeedSink) {
        self.inner.targets.lock().push(target);
        self.inner.sinks.lock().insert(sink.key().clone(), sink);
        self.inner.subscribed.notify_waiters();
    }
}

/// A node client answering from canned responses.
///
/// Probes without a canned response answer `404 missing`.
#[derive(Debug, Clone, Default)]
pub struct MockNodeClient {
    inner: Arc<MockInner>,
}

#[derive(Debug, Default)]
struct MockInner {
    databases: Mutex<HashMap<String, Result<Vec<String>, FetchError>>>,
    responses: Mutex<HashMap<ProbeRequest, Result<ProbeResponse, FetchError>>>,
    probes: Mutex<Vec<ProbeRequest>>,
}

impl MockNodeClient {
    /// Creates a client with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the database list returned for `node`.
    pub fn set_databases(&self, node: &str, dbs: &[&str]) {
        self.inner.databases.lock().insert(
            node.to_string(),
            Ok(dbs.iter().map(|db| db.to_string()).collect()),
        );
    }

    /// Makes database enumeration on `node` fail.
    pub fn fail_databases(&self, node: &str, error: FetchError) {
        self.inner
            .databases
            .lock()
            .insert(node.to_string(), Err(error));
    }

    /// Sets the probe answer for a document on a node.
    pub fn respond(
        &self,
        node: &str,
        database: &str,
        document_id: &str,
        response: Result<ProbeResponse, FetchError>,
    ) {
        let probe = ProbeRequest {
            node: node.to_string(),
            database: database.to_string(),
            document_id: document_id.to_string(),
        };
        self.inner.responses.lock().insert(probe, response);
    }

    /// Probes received so far.
    pub fn probes(&self) -> Vec<ProbeRequest> {
        self.inner.probes.lock().clone()
    }
}

impl NodeClient for MockNodeClient {
    async fn all_dbs(&self, node: &str) -> Result<Vec<String>, FetchError> {
        self.inner
            .databases
            .lock()
            .get(node)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn probe_revisions(&self, probe: &ProbeRequest) -> Result<ProbeResponse, FetchError> {
        self.inner.probes.lock().push(probe.clone());
        self.inner
            .responses
            .lock()
            .get(probe)
            .cloned()
            .unwrap_or_else(|| Ok(ProbeResponse::not_found("missing")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Sequence;
    use crate::config::FollowOptions;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn scripted_feeds_record_subscriptions() {
        let feeds = ScriptedFeeds::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let key = FeedKey::new("users", "http://hub:5984");

        feeds.subscribe(
            FeedTarget {
                node: key.node.clone(),
                database: key.database.clone(),
                options: FollowOptions::default(),
            },
            FeedSink::new(key.clone(), tx),
        );

        let sink = feeds.wait_for("users", "http://hub:5984").await;
        assert!(sink.caught_up(Sequence::Number(1)));
        assert_eq!(rx.recv().await.unwrap().0, key);
        assert_eq!(feeds.targets().len(), 1);

        drop(sink);
        feeds.close_all();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn mock_client_defaults_to_missing() {
        let client = MockNodeClient::new();
        let probe = ProbeRequest {
            node: "http://s1:5984".into(),
            database: "users".into(),
            document_id: "doc1".into(),
        };

        let response = client.probe_revisions(&probe).await.unwrap();
        assert_eq!(response, ProbeResponse::not_found("missing"));

        client.respond("http://s1:5984", "users", "doc1", Ok(ProbeResponse::document(&["1-a"])));
        let response = client.probe_revisions(&probe).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(client.probes().len(), 2);

        client.set_databases("http://hub:5984", &["users", "orders"]);
        assert_eq!(client.all_dbs("http://hub:5984").await.unwrap().len(), 2);
        client.fail_databases("http://s1:5984", FetchError::Status { status: 401 });
        assert!(client.all_dbs("http://s1:5984").await.is_err());
    }
}
