//! [`ChangeFeedSource`] over CouchDB's `_changes` endpoint.
//!
//! Each subscription runs on its own task. The first read asks for
//! everything after the configured `since` without waiting, which is the
//! node's history up to its current tip; the feed reports that tip as its
//! catch-up point and then long-polls from there. Transient failures are
//! retried with backoff; once retries are exhausted the failure is reported
//! and the feed ends.

use crate::client::{decode, transport};
use crate::endpoint;
use overwatch_core::{
    ChangeFeedSource, FeedSink, FeedTarget, FetchError, RawChange, RetryConfig, Sequence,
};
use serde::Deserialize;
use tracing::{debug, trace, warn};

/// One `_changes` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangesPage {
    /// Changes after the requested sequence.
    #[serde(default)]
    pub results: Vec<RawChange>,
    /// Sequence to resume from.
    pub last_seq: Sequence,
}

/// Follows `_changes` feeds over HTTP.
#[derive(Debug, Clone, Default)]
pub struct CouchChangesFeed {
    http: reqwest::Client,
}

impl CouchChangesFeed {
    /// Creates a feed source with default connection settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured `reqwest::Client`.
    ///
    /// Long-polls hold a request open for up to the heartbeat interval, so a
    /// request timeout shorter than that will fail every live read.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl ChangeFeedSource for CouchChangesFeed {
    fn subscribe(&self, target: FeedTarget, sink: FeedSink) {
        tokio::spawn(follow(self.http.clone(), target, sink));
    }
}

async fn follow(http: reqwest::Client, target: FeedTarget, sink: FeedSink) {
    let mut since = target.options.since.clone();
    let mut live = false;

    loop {
        let page = tokio::select! {
            _ = sink.closed() => {
                trace!(db = %target.database, node = %target.node, "auditor gone, feed stopping");
                return;
            }
            page = fetch_with_retry(&http, &target, since.as_ref(), live) => page,
        };

        let page = match page {
            Ok(page) => page,
            Err(err) => {
                warn!(db = %target.database, node = %target.node, %err, "change feed failed");
                sink.error(err.to_string());
                return;
            }
        };

        trace!(
            db = %target.database,
            node = %target.node,
            changes = page.results.len(),
            last_seq = %page.last_seq,
            "changes read"
        );
        for change in page.results {
            if !sink.change(change) {
                return;
            }
        }
        if !live {
            debug!(db = %target.database, node = %target.node, seq = %page.last_seq, "feed caught up");
            if !sink.caught_up(page.last_seq.clone()) {
                return;
            }
            live = true;
        }
        since = Some(page.last_seq);
    }
}

async fn fetch_with_retry(
    http: &reqwest::Client,
    target: &FeedTarget,
    since: Option<&Sequence>,
    longpoll: bool,
) -> Result<ChangesPage, FetchError> {
    let retry: &RetryConfig = &target.options.retry;
    let mut attempt = 0;
    loop {
        match fetch_page(http, target, since, longpoll).await {
            Ok(page) => return Ok(page),
            Err(err) if attempt + 1 < retry.max_attempts => {
                attempt += 1;
                let delay = retry.delay_for_attempt(attempt);
                debug!(
                    db = %target.database,
                    node = %target.node,
                    attempt,
                    ?delay,
                    %err,
                    "retrying change feed"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn fetch_page(
    http: &reqwest::Client,
    target: &FeedTarget,
    since: Option<&Sequence>,
    longpoll: bool,
) -> Result<ChangesPage, FetchError> {
    let url = endpoint::changes(target, since, longpoll)?;
    let response = http.get(url).send().await.map_err(transport)?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
        });
    }
    let body = response.bytes().await.map_err(transport)?;
    serde_json::from_slice(&body).map_err(decode)
}
