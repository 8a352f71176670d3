//! Url construction for the CouchDB endpoints the auditor reads.

use overwatch_core::{FeedTarget, FetchError, ProbeRequest, Sequence};
use reqwest::Url;

/// `{node}/{segments...}`, each segment percent-encoded.
fn node_url(node: &str, segments: &[&str]) -> Result<Url, FetchError> {
    let mut url = Url::parse(node)
        .map_err(|err| FetchError::Transport(format!("invalid node url {node}: {err}")))?;
    url.path_segments_mut()
        .map_err(|()| FetchError::Transport(format!("node url {node} cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn with_query(mut url: Url, pairs: &[(&str, String)]) -> Url {
    if !pairs.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(pairs.iter().map(|(key, value)| (*key, value.as_str())));
    }
    url
}

pub(crate) fn all_dbs(node: &str) -> Result<Url, FetchError> {
    node_url(node, &["_all_dbs"])
}

pub(crate) fn document(probe: &ProbeRequest) -> Result<Url, FetchError> {
    let url = node_url(&probe.node, &[&probe.database, &probe.document_id])?;
    Ok(with_query(
        url,
        &[
            ("revs_info", "true".to_string()),
            ("conflicts", "true".to_string()),
            ("deleted_conflicts", "true".to_string()),
        ],
    ))
}

/// A `_changes` read. Without `longpoll` the node answers immediately with
/// everything after `since`.
pub(crate) fn changes(
    target: &FeedTarget,
    since: Option<&Sequence>,
    longpoll: bool,
) -> Result<Url, FetchError> {
    let url = node_url(&target.node, &[&target.database, "_changes"])?;
    let options = &target.options;

    let mut pairs = Vec::new();
    if longpoll {
        pairs.push(("feed", "longpoll".to_string()));
        pairs.push(("heartbeat", options.heartbeat.as_millis().to_string()));
    }
    if let Some(since) = since {
        pairs.push(("since", since.to_string()));
    }
    if let Some(filter) = &options.filter {
        pairs.push(("filter", filter.clone()));
    }
    for (key, value) in &options.query {
        pairs.push((key.as_str(), value.clone()));
    }
    Ok(with_query(url, &pairs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use overwatch_core::FollowOptions;
    use std::time::Duration;

    fn target(node: &str, options: FollowOptions) -> FeedTarget {
        FeedTarget {
            node: node.into(),
            database: "users".into(),
            options,
        }
    }

    #[test]
    fn all_dbs_url() {
        assert_eq!(
            all_dbs("http://hub:5984").unwrap().as_str(),
            "http://hub:5984/_all_dbs"
        );
        assert_eq!(
            all_dbs("http://hub:5984/").unwrap().as_str(),
            "http://hub:5984/_all_dbs"
        );
        assert_eq!(
            all_dbs("https://proxy.local/couch").unwrap().as_str(),
            "https://proxy.local/couch/_all_dbs"
        );
    }

    #[test]
    fn document_url_encodes_segments() {
        let probe = ProbeRequest {
            node: "http://s2:5984".into(),
            database: "team/users".into(),
            document_id: "a b".into(),
        };
        assert_eq!(
            document(&probe).unwrap().as_str(),
            "http://s2:5984/team%2Fusers/a%20b?revs_info=true&conflicts=true&deleted_conflicts=true"
        );
    }

    #[test]
    fn catch_up_read_has_no_feed_mode() {
        let url = changes(&target("http://s1:5984", FollowOptions::default()), None, false).unwrap();
        assert_eq!(url.as_str(), "http://s1:5984/users/_changes");

        let since = Sequence::Number(42);
        let url = changes(
            &target("http://s1:5984", FollowOptions::default()),
            Some(&since),
            false,
        )
        .unwrap();
        assert_eq!(url.query(), Some("since=42"));
    }

    #[test]
    fn longpoll_passes_options_through() {
        let options = FollowOptions::default()
            .with_heartbeat(Duration::from_secs(10))
            .with_filter("app/important")
            .with_query("style", "all_docs");
        let since = Sequence::Token("12-abc".into());

        let url = changes(&target("http://s1:5984", options), Some(&since), true).unwrap();
        assert_eq!(
            url.query(),
            Some("feed=longpoll&heartbeat=10000&since=12-abc&filter=app%2Fimportant&style=all_docs")
        );
    }

    #[test]
    fn invalid_node_url() {
        assert!(matches!(all_dbs("not a url"), Err(FetchError::Transport(_))));
        assert!(matches!(
            all_dbs("mailto:admin@example.com"),
            Err(FetchError::Transport(_))
        ));
    }
}
