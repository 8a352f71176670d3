//! Config file loading and flag overrides.
//!
//! ```json
//! {
//!   "couches": [
//!     { "url": "http://hub:5984", "hub": true },
//!     { "url": "http://edge-1:5984" },
//!     { "url": "http://kiosk:5984", "pullOnly": true }
//!   ],
//!   "dbs": ["users"],
//!   "timeout": 5000,
//!   "exclude": ["sessions"],
//!   "includeSystem": false,
//!   "follow": { "heartbeat": 30000, "filter": "app/important", "retries": 5 }
//! }
//! ```

use crate::error::CliError;
use overwatch_core::{
    AuditConfig, FollowOptions, NodeDescriptor, RetryConfig, Sequence, DEFAULT_TIMEOUT,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Contents of a config file.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    /// Nodes to watch.
    #[serde(default)]
    pub couches: Vec<NodeDescriptor>,
    /// Databases to audit; all databases on the hub when absent.
    pub dbs: Option<Vec<String>>,
    /// Fulfillment timeout in milliseconds.
    pub timeout: Option<u64>,
    /// Databases to skip when enumerating the hub.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Enumerate `_`-prefixed system databases too. Listed ones are always
    /// audited.
    #[serde(default)]
    pub include_system: bool,
    /// Change-feed options.
    #[serde(default)]
    pub follow: FollowFile,
}

/// The `follow` section of a config file.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FollowFile {
    /// Sequence to start every feed from.
    pub since: Option<Sequence>,
    /// Long-poll heartbeat in milliseconds.
    pub heartbeat: Option<u64>,
    /// Server-side filter function.
    pub filter: Option<String>,
    /// Extra `_changes` query parameters.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Attempts per feed request before a feed error is reported.
    pub retries: Option<u32>,
}

/// Command-line values that extend or replace the file.
#[derive(Debug, Default)]
pub struct Overrides {
    /// Extra spokes.
    pub couches: Vec<String>,
    /// Hub, when not in the file.
    pub hub: Option<String>,
    /// Extra pull-only spokes.
    pub pull_only: Vec<String>,
    /// Replaces the file's database list when non-empty.
    pub dbs: Vec<String>,
    /// Added to the file's exclusions.
    pub exclude: Vec<String>,
    /// Replaces the file's timeout.
    pub timeout_ms: Option<u64>,
}

impl FileConfig {
    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CliError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `overrides` and builds the audit configuration.
    ///
    /// The system and exclusion rules only narrow hub enumeration; databases
    /// named in `dbs` are audited as listed.
    ///
    /// Topology problems are left for [`overwatch_core::Overwatch::new`] to
    /// report.
    pub fn into_audit_config(self, overrides: Overrides) -> AuditConfig {
        let mut couches = self.couches;
        couches.extend(overrides.hub.map(NodeDescriptor::hub));
        couches.extend(overrides.couches.into_iter().map(NodeDescriptor::spoke));
        couches.extend(overrides.pull_only.into_iter().map(NodeDescriptor::pull_only));

        let timeout = overrides
            .timeout_ms
            .or(self.timeout)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);

        let mut exclude = self.exclude;
        exclude.extend(overrides.exclude);
        let include_system = self.include_system;

        let mut config = AuditConfig::new(couches)
            .with_timeout(timeout)
            .with_follow(self.follow.into_options())
            .with_filter(move |db| {
                (include_system || !db.starts_with('_')) && !exclude.iter().any(|name| name == db)
            });

        if !overrides.dbs.is_empty() {
            config = config.with_dbs(overrides.dbs);
        } else if let Some(dbs) = self.dbs {
            config = config.with_dbs(dbs);
        }
        config
    }
}

impl FollowFile {
    fn into_options(self) -> FollowOptions {
        let defaults = FollowOptions::default();
        FollowOptions {
            since: self.since,
            heartbeat: self
                .heartbeat
                .map(Duration::from_millis)
                .unwrap_or(defaults.heartbeat),
            filter: self.filter,
            query: self.query,
            retry: self
                .retries
                .map(|attempts| RetryConfig::new(attempts.max(1)))
                .unwrap_or(defaults.retry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overwatch_core::mock::{MockNodeClient, ScriptedFeeds};
    use overwatch_core::{Overwatch, Topology};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_full_config() {
        let file = write(
            r#"{
                "couches": [
                    { "url": "http://hub:5984", "hub": true },
                    { "url": "http://edge-1:5984" },
                    { "url": "http://kiosk:5984", "pullOnly": true }
                ],
                "dbs": ["users", "orders"],
                "timeout": 250,
                "follow": { "since": "now", "heartbeat": 10000, "filter": "app/important",
                            "query": { "style": "all_docs" }, "retries": 3 }
            }"#,
        );

        let config = FileConfig::load(file.path())
            .unwrap()
            .into_audit_config(Overrides::default());

        let topology = Topology::new(&config.couches).unwrap();
        assert_eq!(topology.hub().url(), "http://hub:5984");
        assert!(topology.get("http://kiosk:5984").unwrap().is_pull_only());
        assert_eq!(config.dbs, Some(vec!["users".to_string(), "orders".to_string()]));
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.follow.since, Some(Sequence::Token("now".into())));
        assert_eq!(config.follow.heartbeat, Duration::from_secs(10));
        assert_eq!(config.follow.filter.as_deref(), Some("app/important"));
        assert_eq!(config.follow.query.get("style").map(String::as_str), Some("all_docs"));
        assert_eq!(config.follow.retry.max_attempts, 3);
    }

    #[test]
    fn flags_extend_and_override_the_file() {
        let file = write(r#"{ "couches": [{ "url": "http://edge-1:5984" }], "dbs": ["users"], "timeout": 250 }"#);

        let config = FileConfig::load(file.path()).unwrap().into_audit_config(Overrides {
            couches: vec!["http://edge-2:5984".into()],
            hub: Some("http://hub:5984".into()),
            pull_only: vec!["http://kiosk:5984".into()],
            dbs: vec!["orders".into()],
            exclude: Vec::new(),
            timeout_ms: Some(1000),
        });

        let topology = Topology::new(&config.couches).unwrap();
        assert_eq!(topology.len(), 4);
        assert_eq!(topology.hub().url(), "http://hub:5984");
        assert_eq!(config.dbs, Some(vec!["orders".to_string()]));
        assert_eq!(config.timeout, Duration::from_secs(1));
    }

    #[test]
    fn defaults_without_a_file() {
        let config = FileConfig::default().into_audit_config(Overrides {
            hub: Some("http://hub:5984".into()),
            ..Overrides::default()
        });

        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.dbs.is_none());
        assert_eq!(config.follow, FollowOptions::default());
    }

    #[test]
    fn filter_skips_system_and_excluded_databases() {
        let file = write(r#"{ "exclude": ["sessions"] }"#);
        let config = FileConfig::load(file.path()).unwrap().into_audit_config(Overrides {
            exclude: vec!["cache".into()],
            ..Overrides::default()
        });
        assert!(config.accepts("users"));
        assert!(!config.accepts("_replicator"));
        assert!(!config.accepts("sessions"));
        assert!(!config.accepts("cache"));

        let file = write(r#"{ "includeSystem": true }"#);
        let config = FileConfig::load(file.path())
            .unwrap()
            .into_audit_config(Overrides::default());
        assert!(config.accepts("_users"));
    }

    #[tokio::test]
    async fn listed_system_databases_are_audited() {
        let config = FileConfig::default().into_audit_config(Overrides {
            hub: Some("http://hub:5984".into()),
            dbs: vec!["_users".into()],
            ..Overrides::default()
        });
        assert!(!config.accepts("_users"));

        let overwatch = Overwatch::new(config, ScriptedFeeds::new(), MockNodeClient::new()).unwrap();
        assert_eq!(overwatch.databases().await.unwrap(), vec!["_users"]);
    }

    #[test]
    fn config_errors_name_the_file() {
        let file = write(r#"{ "couches": [], "timeoutMs": 5 }"#);
        let err = FileConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, CliError::ParseConfig { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("overwatch.json");
        assert!(matches!(
            FileConfig::load(&missing),
            Err(CliError::ReadConfig { .. })
        ));
    }
}
