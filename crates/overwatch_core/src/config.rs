//! Configuration for the auditor.

use crate::change::Sequence;
use crate::topology::NodeDescriptor;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Fulfillment window used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Predicate selecting which databases to audit.
pub type DbFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Configuration for an audit run.
#[derive(Clone)]
pub struct AuditConfig {
    /// Nodes to watch. Exactly one must be the hub.
    pub couches: Vec<NodeDescriptor>,
    /// Databases to watch. When absent they are enumerated on the hub.
    pub dbs: Option<Vec<String>>,
    /// How long a sibling has to report a change.
    pub timeout: Duration,
    /// Database filter for hub enumeration. Explicit lists bypass it.
    pub filter: Option<DbFilter>,
    /// Options passed through to every change feed.
    pub follow: FollowOptions,
}

impl AuditConfig {
    /// Creates a configuration with the default timeout.
    pub fn new(couches: Vec<NodeDescriptor>) -> Self {
        Self {
            couches,
            dbs: None,
            timeout: DEFAULT_TIMEOUT,
            filter: None,
            follow: FollowOptions::default(),
        }
    }

    /// Watches an explicit list of databases instead of enumerating the hub.
    pub fn with_dbs<I, S>(mut self, dbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dbs = Some(dbs.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the fulfillment timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the database filter.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Sets the change-feed options.
    pub fn with_follow(mut self, follow: FollowOptions) -> Self {
        self.follow = follow;
        self
    }

    /// Returns true if `db` passes the filter.
    pub fn accepts(&self, db: &str) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(db))
    }
}

impl fmt::Debug for AuditConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditConfig")
            .field("couches", &self.couches)
            .field("dbs", &self.dbs)
            .field("timeout", &self.timeout)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("follow", &self.follow)
            .finish()
    }
}

/// Options handed to each change feed. The core does not interpret them.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowOptions {
    /// Sequence to start from. `None` reads the whole history.
    pub since: Option<Sequence>,
    /// Heartbeat interval for long-polling feeds.
    pub heartbeat: Duration,
    /// Server-side filter function, e.g. `app/important`.
    pub filter: Option<String>,
    /// Extra query parameters.
    pub query: BTreeMap<String, String>,
    /// Retry behaviour for transient feed failures.
    pub retry: RetryConfig,
}

impl FollowOptions {
    /// Starts every feed at `since`.
    pub fn with_since(mut self, since: impl Into<Sequence>) -> Self {
        self.since = Some(since.into());
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Sets the server-side filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Adds an extra query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for FollowOptions {
    fn default() -> Self {
        Self {
            since: None,
            heartbeat: Duration::from_secs(30),
            filter: None,
            query: BTreeMap::new(),
            retry: RetryConfig::default(),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of consecutive attempts.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    /// Fails on the first error.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay before attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_nanos() as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay.as_nanos() as f64);
        Duration::from_nanos(capped as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_config_defaults() {
        let config = AuditConfig::new(vec![NodeDescriptor::hub("http://hub:5984")]);
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert!(config.dbs.is_none());
        assert!(config.accepts("anything"));
        assert_eq!(config.follow.since, None);
    }

    #[test]
    fn audit_config_builder() {
        let config = AuditConfig::new(vec![NodeDescriptor::hub("http://hub:5984")])
            .with_dbs(["users", "_replicator"])
            .with_timeout(Duration::from_millis(100))
            .with_filter(|db| !db.starts_with('_'))
            .with_follow(FollowOptions::default().with_since(10).with_filter("app/all"));

        assert_eq!(
            config.dbs,
            Some(vec!["users".to_string(), "_replicator".to_string()])
        );
        assert_eq!(config.timeout, Duration::from_millis(100));
        assert!(config.accepts("users"));
        assert!(!config.accepts("_replicator"));
        assert_eq!(config.follow.since, Some(Sequence::Number(10)));
        assert_eq!(config.follow.filter.as_deref(), Some("app/all"));
        assert!(format!("{config:?}").contains("<fn>"));
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
    }
}
