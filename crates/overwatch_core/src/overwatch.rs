//! The audit driver.
//!
//! [`Overwatch`] resolves the set of databases, subscribes one feed per
//! database and node, and then runs a single event loop that owns the
//! [`Auditor`]. Feed notifications, deadline expirations and probe results
//! all arrive on that one task, in the order the loop observes them.

use crate::auditor::{AuditStats, Auditor};
use crate::config::AuditConfig;
use crate::error::{OverwatchError, OverwatchResult};
use crate::event::AuditEvent;
use crate::resolver::{Resolution, UnfulfilledResolver};
use crate::source::{ChangeFeedSource, FeedSink, FeedTarget, NodeClient};
use crate::topology::Topology;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Audits replication across a topology.
///
/// # Example
///
/// ```rust,ignore
/// use overwatch_core::{AuditConfig, NodeDescriptor, Overwatch};
///
/// let config = AuditConfig::new(vec![
///     NodeDescriptor::hub("http://hub:5984"),
///     NodeDescriptor::spoke("http://spoke:5984"),
/// ]);
/// let mut handle = Overwatch::new(config, feeds, client)?.spawn();
/// while let Some(event) = handle.next_event().await {
///     println!("{event:?}");
/// }
/// ```
pub struct Overwatch<F, C> {
    config: AuditConfig,
    topology: Topology,
    feeds: F,
    client: Arc<C>,
}

impl<F: ChangeFeedSource, C: NodeClient> Overwatch<F, C> {
    /// Validates the topology and prepares a run.
    pub fn new(config: AuditConfig, feeds: F, client: C) -> OverwatchResult<Self> {
        let topology = Topology::new(&config.couches)?;
        Ok(Self {
            config,
            topology,
            feeds,
            client: Arc::new(client),
        })
    }

    /// The validated topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Databases to audit.
    ///
    /// An explicit list is taken as given, minus repeats. Otherwise the hub's
    /// databases are enumerated and passed through the configured filter.
    pub async fn databases(&self) -> OverwatchResult<Vec<String>> {
        let (dbs, explicit) = match &self.config.dbs {
            Some(dbs) => (dbs.clone(), true),
            None => {
                let hub = self.topology.hub().url();
                let dbs = self
                    .client
                    .all_dbs(hub)
                    .await
                    .map_err(|source| OverwatchError::Discovery {
                        hub: hub.to_string(),
                        source,
                    })?;
                (dbs, false)
            }
        };

        let mut selected: Vec<String> = Vec::with_capacity(dbs.len());
        for db in dbs {
            if (explicit || self.config.accepts(&db)) && !selected.contains(&db) {
                selected.push(db);
            }
        }
        if selected.is_empty() {
            warn!(explicit, "no databases selected, nothing to audit");
        }
        Ok(selected)
    }

    /// Runs the audit on a background task.
    pub fn spawn(self) -> WatchHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let shutdown = async move {
            // A dropped handle is not a shutdown request.
            if shutdown_rx.await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let task = tokio::spawn(self.watch(events_tx, shutdown));
        WatchHandle {
            events: events_rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// Runs the audit on the current task until `shutdown` resolves, the
    /// event receiver is dropped, or every feed has ended and nothing is
    /// left pending.
    pub async fn watch(
        self,
        events: mpsc::UnboundedSender<AuditEvent>,
        shutdown: impl Future<Output = ()> + Send,
    ) -> OverwatchResult<AuditStats> {
        let dbs = self.databases().await?;
        info!(
            hub = %self.topology.hub().url(),
            nodes = self.topology.len(),
            databases = dbs.len(),
            timeout_ms = self.config.timeout.as_millis() as u64,
            "starting audit"
        );

        let mut auditor = Auditor::new(self.topology.clone(), self.config.timeout);
        let (feed_tx, mut feed_rx) = mpsc::unbounded_channel();
        for db in &dbs {
            for key in auditor.watch_database(db) {
                let target = FeedTarget {
                    node: key.node.clone(),
                    database: key.database.clone(),
                    options: self.config.follow.clone(),
                };
                debug!(db = %key.database, node = %key.node, "subscribing feed");
                self.feeds.subscribe(target, FeedSink::new(key, feed_tx.clone()));
            }
        }
        drop(feed_tx);

        let resolver = UnfulfilledResolver::new(Arc::clone(&self.client));
        let (probe_tx, mut probe_rx) = mpsc::unbounded_channel::<Resolution>();
        let mut in_flight = 0usize;
        let mut feeds_open = true;
        let mut out = Vec::new();
        tokio::pin!(shutdown);

        loop {
            if !feeds_open && auditor.tracker().pending() == 0 && in_flight == 0 {
                debug!("all feeds ended and nothing pending");
                break;
            }
            let deadline = auditor.next_deadline();

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!(pending = auditor.tracker().pending(), in_flight, "shutdown requested");
                    break;
                }
                notification = feed_rx.recv(), if feeds_open => {
                    match notification {
                        Some((key, notification)) => {
                            auditor.handle(&key, notification, Instant::now(), &mut out);
                        }
                        None => feeds_open = false,
                    }
                }
                Some(resolution) = probe_rx.recv() => {
                    in_flight -= 1;
                    auditor.resolve(resolution, &mut out);
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    for expired in auditor.expire(Instant::now()) {
                        debug!(db = %expired.database, target = %expired.target, key = %expired.key, "probing");
                        in_flight += 1;
                        let resolver = resolver.clone();
                        let probe_tx = probe_tx.clone();
                        tokio::spawn(async move {
                            let resolution = resolver.resolve(expired).await;
                            let _ = probe_tx.send(resolution);
                        });
                    }
                }
            }

            for event in out.drain(..) {
                if events.send(event).is_err() {
                    debug!("event receiver dropped, stopping");
                    return Ok(auditor.stats().clone());
                }
            }
        }

        let stats = auditor.stats().clone();
        info!(?stats, "audit finished");
        Ok(stats)
    }
}

/// Handle to a spawned audit.
pub struct WatchHandle {
    events: mpsc::UnboundedReceiver<AuditEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<OverwatchResult<AuditStats>>,
}

impl WatchHandle {
    /// Next audit event, or `None` once the audit has stopped.
    pub async fn next_event(&mut self) -> Option<AuditEvent> {
        self.events.recv().await
    }

    /// Asks the audit to stop. Pending expectations are abandoned.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Waits for the audit to stop, collecting every remaining event.
    pub async fn finish(mut self) -> OverwatchResult<(Vec<AuditEvent>, AuditStats)> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let stats = self
            .task
            .await
            .map_err(|err| OverwatchError::Task(err.to_string()))??;
        Ok((events, stats))
    }
}
