//! Watch command implementation.

use super::output::{render, Format};
use crate::error::CliError;
use overwatch_core::{AuditConfig, AuditStats, Overwatch};
use overwatch_http::{CouchChangesFeed, HttpNodeClient};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Runs the audit until Ctrl-C, writing events to stdout.
pub async fn run(config: AuditConfig, format: Format) -> Result<AuditStats, CliError> {
    let http = reqwest_client();
    let overwatch = Overwatch::new(
        config,
        CouchChangesFeed::with_client(http.clone()),
        HttpNodeClient::with_client(http),
    )?;

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(err) => {
                warn!(%err, "cannot listen for interrupts");
                std::future::pending::<()>().await;
            }
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = async move {
        while let Some(event) = rx.recv().await {
            match render(&event, format) {
                Ok(line) => println!("{line}"),
                Err(err) => warn!(%err, event = event.name(), "cannot render event"),
            }
        }
    };

    let (stats, ()) = tokio::join!(overwatch.watch(tx, shutdown), printer);
    stats.map_err(CliError::from)
}

fn reqwest_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("overwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}
