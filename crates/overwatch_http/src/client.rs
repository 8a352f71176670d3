//! [`NodeClient`] over HTTP.

use crate::endpoint;
use overwatch_core::{FetchError, NodeClient, ProbeBody, ProbeRequest, ProbeResponse};
use std::time::Duration;
use tracing::trace;

/// Per-request limit on database listing and document probes.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lists databases and probes documents through a shared `reqwest::Client`.
///
/// Every request is bounded by a timeout, so a node that accepts a
/// connection and never answers yields [`FetchError::Transport`].
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl Default for HttpNodeClient {
    fn default() -> Self {
        Self::with_client(reqwest::Client::default())
    }
}

impl HttpNodeClient {
    /// Creates a client with default connection settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured `reqwest::Client` (proxies, TLS roots).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

pub(crate) fn transport(err: reqwest::Error) -> FetchError {
    FetchError::Transport(err.to_string())
}

pub(crate) fn decode(err: serde_json::Error) -> FetchError {
    FetchError::Decode(err.to_string())
}

impl NodeClient for HttpNodeClient {
    async fn all_dbs(&self, node: &str) -> Result<Vec<String>, FetchError> {
        let url = endpoint::all_dbs(node)?;
        trace!(%url, "listing databases");
        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(decode)
    }

    async fn probe_revisions(&self, probe: &ProbeRequest) -> Result<ProbeResponse, FetchError> {
        let url = endpoint::document(probe)?;
        trace!(%url, "probing document");
        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport)?;

        // Error bodies are advisory; only a document body must decode.
        let body = match serde_json::from_slice::<ProbeBody>(&bytes) {
            Ok(body) => body,
            Err(err) if status.is_success() => return Err(decode(err)),
            Err(_) => ProbeBody::default(),
        };
        Ok(ProbeResponse {
            status: status.as_u16(),
            body,
        })
    }
}
