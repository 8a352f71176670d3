//! # Overwatch HTTP
//!
//! CouchDB-backed collaborators for `overwatch_core`:
//!
//! - [`HttpNodeClient`] lists databases and probes documents over HTTP,
//!   each request bounded by a timeout
//! - [`CouchChangesFeed`] follows `_changes`, first reading the history up
//!   to the current tip and then long-polling for new changes
//!
//! Both share one `reqwest::Client`, so connections to a node are pooled
//! across databases.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod feed;
mod endpoint;

pub use client::{HttpNodeClient, DEFAULT_REQUEST_TIMEOUT};
pub use feed::{ChangesPage, CouchChangesFeed};
