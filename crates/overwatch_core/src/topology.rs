//! Watched cluster topology.
//!
//! A topology is one hub plus any number of spokes. The hub's database list
//! drives discovery; every node is expected to eventually receive every
//! change observed anywhere else. Changes first seen on a pull-only spoke
//! create no expectations, and a spoke with `pull: false` is never expected
//! to receive.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// A node as it appears in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    /// Base url of the node, e.g. `http://couch-a:5984`.
    pub url: String,
    /// Whether this node is the hub.
    #[serde(default)]
    pub hub: bool,
    /// Whether this spoke only consumes changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_only: Option<bool>,
    /// Whether the spoke pushes its changes outward. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<bool>,
    /// Whether the spoke pulls changes in. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<bool>,
}

impl NodeDescriptor {
    /// Describes the hub node.
    pub fn hub(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            hub: true,
            ..Self::default()
        }
    }

    /// Describes a bidirectional spoke.
    pub fn spoke(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Describes a spoke that never propagates its changes outward.
    pub fn pull_only(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pull_only: Some(true),
            ..Self::default()
        }
    }
}

/// Role of a node in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The single authoritative node.
    Hub,
    /// Any other node.
    Spoke,
}

/// A validated node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    url: String,
    role: Role,
    pull_only: bool,
    push: bool,
    pull: bool,
}

impl Node {
    /// Normalized base url.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Role of the node.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns true for the hub.
    pub fn is_hub(&self) -> bool {
        self.role == Role::Hub
    }

    /// Returns true if changes first seen here are not expected elsewhere.
    pub fn is_pull_only(&self) -> bool {
        self.pull_only
    }

    /// Whether the node pushes changes outward.
    pub fn pushes(&self) -> bool {
        self.push
    }

    /// Whether the node pulls changes in.
    pub fn pulls(&self) -> bool {
        self.pull
    }
}

/// An ordered, validated set of nodes with exactly one hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    nodes: Vec<Node>,
    hub: usize,
}

impl Topology {
    /// Validates and normalizes node descriptors.
    ///
    /// Fails when the list is empty, when there is not exactly one hub, or
    /// when a url is empty or repeated. Trailing slashes are trimmed.
    pub fn new(descriptors: &[NodeDescriptor]) -> Result<Self, ConfigError> {
        if descriptors.is_empty() {
            return Err(ConfigError::NoCouches);
        }

        let hubs = descriptors.iter().filter(|d| d.hub).count();
        match hubs {
            0 => return Err(ConfigError::NoHub),
            1 => {}
            count => return Err(ConfigError::MultipleHubs { count }),
        }

        let mut nodes: Vec<Node> = Vec::with_capacity(descriptors.len());
        let mut hub = 0;

        for (index, descriptor) in descriptors.iter().enumerate() {
            let url = normalize_url(&descriptor.url);
            if url.is_empty() {
                return Err(ConfigError::EmptyUrl { index });
            }
            if nodes.iter().any(|n| n.url == url) {
                return Err(ConfigError::DuplicateCouch(url));
            }

            let node = if descriptor.hub {
                hub = nodes.len();
                Node {
                    url,
                    role: Role::Hub,
                    pull_only: false,
                    push: true,
                    pull: true,
                }
            } else {
                let push = descriptor.push != Some(false);
                let pull = descriptor.pull != Some(false);
                Node {
                    url,
                    role: Role::Spoke,
                    pull_only: descriptor.pull_only.unwrap_or(!push),
                    push,
                    pull,
                }
            };
            nodes.push(node);
        }

        Ok(Self { nodes, hub })
    }

    /// The hub node.
    pub fn hub(&self) -> &Node {
        &self.nodes[self.hub]
    }

    /// All nodes in configured order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Spokes in configured order.
    pub fn spokes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| !n.is_hub())
    }

    /// Looks up a node by url.
    pub fn get(&self, url: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.url == url)
    }

    /// Every node except `url`, in configured order.
    pub fn siblings<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().filter(move |n| n.url != url)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a validated topology.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
