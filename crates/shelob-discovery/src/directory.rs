//! The directory abstraction consumed by the probe loop.

use async_trait::async_trait;

use crate::error::DiscoveryResult;

/// One address listed for a group, as reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub ip: String,
    /// Whether the directory considers this address ready to serve.
    pub ready: bool,
}

impl PeerEndpoint {
    pub fn ready(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ready: true,
        }
    }

    pub fn not_ready(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ready: false,
        }
    }
}

/// A source of peer addresses for a named group.
#[async_trait]
pub trait PeerDirectory: Send + Sync + 'static {
    /// List every address of `group`, in directory order.
    async fn list_peers(&self, group: &str) -> DiscoveryResult<Vec<PeerEndpoint>>;
}

/// A fixed peer list that ignores the group name.
#[derive(Debug, Clone, Default)]
pub struct StaticPeers {
    peers: Vec<PeerEndpoint>,
}

impl StaticPeers {
    pub fn new(peers: Vec<PeerEndpoint>) -> Self {
        Self { peers }
    }

    /// Parse a comma-separated list of IPs, all treated as ready.
    pub fn parse(list: &str) -> Self {
        let peers = list
            .split(',')
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(PeerEndpoint::ready)
            .collect();
        Self { peers }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[async_trait]
impl PeerDirectory for StaticPeers {
    async fn list_peers(&self, _group: &str) -> DiscoveryResult<Vec<PeerEndpoint>> {
        Ok(self.peers.clone())
    }
}
