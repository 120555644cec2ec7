//! Kubernetes Endpoints backend.
//!
//! Reads the `Endpoints` object named after the group. Addresses listed
//! under `subsets[].addresses` are ready, those under
//! `subsets[].notReadyAddresses` are not.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Endpoints;
use kube::{Api, Client, Config};
use tracing::{debug, info};

use crate::directory::{PeerDirectory, PeerEndpoint};
use crate::error::{DiscoveryError, DiscoveryResult};

/// Resolves groups against Endpoints objects in one namespace.
#[derive(Clone)]
pub struct KubeEndpoints {
    api: Api<Endpoints>,
    namespace: String,
}

impl KubeEndpoints {
    /// Build a directory from an existing client.
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    /// Build a directory from the pod's service account.
    ///
    /// Must be called from within a tokio runtime.
    pub fn in_cluster(namespace: &str) -> DiscoveryResult<Self> {
        let config =
            Config::incluster().map_err(|e| DiscoveryError::Credentials(e.to_string()))?;
        let client =
            Client::try_from(config).map_err(|e| DiscoveryError::Credentials(e.to_string()))?;
        info!(%namespace, "in-cluster discovery client ready");
        Ok(Self::new(client, namespace))
    }
}

#[async_trait]
impl PeerDirectory for KubeEndpoints {
    async fn list_peers(&self, group: &str) -> DiscoveryResult<Vec<PeerEndpoint>> {
        let endpoints = self.api.get(group).await.map_err(|e| match e {
            kube::Error::Api(resp) if resp.code == 404 => {
                DiscoveryError::NotFound(format!("{}/{group}", self.namespace))
            }
            other => DiscoveryError::Api(other.to_string()),
        })?;

        let peers = endpoints_to_peers(&endpoints);
        debug!(%group, peers = peers.len(), "endpoints resolved");
        Ok(peers)
    }
}

/// Flatten an Endpoints object into peer addresses.
///
/// Order follows the object: subset by subset, ready addresses of a
/// subset before its not-ready ones.
pub fn endpoints_to_peers(endpoints: &Endpoints) -> Vec<PeerEndpoint> {
    let mut peers = Vec::new();
    for subset in endpoints.subsets.iter().flatten() {
        for address in subset.addresses.iter().flatten() {
            peers.push(PeerEndpoint::ready(address.ip.clone()));
        }
        for address in subset.not_ready_addresses.iter().flatten() {
            peers.push(PeerEndpoint::not_ready(address.ip.clone()));
        }
    }
    peers
}
