//! shelob-discovery — peer discovery for the latency prober.
//!
//! Resolves a named group to the ordered list of peer IPs that belong to
//! it. The probe loop only sees the `PeerDirectory` trait; the Kubernetes
//! Endpoints implementation is one backend, a fixed peer list another.
//!
//! # Architecture
//!
//! ```text
//! PeerDirectory (trait)
//!   ├── KubeEndpoints → GET /api/v1/namespaces/{ns}/endpoints/{group}
//!   └── StaticPeers   → fixed list (local runs, tests)
//! ```
//!
//! Discovery failures are reported as `DiscoveryError`; the caller
//! decides whether they are fatal.

pub mod directory;
pub mod endpoints;
pub mod error;

pub use directory::{PeerDirectory, PeerEndpoint, StaticPeers};
pub use endpoints::{KubeEndpoints, endpoints_to_peers};
pub use error::{DiscoveryError, DiscoveryResult};
