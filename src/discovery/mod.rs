//! Bootstrap Discovery Module
//!
//! Tells a starting placement-driver pod whether it founds a new quorum or
//! joins the existing one.

pub mod coordinator;

pub use coordinator::*;

/// Configuration for the discovery coordinator
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    /// Namespace served by this process; peers from elsewhere are refused
    pub namespace: String,
    /// Restrict discovery to one cluster
    pub cluster_name: Option<String>,
    /// Advertise `https` to founders regardless of the cluster's own setting
    pub tls_enabled: bool,
}
