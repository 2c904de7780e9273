//! Cluster Topology Module
//!
//! Adapters for the placement-driver quorum's control API.

pub mod control;
pub mod pd_client;

pub use control::*;
pub use pd_client::*;
