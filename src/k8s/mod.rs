//! Kubernetes Adapters
//!
//! Concrete `KubeStateClient` backed by the cluster's API server.

pub mod client;

pub use client::*;
