//! Custom Resource Definitions for the Cluster Lifecycle Operator
//!
//! - DbCluster: declared topology of one database cluster

pub mod db_cluster;

pub use db_cluster::*;
