//! API Module
//!
//! HTTP surface of the operator: the pod admission webhook and the
//! placement-driver bootstrap discovery endpoint.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
