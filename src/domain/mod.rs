//! Domain layer - Core types, naming rules and port definitions
//!
//! This module defines the core traits (ports) that adapters implement,
//! following hexagonal architecture principles.

pub mod naming;
pub mod ports;

pub use naming::*;
pub use ports::*;
