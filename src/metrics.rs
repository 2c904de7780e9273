//! Operator Metrics
//!
//! Prometheus counters for admission decisions and discovery outcomes,
//! registered in a registry owned by the process instead of the global one.

use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Metrics shared by the admission gateway and the discovery service
pub struct OperatorMetrics {
    registry: Registry,
    admission_decisions: IntCounterVec,
    discovery_results: IntCounterVec,
}

impl OperatorMetrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let admission_decisions = IntCounterVec::new(
            Opts::new(
                "cluster_lifecycle_admission_decisions_total",
                "Admission decisions by pod role and outcome",
            ),
            &["role", "decision"],
        )
        .map_err(metrics_error)?;

        let discovery_results = IntCounterVec::new(
            Opts::new(
                "cluster_lifecycle_discovery_results_total",
                "Discovery answers by outcome",
            ),
            &["result"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(admission_decisions.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(discovery_results.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            admission_decisions,
            discovery_results,
        })
    }

    /// Count one admission decision
    pub fn record_admission(&self, role: &str, decision: &str) {
        self.admission_decisions
            .with_label_values(&[role, decision])
            .inc();
    }

    /// Count one discovery answer (`initial`, `join`, `error`)
    pub fn record_discovery(&self, result: &str) {
        self.discovery_results.with_label_values(&[result]).inc();
    }

    /// Render all metrics in the text exposition format
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics error: {}", e))
}
