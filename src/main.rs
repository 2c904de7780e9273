//! Cluster Lifecycle Operator
//!
//! Serves the pod admission webhook and the placement-driver bootstrap
//! discovery endpoint for the database clusters of one namespace.

use clap::Parser;
use kube::CustomResourceExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cluster_lifecycle_operator::{
    AdmissionConfig, AdmissionContext, AdmissionGateway, ApiServer, ApiServerConfig, DbCluster,
    DiscoveryConfig, DiscoveryCoordinator, Error, KubeApiClient, OperatorMetrics, PdControl,
    PdControlConfig, RestRouter, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Cluster Lifecycle Operator - admission control and bootstrap discovery
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Webhook and discovery bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:10261")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Namespace served by this process
    #[arg(long, env = "NAMESPACE")]
    namespace: Option<String>,

    /// Restrict discovery to one cluster
    #[arg(long, env = "CLUSTER_NAME")]
    cluster_name: Option<String>,

    /// Talk TLS to every placement driver
    #[arg(long, env = "CLUSTER_TLS_ENABLED")]
    tls_enabled: bool,

    /// Seconds a store may spend in leader eviction before it is upgraded anyway
    #[arg(long, env = "EVICT_LEADER_TIMEOUT", default_value = "180")]
    evict_leader_timeout_secs: u64,

    /// Placement-driver request timeout in seconds
    #[arg(long, env = "PD_TIMEOUT", default_value = "5")]
    pd_timeout_secs: u64,

    /// Inject the start command into new placement-driver pods
    #[arg(long, env = "PATCH_PD_COMMAND")]
    patch_pd_command: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Print the DbCluster CRD manifest and exit
    #[arg(long)]
    print_crd: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crd {
        let manifest = serde_yaml::to_string(&DbCluster::crd())
            .map_err(|e| Error::Internal(format!("Failed to render CRD: {}", e)))?;
        print!("{}", manifest);
        return Ok(());
    }

    init_logging(&args);

    let namespace = args
        .namespace
        .clone()
        .filter(|ns| !ns.is_empty())
        .ok_or_else(|| Error::Configuration("NAMESPACE is not set".into()))?;

    info!("Starting Cluster Lifecycle Operator");
    info!("  Version: {}", cluster_lifecycle_operator::VERSION);
    info!("  API: {}", args.api_addr);
    info!("  Namespace: {}", namespace);
    info!("  Cluster: {}", args.cluster_name.as_deref().unwrap_or("<any>"));
    info!("  TLS: {}", args.tls_enabled);

    let shutdown = CancellationToken::new();
    let metrics = Arc::new(OperatorMetrics::new()?);

    let client = kube::Client::try_default().await?;
    let kube = Arc::new(KubeApiClient::new(client));
    let topology = Arc::new(PdControl::new(PdControlConfig {
        request_timeout: Duration::from_secs(args.pd_timeout_secs),
        force_tls: args.tls_enabled,
    }));

    let ctx = AdmissionContext::new(
        kube.clone(),
        topology.clone(),
        AdmissionConfig {
            evict_leader_timeout: Duration::from_secs(args.evict_leader_timeout_secs),
            patch_pd_command: args.patch_pd_command,
        },
        metrics.clone(),
    );
    let discovery = DiscoveryCoordinator::new(
        DiscoveryConfig {
            namespace,
            cluster_name: args.cluster_name.clone(),
            tls_enabled: args.tls_enabled,
        },
        kube,
        topology,
    );

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_shutdown).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_shutdown = shutdown.clone();
    let served_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, served_metrics, metrics_shutdown).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Cancel everything on Ctrl-C
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
        signal_shutdown.cancel();
    });

    let api_config = ApiServerConfig {
        addr: args
            .api_addr
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid API address: {}", e)))?,
    };
    let router = RestRouter::new(
        Arc::new(AdmissionGateway::new(ctx)),
        Arc::new(discovery),
        metrics,
    );

    ApiServer::new(api_config, router).run(shutdown).await?;

    info!("Operator shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,kube=info,tower=warn,tower_http=info",
            level
        ))
    });

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

fn text_response(status: hyper::StatusCode, body: impl Into<hyper::Body>) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: &str, shutdown: CancellationToken) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => text_response(StatusCode::OK, "ok"),
                _ => text_response(StatusCode::NOT_FOUND, "not found"),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid health server address: {}", e)))?;

    info!("Health server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Failed to bind health server: {}", e)))?
        .serve(make_svc)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: &str,
    metrics: Arc<OperatorMetrics>,
    shutdown: CancellationToken,
) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{header, Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.encode() {
                            Ok((content_type, buffer)) => {
                                let mut response = text_response(StatusCode::OK, buffer);
                                if let Ok(value) = header::HeaderValue::from_str(&content_type) {
                                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                                }
                                response
                            }
                            Err(e) => text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                        },
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid metrics server address: {}", e)))?;

    info!("Metrics server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Failed to bind metrics server: {}", e)))?
        .serve(make_svc)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
