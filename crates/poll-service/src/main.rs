//! Live Poll Service
//!
//! Single-session real-time polling coordinator.
//!
//! # Servers
//!
//! - HTTP/WebSocket gateway for clients (default: 0.0.0.0:3001, path `/ws`)
//! - HTTP server for health and metrics endpoints (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing from the observability config
//! 3. Initialize Prometheus metrics recorder
//! 4. Spawn the `SessionActor`
//! 5. Start health HTTP server (liveness, readiness, metrics)
//! 6. Start WebSocket gateway
//! 7. Mark ready and wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::config::ObservabilityConfig;
use poll_service::actors::{SessionActor, SessionMetrics};
use poll_service::config::Config;
use poll_service::gateway::gateway_router;
use poll_service::observability::{
    health_router, init_metrics_recorder, metrics_router, HealthState,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long the session actor gets to stop after cancellation.
const ACTOR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for open connections to see the close frame.
const DRAIN_PERIOD: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first: it carries the log filter
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(&config.observability);

    info!("Starting Live Poll Service");
    info!(
        session_id = %config.session_id,
        gateway_bind_address = %config.gateway_bind_address,
        health_bind_address = %config.health_bind_address,
        max_timer_seconds = config.limits.max_timer_seconds,
        max_options = config.limits.max_options,
        max_name_length = config.limits.max_name_length,
        completion_policy = config.limits.completion_policy.as_str(),
        notification_buffer = config.notification_buffer,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    // Initialize the session actor
    let (session, actor_task) = SessionActor::spawn(
        config.session_id.clone(),
        config.limits,
        config.notification_buffer,
        CancellationToken::new(),
        SessionMetrics::new(),
    );
    info!(session_id = %session.session_id(), "Session actor initialized");

    // Servers stop when the session is cancelled
    let shutdown_token = session.child_token();

    // Health server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let app = health_router(Arc::clone(&health_state)).merge(metrics_router(prometheus_handle));

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    let health_task = tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // WebSocket gateway
    let gateway_addr: SocketAddr = config.gateway_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.gateway_bind_address, "Invalid gateway bind address");
        format!("Invalid gateway bind address: {e}")
    })?;

    let gateway_listener = tokio::net::TcpListener::bind(gateway_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %gateway_addr, "Failed to bind gateway");
            format!("Failed to bind gateway to {gateway_addr}: {e}")
        })?;
    info!(addr = %gateway_addr, "Gateway bound successfully");

    let gateway_app = gateway_router(session.clone());
    let gateway_shutdown_token = shutdown_token.child_token();
    let gateway_task = tokio::spawn(async move {
        info!(addr = %gateway_addr, "Gateway starting");
        let server = axum::serve(gateway_listener, gateway_app).with_graceful_shutdown(
            async move {
                gateway_shutdown_token.cancelled().await;
                info!("Gateway shutting down");
            },
        );
        if let Err(e) = server.await {
            error!(error = %e, "Gateway failed");
        }
    });

    health_state.set_ready();
    info!("Live Poll Service running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop sending traffic
    health_state.set_not_ready();

    // Cancels the actor, its round timer, every connection and both servers
    session.cancel();
    drop(session);

    tokio::time::sleep(DRAIN_PERIOD).await;

    match tokio::time::timeout(ACTOR_SHUTDOWN_TIMEOUT, actor_task).await {
        Ok(Ok(())) => info!("Session actor stopped"),
        Ok(Err(e)) => warn!(error = %e, "Session actor task failed"),
        Err(_) => warn!(
            timeout_secs = ACTOR_SHUTDOWN_TIMEOUT.as_secs(),
            "Session actor did not stop in time"
        ),
    }

    for (name, task) in [("gateway", gateway_task), ("health", health_task)] {
        if let Err(e) = task.await {
            warn!(server = name, error = %e, "Server task failed");
        }
    }

    info!("Live Poll Service shutdown complete");
    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter when set.
fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&observability.log_level))
        .unwrap_or_else(|_| EnvFilter::new(common::config::DEFAULT_LOG_LEVEL));

    let registry = tracing_subscriber::registry().with(filter);
    if observability.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
