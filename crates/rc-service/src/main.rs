//! Room Controller
//!
//! WebSocket signaling server that orchestrates multi-party WebRTC rooms on
//! a selective-forwarding media engine.
//!
//! # Servers
//!
//! - WebSocket server for client signaling (default: 0.0.0.0:3016, `GET /ws`)
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Initialize Prometheus metrics recorder
//! 4. Build the room registry
//! 5. Bind and start the health server (liveness, readiness, status, metrics)
//! 6. Bind and start the signaling server, mark ready
//! 7. Wait for shutdown signal, drain rooms
//!
//! # Media Engine
//!
//! No media engine ships in-tree. The binary wires `UnconfiguredEngine`, so
//! joins fail with an "unavailable" error until an embedding application
//! builds the registry with a real `MediaEngine`.

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use rc_service::actors::{RoomRegistry, RoomSettings};
use rc_service::config::Config;
use rc_service::media::UnconfiguredEngine;
use rc_service::observability::{health_router, init_tracing, metrics, HealthState};
use rc_service::signaling::signaling_router;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// How long to wait for each server to finish after shutdown is signalled.
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration before tracing so the log format can be chosen
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(&config.observability);

    info!("Starting Room Controller");
    info!(
        rc_id = %config.rc_id,
        signaling_bind_address = %config.signaling_bind_address,
        health_bind_address = %config.health_bind_address,
        listen_ip = %config.listen_ip,
        announced_ip = ?config.announced_ip,
        enable_udp = config.enable_udp,
        enable_tcp = config.enable_tcp,
        prefer_udp = config.prefer_udp,
        video_start_bitrate = config.video_start_bitrate,
        notification_buffer = config.notification_buffer,
        "Configuration loaded successfully"
    );

    // This must happen before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = metrics::init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    warn!("No media engine configured, joins will fail until one is provided");
    let registry = RoomRegistry::new(
        Arc::new(UnconfiguredEngine),
        RoomSettings::from_config(&config),
    );

    let shutdown_token = CancellationToken::new();

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let health_app =
        health_router(Arc::clone(&health_state), registry.clone()).merge(metrics_router);

    // Bind listener BEFORE spawning to fail fast on bind errors
    let health_addr = config.health_bind_address;
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    let health_task = tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // Start signaling server
    let signaling_app = signaling_router(registry.clone()).layer(TraceLayer::new_for_http());

    let signaling_addr = config.signaling_bind_address;
    let signaling_listener = tokio::net::TcpListener::bind(signaling_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %signaling_addr, "Failed to bind signaling server");
            format!("Failed to bind signaling server to {signaling_addr}: {e}")
        })?;
    info!(addr = %signaling_addr, "Signaling server bound successfully");

    let signaling_shutdown_token = shutdown_token.child_token();
    let signaling_task = tokio::spawn(async move {
        info!(addr = %signaling_addr, "Signaling server starting");
        let server = axum::serve(signaling_listener, signaling_app).with_graceful_shutdown(
            async move {
                signaling_shutdown_token.cancelled().await;
                info!("Signaling server shutting down");
            },
        );
        if let Err(e) = server.await {
            error!(error = %e, "Signaling server failed");
        }
    });

    health_state.set_ready();
    info!("Room Controller running - press Ctrl+C to shutdown");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so k8s stops sending traffic
    health_state.set_not_ready();

    registry.shutdown().await;
    shutdown_token.cancel();

    // Open sockets hold the signaling server's graceful shutdown
    for (name, task) in [("signaling", signaling_task), ("health", health_task)] {
        match tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(server = name, error = %e, "Server task failed"),
            Err(_) => warn!(server = name, "Server did not stop within timeout"),
        }
    }

    info!("Room Controller shutdown complete");
    Ok(())
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
