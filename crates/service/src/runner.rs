//! Dual-listener service runner with graceful shutdown.
//!
//! Shutdown sequence on SIGTERM/SIGINT/SIGHUP/SIGQUIT: unset readiness, shut
//! the service listener with a one-second deadline, cancel the root token,
//! wait one second for in-flight work to observe the cancellation, then shut
//! the operator listener.

use crate::error::ServiceResult;
use crate::metrics::{metrics_handler, track_requests};
use crate::readiness::ReadinessGate;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const ROUTE_TIMEOUT: Duration = Duration::from_secs(30);
const SVR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);
const CTX_CANCEL_WAIT: Duration = Duration::from_secs(1);

/// Listen addresses for one service.
#[derive(Clone, Debug)]
pub struct DualListenerConfig {
    pub service_listen: String,
    pub operator_listen: String,
}

/// Shared operator routes: liveness, readiness, metrics.
pub fn operator_base_router(readiness: ReadinessGate) -> Router {
    Router::new()
        .route("/liveness", get(|| async { StatusCode::OK }))
        .route("/readiness", get(readiness_probe))
        .with_state(readiness)
        .route("/metrics", get(metrics_handler))
}

async fn readiness_probe(State(readiness): State<ReadinessGate>) -> impl IntoResponse {
    if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Standard middleware for a service listener: request tracing, metrics and
/// the route timeout.
pub fn service_layers(router: Router) -> Router {
    router
        .layer(axum::middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(ROUTE_TIMEOUT))
}

/// Serve the two routers until a shutdown signal arrives, then run the
/// shutdown sequence. The root token is cancelled between the two listener
/// shutdowns so background work stops before the operator surface goes away.
pub async fn run_dual_listener(
    config: DualListenerConfig,
    service_router: Router,
    operator_router: Router,
    readiness: ReadinessGate,
    root: CancellationToken,
) -> ServiceResult<()> {
    let service_listener = tokio::net::TcpListener::bind(&config.service_listen).await?;
    let operator_listener = tokio::net::TcpListener::bind(&config.operator_listen).await?;

    tracing::info!(listen = %config.service_listen, "service running");
    tracing::info!(listen = %config.operator_listen, "operator running");

    let service_shutdown = CancellationToken::new();
    let operator_shutdown = CancellationToken::new();

    let service_task = {
        let app = service_layers(service_router);
        let shutdown = service_shutdown.clone().cancelled_owned();
        tokio::spawn(async move {
            axum::serve(service_listener, app)
                .with_graceful_shutdown(shutdown)
                .await
        })
    };
    let operator_task = {
        let shutdown = operator_shutdown.clone().cancelled_owned();
        tokio::spawn(async move {
            axum::serve(operator_listener, operator_router)
                .with_graceful_shutdown(shutdown)
                .await
        })
    };

    tracing::info!("waiting for signal");
    wait_for_shutdown_signal().await?;

    readiness.unset_ready();
    service_shutdown.cancel();
    match tokio::time::timeout(SVR_SHUTDOWN_TIMEOUT, service_task).await {
        Ok(Ok(Ok(()))) => tracing::info!("shutdown finished successfully"),
        Ok(Ok(Err(err))) => tracing::error!(error = %err, "shutdown finished with an error"),
        Ok(Err(err)) => tracing::error!(error = %err, "service task failed"),
        Err(_) => tracing::warn!("shutdown timed out"),
    }

    root.cancel();
    tokio::time::sleep(CTX_CANCEL_WAIT).await;

    operator_shutdown.cancel();
    if let Ok(Err(err)) = operator_task.await {
        tracing::error!(error = %err, "error shutting down operator server");
    }

    tracing::info!("exiting");
    Ok(())
}

async fn wait_for_shutdown_signal() -> ServiceResult<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = term.recv() => {}
        _ = interrupt.recv() => {}
        _ = hangup.recv() => {}
        _ = quit.recv() => {}
    }

    Ok(())
}
