//! The nodelocker service: the lease registry behind JSON-RPC.

use crate::logging::LogRegistry;
use crate::metrics;
use crate::readiness::ReadinessGate;
use crate::rpc::{self, RpcRequest, RpcResponse, INVALID_PARAMS};
use crate::runner::operator_base_router;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use fca_locker::LeaseRegistry;
use std::sync::Arc;

#[derive(Clone)]
struct LockerState {
    registry: Arc<LeaseRegistry>,
    logs: Arc<LogRegistry>,
}

/// Dual-listener nodelocker service.
pub struct LockerService {
    state: LockerState,
    readiness: ReadinessGate,
}

impl LockerService {
    pub fn new(logs: Arc<LogRegistry>) -> Self {
        metrics::register_metrics();
        Self {
            state: LockerState {
                registry: Arc::new(LeaseRegistry::new()),
                logs,
            },
            readiness: ReadinessGate::new(),
        }
    }

    pub fn readiness(&self) -> ReadinessGate {
        self.readiness.clone()
    }

    /// Build the service router and mark the service ready.
    pub fn setup_service(&self) -> Router {
        let router = Router::new()
            .route("/rpc/v0", post(service_rpc))
            .with_state(self.state.clone());

        self.readiness.set_ready();
        router
    }

    /// Build the operator router: liveness, readiness, metrics and the
    /// operator JSON-RPC (which also answers the NodeLocker methods).
    pub fn setup_operator(&self) -> Router {
        operator_base_router(self.readiness.clone()).merge(
            Router::new()
                .route("/rpc/v0", post(operator_rpc))
                .with_state(self.state.clone()),
        )
    }
}

async fn service_rpc(
    State(state): State<LockerState>,
    Json(request): Json<RpcRequest>,
) -> Json<RpcResponse> {
    Json(dispatch_locker(&state, request).await)
}

async fn operator_rpc(
    State(state): State<LockerState>,
    Json(request): Json<RpcRequest>,
) -> Json<RpcResponse> {
    let response = if request.method.starts_with("Operator.") {
        dispatch_operator(&state, request)
    } else {
        dispatch_locker(&state, request).await
    };

    Json(response)
}

fn dispatch_operator(state: &LockerState, request: RpcRequest) -> RpcResponse {
    match request.method.as_str() {
        "Operator.Version" => match rpc::to_result_value(&env!("CARGO_PKG_VERSION")) {
            Ok(value) => RpcResponse::result(request.id, value),
            Err(e) => RpcResponse::error(request.id, e.code, e.message),
        },
        "Operator.LogList" => match rpc::to_result_value(&state.logs.subsystems()) {
            Ok(value) => RpcResponse::result(request.id, value),
            Err(e) => RpcResponse::error(request.id, e.code, e.message),
        },
        "Operator.LogSetLevel" => match rpc::parse_params::<(String, String)>(request.params) {
            Ok((subsystem, level)) => match state.logs.set_level(&subsystem, &level) {
                Ok(()) => RpcResponse::result(request.id, serde_json::Value::Null),
                Err(err) => RpcResponse::error(request.id, INVALID_PARAMS, err.to_string()),
            },
            Err(e) => RpcResponse::error(request.id, e.code, e.message),
        },
        method => RpcResponse::method_not_found(request.id, method),
    }
}

async fn dispatch_locker(state: &LockerState, request: RpcRequest) -> RpcResponse {
    match request.method.as_str() {
        "NodeLocker.FetchLocks" => {
            let locks = state.registry.fetch_locks().await;
            match rpc::to_result_value(&locks) {
                Ok(value) => RpcResponse::result(request.id, value),
                Err(e) => RpcResponse::error(request.id, e.code, e.message),
            }
        }
        "NodeLocker.Lock" => match rpc::parse_params::<(String, String)>(request.params) {
            Ok((peer_id, secret)) => {
                let lock = state.registry.lock(&peer_id, &secret).await;
                if lock.acquired {
                    metrics::LOCKS_GRANTED.inc();
                } else {
                    metrics::LOCKS_REJECTED.inc();
                }
                match rpc::to_result_value(&lock) {
                    Ok(value) => RpcResponse::result(request.id, value),
                    Err(e) => RpcResponse::error(request.id, e.code, e.message),
                }
            }
            Err(e) => RpcResponse::error(request.id, e.code, e.message),
        },
        method => RpcResponse::method_not_found(request.id, method),
    }
}
