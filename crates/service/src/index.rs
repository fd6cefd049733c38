//! The index resolver service: `minimal/latest` behind an HTTP redirect.

use crate::error::ServiceResult;
use crate::logging::LogRegistry;
use crate::metrics;
use crate::readiness::ReadinessGate;
use crate::resolver::{CachedResolver, Resolver, StoreResolver};
use crate::rpc::{self, RpcRequest, RpcResponse, INVALID_PARAMS};
use crate::runner::operator_base_router;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fca_core::config::{read_secret_file, IndexServiceConfig};
use fca_storage::S3Backend;
use std::sync::Arc;

#[derive(Clone)]
struct IndexState {
    resolver: Arc<dyn Resolver>,
    logs: Arc<LogRegistry>,
}

/// Dual-listener index resolver service.
pub struct IndexService {
    state: IndexState,
    readiness: ReadinessGate,
}

impl IndexService {
    /// Build the service from its TOML config: an S3-backed resolver wrapped
    /// in the five-minute cache.
    pub async fn from_config(
        config: &IndexServiceConfig,
        logs: Arc<LogRegistry>,
    ) -> ServiceResult<Self> {
        let resolver_config = &config.s3_resolver;
        let access_key = read_secret_file(&resolver_config.access_key_path)?;
        let secret_key = read_secret_file(&resolver_config.secret_key_path)?;

        let store = S3Backend::new(
            &resolver_config.bucket,
            Some(resolver_config.endpoint.clone()),
            None,
            Some(access_key),
            Some(secret_key),
            true,
        )
        .await?;

        let resolver = CachedResolver::new(StoreResolver::new(Arc::new(store)));
        Ok(Self::with_resolver(Arc::new(resolver), logs))
    }

    /// Build the service around any resolver.
    pub fn with_resolver(resolver: Arc<dyn Resolver>, logs: Arc<LogRegistry>) -> Self {
        metrics::register_metrics();
        Self {
            state: IndexState { resolver, logs },
            readiness: ReadinessGate::new(),
        }
    }

    pub fn readiness(&self) -> ReadinessGate {
        self.readiness.clone()
    }

    /// Build the service router and mark the service ready.
    pub fn setup_service(&self) -> Router {
        let router = Router::new()
            .route("/minimal/latest", get(resolve_latest))
            .with_state(self.state.clone());

        self.readiness.set_ready();
        router
    }

    /// Build the operator router.
    pub fn setup_operator(&self) -> Router {
        operator_base_router(self.readiness.clone()).merge(
            Router::new()
                .route("/rpc/v0", post(operator_rpc))
                .with_state(self.state.clone()),
        )
    }
}

async fn resolve_latest(State(state): State<IndexState>) -> Response {
    match state.resolver.resolve("minimal/latest").await {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "error resolving");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

async fn operator_rpc(
    State(state): State<IndexState>,
    Json(request): Json<RpcRequest>,
) -> Json<RpcResponse> {
    let response = match request.method.as_str() {
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
    };

    Json(response)
}
