use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use deadpool_redis::redis;
use tower_http::trace::TraceLayer;
use tracing::warn;

use blackout_core::health::{healthz, readiness};
use blackout_core::middleware::{propagate_request_id_layer, request_id_layer};

use crate::handlers::{
    block::{block_admin, block_status, deactivate_block, submit_block},
    verification::{request_code, verify_code},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Block
        .route("/block", post(submit_block))
        .route("/block/deactivate", post(deactivate_block))
        .route("/block/status", get(block_status))
        .route("/block/admin", get(block_admin))
        // Verification codes
        .route("/verification/code", post(request_code))
        .route("/verification/code/verify", post(verify_code))
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}

/// Ready once both PostgreSQL and Redis answer.
async fn readyz(State(state): State<AppState>) -> StatusCode {
    if let Err(e) = state.db.ping().await {
        warn!(error = %e, "database not ready");
        return readiness(false);
    }
    let redis_ok = match state.redis.get().await {
        Ok(mut conn) => redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| warn!(error = %e, "redis ping failed"))
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "redis not ready");
            false
        }
    };
    readiness(redis_ok)
}
