use axum::http::StatusCode;

/// Liveness check for `GET /healthz`.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Map the outcome of a service's dependency checks onto a readiness status.
pub fn readiness(dependencies_ok: bool) -> StatusCode {
    if dependencies_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
