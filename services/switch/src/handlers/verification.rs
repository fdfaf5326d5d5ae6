use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use blackout_core::serde::to_rfc3339_ms;
use blackout_domain::code::CodePurpose;

use crate::error::SwitchError;
use crate::state::AppState;
use crate::usecase::verification::{
    RequestCodeInput, RequestCodeUseCase, VerifyCodeInput, VerifyCodeUseCase,
};

// ── POST /verification/code ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RequestCodeRequest {
    pub purpose: CodePurpose,
    pub email: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCodeResponse {
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
}

pub async fn request_code(
    State(state): State<AppState>,
    Json(body): Json<RequestCodeRequest>,
) -> Result<(StatusCode, Json<RequestCodeResponse>), SwitchError> {
    let usecase = RequestCodeUseCase {
        codes: state.account_codes(),
        dispatcher: state.mailer.clone(),
        policy: state.dispatch_policy,
    };
    let expires_at = usecase
        .execute(RequestCodeInput {
            purpose: body.purpose,
            email: body.email,
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(RequestCodeResponse { expires_at })))
}

// ── POST /verification/code/verify ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyCodeRequest {
    pub purpose: CodePurpose,
    pub email: String,
    pub code: String,
}

pub async fn verify_code(
    State(state): State<AppState>,
    Json(body): Json<VerifyCodeRequest>,
) -> Result<StatusCode, SwitchError> {
    let usecase = VerifyCodeUseCase {
        codes: state.account_codes(),
    };
    usecase
        .execute(VerifyCodeInput {
            purpose: body.purpose,
            email: body.email,
            code: body.code,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
