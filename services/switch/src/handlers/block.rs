use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use blackout_auth_types::identity::IdentityHeaders;
use blackout_core::serde::{to_rfc3339_ms, to_rfc3339_ms_opt};

use crate::domain::types::{Actor, BLOCK_OPERATOR_ROLE, BlockRecord, BlockState, PendingBlock};
use crate::error::SwitchError;
use crate::state::AppState;
use crate::usecase::block::{AdminBlockView, BlockStatus, ProposeInput};

// ── GET /block/status ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStatusResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "to_rfc3339_ms_opt"
    )]
    pub activated_at: Option<DateTime<Utc>>,
}

impl From<BlockStatus> for BlockStatusResponse {
    fn from(status: BlockStatus) -> Self {
        let (title, message) = match status.notice {
            Some(notice) => (Some(notice.title), Some(notice.message)),
            None => (None, None),
        };
        Self {
            active: status.active,
            title,
            message,
            activated_at: status.activated_at,
        }
    }
}

pub async fn block_status(
    State(state): State<AppState>,
) -> Result<Json<BlockStatusResponse>, SwitchError> {
    let status = state.block_coordinator().status().await?;
    Ok(Json(status.into()))
}

// ── POST /block ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NoticeBody {
    pub title: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitBlockRequest {
    pub notice: Option<NoticeBody>,
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalResponse {
    pub requires_verification: bool,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
}

/// Without `code`: stage `notice` and mail an activation code.
/// With `code`: activate the staged notice.
pub async fn submit_block(
    State(state): State<AppState>,
    identity: IdentityHeaders,
    Json(body): Json<SubmitBlockRequest>,
) -> Result<Response, SwitchError> {
    let actor = Actor::from(&identity);
    let coordinator = state.block_coordinator();

    if let Some(code) = body.code {
        let record = coordinator.confirm(&actor, &code).await?;
        let status = BlockStatus::from(Some(record));
        return Ok(Json(BlockStatusResponse::from(status)).into_response());
    }

    // The role check runs before the body is judged so members always see 403.
    actor.require(BLOCK_OPERATOR_ROLE)?;
    let notice = body
        .notice
        .ok_or_else(|| SwitchError::Validation("notice or code is required".to_owned()))?;
    let output = coordinator
        .propose(
            &actor,
            ProposeInput {
                title: notice.title.unwrap_or_default(),
                message: notice.message.unwrap_or_default(),
            },
        )
        .await?;
    Ok(Json(ProposalResponse {
        requires_verification: true,
        expires_at: output.code_expires_at,
    })
    .into_response())
}

// ── POST /block/deactivate ────────────────────────────────────────────────────

pub async fn deactivate_block(
    State(state): State<AppState>,
    identity: IdentityHeaders,
) -> Result<Json<BlockStatusResponse>, SwitchError> {
    let actor = Actor::from(&identity);
    state.block_coordinator().deactivate(&actor).await?;
    Ok(Json(BlockStatus::from(None).into()))
}

// ── GET /block/admin ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecordResponse {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub created_by: Uuid,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub updated_at: DateTime<Utc>,
}

impl From<BlockRecord> for BlockRecordResponse {
    fn from(record: BlockRecord) -> Self {
        Self {
            id: record.id,
            title: record.notice.title,
            message: record.notice.message,
            created_by: record.created_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingBlockResponse {
    #[serde(flatten)]
    pub record: BlockRecordResponse,
    /// `null` once the code has expired or been purged.
    #[serde(serialize_with = "to_rfc3339_ms_opt")]
    pub code_expires_at: Option<DateTime<Utc>>,
}

impl From<PendingBlock> for PendingBlockResponse {
    fn from(pending: PendingBlock) -> Self {
        Self {
            record: pending.record.into(),
            code_expires_at: pending.code_expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdminBlockResponse {
    pub state: BlockState,
    pub active: Option<BlockRecordResponse>,
    pub pending: Option<PendingBlockResponse>,
}

impl From<AdminBlockView> for AdminBlockResponse {
    fn from(view: AdminBlockView) -> Self {
        Self {
            state: view.state,
            active: view.active.map(Into::into),
            pending: view.pending.map(Into::into),
        }
    }
}

pub async fn block_admin(
    State(state): State<AppState>,
    identity: IdentityHeaders,
) -> Result<Json<AdminBlockResponse>, SwitchError> {
    let actor = Actor::from(&identity);
    let view = state.block_coordinator().admin_view(&actor).await?;
    Ok(Json(view.into()))
}
