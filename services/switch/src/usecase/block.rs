use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};
use uuid::Uuid;

use blackout_domain::code::{CodePurpose, IdentityKey};

use crate::domain::repository::{BlockRepository, Dispatcher};
use crate::domain::types::{
    Actor, BLOCK_OPERATOR_ROLE, BlockNotice, BlockRecord, BlockState, Dispatch, DispatchContext,
    PendingBlock, is_well_formed_code,
};
use crate::error::SwitchError;
use crate::usecase::code::mint;
use crate::usecase::dispatch::{DispatchPolicy, deliver};

/// Drives the propose → verify → commit workflow for the global block.
///
/// Holds no locks: every step that must be atomic is a single storage
/// operation inside `R`, which also stores the activation code.
pub struct BlockCoordinator<R, D>
where
    R: BlockRepository,
    D: Dispatcher,
{
    pub blocks: R,
    pub dispatcher: D,
    pub code_ttl: Duration,
    pub policy: DispatchPolicy,
    /// Fixed destination for activation codes.
    pub admin_email: String,
}

pub struct ProposeInput {
    pub title: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ProposeOutput {
    pub record_id: Uuid,
    pub code_expires_at: DateTime<Utc>,
}

/// Public view of the block; carries nothing but what clients display.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatus {
    pub active: bool,
    pub notice: Option<BlockNotice>,
    pub activated_at: Option<DateTime<Utc>>,
}

impl From<Option<BlockRecord>> for BlockStatus {
    fn from(active: Option<BlockRecord>) -> Self {
        match active {
            Some(record) => Self {
                active: true,
                notice: Some(record.notice),
                activated_at: Some(record.updated_at),
            },
            None => Self {
                active: false,
                notice: None,
                activated_at: None,
            },
        }
    }
}

/// Operator view: both rows, never the code value.
#[derive(Debug, Clone)]
pub struct AdminBlockView {
    pub state: BlockState,
    pub active: Option<BlockRecord>,
    pub pending: Option<PendingBlock>,
}

impl<R, D> BlockCoordinator<R, D>
where
    R: BlockRepository,
    D: Dispatcher,
{
    fn activation_identity(&self) -> IdentityKey {
        IdentityKey::new(CodePurpose::BlockActivation, &self.admin_email)
    }

    /// Store a new draft gated by a fresh code and mail the code to the admin address.
    ///
    /// Replaces any earlier draft together with its code. If the code cannot be
    /// delivered the draft is rolled back and the caller gets `Dispatch`.
    pub async fn propose(
        &self,
        actor: &Actor,
        input: ProposeInput,
    ) -> Result<ProposeOutput, SwitchError> {
        actor.require(BLOCK_OPERATOR_ROLE)?;
        let notice = BlockNotice::parse(&input.title, &input.message)?;

        let now = Utc::now();
        let identity = self.activation_identity();
        let code = mint(&identity, self.code_ttl, now);
        let draft = BlockRecord {
            id: Uuid::now_v7(),
            active: false,
            notice,
            pending_code_id: Some(code.id),
            created_by: actor.user_id,
            created_at: now,
            updated_at: now,
        };
        self.blocks.upsert_draft(&draft, &code).await?;
        info!(record_id = %draft.id, actor = %actor.user_id, "block draft proposed");

        let dispatch = Dispatch {
            destination: self.admin_email.trim().to_owned(),
            code: code.code.clone(),
            context: DispatchContext {
                purpose: CodePurpose::BlockActivation,
                requested_by: Some(actor.user_id),
                requested_at: now,
                expires_at: code.expires_at,
                summary: format!(
                    "Confirming this code blocks all clients and shows the notice \"{}\".",
                    draft.notice.title
                ),
            },
        };
        if let Err(e) = deliver(&self.dispatcher, &dispatch, self.policy).await {
            if let Err(discard) = self.blocks.discard_draft(draft.id, code.id).await {
                error!(record_id = %draft.id, error = %discard, "failed to discard undeliverable draft");
            }
            return Err(e.into());
        }

        Ok(ProposeOutput {
            record_id: draft.id,
            code_expires_at: code.expires_at,
        })
    }

    /// Verify `code` and promote the draft it gates to the sole active block.
    ///
    /// Code check and promotion commit together. On any error the block state is
    /// unchanged; unless the code itself was rejected it stays usable for a retry.
    pub async fn confirm(&self, actor: &Actor, code: &str) -> Result<BlockRecord, SwitchError> {
        actor.require(BLOCK_OPERATOR_ROLE)?;
        let code = code.trim();
        if !is_well_formed_code(code) {
            return Err(SwitchError::Validation(
                "code must be 6 digits".to_owned(),
            ));
        }

        let record = self
            .blocks
            .promote(&self.activation_identity(), code, Utc::now())
            .await?;
        info!(record_id = %record.id, actor = %actor.user_id, "block activated");
        Ok(record)
    }

    /// Turn the active block off. Not code-gated.
    pub async fn deactivate(&self, actor: &Actor) -> Result<BlockRecord, SwitchError> {
        actor.require(BLOCK_OPERATOR_ROLE)?;
        let record = self.blocks.deactivate(Utc::now()).await?;
        info!(record_id = %record.id, actor = %actor.user_id, "block deactivated");
        Ok(record)
    }

    /// Unauthenticated status for clients to poll.
    pub async fn status(&self) -> Result<BlockStatus, SwitchError> {
        Ok(self.blocks.find_active().await?.into())
    }

    pub async fn admin_view(&self, actor: &Actor) -> Result<AdminBlockView, SwitchError> {
        actor.require(BLOCK_OPERATOR_ROLE)?;
        let active = self.blocks.find_active().await?;
        let pending = self.blocks.find_pending().await?;
        Ok(AdminBlockView {
            state: BlockState::derive(active.as_ref(), pending.as_ref()),
            active,
            pending,
        })
    }
}
