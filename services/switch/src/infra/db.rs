use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, QueryFilter, QueryOrder, SqlErr,
    TransactionTrait,
    sea_query::{Expr, ExprTrait, OnConflict},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use blackout_domain::code::IdentityKey;
use blackout_switch_schema::{blocks, one_time_codes};

use crate::domain::repository::BlockRepository;
use crate::domain::types::{BlockRecord, MAX_CODE_ATTEMPTS, OneTimeCode, PendingBlock};
use crate::error::{CodeError, SwitchError};

/// Transaction-scoped advisory lock serializing every multi-statement block
/// mutation across all service instances.
const BLOCK_LOCK_SQL: &str = "SELECT pg_advisory_xact_lock(7196117360432235083)";

/// Insert or overwrite the code row for the code's identity.
async fn upsert_code<C: ConnectionTrait>(conn: &C, code: &OneTimeCode) -> Result<(), DbErr> {
    let model = one_time_codes::ActiveModel {
        identity: Set(code.identity.as_key()),
        id: Set(code.id),
        code: Set(code.code.clone()),
        issued_at: Set(code.issued_at),
        expires_at: Set(code.expires_at),
        consumed_at: Set(code.consumed_at),
        attempts: Set(i32::try_from(code.attempts).unwrap_or(i32::MAX)),
    };
    one_time_codes::Entity::insert(model)
        .on_conflict(
            OnConflict::column(one_time_codes::Column::Identity)
                .update_columns([
                    one_time_codes::Column::Id,
                    one_time_codes::Column::Code,
                    one_time_codes::Column::IssuedAt,
                    one_time_codes::Column::ExpiresAt,
                    one_time_codes::Column::ConsumedAt,
                    one_time_codes::Column::Attempts,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

/// Drop codes that can never verify again.
async fn purge_dead_codes<C: ConnectionTrait>(conn: &C, now: DateTime<Utc>) -> Result<(), DbErr> {
    one_time_codes::Entity::delete_many()
        .filter(
            Condition::any()
                .add(one_time_codes::Column::ExpiresAt.lt(now))
                .add(one_time_codes::Column::ConsumedAt.is_not_null()),
        )
        .exec(conn)
        .await?;
    Ok(())
}

async fn delete_code<C: ConnectionTrait>(conn: &C, row: &one_time_codes::Model) -> Result<(), DbErr> {
    one_time_codes::Entity::delete_many()
        .filter(one_time_codes::Column::Identity.eq(row.identity.as_str()))
        .filter(one_time_codes::Column::Id.eq(row.id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Count a wrong guess against `row`, deleting it on the last allowed miss.
async fn record_miss<C: ConnectionTrait>(conn: &C, row: &one_time_codes::Model) -> Result<(), DbErr> {
    if row.attempts.saturating_add(1) >= MAX_CODE_ATTEMPTS as i32 {
        delete_code(conn, row).await?;
        warn!(identity = %row.identity, code_id = %row.id, "one-time code exhausted by wrong guesses");
        return Ok(());
    }
    one_time_codes::Entity::update_many()
        .col_expr(
            one_time_codes::Column::Attempts,
            Expr::col(one_time_codes::Column::Attempts).add(1),
        )
        .filter(one_time_codes::Column::Identity.eq(row.identity.as_str()))
        .filter(one_time_codes::Column::Id.eq(row.id))
        .exec(conn)
        .await?;
    Ok(())
}

// ── Block repository ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbBlockRepository {
    pub db: DatabaseConnection,
}

impl BlockRepository for DbBlockRepository {
    async fn find_active(&self) -> Result<Option<BlockRecord>, SwitchError> {
        let mut models = blocks::Entity::find()
            .filter(blocks::Column::Active.eq(true))
            .all(&self.db)
            .await
            .context("find active block")?;
        if models.len() > 1 {
            error!(count = models.len(), "more than one active block");
            return Err(SwitchError::InvariantViolation(format!(
                "{} active blocks",
                models.len()
            )));
        }
        models.pop().map(block_from_model).transpose()
    }

    async fn find_pending(&self) -> Result<Option<PendingBlock>, SwitchError> {
        let model = blocks::Entity::find()
            .filter(blocks::Column::Active.eq(false))
            .filter(blocks::Column::PendingCodeId.is_not_null())
            .order_by_desc(blocks::Column::CreatedAt)
            .one(&self.db)
            .await
            .context("find pending block")?;
        let Some(model) = model else {
            return Ok(None);
        };
        let record = block_from_model(model)?;

        let code_expires_at = match record.pending_code_id {
            Some(code_id) => one_time_codes::Entity::find()
                .filter(one_time_codes::Column::Id.eq(code_id))
                .filter(one_time_codes::Column::ConsumedAt.is_null())
                .one(&self.db)
                .await
                .context("find pending block code")?
                .map(|code| code.expires_at),
            None => None,
        };
        Ok(Some(PendingBlock {
            record,
            code_expires_at,
        }))
    }

    async fn upsert_draft(
        &self,
        draft: &BlockRecord,
        code: &OneTimeCode,
    ) -> Result<(), SwitchError> {
        let notice = serde_json::to_value(&draft.notice).context("encode block notice")?;
        self.db
            .transaction::<_, (), DbErr>(|txn| {
                let draft = draft.clone();
                let code = code.clone();
                Box::pin(async move {
                    txn.execute_unprepared(BLOCK_LOCK_SQL).await?;
                    blocks::Entity::delete_many()
                        .filter(blocks::Column::Active.eq(false))
                        .exec(txn)
                        .await?;
                    purge_dead_codes(txn, code.issued_at).await?;
                    upsert_code(txn, &code).await?;
                    blocks::ActiveModel {
                        id: Set(draft.id),
                        active: Set(false),
                        notice: Set(notice),
                        pending_code_id: Set(draft.pending_code_id),
                        created_by: Set(draft.created_by),
                        created_at: Set(draft.created_at),
                        updated_at: Set(draft.updated_at),
                    }
                    .insert(txn)
                    .await?;
                    Ok(())
                })
            })
            .await
            .context("upsert block draft")?;
        Ok(())
    }

    async fn promote(
        &self,
        identity: &IdentityKey,
        supplied: &str,
        now: DateTime<Utc>,
    ) -> Result<BlockRecord, SwitchError> {
        let txn = self.db.begin().await.context("begin block promotion")?;
        match promote_in(&txn, identity, supplied, now).await {
            Ok(Promotion::Promoted(model)) => {
                txn.commit().await.map_err(promotion_error)?;
                block_from_model(model)
            }
            Ok(Promotion::Rejected(err)) => {
                // Misses and evictions are kept even though the call fails.
                txn.commit().await.context("record rejected activation code")?;
                Err(err.into())
            }
            Ok(Promotion::NoDraft) => {
                txn.rollback().await.context("roll back block promotion")?;
                Err(SwitchError::InvariantViolation(
                    "no draft is gated by this code".to_owned(),
                ))
            }
            Err(err) => {
                txn.rollback().await.context("roll back block promotion")?;
                Err(promotion_error(err))
            }
        }
    }

    async fn deactivate(&self, now: DateTime<Utc>) -> Result<BlockRecord, SwitchError> {
        let mut models = blocks::Entity::update_many()
            .col_expr(blocks::Column::Active, Expr::value(false))
            .col_expr(blocks::Column::UpdatedAt, Expr::value(now))
            .filter(blocks::Column::Active.eq(true))
            .exec_with_returning(&self.db)
            .await
            .context("deactivate block")?;
        if models.len() > 1 {
            error!(count = models.len(), "deactivated more than one active block");
        }
        let model = models.pop().ok_or(SwitchError::NothingActive)?;
        block_from_model(model)
    }

    async fn discard_draft(&self, record_id: Uuid, code_id: Uuid) -> Result<(), SwitchError> {
        self.db
            .transaction::<_, (), DbErr>(|txn| {
                Box::pin(async move {
                    txn.execute_unprepared(BLOCK_LOCK_SQL).await?;
                    blocks::Entity::delete_many()
                        .filter(blocks::Column::Id.eq(record_id))
                        .filter(blocks::Column::PendingCodeId.eq(code_id))
                        .filter(blocks::Column::Active.eq(false))
                        .exec(txn)
                        .await?;
                    one_time_codes::Entity::delete_many()
                        .filter(one_time_codes::Column::Id.eq(code_id))
                        .exec(txn)
                        .await?;
                    Ok(())
                })
            })
            .await
            .context("discard block draft")?;
        Ok(())
    }
}

enum Promotion {
    Promoted(blocks::Model),
    Rejected(CodeError),
    NoDraft,
}

/// Body of the promotion transaction. The caller commits or rolls back.
async fn promote_in(
    txn: &DatabaseTransaction,
    identity: &IdentityKey,
    supplied: &str,
    now: DateTime<Utc>,
) -> Result<Promotion, DbErr> {
    txn.execute_unprepared(BLOCK_LOCK_SQL).await?;

    let key = identity.as_key();
    let Some(row) = one_time_codes::Entity::find_by_id(key.clone()).one(txn).await? else {
        return Ok(Promotion::Rejected(CodeError::NotFound));
    };
    if row.consumed_at.is_some() {
        return Ok(Promotion::Rejected(CodeError::NotFound));
    }
    if now > row.expires_at {
        delete_code(txn, &row).await?;
        info!(identity = %identity, code_id = %row.id, "expired one-time code evicted");
        return Ok(Promotion::Rejected(CodeError::Expired));
    }
    if row.code != supplied {
        record_miss(txn, &row).await?;
        return Ok(Promotion::Rejected(CodeError::Mismatch));
    }

    one_time_codes::Entity::update_many()
        .col_expr(one_time_codes::Column::ConsumedAt, Expr::value(now))
        .filter(one_time_codes::Column::Identity.eq(key.as_str()))
        .filter(one_time_codes::Column::Id.eq(row.id))
        .exec(txn)
        .await?;

    // Switch the previous block off first; the partial unique index would
    // reject the flip below while it is still active.
    blocks::Entity::update_many()
        .col_expr(blocks::Column::Active, Expr::value(false))
        .col_expr(blocks::Column::UpdatedAt, Expr::value(now))
        .filter(blocks::Column::Active.eq(true))
        .exec(txn)
        .await?;

    let promoted = blocks::Entity::update_many()
        .col_expr(blocks::Column::Active, Expr::value(true))
        .col_expr(blocks::Column::PendingCodeId, Expr::value(Option::<Uuid>::None))
        .col_expr(blocks::Column::UpdatedAt, Expr::value(now))
        .filter(blocks::Column::PendingCodeId.eq(row.id))
        .filter(blocks::Column::Active.eq(false))
        .exec_with_returning(txn)
        .await?;
    Ok(promoted
        .into_iter()
        .next()
        .map_or(Promotion::NoDraft, Promotion::Promoted))
}

fn promotion_error(err: DbErr) -> SwitchError {
    classify_promotion_error(err.sql_err(), err)
}

/// A unique-index hit means another promotion committed first.
fn classify_promotion_error(sql_err: Option<SqlErr>, err: DbErr) -> SwitchError {
    match sql_err {
        Some(SqlErr::UniqueConstraintViolation(detail)) => SwitchError::InvariantViolation(
            format!("concurrent promotion rejected by storage: {detail}"),
        ),
        _ => SwitchError::Internal(anyhow::Error::new(err).context("promote block")),
    }
}

fn block_from_model(model: blocks::Model) -> Result<BlockRecord, SwitchError> {
    let notice = serde_json::from_value(model.notice).context("decode block notice")?;
    Ok(BlockRecord {
        id: model.id,
        active: model.active,
        notice,
        pending_code_id: model.pending_code_id,
        created_by: model.created_by,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}
