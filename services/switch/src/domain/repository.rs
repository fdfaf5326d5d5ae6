#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use uuid::Uuid;

use blackout_domain::code::IdentityKey;

use crate::domain::types::{BlockRecord, Dispatch, OneTimeCode, PendingBlock};
use crate::error::{DispatchError, SwitchError};

/// Storage for one-time codes. At most one code per identity key.
pub trait CodeStore: Send + Sync {
    /// Store `code`, replacing whatever was on file for its identity.
    async fn put(&self, code: &OneTimeCode) -> Result<(), SwitchError>;

    /// Atomically consume the code on file for `identity` if it equals `supplied`
    /// and is live at `now`.
    ///
    /// Fails with `SwitchError::Code`: `NotFound` (nothing on file, or already
    /// consumed), `Expired` (record evicted), `Mismatch` (miss counted; the
    /// record is deleted once `MAX_CODE_ATTEMPTS` misses are reached).
    async fn consume(
        &self,
        identity: &IdentityKey,
        supplied: &str,
        now: DateTime<Utc>,
    ) -> Result<OneTimeCode, SwitchError>;

    /// Remove the code for `identity` if it is still the one with `code_id`.
    async fn revoke(&self, identity: &IdentityKey, code_id: Uuid) -> Result<(), SwitchError>;
}

/// Storage for block records. Every mutation is one atomic storage operation.
pub trait BlockRepository: Send + Sync {
    /// The active block, if any.
    async fn find_active(&self) -> Result<Option<BlockRecord>, SwitchError>;

    /// The draft awaiting verification, if any.
    async fn find_pending(&self) -> Result<Option<PendingBlock>, SwitchError>;

    /// Replace any existing draft with `draft` and store `code` for its identity,
    /// in one transaction. The superseded draft's code dies with it.
    async fn upsert_draft(&self, draft: &BlockRecord, code: &OneTimeCode)
    -> Result<(), SwitchError>;

    /// Consume the activation code for `identity` and make the draft it gates
    /// the only active block, all in one transaction.
    ///
    /// Code failures are reported exactly as [`CodeStore::consume`] reports them
    /// (a miss is counted even though the call fails). If no draft is gated by
    /// the code, `InvariantViolation`. On any failure after the code matched,
    /// the code stays live.
    async fn promote(
        &self,
        identity: &IdentityKey,
        supplied: &str,
        now: DateTime<Utc>,
    ) -> Result<BlockRecord, SwitchError>;

    /// Turn the active block off. Fails with `NothingActive` if none is active.
    async fn deactivate(&self, now: DateTime<Utc>) -> Result<BlockRecord, SwitchError>;

    /// Drop the draft `record_id` and code `code_id` if they still belong together.
    async fn discard_draft(&self, record_id: Uuid, code_id: Uuid) -> Result<(), SwitchError>;
}

/// Out-of-band delivery of a code (email).
pub trait Dispatcher: Send + Sync {
    async fn send(&self, dispatch: &Dispatch) -> Result<(), DispatchError>;
}
