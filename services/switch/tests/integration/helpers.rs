use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use blackout_domain::code::IdentityKey;
use blackout_domain::user::UserRole;
use blackout_switch::domain::repository::{BlockRepository, CodeStore, Dispatcher};
use blackout_switch::domain::types::{
    Actor, BlockRecord, Dispatch, MAX_CODE_ATTEMPTS, OneTimeCode, PendingBlock,
};
use blackout_switch::error::{CodeError, DispatchError, SwitchError};
use blackout_switch::usecase::block::BlockCoordinator;
use blackout_switch::usecase::dispatch::DispatchPolicy;

pub const ADMIN_EMAIL: &str = "ops@example.com";

// ── MemoryStore ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct Tables {
    codes: HashMap<String, OneTimeCode>,
    blocks: Vec<BlockRecord>,
}

impl Tables {
    fn consume(
        &mut self,
        identity: &IdentityKey,
        supplied: &str,
        now: DateTime<Utc>,
    ) -> Result<OneTimeCode, SwitchError> {
        let key = identity.as_key();
        let Some(code) = self.codes.get_mut(&key) else {
            return Err(CodeError::NotFound.into());
        };
        if code.consumed_at.is_some() {
            return Err(CodeError::NotFound.into());
        }
        if code.is_expired(now) {
            self.codes.remove(&key);
            return Err(CodeError::Expired.into());
        }
        if code.code != supplied {
            code.attempts += 1;
            if code.attempts >= MAX_CODE_ATTEMPTS {
                self.codes.remove(&key);
            }
            return Err(CodeError::Mismatch.into());
        }
        code.consumed_at = Some(now);
        Ok(code.clone())
    }
}

/// In-memory code store and block repository sharing one set of tables, the
/// way the database adapters share one PostgreSQL schema.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.tables
            .lock()
            .unwrap()
            .blocks
            .iter()
            .filter(|b| b.active)
            .count()
    }

    pub fn draft_count(&self) -> usize {
        self.tables
            .lock()
            .unwrap()
            .blocks
            .iter()
            .filter(|b| !b.active && b.pending_code_id.is_some())
            .count()
    }

    pub fn code_on_file(&self, identity: &IdentityKey) -> Option<OneTimeCode> {
        self.tables
            .lock()
            .unwrap()
            .codes
            .get(&identity.as_key())
            .cloned()
    }

    /// Push every stored code's expiry into the past.
    pub fn expire_all_codes(&self) {
        let past = Utc::now() - chrono::Duration::seconds(1);
        for code in self.tables.lock().unwrap().codes.values_mut() {
            code.expires_at = past;
        }
    }
}

impl CodeStore for MemoryStore {
    async fn put(&self, code: &OneTimeCode) -> Result<(), SwitchError> {
        self.tables
            .lock()
            .unwrap()
            .codes
            .insert(code.identity.as_key(), code.clone());
        Ok(())
    }

    async fn consume(
        &self,
        identity: &IdentityKey,
        supplied: &str,
        now: DateTime<Utc>,
    ) -> Result<OneTimeCode, SwitchError> {
        self.tables.lock().unwrap().consume(identity, supplied, now)
    }

    async fn revoke(&self, identity: &IdentityKey, code_id: Uuid) -> Result<(), SwitchError> {
        let mut tables = self.tables.lock().unwrap();
        let key = identity.as_key();
        if tables.codes.get(&key).is_some_and(|c| c.id == code_id) {
            tables.codes.remove(&key);
        }
        Ok(())
    }
}

impl BlockRepository for MemoryStore {
    async fn find_active(&self) -> Result<Option<BlockRecord>, SwitchError> {
        let tables = self.tables.lock().unwrap();
        let active: Vec<&BlockRecord> = tables.blocks.iter().filter(|b| b.active).collect();
        if active.len() > 1 {
            return Err(SwitchError::InvariantViolation(format!(
                "{} active blocks",
                active.len()
            )));
        }
        Ok(active.first().map(|b| (*b).clone()))
    }

    async fn find_pending(&self) -> Result<Option<PendingBlock>, SwitchError> {
        let tables = self.tables.lock().unwrap();
        let Some(record) = tables
            .blocks
            .iter()
            .filter(|b| !b.active && b.pending_code_id.is_some())
            .max_by_key(|b| b.created_at)
            .cloned()
        else {
            return Ok(None);
        };
        let code_expires_at = tables
            .codes
            .values()
            .find(|c| Some(c.id) == record.pending_code_id && c.consumed_at.is_none())
            .map(|c| c.expires_at);
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
        let mut tables = self.tables.lock().unwrap();
        tables.blocks.retain(|b| b.active);
        tables.codes.insert(code.identity.as_key(), code.clone());
        tables.blocks.push(draft.clone());
        Ok(())
    }

    async fn promote(
        &self,
        identity: &IdentityKey,
        supplied: &str,
        now: DateTime<Utc>,
    ) -> Result<BlockRecord, SwitchError> {
        let mut tables = self.tables.lock().unwrap();
        let on_file = tables.codes.get(&identity.as_key()).cloned();
        let code = tables.consume(identity, supplied, now)?;
        let Some(index) = tables
            .blocks
            .iter()
            .position(|b| b.pending_code_id == Some(code.id) && !b.active)
        else {
            // Roll the consumption back along with the failed promotion.
            if let Some(on_file) = on_file {
                tables.codes.insert(identity.as_key(), on_file);
            }
            return Err(SwitchError::InvariantViolation(
                "no draft is gated by this code".to_owned(),
            ));
        };
        for block in tables.blocks.iter_mut().filter(|b| b.active) {
            block.active = false;
            block.updated_at = now;
        }
        let draft = &mut tables.blocks[index];
        draft.active = true;
        draft.pending_code_id = None;
        draft.updated_at = now;
        Ok(draft.clone())
    }

    async fn deactivate(&self, now: DateTime<Utc>) -> Result<BlockRecord, SwitchError> {
        let mut tables = self.tables.lock().unwrap();
        let mut deactivated = None;
        for block in tables.blocks.iter_mut().filter(|b| b.active) {
            block.active = false;
            block.updated_at = now;
            deactivated = Some(block.clone());
        }
        deactivated.ok_or(SwitchError::NothingActive)
    }

    async fn discard_draft(&self, record_id: Uuid, code_id: Uuid) -> Result<(), SwitchError> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .blocks
            .retain(|b| !(b.id == record_id && b.pending_code_id == Some(code_id) && !b.active));
        tables.codes.retain(|_, c| c.id != code_id);
        Ok(())
    }
}

// ── FlakyBlocks ──────────────────────────────────────────────────────────────

/// Block repository whose first `n` promotions fail with a storage error
/// before anything is written; everything else goes to the wrapped store.
#[derive(Clone)]
pub struct FlakyBlocks {
    pub inner: MemoryStore,
    failures_left: Arc<AtomicU32>,
}

impl FlakyBlocks {
    pub fn failing_promotions(inner: &MemoryStore, n: u32) -> Self {
        Self {
            inner: inner.clone(),
            failures_left: Arc::new(AtomicU32::new(n)),
        }
    }
}

impl BlockRepository for FlakyBlocks {
    async fn find_active(&self) -> Result<Option<BlockRecord>, SwitchError> {
        self.inner.find_active().await
    }

    async fn find_pending(&self) -> Result<Option<PendingBlock>, SwitchError> {
        self.inner.find_pending().await
    }

    async fn upsert_draft(
        &self,
        draft: &BlockRecord,
        code: &OneTimeCode,
    ) -> Result<(), SwitchError> {
        self.inner.upsert_draft(draft, code).await
    }

    async fn promote(
        &self,
        identity: &IdentityKey,
        supplied: &str,
        now: DateTime<Utc>,
    ) -> Result<BlockRecord, SwitchError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SwitchError::Internal(anyhow::anyhow!("connection reset")));
        }
        self.inner.promote(identity, supplied, now).await
    }

    async fn deactivate(&self, now: DateTime<Utc>) -> Result<BlockRecord, SwitchError> {
        self.inner.deactivate(now).await
    }

    async fn discard_draft(&self, record_id: Uuid, code_id: Uuid) -> Result<(), SwitchError> {
        self.inner.discard_draft(record_id, code_id).await
    }
}

// ── MockDispatcher ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum DispatchMode {
    Deliver,
    Fail,
    /// Fail the first `n` attempts, then deliver.
    FailFirst(u32),
    /// Never complete; only the dispatch timeout ends the attempt.
    Hang,
}

#[derive(Clone)]
pub struct MockDispatcher {
    mode: DispatchMode,
    attempts: Arc<AtomicU32>,
    sent: Arc<Mutex<Vec<Dispatch>>>,
}

impl MockDispatcher {
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            mode,
            attempts: Arc::new(AtomicU32::new(0)),
            sent: Arc::new(Mutex::new(vec![])),
        }
    }

    pub fn delivering() -> Self {
        Self::new(DispatchMode::Deliver)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Messages that were actually delivered.
    pub fn sent(&self) -> Vec<Dispatch> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_code(&self) -> String {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|d| d.code.clone())
            .expect("no code was delivered")
    }
}

impl Dispatcher for MockDispatcher {
    async fn send(&self, dispatch: &Dispatch) -> Result<(), DispatchError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match self.mode {
            DispatchMode::Deliver => {}
            DispatchMode::Fail => return Err(DispatchError::Failed("mailbox unavailable".into())),
            DispatchMode::FailFirst(n) if attempt <= n => {
                return Err(DispatchError::Failed("transient".into()));
            }
            DispatchMode::FailFirst(_) => {}
            DispatchMode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
        self.sent.lock().unwrap().push(dispatch.clone());
        Ok(())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub type TestCoordinator = BlockCoordinator<MemoryStore, MockDispatcher>;

pub fn fast_policy() -> DispatchPolicy {
    DispatchPolicy {
        timeout: Duration::from_millis(50),
        max_attempts: 2,
    }
}

pub fn test_coordinator(store: &MemoryStore, dispatcher: &MockDispatcher) -> TestCoordinator {
    coordinator_over(store.clone(), dispatcher)
}

pub fn coordinator_over<R: BlockRepository>(
    blocks: R,
    dispatcher: &MockDispatcher,
) -> BlockCoordinator<R, MockDispatcher> {
    BlockCoordinator {
        blocks,
        dispatcher: dispatcher.clone(),
        code_ttl: chrono::Duration::seconds(600),
        policy: fast_policy(),
        admin_email: ADMIN_EMAIL.to_owned(),
    }
}

pub fn operator() -> Actor {
    Actor {
        user_id: Uuid::now_v7(),
        role: Some(UserRole::SuperAdmin),
    }
}

pub fn actor_with(role: UserRole) -> Actor {
    Actor {
        user_id: Uuid::now_v7(),
        role: Some(role),
    }
}
