use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use blackout_domain::code::{CodePurpose, IdentityKey};
use blackout_domain::user::UserRole;

use crate::error::SwitchError;

/// Caller identity as seen by use cases (built from gateway headers).
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    /// `None` when the gateway sent a role value this service does not know.
    pub role: Option<UserRole>,
}

impl Actor {
    pub fn require(&self, required: UserRole) -> Result<(), SwitchError> {
        match self.role {
            Some(role) if role.satisfies(required) => Ok(()),
            _ => Err(SwitchError::Forbidden),
        }
    }
}

/// Role needed to propose, confirm, deactivate or inspect the global block.
pub const BLOCK_OPERATOR_ROLE: UserRole = UserRole::SuperAdmin;

// ── One-time codes ───────────────────────────────────────────────────────────

/// Short-lived code bound to an identity key.
#[derive(Debug, Clone, PartialEq)]
pub struct OneTimeCode {
    pub id: Uuid,
    pub identity: IdentityKey,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    /// Wrong guesses recorded against this code so far.
    pub attempts: u32,
}

impl OneTimeCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Unconsumed and unexpired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && !self.is_expired(now)
    }
}

/// Number of decimal digits in a one-time code.
pub const CODE_LEN: usize = 6;

/// Default code time-to-live in seconds.
pub const DEFAULT_CODE_TTL_SECS: i64 = 600;

/// Upper bound accepted for a configured code TTL (one day).
pub const MAX_CODE_TTL_SECS: i64 = 86_400;

/// Wrong guesses a code survives. The miss that reaches this count deletes it.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

/// How long Redis keeps an expired code around so verification can still
/// answer `Expired` instead of `NotFound`.
pub const EXPIRED_CODE_GRACE_SECS: i64 = 300;

/// `true` if `code` has the shape of an issued code (exactly [`CODE_LEN`] ASCII digits).
pub fn is_well_formed_code(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

// ── Block ────────────────────────────────────────────────────────────────────

pub const NOTICE_TITLE_MAX_CHARS: usize = 120;
pub const NOTICE_MESSAGE_MAX_CHARS: usize = 2000;

/// What clients are shown while a block is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockNotice {
    pub title: String,
    pub message: String,
}

impl BlockNotice {
    /// Trim and validate operator input.
    pub fn parse(title: &str, message: &str) -> Result<Self, SwitchError> {
        let title = title.trim();
        let message = message.trim();
        if title.is_empty() {
            return Err(SwitchError::Validation("notice title is required".to_owned()));
        }
        if message.is_empty() {
            return Err(SwitchError::Validation(
                "notice message is required".to_owned(),
            ));
        }
        if title.chars().count() > NOTICE_TITLE_MAX_CHARS {
            return Err(SwitchError::Validation(format!(
                "notice title exceeds {NOTICE_TITLE_MAX_CHARS} characters"
            )));
        }
        if message.chars().count() > NOTICE_MESSAGE_MAX_CHARS {
            return Err(SwitchError::Validation(format!(
                "notice message exceeds {NOTICE_MESSAGE_MAX_CHARS} characters"
            )));
        }
        Ok(Self {
            title: title.to_owned(),
            message: message.to_owned(),
        })
    }
}

/// A row of the block table: the draft (gated by a code), the active block,
/// or a retired block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub id: Uuid,
    pub active: bool,
    pub notice: BlockNotice,
    /// Code currently gating activation; `None` once active.
    pub pending_code_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Draft awaiting its activation code, with the expiry of that code if it is still on file.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBlock {
    pub record: BlockRecord,
    pub code_expires_at: Option<DateTime<Utc>>,
}

/// Coarse state of the block workflow.
///
/// A pending draft takes precedence: an active block with a new proposal in
/// flight reports `PendingVerification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockState {
    Idle,
    PendingVerification,
    Active,
}

impl BlockState {
    pub fn derive(active: Option<&BlockRecord>, pending: Option<&PendingBlock>) -> Self {
        match (active, pending) {
            (_, Some(_)) => Self::PendingVerification,
            (Some(_), None) => Self::Active,
            (None, None) => Self::Idle,
        }
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

/// Human-readable context delivered along with a code.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub purpose: CodePurpose,
    pub requested_by: Option<Uuid>,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// What confirming the code will do.
    pub summary: String,
}

/// A code to be delivered to an out-of-band destination.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub destination: String,
    pub code: String,
    pub context: DispatchContext,
}
