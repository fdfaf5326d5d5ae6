use chrono::{DateTime, Duration, Utc};
use rand::RngExt;
use tracing::debug;
use uuid::Uuid;

use blackout_domain::code::IdentityKey;

use crate::domain::repository::CodeStore;
use crate::domain::types::{CODE_LEN, OneTimeCode};
use crate::error::SwitchError;

/// Uniform over `000000..=999999`.
fn generate_code() -> String {
    let mut rng = rand::rng();
    let n: u32 = rng.random_range(0..10u32.pow(CODE_LEN as u32));
    format!("{n:0width$}", width = CODE_LEN)
}

/// Fresh code for `identity`, valid for `ttl` from `now`. Not stored anywhere.
pub fn mint(identity: &IdentityKey, ttl: Duration, now: DateTime<Utc>) -> OneTimeCode {
    OneTimeCode {
        id: Uuid::now_v7(),
        identity: identity.clone(),
        code: generate_code(),
        issued_at: now,
        expires_at: now + ttl,
        consumed_at: None,
        attempts: 0,
    }
}

/// Issues and verifies one-time codes. Purpose-agnostic: callers pick the
/// identity key, the engine enforces overwrite-on-issue, expiry and single use.
pub struct CodeEngine<S: CodeStore> {
    pub store: S,
    pub ttl: Duration,
}

impl<S: CodeStore> CodeEngine<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Generate and store a code, killing any code previously issued for `identity`.
    pub async fn issue(&self, identity: &IdentityKey) -> Result<OneTimeCode, SwitchError> {
        let code = mint(identity, self.ttl, Utc::now());
        self.store.put(&code).await?;
        debug!(identity = %identity, code_id = %code.id, "one-time code issued");
        Ok(code)
    }

    /// Check `supplied` against the code on file and consume it on success.
    ///
    /// Expiry is judged here, at verification time; a correct but expired code fails.
    /// Every miss counts against the code, which is deleted after
    /// [`MAX_CODE_ATTEMPTS`](crate::domain::types::MAX_CODE_ATTEMPTS) misses.
    pub async fn verify(
        &self,
        identity: &IdentityKey,
        supplied: &str,
    ) -> Result<OneTimeCode, SwitchError> {
        let consumed = self
            .store
            .consume(identity, supplied.trim(), Utc::now())
            .await?;
        debug!(identity = %identity, code_id = %consumed.id, "one-time code consumed");
        Ok(consumed)
    }

    /// Withdraw a code that was stored but never delivered.
    pub async fn revoke(&self, code: &OneTimeCode) -> Result<(), SwitchError> {
        self.store.revoke(&code.identity, code.id).await
    }
}
