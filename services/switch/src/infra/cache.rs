use anyhow::Context as _;
use chrono::{DateTime, Utc};
use deadpool_redis::Pool;
use deadpool_redis::redis::{self, AsyncCommands};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use blackout_domain::code::IdentityKey;

use crate::domain::repository::CodeStore;
use crate::domain::types::{EXPIRED_CODE_GRACE_SECS, MAX_CODE_ATTEMPTS, OneTimeCode};
use crate::error::{CodeError, SwitchError};

/// Compare-and-consume in one round trip. Replies `{status}` or `{"OK", raw}`.
/// A miss bumps `attempts` in place; the miss reaching `ARGV[3]` deletes the key.
const CONSUME_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return {'NOT_FOUND'}
end
local rec = cjson.decode(raw)
if tonumber(ARGV[2]) > rec.expires_at_ms then
  redis.call('DEL', KEYS[1])
  return {'EXPIRED'}
end
if rec.code ~= ARGV[1] then
  local attempts = (rec.attempts or 0) + 1
  if attempts >= tonumber(ARGV[3]) then
    redis.call('DEL', KEYS[1])
  else
    rec.attempts = attempts
    redis.call('SET', KEYS[1], cjson.encode(rec), 'KEEPTTL')
  end
  return {'MISMATCH'}
end
redis.call('DEL', KEYS[1])
return {'OK', raw}
"#;

/// Delete the key only if it still holds the code with id `ARGV[1]`.
const REVOKE_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return 0
end
if cjson.decode(raw).id ~= ARGV[1] then
  return 0
end
return redis.call('DEL', KEYS[1])
"#;

#[derive(Clone)]
pub struct RedisCodeStore {
    pub pool: Pool,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCode {
    id: Uuid,
    code: String,
    issued_at_ms: i64,
    expires_at_ms: i64,
    #[serde(default)]
    attempts: u32,
}

fn code_key(identity: &IdentityKey) -> String {
    format!("otc:{}", identity.as_key())
}

/// Keys outlive the code by a grace period so a late attempt still reads as
/// `Expired` rather than `NotFound`.
fn key_ttl_secs(code: &OneTimeCode, now: DateTime<Utc>) -> u64 {
    let remaining = (code.expires_at - now).num_seconds().max(0);
    (remaining + EXPIRED_CODE_GRACE_SECS).max(1) as u64
}

impl CodeStore for RedisCodeStore {
    async fn put(&self, code: &OneTimeCode) -> Result<(), SwitchError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| SwitchError::Internal(e.into()))?;
        let payload = serde_json::to_string(&StoredCode {
            id: code.id,
            code: code.code.clone(),
            issued_at_ms: code.issued_at.timestamp_millis(),
            expires_at_ms: code.expires_at.timestamp_millis(),
            attempts: code.attempts,
        })
        .context("encode one-time code")?;
        let (): () = conn
            .set_ex(code_key(&code.identity), payload, key_ttl_secs(code, Utc::now()))
            .await
            .map_err(|e: deadpool_redis::redis::RedisError| SwitchError::Internal(e.into()))?;
        Ok(())
    }

    async fn consume(
        &self,
        identity: &IdentityKey,
        supplied: &str,
        now: DateTime<Utc>,
    ) -> Result<OneTimeCode, SwitchError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| SwitchError::Internal(e.into()))?;
        let reply: Vec<String> = redis::cmd("EVAL")
            .arg(CONSUME_SCRIPT)
            .arg(1)
            .arg(code_key(identity))
            .arg(supplied)
            .arg(now.timestamp_millis())
            .arg(MAX_CODE_ATTEMPTS)
            .query_async(&mut conn)
            .await
            .map_err(|e| SwitchError::Internal(e.into()))?;

        match reply.as_slice() {
            [status, raw] if status == "OK" => {
                let stored: StoredCode =
                    serde_json::from_str(raw).context("decode one-time code")?;
                Ok(OneTimeCode {
                    id: stored.id,
                    identity: identity.clone(),
                    code: stored.code,
                    issued_at: DateTime::from_timestamp_millis(stored.issued_at_ms)
                        .context("one-time code issued_at out of range")?,
                    expires_at: DateTime::from_timestamp_millis(stored.expires_at_ms)
                        .context("one-time code expires_at out of range")?,
                    consumed_at: Some(now),
                    attempts: stored.attempts,
                })
            }
            [status] if status == "EXPIRED" => Err(CodeError::Expired.into()),
            [status] if status == "MISMATCH" => Err(CodeError::Mismatch.into()),
            [status] if status == "NOT_FOUND" => Err(CodeError::NotFound.into()),
            other => Err(SwitchError::Internal(anyhow::anyhow!(
                "unexpected consume reply: {other:?}"
            ))),
        }
    }

    async fn revoke(&self, identity: &IdentityKey, code_id: Uuid) -> Result<(), SwitchError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| SwitchError::Internal(e.into()))?;
        let _: i64 = redis::cmd("EVAL")
            .arg(REVOKE_SCRIPT)
            .arg(1)
            .arg(code_key(identity))
            .arg(code_id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(|e| SwitchError::Internal(e.into()))?;
        Ok(())
    }
}
