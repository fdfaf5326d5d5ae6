use deadpool_redis::Pool as RedisPool;
use sea_orm::DatabaseConnection;

use crate::infra::cache::RedisCodeStore;
use crate::infra::db::DbBlockRepository;
use crate::infra::mail::SmtpDispatcher;
use crate::usecase::block::BlockCoordinator;
use crate::usecase::code::CodeEngine;
use crate::usecase::dispatch::DispatchPolicy;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub redis: RedisPool,
    pub mailer: SmtpDispatcher,
    pub admin_email: String,
    pub code_ttl: chrono::Duration,
    pub dispatch_policy: DispatchPolicy,
}

impl AppState {
    pub fn block_repo(&self) -> DbBlockRepository {
        DbBlockRepository {
            db: self.db.clone(),
        }
    }

    pub fn account_codes(&self) -> CodeEngine<RedisCodeStore> {
        CodeEngine::new(
            RedisCodeStore {
                pool: self.redis.clone(),
            },
            self.code_ttl,
        )
    }

    /// Activation codes live in the block repository, next to the draft they gate.
    pub fn block_coordinator(&self) -> BlockCoordinator<DbBlockRepository, SmtpDispatcher> {
        BlockCoordinator {
            blocks: self.block_repo(),
            dispatcher: self.mailer.clone(),
            code_ttl: self.code_ttl,
            policy: self.dispatch_policy,
            admin_email: self.admin_email.clone(),
        }
    }
}
