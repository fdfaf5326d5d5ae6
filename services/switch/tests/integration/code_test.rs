use chrono::Duration;

use blackout_domain::code::{CodePurpose, IdentityKey};
use blackout_switch::domain::types::MAX_CODE_ATTEMPTS;
use blackout_switch::error::{CodeError, SwitchError};
use blackout_switch::usecase::code::CodeEngine;

use crate::helpers::MemoryStore;

fn engine(store: &MemoryStore) -> CodeEngine<MemoryStore> {
    CodeEngine::new(store.clone(), Duration::seconds(600))
}

fn reset_identity() -> IdentityKey {
    IdentityKey::new(CodePurpose::PasswordReset, "user@example.com")
}

#[tokio::test]
async fn should_issue_code_with_configured_ttl() {
    let store = MemoryStore::new();
    let code = engine(&store).issue(&reset_identity()).await.unwrap();

    assert_eq!(code.expires_at - code.issued_at, Duration::seconds(600));
    assert!(code.consumed_at.is_none());
    assert_eq!(store.code_on_file(&reset_identity()).unwrap().id, code.id);
}

#[tokio::test]
async fn should_verify_code_exactly_once() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let issued = engine.issue(&reset_identity()).await.unwrap();

    let consumed = engine.verify(&reset_identity(), &issued.code).await.unwrap();
    assert_eq!(consumed.id, issued.id);
    assert!(consumed.consumed_at.is_some());

    let again = engine.verify(&reset_identity(), &issued.code).await;
    assert!(
        matches!(again, Err(SwitchError::Code(CodeError::NotFound))),
        "expected NotFound, got {again:?}"
    );
}

#[tokio::test]
async fn should_ignore_surrounding_whitespace() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let issued = engine.issue(&reset_identity()).await.unwrap();

    engine
        .verify(&reset_identity(), &format!("  {}\n", issued.code))
        .await
        .unwrap();
}

#[tokio::test]
async fn should_keep_code_after_mismatch() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let issued = engine.issue(&reset_identity()).await.unwrap();
    let wrong = if issued.code == "999999" { "000000" } else { "999999" };

    let result = engine.verify(&reset_identity(), wrong).await;
    assert!(
        matches!(result, Err(SwitchError::Code(CodeError::Mismatch))),
        "expected Mismatch, got {result:?}"
    );
    engine.verify(&reset_identity(), &issued.code).await.unwrap();
}

#[tokio::test]
async fn should_accept_correct_code_after_misses_below_limit() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let issued = engine.issue(&reset_identity()).await.unwrap();
    let wrong = if issued.code == "999999" { "000000" } else { "999999" };

    for _ in 1..MAX_CODE_ATTEMPTS {
        assert!(engine.verify(&reset_identity(), wrong).await.is_err());
    }
    assert_eq!(
        store.code_on_file(&reset_identity()).unwrap().attempts,
        MAX_CODE_ATTEMPTS - 1
    );
    engine.verify(&reset_identity(), &issued.code).await.unwrap();
}

#[tokio::test]
async fn should_delete_code_on_last_allowed_miss() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let issued = engine.issue(&reset_identity()).await.unwrap();
    let wrong = if issued.code == "999999" { "000000" } else { "999999" };

    for _ in 0..MAX_CODE_ATTEMPTS {
        let result = engine.verify(&reset_identity(), wrong).await;
        assert!(
            matches!(result, Err(SwitchError::Code(CodeError::Mismatch))),
            "expected Mismatch, got {result:?}"
        );
    }
    assert!(store.code_on_file(&reset_identity()).is_none());

    let result = engine.verify(&reset_identity(), &issued.code).await;
    assert!(
        matches!(result, Err(SwitchError::Code(CodeError::NotFound))),
        "expected NotFound, got {result:?}"
    );
}

#[tokio::test]
async fn should_reset_attempts_when_code_is_reissued() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let first = engine.issue(&reset_identity()).await.unwrap();
    let wrong = if first.code == "999999" { "000000" } else { "999999" };
    for _ in 1..MAX_CODE_ATTEMPTS {
        let _ = engine.verify(&reset_identity(), wrong).await;
    }

    let second = engine.issue(&reset_identity()).await.unwrap();
    assert_eq!(store.code_on_file(&reset_identity()).unwrap().attempts, 0);
    engine.verify(&reset_identity(), &second.code).await.unwrap();
}

#[tokio::test]
async fn should_reject_then_evict_expired_code() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let issued = engine.issue(&reset_identity()).await.unwrap();
    store.expire_all_codes();

    let expired = engine.verify(&reset_identity(), &issued.code).await;
    assert!(
        matches!(expired, Err(SwitchError::Code(CodeError::Expired))),
        "expected Expired, got {expired:?}"
    );
    let gone = engine.verify(&reset_identity(), &issued.code).await;
    assert!(
        matches!(gone, Err(SwitchError::Code(CodeError::NotFound))),
        "expected NotFound, got {gone:?}"
    );
}

#[tokio::test]
async fn should_supersede_previous_code_for_same_identity() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let first = engine.issue(&reset_identity()).await.unwrap();
    let second = engine.issue(&reset_identity()).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(store.code_on_file(&reset_identity()).unwrap().id, second.id);
    if first.code != second.code {
        let stale = engine.verify(&reset_identity(), &first.code).await;
        assert!(
            matches!(stale, Err(SwitchError::Code(CodeError::Mismatch))),
            "expected Mismatch, got {stale:?}"
        );
    }
    engine.verify(&reset_identity(), &second.code).await.unwrap();
}

#[tokio::test]
async fn should_keep_purposes_apart_for_the_same_address() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let reset = engine.issue(&reset_identity()).await.unwrap();
    let change_identity = IdentityKey::new(CodePurpose::EmailChange, "user@example.com");
    let change = engine.issue(&change_identity).await.unwrap();

    // Issuing for one purpose does not disturb the other.
    engine.verify(&reset_identity(), &reset.code).await.unwrap();
    engine.verify(&change_identity, &change.code).await.unwrap();

    let registration = IdentityKey::new(CodePurpose::Registration, "user@example.com");
    let cross = engine.verify(&registration, &reset.code).await;
    assert!(
        matches!(cross, Err(SwitchError::Code(CodeError::NotFound))),
        "expected NotFound, got {cross:?}"
    );
}

#[tokio::test]
async fn should_treat_destination_case_insensitively() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let issued = engine
        .issue(&IdentityKey::new(CodePurpose::Registration, "User@Example.COM"))
        .await
        .unwrap();

    engine
        .verify(
            &IdentityKey::new(CodePurpose::Registration, " user@example.com "),
            &issued.code,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn should_revoke_only_the_code_it_was_given() {
    let store = MemoryStore::new();
    let engine = engine(&store);
    let stale = engine.issue(&reset_identity()).await.unwrap();
    let current = engine.issue(&reset_identity()).await.unwrap();

    engine.revoke(&stale).await.unwrap();
    assert_eq!(store.code_on_file(&reset_identity()).unwrap().id, current.id);

    engine.revoke(&current).await.unwrap();
    assert!(store.code_on_file(&reset_identity()).is_none());
}
