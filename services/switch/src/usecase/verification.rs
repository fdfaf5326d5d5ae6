use chrono::{DateTime, Utc};
use tracing::{info, warn};

use blackout_domain::code::{CodePurpose, IdentityKey};

use crate::domain::repository::{CodeStore, Dispatcher};
use crate::domain::types::{Dispatch, DispatchContext, is_well_formed_code};
use crate::error::SwitchError;
use crate::usecase::code::CodeEngine;
use crate::usecase::dispatch::{DispatchPolicy, deliver};

/// Loose shape check; the mail server is the real judge of deliverability.
fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
}

/// Account flows that may request codes directly. Block activation codes are
/// only ever issued by the block coordinator.
fn requestable(purpose: CodePurpose) -> Result<(), SwitchError> {
    match purpose {
        CodePurpose::Registration | CodePurpose::PasswordReset | CodePurpose::EmailChange => Ok(()),
        CodePurpose::BlockActivation => Err(SwitchError::Validation(
            "block activation codes cannot be requested directly".to_owned(),
        )),
    }
}

fn summary(purpose: CodePurpose) -> &'static str {
    match purpose {
        CodePurpose::Registration => "Use this code to finish creating your account.",
        CodePurpose::PasswordReset => "Use this code to choose a new password.",
        CodePurpose::EmailChange => "Use this code to confirm your new email address.",
        CodePurpose::BlockActivation => "Use this code to activate the client block.",
    }
}

// ── RequestCode ──────────────────────────────────────────────────────────────

pub struct RequestCodeInput {
    pub purpose: CodePurpose,
    pub email: String,
}

pub struct RequestCodeUseCase<S: CodeStore, D: Dispatcher> {
    pub codes: CodeEngine<S>,
    pub dispatcher: D,
    pub policy: DispatchPolicy,
}

impl<S: CodeStore, D: Dispatcher> RequestCodeUseCase<S, D> {
    /// Issue a code for `purpose:email` and mail it. Returns the code's expiry.
    pub async fn execute(&self, input: RequestCodeInput) -> Result<DateTime<Utc>, SwitchError> {
        requestable(input.purpose)?;
        let email = input.email.trim();
        if !is_plausible_email(email) {
            return Err(SwitchError::Validation("invalid email address".to_owned()));
        }

        let identity = IdentityKey::new(input.purpose, email);
        let code = self.codes.issue(&identity).await?;

        // The key is case-folded; mail goes to the address exactly as entered.
        let dispatch = Dispatch {
            destination: email.to_owned(),
            code: code.code.clone(),
            context: DispatchContext {
                purpose: input.purpose,
                requested_by: None,
                requested_at: code.issued_at,
                expires_at: code.expires_at,
                summary: summary(input.purpose).to_owned(),
            },
        };
        if let Err(e) = deliver(&self.dispatcher, &dispatch, self.policy).await {
            if let Err(revoke) = self.codes.revoke(&code).await {
                warn!(identity = %identity, error = %revoke, "failed to revoke undelivered code");
            }
            return Err(e.into());
        }

        info!(purpose = %input.purpose, "verification code sent");
        Ok(code.expires_at)
    }
}

// ── VerifyCode ───────────────────────────────────────────────────────────────

pub struct VerifyCodeInput {
    pub purpose: CodePurpose,
    pub email: String,
    pub code: String,
}

pub struct VerifyCodeUseCase<S: CodeStore> {
    pub codes: CodeEngine<S>,
}

impl<S: CodeStore> VerifyCodeUseCase<S> {
    /// Consume the code for `purpose:email`. A success authorizes exactly one mutation.
    pub async fn execute(&self, input: VerifyCodeInput) -> Result<(), SwitchError> {
        requestable(input.purpose)?;
        if !is_well_formed_code(input.code.trim()) {
            return Err(SwitchError::Validation(
                "code must be 6 digits".to_owned(),
            ));
        }
        let identity = IdentityKey::new(input.purpose, &input.email);
        self.codes.verify(&identity, &input.code).await?;
        Ok(())
    }
}
