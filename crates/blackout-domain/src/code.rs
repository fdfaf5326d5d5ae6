//! One-time code purposes and the identity keys codes are bound to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a one-time code authorizes.
///
/// Wire format: snake_case string (`"registration"`, `"password_reset"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodePurpose {
    Registration,
    PasswordReset,
    EmailChange,
    BlockActivation,
}

impl CodePurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::PasswordReset => "password_reset",
            Self::EmailChange => "email_change",
            Self::BlockActivation => "block_activation",
        }
    }
}

impl fmt::Display for CodePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown code purpose: {0}")]
pub struct UnknownPurpose(pub String);

impl FromStr for CodePurpose {
    type Err = UnknownPurpose;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(Self::Registration),
            "password_reset" => Ok(Self::PasswordReset),
            "email_change" => Ok(Self::EmailChange),
            "block_activation" => Ok(Self::BlockActivation),
            other => Err(UnknownPurpose(other.to_owned())),
        }
    }
}

/// Key a one-time code is bound to: `"{purpose}:{destination}"`.
///
/// The purpose prefix keeps a code issued for one flow from being replayed
/// against another flow for the same address. The destination is trimmed and
/// lower-cased so differently-cased spellings of an address share one key; mail
/// is still sent to the address as the caller wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    purpose: CodePurpose,
    destination: String,
}

impl IdentityKey {
    pub fn new(purpose: CodePurpose, destination: &str) -> Self {
        Self {
            purpose,
            destination: destination.trim().to_lowercase(),
        }
    }

    pub fn purpose(&self) -> CodePurpose {
        self.purpose
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Storage key form, e.g. `block_activation:ops@example.com`.
    pub fn as_key(&self) -> String {
        format!("{}:{}", self.purpose, self.destination)
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.purpose, self.destination)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseIdentityKeyError {
    #[error("identity key has no purpose separator")]
    MissingSeparator,
    #[error(transparent)]
    UnknownPurpose(#[from] UnknownPurpose),
}

impl FromStr for IdentityKey {
    type Err = ParseIdentityKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (purpose, destination) = s
            .split_once(':')
            .ok_or(ParseIdentityKeyError::MissingSeparator)?;
        Ok(Self::new(purpose.parse()?, destination))
    }
}
