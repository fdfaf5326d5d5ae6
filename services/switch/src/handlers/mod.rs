use blackout_auth_types::identity::IdentityHeaders;

use crate::domain::types::Actor;

pub mod block;
pub mod verification;

impl From<&IdentityHeaders> for Actor {
    fn from(identity: &IdentityHeaders) -> Self {
        Self {
            user_id: identity.user_id,
            role: identity.role(),
        }
    }
}
