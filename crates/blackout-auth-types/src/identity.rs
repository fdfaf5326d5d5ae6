//! Gateway-injected identity headers extractor.

use axum::extract::FromRequestParts;
use http::StatusCode;
use http::request::Parts;
use uuid::Uuid;

use blackout_domain::user::UserRole;

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-blackout-user-id";

/// Header carrying the authenticated user's role as a `u8` wire value.
pub const USER_ROLE_HEADER: &str = "x-blackout-user-role";

/// User identity injected by the gateway via `x-blackout-user-id` and `x-blackout-user-role`.
///
/// Returns 401 if either header is absent or unparsable. Role enforcement (403)
/// is left to use cases, which know which role an operation needs.
#[derive(Debug, Clone)]
pub struct IdentityHeaders {
    pub user_id: Uuid,
    pub user_role: u8,
}

impl IdentityHeaders {
    /// Typed role; unknown wire values map to `None` and never satisfy a role check.
    pub fn role(&self) -> Option<UserRole> {
        UserRole::from_u8(self.user_role)
    }
}

impl<S> FromRequestParts<S> for IdentityHeaders
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    // axum-core 0.5 declares `fn -> impl Future + Send`; reading the headers up front
    // keeps the returned future free of borrows on `parts`.
    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Uuid>().ok());

        let user_role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u8>().ok());

        async move {
            let user_id = user_id.ok_or(StatusCode::UNAUTHORIZED)?;
            let user_role = user_role.ok_or(StatusCode::UNAUTHORIZED)?;
            Ok(Self { user_id, user_role })
        }
    }
}
