//! Mock auth helpers for integration tests.
//!
//! Services behind the gateway receive `x-blackout-user-id` + `x-blackout-user-role` headers
//! injected by the gateway. In tests, `MockAuth` produces these headers directly
//! so no real gateway or session is needed.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

use blackout_auth_types::identity::{USER_ID_HEADER, USER_ROLE_HEADER};
use blackout_domain::user::UserRole;

/// Configurable identity injected into test requests.
pub struct MockAuth {
    pub user_id: Uuid,
    pub user_role: u8,
}

impl MockAuth {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self {
            user_id,
            user_role: role.as_u8(),
        }
    }

    pub fn super_admin() -> Self {
        Self::new(Uuid::new_v4(), UserRole::SuperAdmin)
    }

    pub fn member() -> Self {
        Self::new(Uuid::new_v4(), UserRole::Member)
    }

    /// Return headers as if the gateway injected them.
    pub fn headers(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(
            HeaderName::from_static(USER_ID_HEADER),
            HeaderValue::from_str(&self.user_id.to_string()).unwrap(),
        );
        map.insert(
            HeaderName::from_static(USER_ROLE_HEADER),
            HeaderValue::from(u16::from(self.user_role)),
        );
        map
    }
}
