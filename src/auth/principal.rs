//! The resolved, request-scoped identity.

use serde::{Deserialize, Serialize};

use crate::db::models::users::UserDBResponse;
use crate::types::UserId;

/// Which credential source produced a [`Principal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    Jwt,
    ForwardedHeaders,
    LocalFallback,
}

/// The authenticated identity for one request.
///
/// Constructed once per request by the resolver and discarded at request end;
/// never persisted. Resolution answers "who is this" only - an inactive user
/// still resolves to a structurally valid principal, and the authorization
/// gate is what denies them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub auth_method: AuthMethod,
}

impl Principal {
    pub fn from_user(user: &UserDBResponse, auth_method: AuthMethod) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            is_admin: user.is_admin,
            is_active: user.is_active,
            auth_method,
        }
    }
}
