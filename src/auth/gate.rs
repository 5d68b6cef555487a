//! Ownership and role based access decisions.
//!
//! This is the single authorization decision point for the whole service:
//! REST handlers and GraphQL resolvers call the same functions, so the rules
//! cannot drift between transports.
//!
//! Decision order:
//! 1. Inactive principals are denied unconditionally, before anything else.
//! 2. Admins may access any resource.
//! 3. Everyone else may access exactly the resources they own.

use crate::auth::principal::Principal;
use crate::errors::Error;
use crate::types::UserId;

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The account is deactivated; ownership and roles are irrelevant.
    Inactive,
    /// The principal neither owns the resource nor is an admin.
    NotOwner,
}

/// Anything with a single owning user.
pub trait Owned {
    fn owner_id(&self) -> UserId;
}

impl Owned for crate::db::models::items::ItemDBResponse {
    fn owner_id(&self) -> UserId {
        self.owner_id
    }
}

/// Users own themselves: self-service reads/updates go through the same gate.
impl Owned for crate::db::models::users::UserDBResponse {
    fn owner_id(&self) -> UserId {
        self.id
    }
}

/// Decide whether `principal` may act on `resource`.
pub fn can_access<R: Owned>(principal: &Principal, resource: &R) -> Access {
    if !principal.is_active {
        return Access::Deny(DenyReason::Inactive);
    }
    if principal.is_admin {
        return Access::Allow;
    }
    if resource.owner_id() == principal.user_id {
        Access::Allow
    } else {
        Access::Deny(DenyReason::NotOwner)
    }
}

/// Like [`can_access`], mapping a denial onto the service error type.
pub fn authorize<R: Owned>(principal: &Principal, resource: &R, action: &str, resource_name: &str) -> Result<(), Error> {
    match can_access(principal, resource) {
        Access::Allow => Ok(()),
        Access::Deny(_) => Err(Error::Forbidden {
            action: action.to_string(),
            resource: resource_name.to_string(),
        }),
    }
}

/// Operations without a target resource (creating items, listing own data)
/// still require an active account.
pub fn require_active(principal: &Principal, action: &str, resource_name: &str) -> Result<(), Error> {
    if principal.is_active {
        Ok(())
    } else {
        Err(Error::Forbidden {
            action: action.to_string(),
            resource: resource_name.to_string(),
        })
    }
}

/// Admin-only operations (listing all users, toggling roles).
pub fn require_admin(principal: &Principal, action: &str, resource_name: &str) -> Result<(), Error> {
    if !principal.is_active || !principal.is_admin {
        return Err(Error::Forbidden {
            action: action.to_string(),
            resource: resource_name.to_string(),
        });
    }
    Ok(())
}
