//! Role ranking and authorization predicates.
//!
//! Everything here is pure and side-effect-free. Every mutating operation
//! and every guarded route goes through these predicates; an unknown role
//! string parses to `None` and callers must deny, never silently allow.

use serde::{Deserialize, Serialize};

use crate::AuthError;

/// Ordered team/platform role.
///
/// `SuperAdmin` is a platform-level rank carried in credentials; it is
/// never a team role and never assignable through team operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
    Owner,
    SuperAdmin,
}

impl Role {
    /// Returns the ordinal rank of the role.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Member => 1,
            Self::Admin => 2,
            Self::Owner => 3,
            Self::SuperAdmin => 4,
        }
    }

    /// Rank comparison. In strict mode the ranks must match exactly.
    pub fn is_at_least(&self, required: Role, strict: bool) -> bool {
        if strict {
            self.rank() == required.rank()
        } else {
            self.rank() >= required.rank()
        }
    }

    /// String form used in storage and claims.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
            Self::SuperAdmin => "super_admin",
        }
    }

    /// Parses a stored role string. Unknown strings yield `None`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            "super_admin" => Some(Self::SuperAdmin),
            _ => None,
        }
    }

    /// True for roles a team member can hold.
    pub fn is_team_role(&self) -> bool {
        !matches!(self, Self::SuperAdmin)
    }
}

/// Parses a role string, denying (and logging) unknown values.
pub fn parse_role_or_deny(s: &str) -> Result<Role, AuthError> {
    match Role::from_str(s) {
        Some(role) => Ok(role),
        None => {
            log::warn!(target: "warrant", "msg=\"unknown role string, denying\", role=\"{s}\"");
            Err(AuthError::Forbidden)
        }
    }
}

/// Route guard: does the effective role satisfy the requirement?
///
/// The effective role is the acting-as identity's role while an
/// impersonation is active, so an impersonating admin never blends in
/// their underlying rank. `None` (no role resolved) always denies.
pub fn require_role(effective: Option<Role>, required: Role) -> Result<(), AuthError> {
    match effective {
        Some(role) if role.is_at_least(required, false) => Ok(()),
        _ => Err(AuthError::Forbidden),
    }
}

/// May `actor` grant `new_role` to another member of the team?
///
/// Only an owner may promote to admin; nobody grants `owner` directly
/// (ownership moves via transfer) or `super_admin` (not a team role).
pub fn can_grant_role(actor: Role, new_role: Role) -> Result<(), AuthError> {
    if !new_role.is_team_role() || new_role == Role::Owner {
        return Err(AuthError::RoleNotAssignable);
    }
    let required = match new_role {
        Role::Admin => Role::Owner,
        _ => Role::Admin,
    };
    if actor.is_at_least(required, false) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// May `inviter_role` issue an invitation at `invited_role`?
///
/// Same matrix as granting: inviting at admin is a promotion in disguise
/// and needs an owner.
pub fn can_invite_at_role(inviter_role: Role, invited_role: Role) -> Result<(), AuthError> {
    can_grant_role(inviter_role, invited_role)
}
