//! Authorization decisions. Each check is a pure function with two
//! outcomes: `Ok(())` or a [`Denial`] naming the reason.

use thiserror::Error;
use uuid::Uuid;

use super::extractors::AuthUser;
use crate::users::repo_types::{Role, User};

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum Denial {
    #[error("Admin access required")]
    AdminRequired,
    #[error("Access denied: can only modify own profile or need admin access")]
    NotSelfOrAdmin,
    #[error("Account not activated. Please check your email and activate your account first")]
    AccountNotActive,
}

impl Denial {
    pub fn code(&self) -> &'static str {
        match self {
            Denial::AdminRequired | Denial::NotSelfOrAdmin => "FORBIDDEN",
            Denial::AccountNotActive => "ACCOUNT_NOT_ACTIVE",
        }
    }
}

pub fn require_admin(actor: &AuthUser) -> Result<(), Denial> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(Denial::AdminRequired)
    }
}

pub fn require_self_or_admin(actor: &AuthUser, target: Uuid) -> Result<(), Denial> {
    if actor.id == target || actor.role == Role::Admin {
        Ok(())
    } else {
        Err(Denial::NotSelfOrAdmin)
    }
}

pub fn require_active_account(user: &User) -> Result<(), Denial> {
    if user.is_active {
        Ok(())
    } else {
        Err(Denial::AccountNotActive)
    }
}
