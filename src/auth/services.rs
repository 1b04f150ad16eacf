//! Authentication flows over the shared state: login, registration,
//! password change and reset, account activation.

use tracing::{info, warn};

use super::{
    extractors::AuthUser,
    gate,
    password::{check_strength, hash_password_async, verify_password_async, PasswordPolicy},
};
use crate::{
    error::AppError,
    state::AppState,
    tokens::{IssuedToken, TokenError},
    users::repo_types::{Role, User, UserPatch},
};

#[derive(Debug)]
pub struct Registered {
    pub user: User,
    pub activation: IssuedToken,
    pub activation_email_sent: bool,
}

/// Returns the session token and the user. Unknown email and wrong password
/// produce the same error.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<(String, User), AppError> {
    let Some(user) = state.users.find_by_email(email).await else {
        warn!(target: "security_event", event = "FAILED_LOGIN_ATTEMPT", email, reason = "user not found", "login rejected");
        return Err(AppError::InvalidCredentials);
    };

    if let Err(denial) = gate::require_active_account(&user) {
        warn!(target: "security_event", event = "INACTIVE_ACCOUNT_LOGIN", email, user_id = %user.id, "login rejected");
        return Err(denial.into());
    }

    if !verify_password_async(password.to_string(), user.password_hash.clone()).await? {
        warn!(target: "security_event", event = "FAILED_LOGIN_ATTEMPT", email, user_id = %user.id, reason = "invalid password", "login rejected");
        return Err(AppError::InvalidCredentials);
    }

    let token = state.keys.sign(&user)?;
    info!(target: "auth_event", event = "LOGIN_SUCCESS", user_id = %user.id, email, "user logged in");
    Ok((token, user))
}

/// Creates an inactive user and issues an activation token. A failed
/// activation email is logged and reported, the user stays created.
pub async fn register(
    state: &AppState,
    name: &str,
    email: &str,
    password: &str,
) -> Result<Registered, AppError> {
    check_strength(password, PasswordPolicy::Strong)?;

    if state.users.find_by_email(email).await.is_some() {
        warn!(email, "email already registered");
        return Err(AppError::AlreadyExists);
    }

    let hash = hash_password_async(password.to_string()).await?;
    let user = state.users.insert(User::new(email, hash, name, Role::User)).await?;

    let activation = state.activations.issue(&user.email, user.id);
    let activation_email_sent = match state.activations.deliver(&user.email, &activation).await {
        Ok(()) => true,
        Err(e) => {
            warn!(target: "security_event", event = "ACTIVATION_EMAIL_FAILED", email = %user.email, user_id = %user.id, error = %e, "activation email not delivered");
            false
        }
    };

    info!(target: "auth_event", event = "USER_REGISTERED", user_id = %user.id, email = %user.email, requires_activation = true, "user registered");
    Ok(Registered {
        user,
        activation,
        activation_email_sent,
    })
}

pub async fn change_password(
    state: &AppState,
    actor: &AuthUser,
    current_password: &str,
    new_password: &str,
) -> Result<(), AppError> {
    if current_password.is_empty() || new_password.is_empty() {
        return Err(AppError::Validation(
            "Current password and new password are required".into(),
        ));
    }

    let user = state
        .users
        .find_by_id(actor.id)
        .await
        .ok_or(AppError::NotFound("User"))?;

    if !verify_password_async(current_password.to_string(), user.password_hash.clone()).await? {
        warn!(target: "security_event", event = "PASSWORD_CHANGE_WRONG_CURRENT", user_id = %user.id, "password change rejected");
        return Err(AppError::WrongCurrentPassword);
    }

    check_strength(new_password, PasswordPolicy::Strong)?;

    let hash = hash_password_async(new_password.to_string()).await?;
    state
        .users
        .update(user.id, UserPatch::password(hash))
        .await?
        .ok_or(AppError::NotFound("User"))?;

    info!(target: "auth_event", event = "PASSWORD_CHANGED", user_id = %user.id, "password changed");
    Ok(())
}

/// Issues a reset token only when the account exists. The caller answers
/// with the same message either way.
pub async fn forgot_password(state: &AppState, email: &str) -> Option<IssuedToken> {
    let Some(user) = state.users.find_by_email(email).await else {
        warn!(target: "security_event", event = "PASSWORD_RESET_ATTEMPT_INVALID_EMAIL", email, "reset requested for unknown email");
        return None;
    };

    let issued = state.resets.issue(&user.email, user.id);
    if let Err(e) = state.resets.deliver(&user.email, &issued).await {
        warn!(target: "security_event", event = "PASSWORD_RESET_ERROR", user_id = %user.id, error = %e, "reset email not delivered");
        state.resets.revoke(&issued.token);
        return None;
    }

    info!(target: "auth_event", event = "PASSWORD_RESET_REQUESTED", user_id = %user.id, email = %user.email, "password reset requested");
    Some(issued)
}

/// Consumes the reset token and stores the new password. The password is
/// checked first so a weak one does not burn the token. The account is
/// resolved by id, so an email changed after the request does not matter.
pub async fn reset_password(state: &AppState, token: &str, new_password: &str) -> Result<User, AppError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::Validation("Reset token is required".into()));
    }
    check_strength(new_password, PasswordPolicy::Strong)?;

    let pending = state.resets.validate(token)?;
    if !state.users.exists(pending.user_id).await {
        warn!(target: "security_event", event = "PASSWORD_RESET_ORPHANED", user_id = %pending.user_id, "reset token for deleted account");
        state.resets.revoke(token);
        return Err(TokenError::NotFound.into());
    }

    let hash = hash_password_async(new_password.to_string()).await?;
    let subject = state.resets.consume(token)?;
    let user = state
        .users
        .update(subject.user_id, UserPatch::password(hash))
        .await?
        .ok_or(AppError::InvalidToken(TokenError::NotFound))?;

    info!(target: "auth_event", event = "PASSWORD_RESET_COMPLETED", user_id = %user.id, email = %user.email, "password reset");
    Ok(user)
}

pub async fn activate(state: &AppState, token: &str) -> Result<User, AppError> {
    if token.trim().is_empty() {
        return Err(AppError::Validation("Activation token is required".into()));
    }
    let subject = state.activations.consume(token.trim())?;
    let user = state
        .users
        .update(subject.user_id, UserPatch::activate())
        .await?
        .ok_or(AppError::NotFound("User"))?;

    info!(target: "auth_event", event = "ACCOUNT_ACTIVATED", user_id = %user.id, email = %user.email, "account activated");
    Ok(user)
}

/// Replaces the user's outstanding activation tokens and emails a new one.
/// Delivery must succeed, otherwise the new token is withdrawn.
pub async fn resend_activation(state: &AppState, email: &str) -> Result<IssuedToken, AppError> {
    let user = state
        .users
        .find_by_email(email)
        .await
        .ok_or(AppError::NotFound("User"))?;
    if user.is_active {
        return Err(AppError::AlreadyActive);
    }

    let issued = state.activations.issue(&user.email, user.id);
    if let Err(e) = state.activations.deliver(&user.email, &issued).await {
        state.activations.revoke(&issued.token);
        return Err(AppError::Delivery(e));
    }

    info!(target: "auth_event", event = "ACTIVATION_RESENT", user_id = %user.id, email = %user.email, "activation email resent");
    Ok(issued)
}
