use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            ActivateRequest, ActivateResponse, AdminStats, ChangePasswordRequest, EmailRequest,
            ForgotPasswordResponse, LoginRequest, LoginResponse, MessageResponse,
            RegisterRequest, RegisterResponse, ResendActivationResponse, ResetPasswordRequest,
            TokenCheckResponse, TokenQuery,
        },
        extractors::AuthUser,
        gate, services,
    },
    error::AppError,
    extract::{ApiJson, ApiQuery},
    rate_limit,
    state::AppState,
    users::dto::PublicUser,
    validation::{normalize_email, validate_name},
};

const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account with that email exists, password reset instructions have been sent.";

/// Credential and token endpoints, behind the auth rate limiter.
pub fn auth_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route(
            "/auth/reset-password",
            post(reset_password).get(check_reset_token),
        )
        .route("/auth/activate", post(activate).get(check_activation_token))
        .route("/auth/resend-activation", post(resend_activation))
        .route_layer(from_fn_with_state(state.limits.auth.clone(), rate_limit::limit))
}

pub fn password_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/change-password", post(change_password))
        .route_layer(from_fn_with_state(state.limits.strict.clone(), rate_limit::limit))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/profile", get(profile))
        .route("/auth/admin/stats", get(admin_stats))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let email = normalize_email(&payload.email)?;
    let name = validate_name(&payload.name)?;

    let reg = services::register(&state, &name, &email, &payload.password).await?;

    let message = if reg.activation_email_sent {
        "User created successfully. Please check your email to activate your account."
    } else {
        "User created successfully, but the activation email could not be sent. Please request a new one."
    };
    let activation_token = state
        .config
        .expose_dev_tokens
        .then(|| reg.activation.token.clone());

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message,
            user: PublicUser::from(&reg.user),
            activation_email_sent: reg.activation_email_sent,
            activation_token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = normalize_email(&payload.email)?;
    if payload.password.is_empty() {
        return Err(AppError::Validation("Password is required".into()));
    }

    let (token, user) = services::login(&state, &email, &payload.password).await?;
    Ok(Json(LoginResponse {
        message: "Login successful",
        token,
        user: PublicUser::from(user),
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> Result<Json<ForgotPasswordResponse>, AppError> {
    let email = normalize_email(&payload.email)?;
    let issued = services::forgot_password(&state, &email).await;

    Ok(Json(ForgotPasswordResponse {
        message: FORGOT_PASSWORD_MESSAGE,
        dev_token: issued
            .filter(|_| state.config.expose_dev_tokens)
            .map(|t| t.token),
    }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    services::reset_password(&state, &payload.token, &payload.new_password).await?;
    Ok(Json(MessageResponse {
        message: "Password has been reset successfully",
    }))
}

/// Lets a client check a reset link before asking for a new password.
/// Does not consume the token.
#[instrument(skip_all)]
pub async fn check_reset_token(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<TokenQuery>,
) -> Result<Json<TokenCheckResponse>, AppError> {
    state.resets.validate(&q.token)?;
    Ok(Json(TokenCheckResponse { valid: true }))
}

#[instrument(skip_all)]
pub async fn check_activation_token(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<TokenQuery>,
) -> Result<Json<TokenCheckResponse>, AppError> {
    state.activations.validate(&q.token)?;
    Ok(Json(TokenCheckResponse { valid: true }))
}

#[instrument(skip(state, payload))]
pub async fn activate(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ActivateRequest>,
) -> Result<Json<ActivateResponse>, AppError> {
    let user = services::activate(&state, &payload.token).await?;
    Ok(Json(ActivateResponse {
        message: "Account activated successfully",
        email: user.email,
    }))
}

#[instrument(skip(state, payload))]
pub async fn resend_activation(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<EmailRequest>,
) -> Result<Json<ResendActivationResponse>, AppError> {
    let email = normalize_email(&payload.email)?;
    let issued = services::resend_activation(&state, &email).await?;
    Ok(Json(ResendActivationResponse {
        message: "Activation email sent",
        activation_token: state.config.expose_dev_tokens.then_some(issued.token),
    }))
}

#[instrument(skip(state))]
pub async fn profile(
    State(state): State<AppState>,
    actor: AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state
        .users
        .find_by_id(actor.id)
        .await
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(PublicUser::from(user)))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    actor: AuthUser,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    services::change_password(
        &state,
        &actor,
        &payload.current_password,
        &payload.new_password,
    )
    .await?;
    Ok(Json(MessageResponse {
        message: "Password changed successfully",
    }))
}

#[instrument(skip(state))]
pub async fn admin_stats(
    State(state): State<AppState>,
    actor: AuthUser,
) -> Result<Json<AdminStats>, AppError> {
    gate::require_admin(&actor)?;

    let users = state.users.list().await;
    let admin_users = users.iter().filter(|u| u.is_admin()).count();
    let active_users = users.iter().filter(|u| u.is_active).count();

    let mut recent = users.clone();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(AdminStats {
        total_users: users.len(),
        admin_users,
        regular_users: users.len() - admin_users,
        active_users,
        inactive_users: users.len() - active_users,
        recent_users: recent.iter().take(5).map(PublicUser::from).collect(),
        timestamp: OffsetDateTime::now_utc(),
    }))
}
