use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{ListQuery, PublicUser, SearchQuery, UpdateUserRequest, UpdateUserResponse, UserListResponse},
    repo::UserFilter,
    repo_types::UserPatch,
};
use crate::{
    auth::{
        gate,
        password::{check_strength, hash_password_async, PasswordPolicy},
        AuthUser,
    },
    auth::dto::MessageResponse,
    error::AppError,
    extract::{ApiJson, ApiQuery},
    state::AppState,
    validation::{normalize_email, validate_name, validate_page, validate_role, validate_search_query},
};

pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/search", get(search_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

/// Unparseable ids are simply unknown users.
fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("User"))
}

fn page_headers(list: &UserListResponse) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let p = &list.pagination;
    for (name, value) in [
        ("x-total-users", p.total_users),
        ("x-current-page", p.current_page),
        ("x-total-pages", p.total_pages),
    ] {
        headers.insert(name, HeaderValue::from(value));
    }
    headers
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    _actor: AuthUser,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> Result<(HeaderMap, Json<UserListResponse>), AppError> {
    validate_page(q.page, q.limit)?;
    let list = UserListResponse::paginate(state.users.list().await, q.page, q.limit);
    Ok((page_headers(&list), Json(list)))
}

#[instrument(skip(state))]
pub async fn search_users(
    State(state): State<AppState>,
    _actor: AuthUser,
    ApiQuery(q): ApiQuery<SearchQuery>,
) -> Result<(HeaderMap, Json<UserListResponse>), AppError> {
    validate_page(q.page, q.limit)?;
    let filter = UserFilter {
        query: q.q.as_deref().map(validate_search_query).transpose()?,
        role: q.role.as_deref().map(validate_role).transpose()?,
    };
    let list = UserListResponse::paginate(state.users.search(&filter).await, q.page, q.limit);
    Ok((page_headers(&list), Json(list)))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    _actor: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<PublicUser>, AppError> {
    let user = state
        .users
        .find_by_id(parse_id(&id)?)
        .await
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(PublicUser::from(user)))
}

/// Self-or-admin. A role change from a non-admin is dropped, not rejected.
#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> Result<Json<UpdateUserResponse>, AppError> {
    let id = parse_id(&id)?;
    gate::require_self_or_admin(&actor, id)?;

    let mut patch = UserPatch {
        name: payload.name.as_deref().map(validate_name).transpose()?,
        email: payload.email.as_deref().map(normalize_email).transpose()?,
        role: payload.role.as_deref().map(validate_role).transpose()?,
        ..UserPatch::default()
    };
    if patch.role.is_some() && gate::require_admin(&actor).is_err() {
        info!(user_id = %actor.id, "dropping role change from non-admin");
        patch.role = None;
    }
    if let Some(password) = payload.password {
        check_strength(&password, PasswordPolicy::Legacy)?;
        patch.password_hash = Some(hash_password_async(password).await?);
    }

    let user = state
        .users
        .update(id, patch)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    info!(target: "auth_event", event = "USER_UPDATED", user_id = %user.id, actor = %actor.id, "user updated");
    Ok(Json(UpdateUserResponse {
        message: "User updated successfully",
        user: PublicUser::from(user),
    }))
}

/// Admin only; an admin cannot delete their own account.
#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    gate::require_admin(&actor)?;
    let id = parse_id(&id)?;
    if id == actor.id {
        return Err(AppError::BadRequest("Cannot delete your own account".into()));
    }

    state
        .users
        .delete(id)
        .await
        .ok_or(AppError::NotFound("User"))?;

    info!(target: "auth_event", event = "USER_DELETED", user_id = %id, actor = %actor.id, "user deleted");
    Ok(Json(MessageResponse {
        message: "User deleted successfully",
    }))
}
