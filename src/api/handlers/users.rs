//! REST handlers for user management.

use crate::{
    api::models::users::{ListUsersQuery, UserResponse, UserUpdate, UsersResponse},
    auth::{gate, password, Principal},
    db::{
        errors::DbError,
        handlers::{users::UserFilter, Repository, Users},
        models::users::{UserDBResponse, UserUpdateDBRequest},
    },
    errors::Error,
    types::UserId,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

async fn fetch_user(users: &mut Users<'_>, id: UserId) -> Result<UserDBResponse, Error> {
    users.get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: id.to_string(),
    })
}

// GET /users - List users (admin only)
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    description = "List all users (admin only)",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "List of users", body = UsersResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
    ),
)]
pub async fn list_users(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<UsersResponse>, Error> {
    gate::require_admin(&principal, "list", "users")?;

    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let data = users.list(&UserFilter::new(skip, limit)).await?;
    let count = users.count().await?;

    Ok(Json(UsersResponse {
        data: data.into_iter().map(UserResponse::from).collect(),
        count,
    }))
}

// GET /users/me - The current authenticated user
#[utoipa::path(
    get,
    path = "/users/me",
    tag = "users",
    summary = "Get current user",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized"),
    ),
)]
pub async fn me(State(state): State<AppState>, principal: Principal) -> Result<Json<UserResponse>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let user = fetch_user(&mut users, principal.user_id).await?;
    Ok(Json(UserResponse::from(user)))
}

// GET /users/{id} - Get a user (self or admin)
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    summary = "Get user",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - can only view own user data unless admin"),
        (status = 404, description = "User not found"),
    ),
)]
pub async fn get_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<UserId>,
) -> Result<Json<UserResponse>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let user = fetch_user(&mut users, id).await?;
    gate::authorize(&principal, &user, "read", "user")?;

    Ok(Json(UserResponse::from(user)))
}

// PATCH /users/{id} - Update a user
#[utoipa::path(
    patch,
    path = "/users/{id}",
    tag = "users",
    summary = "Update user",
    description = "Update profile fields (self or admin). Toggling is_active/is_admin requires admin.",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
    ),
)]
pub async fn update_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<UserId>,
    Json(payload): Json<UserUpdate>,
) -> Result<Json<UserResponse>, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let user = fetch_user(&mut users, id).await?;
    gate::authorize(&principal, &user, "update", "user")?;

    // Role and activation changes are explicit administrative actions
    if payload.is_admin.is_some() || payload.is_active.is_some() {
        gate::require_admin(&principal, "change roles of", "user")?;
    }

    let hashed_password = payload.password.as_deref().map(password::hash_string).transpose()?;

    let updated = users
        .update(
            id,
            &UserUpdateDBRequest {
                full_name: payload.full_name,
                is_active: payload.is_active,
                is_admin: payload.is_admin,
                hashed_password,
            },
        )
        .await?;

    Ok(Json(UserResponse::from(updated)))
}

// DELETE /users/{id} - Delete a user (self or admin); owned items cascade
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    summary = "Delete user",
    description = "Delete a user. All items they own are deleted with them.",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found"),
    ),
)]
pub async fn delete_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<UserId>,
) -> Result<StatusCode, Error> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let user = fetch_user(&mut users, id).await?;
    gate::authorize(&principal, &user, "delete", "user")?;

    match users.delete(id).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        // The owned-items cascade makes this unreachable; seeing it means the
        // schema no longer declares the cascade.
        Err(DbError::ForeignKeyViolation { message, .. }) => Err(Error::IntegrityViolation {
            detail: format!("user delete left dependent rows behind: {message}"),
        }),
        Err(e) => Err(e.into()),
    }
}
