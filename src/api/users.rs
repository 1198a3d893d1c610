//! User directory endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        tool::{AssignTag, Tool},
        user::{CreateUser, UpdateUser, User},
    },
    AppState,
};

/// List users
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    responses(
        (status = 200, description = "Users", body = Vec<User>)
    )
)]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    let users = state.services.users.list().await?;
    Ok(Json(users))
}

/// Get user by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<User>> {
    let user = state.services.users.get(&id).await?;
    Ok(Json(user))
}

/// Create a user
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Missing or invalid fields", body = crate::error::ErrorResponse),
        (status = 409, description = "Duplicate ID or tag", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.services.users.create(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Update a user
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    params(("id" = String, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateUser>,
) -> AppResult<Json<User>> {
    let user = state.services.users.update(&id, request).await?;
    Ok(Json(user))
}

/// Delete a user who holds no tools
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse),
        (status = 409, description = "User still holds tools", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_user(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<StatusCode> {
    state.services.users.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Tools currently held by a user
#[utoipa::path(
    get,
    path = "/users/{id}/tools",
    tag = "users",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Tools held", body = Vec<Tool>),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_user_tools(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Tool>>> {
    let tools = state.services.users.tools_held(&id).await?;
    Ok(Json(tools))
}

/// Assign an NFC badge to a user
#[utoipa::path(
    put,
    path = "/users/{id}/tag",
    tag = "users",
    params(("id" = String, Path, description = "User ID")),
    request_body = AssignTag,
    responses(
        (status = 200, description = "Tag assigned", body = User),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Tag already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn assign_user_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AssignTag>,
) -> AppResult<Json<User>> {
    let user = state.services.users.assign_tag(&id, &request.tag).await?;
    Ok(Json(user))
}
