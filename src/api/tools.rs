//! Tool registry endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::tool::{
        AssignTag, BatchToolUpdate, CreateTool, Tool, ToolQuery, ToolStatusUpdate, UpdateTool,
    },
    AppState,
};

/// List tools, optionally filtered by status
#[utoipa::path(
    get,
    path = "/tools",
    tag = "tools",
    params(ToolQuery),
    responses(
        (status = 200, description = "Tools", body = Vec<Tool>),
        (status = 400, description = "Unknown status", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_tools(
    State(state): State<AppState>,
    Query(query): Query<ToolQuery>,
) -> AppResult<Json<Vec<Tool>>> {
    let tools = state.services.tools.list(query.status.as_deref()).await?;
    Ok(Json(tools))
}

/// Get tool by ID
#[utoipa::path(
    get,
    path = "/tools/{id}",
    tag = "tools",
    params(("id" = String, Path, description = "Tool ID")),
    responses(
        (status = 200, description = "Tool", body = Tool),
        (status = 404, description = "Tool not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_tool(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Tool>> {
    let tool = state.services.tools.get(&id).await?;
    Ok(Json(tool))
}

/// Register a new tool
#[utoipa::path(
    post,
    path = "/tools",
    tag = "tools",
    request_body = CreateTool,
    responses(
        (status = 201, description = "Tool created", body = Tool),
        (status = 400, description = "Missing or invalid fields", body = crate::error::ErrorResponse),
        (status = 409, description = "Duplicate ID or tag", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_tool(
    State(state): State<AppState>,
    Json(request): Json<CreateTool>,
) -> AppResult<(StatusCode, Json<Tool>)> {
    let tool = state.services.tools.create(request).await?;
    Ok((StatusCode::CREATED, Json(tool)))
}

/// Update a tool's name, model and calibration date
#[utoipa::path(
    put,
    path = "/tools/{id}",
    tag = "tools",
    params(("id" = String, Path, description = "Tool ID")),
    request_body = UpdateTool,
    responses(
        (status = 200, description = "Tool updated", body = Tool),
        (status = 400, description = "Missing or invalid fields", body = crate::error::ErrorResponse),
        (status = 404, description = "Tool not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_tool(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTool>,
) -> AppResult<Json<Tool>> {
    let tool = state.services.tools.update(&id, request).await?;
    Ok(Json(tool))
}

/// Delete a tool
#[utoipa::path(
    delete,
    path = "/tools/{id}",
    tag = "tools",
    params(("id" = String, Path, description = "Tool ID")),
    responses(
        (status = 204, description = "Tool deleted"),
        (status = 404, description = "Tool not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_tool(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<StatusCode> {
    state.services.tools.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Manually override a tool's status
#[utoipa::path(
    put,
    path = "/tools/{id}/status",
    tag = "tools",
    params(("id" = String, Path, description = "Tool ID")),
    request_body = ToolStatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = Tool),
        (status = 400, description = "Invalid status", body = crate::error::ErrorResponse),
        (status = 404, description = "Tool not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn set_tool_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ToolStatusUpdate>,
) -> AppResult<Json<Tool>> {
    let tool = state.services.lifecycle.override_status(&id, &request.status).await?;
    Ok(Json(tool))
}

/// Assign an NFC tag to a tool
#[utoipa::path(
    put,
    path = "/tools/{id}/tag",
    tag = "tools",
    params(("id" = String, Path, description = "Tool ID")),
    request_body = AssignTag,
    responses(
        (status = 200, description = "Tag assigned", body = Tool),
        (status = 400, description = "Malformed tag", body = crate::error::ErrorResponse),
        (status = 404, description = "Tool not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Tag already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn assign_tool_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AssignTag>,
) -> AppResult<Json<Tool>> {
    let tool = state.services.tools.assign_tag(&id, &request.tag).await?;
    Ok(Json(tool))
}

/// Set status and/or calibration date on several tools at once
#[utoipa::path(
    post,
    path = "/tools/batch",
    tag = "tools",
    request_body = BatchToolUpdate,
    responses(
        (status = 200, description = "Tools updated", body = Vec<Tool>),
        (status = 400, description = "Invalid batch operation", body = crate::error::ErrorResponse),
        (status = 404, description = "A tool was not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn batch_update_tools(
    State(state): State<AppState>,
    Json(request): Json<BatchToolUpdate>,
) -> AppResult<Json<Vec<Tool>>> {
    let tools = state.services.tools.batch_update(request).await?;
    Ok(Json(tools))
}
