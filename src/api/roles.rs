// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role and access-module endpoints. All routes require authentication.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::extract::{ApiJson, ApiQuery};
use crate::{
    auth::Auth,
    error::ApiError,
    models::{
        AccessModuleRequest, CreateRoleRequest, DataResponse, ListQuery, ListResponse,
        MessageResponse, UpdateRoleRequest,
    },
    state::AppState,
    storage::{ListParams, NewRole, RoleRepository, RoleUpdate, StoredRole},
};

#[utoipa::path(
    post,
    path = "/api/roles",
    request_body = CreateRoleRequest,
    tag = "Roles",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Role created", body = StoredRole),
        (status = 400, description = "Missing roleName or duplicate name", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = MessageResponse)
    )
)]
pub async fn create_role(
    State(state): State<AppState>,
    Auth(caller): Auth,
    ApiJson(request): ApiJson<CreateRoleRequest>,
) -> Result<(StatusCode, Json<DataResponse<StoredRole>>), ApiError> {
    let new_role = NewRole::from(request);
    let role = state
        .run_store(move |store| RoleRepository::new(store).create(new_role))
        .await?;

    tracing::info!(
        role_id = %role.id,
        role_name = %role.role_name,
        actor = %caller.user_id(),
        "Role created"
    );
    Ok((StatusCode::CREATED, Json(DataResponse::new(role))))
}

#[utoipa::path(
    get,
    path = "/api/roles",
    params(ListQuery),
    tag = "Roles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Page of roles matching q", body = [StoredRole]),
        (status = 401, description = "Not authenticated", body = MessageResponse)
    )
)]
pub async fn list_roles(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<ListResponse<StoredRole>>, ApiError> {
    let params = ListParams::from(query);
    let roles = state
        .run_store(move |store| RoleRepository::new(store).list(&params))
        .await?;
    Ok(Json(ListResponse::new(roles)))
}

#[utoipa::path(
    get,
    path = "/api/roles/{id}",
    params(("id" = String, Path, description = "Role identifier")),
    tag = "Roles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = StoredRole),
        (status = 401, body = MessageResponse),
        (status = 404, description = "Role not found", body = MessageResponse)
    )
)]
pub async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<StoredRole>>, ApiError> {
    let role = state
        .run_store(move |store| RoleRepository::new(store).get(&id))
        .await?;
    Ok(Json(DataResponse::new(role)))
}

#[utoipa::path(
    put,
    path = "/api/roles/{id}",
    params(("id" = String, Path, description = "Role identifier")),
    request_body = UpdateRoleRequest,
    tag = "Roles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = StoredRole),
        (status = 400, description = "Invalid field or duplicate name", body = MessageResponse),
        (status = 401, body = MessageResponse),
        (status = 404, description = "Role not found", body = MessageResponse)
    )
)]
pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateRoleRequest>,
) -> Result<Json<DataResponse<StoredRole>>, ApiError> {
    let update = RoleUpdate::from(request);
    let role = state
        .run_store(move |store| RoleRepository::new(store).update(&id, update))
        .await?;
    Ok(Json(DataResponse::new(role)))
}

#[utoipa::path(
    delete,
    path = "/api/roles/{id}",
    params(("id" = String, Path, description = "Role identifier")),
    tag = "Roles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Role deleted and unset on its users", body = MessageResponse),
        (status = 401, body = MessageResponse),
        (status = 404, description = "Role not found", body = MessageResponse)
    )
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let role_id = id.clone();
    let cleared = state
        .run_store(move |store| RoleRepository::new(store).delete(&role_id))
        .await?;

    tracing::info!(
        role_id = %id,
        users_cleared = cleared,
        actor = %caller.user_id(),
        "Role deleted"
    );
    Ok(Json(MessageResponse::ok("Role deleted")))
}

#[utoipa::path(
    post,
    path = "/api/roles/{id}/access/add",
    params(("id" = String, Path, description = "Role identifier")),
    request_body = AccessModuleRequest,
    tag = "Roles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Module present exactly once", body = StoredRole),
        (status = 400, description = "module is required", body = MessageResponse),
        (status = 401, body = MessageResponse),
        (status = 404, description = "Role not found", body = MessageResponse)
    )
)]
pub async fn add_access_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<AccessModuleRequest>,
) -> Result<Json<DataResponse<StoredRole>>, ApiError> {
    let role = state
        .run_store(move |store| {
            RoleRepository::new(store).add_access_module(&id, request.module.as_deref())
        })
        .await?;
    Ok(Json(DataResponse::new(role)))
}

#[utoipa::path(
    post,
    path = "/api/roles/{id}/access/remove",
    params(("id" = String, Path, description = "Role identifier")),
    request_body = AccessModuleRequest,
    tag = "Roles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Module absent (no-op if it was never there)", body = StoredRole),
        (status = 400, description = "module is required", body = MessageResponse),
        (status = 401, body = MessageResponse),
        (status = 404, description = "Role not found", body = MessageResponse)
    )
)]
pub async fn remove_access_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<AccessModuleRequest>,
) -> Result<Json<DataResponse<StoredRole>>, ApiError> {
    let role = state
        .run_store(move |store| {
            RoleRepository::new(store).remove_access_module(&id, request.module.as_deref())
        })
        .await?;
    Ok(Json(DataResponse::new(role)))
}
