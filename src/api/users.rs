// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints. Signup and login are public; everything else requires a
//! bearer token.

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
        AccessCheckResponse, BulkOperationRequest, BulkResponse, BulkUpdateDifferentRequest,
        BulkUpdateSameRequest, CheckAccessQuery, DataResponse, ListQuery, ListResponse,
        LoginRequest, LoginResponse, LoginUser, MessageResponse, SignupRequest,
        UpdateUserRequest,
    },
    state::AppState,
    storage::{
        repository::{BulkFailure, BulkUpdate, BulkWriteResult, UpdateManyResult},
        ListParams, NewUser, UserFilter, UserRepository, UserUpdate, UserView,
    },
};

#[utoipa::path(
    post,
    path = "/api/users/signup",
    request_body = SignupRequest,
    tag = "Users",
    responses(
        (status = 201, description = "User created", body = UserView),
        (status = 400, description = "Missing fields, duplicate email or unknown role", body = MessageResponse)
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignupRequest>,
) -> Result<(StatusCode, Json<DataResponse<UserView>>), ApiError> {
    let signup = request
        .validate()
        .ok_or_else(|| ApiError::validation("firstName, email, password required"))?;

    let password_hash = state.hash_password(signup.password).await?;
    let new_user = NewUser {
        first_name: signup.first_name,
        last_name: signup.last_name,
        email: signup.email,
        password_hash,
        role: signup.role,
    };
    let user = state
        .run_store(move |store| UserRepository::new(store).create(new_user))
        .await?;

    tracing::info!(user_id = %user.id, "User signed up");
    Ok((StatusCode::CREATED, Json(DataResponse::new(user))))
}

#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    tag = "Users",
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 400, description = "Missing fields or invalid credentials", body = MessageResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (Some(email), Some(password)) = (
        request.email.filter(|e| !e.trim().is_empty()),
        request.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::validation("email and password required"));
    };

    let user = state
        .run_store(move |store| UserRepository::new(store).find_by_email(&email))
        .await?;
    let matches = state
        .verify_password(password, user.as_ref().map(|u| u.password_hash.clone()))
        .await?;

    let Some(user) = user.filter(|_| matches) else {
        tracing::warn!("Login failed");
        return Err(ApiError::invalid_credentials());
    };

    let issued = state.tokens.issue(&user.id)?;
    tracing::info!(user_id = %user.id, expires_at = issued.expires_at, "Login succeeded");

    Ok(Json(LoginResponse {
        success: true,
        token: issued.token,
        user: LoginUser {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
        },
    }))
}

#[utoipa::path(
    get,
    path = "/api/users",
    params(ListQuery),
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Page of users matching q", body = [UserView]),
        (status = 401, body = MessageResponse)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<ListResponse<UserView>>, ApiError> {
    let params = ListParams::from(query);
    let users = state
        .run_store(move |store| UserRepository::new(store).list(&params))
        .await?;
    Ok(Json(ListResponse::new(users)))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User identifier")),
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = UserView),
        (status = 401, body = MessageResponse),
        (status = 404, description = "User not found", body = MessageResponse)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<UserView>>, ApiError> {
    let user = state
        .run_store(move |store| UserRepository::new(store).get(&id))
        .await?;
    Ok(Json(DataResponse::new(user)))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User identifier")),
    request_body = UpdateUserRequest,
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, body = UserView),
        (status = 400, description = "Invalid field, duplicate email or unknown role", body = MessageResponse),
        (status = 401, body = MessageResponse),
        (status = 404, description = "User not found", body = MessageResponse)
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> Result<Json<DataResponse<UserView>>, ApiError> {
    let changes = UserUpdate::from(request);
    let user = state
        .run_store(move |store| UserRepository::new(store).update(&id, changes))
        .await?;
    Ok(Json(DataResponse::new(user)))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "User identifier")),
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 401, body = MessageResponse),
        (status = 404, description = "User not found", body = MessageResponse)
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = id.clone();
    state
        .run_store(move |store| UserRepository::new(store).delete(&user_id))
        .await?;

    tracing::info!(user_id = %id, actor = %caller.user_id(), "User deleted");
    Ok(Json(MessageResponse::ok("User deleted")))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}/check-access",
    params(
        ("id" = String, Path, description = "User identifier"),
        CheckAccessQuery
    ),
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Whether the user's role grants the module", body = AccessCheckResponse),
        (status = 400, description = "module query param is required", body = MessageResponse),
        (status = 401, body = MessageResponse),
        (status = 404, description = "User not found", body = MessageResponse)
    )
)]
pub async fn check_access(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<CheckAccessQuery>,
) -> Result<Json<AccessCheckResponse>, ApiError> {
    let module = query
        .module
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::validation("module query param is required"))?;

    let has_access = state
        .run_store(move |store| UserRepository::new(store).check_access(&id, &module))
        .await?;
    Ok(Json(AccessCheckResponse {
        success: true,
        has_access,
    }))
}

#[utoipa::path(
    post,
    path = "/api/users/bulk/update-same",
    request_body = BulkUpdateSameRequest,
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Match and modify counts", body = UpdateManyResult),
        (status = 400, description = "Unknown filter field or rejected change", body = MessageResponse),
        (status = 401, body = MessageResponse)
    )
)]
pub async fn bulk_update_same(
    State(state): State<AppState>,
    Auth(caller): Auth,
    ApiJson(request): ApiJson<BulkUpdateSameRequest>,
) -> Result<Json<BulkResponse<UpdateManyResult>>, ApiError> {
    let filter = UserFilter::from(request.filter);
    let changes = UserUpdate::from(request.update);
    let result = state
        .run_store(move |store| UserRepository::new(store).update_many(&filter, &changes))
        .await?;

    tracing::info!(
        matched = result.matched_count,
        modified = result.modified_count,
        actor = %caller.user_id(),
        "Bulk update-same applied"
    );
    Ok(Json(BulkResponse::new(result)))
}

#[utoipa::path(
    post,
    path = "/api/users/bulk/update-different",
    request_body = BulkUpdateDifferentRequest,
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Aggregated per-operation outcome", body = BulkWriteResult),
        (status = 400, description = "operations array required", body = MessageResponse),
        (status = 401, body = MessageResponse)
    )
)]
pub async fn bulk_update_different(
    State(state): State<AppState>,
    Auth(caller): Auth,
    ApiJson(request): ApiJson<BulkUpdateDifferentRequest>,
) -> Result<Json<BulkResponse<BulkWriteResult>>, ApiError> {
    let serde_json::Value::Array(items) = request.operations else {
        return Err(ApiError::validation("operations array required"));
    };

    let mut operations = Vec::with_capacity(items.len());
    let mut malformed = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<BulkOperationRequest>(item) {
            Ok(op) => operations.push(BulkUpdate {
                index,
                id: op.id,
                changes: op.update.into(),
            }),
            Err(e) => malformed.push(BulkFailure {
                index,
                id: None,
                message: format!("Invalid operation: {e}"),
            }),
        }
    }

    let mut result = state
        .run_store(move |store| UserRepository::new(store).bulk_update(operations))
        .await?;
    result.failures.extend(malformed);
    result.failures.sort_by_key(|f| f.index);

    tracing::info!(
        matched = result.matched_count,
        modified = result.modified_count,
        failed = result.failures.len(),
        actor = %caller.user_id(),
        "Bulk update-different applied"
    );
    Ok(Json(BulkResponse::new(result)))
}
