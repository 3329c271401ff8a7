// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request bodies and response envelopes for the REST API. Stored records
//! (`StoredRole`, `UserView`) live with their repositories and are embedded
//! in these envelopes unchanged.
//!
//! ## Envelope
//!
//! Every response carries `success`. Successful reads wrap the record in
//! `data`; failures carry `message` (see [`crate::error::ApiError`]).
//!
//! ## Request Bodies
//!
//! Fields are optional at the serde level so that missing input surfaces as a
//! `ValidationError` with a specific message rather than a generic body
//! rejection. Unknown fields are ignored, which is how `password` is dropped
//! from user updates.

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::storage::{ListParams, NewRole, RoleUpdate, UserFilter, UserUpdate};

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
fn deserialize_nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Blank strings count as "not provided".
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// =============================================================================
// Envelopes
// =============================================================================

/// `{ success, data }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// `{ success, count, data }` where `count` is the size of this page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListResponse<T> {
    pub success: bool,
    pub count: usize,
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            success: true,
            count: data.len(),
            data,
        }
    }
}

/// `{ success, message }`, used for deletes and for every error.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// `{ success, result }` for bulk operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BulkResponse<T> {
    pub success: bool,
    pub result: T,
}

impl<T> BulkResponse<T> {
    pub fn new(result: T) -> Self {
        Self {
            success: true,
            result,
        }
    }
}

/// Minimal identity returned by login. Never includes the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct LoginResponse {
    pub success: bool,
    /// Bearer token for the `Authorization` header
    pub token: String,
    pub user: LoginUser,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheckResponse {
    pub success: bool,
    pub has_access: bool,
}

// =============================================================================
// Query Strings
// =============================================================================

/// Search and pagination for list endpoints.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Case-insensitive substring to search for
    pub q: Option<String>,
    /// 1-based page number (default 1)
    pub page: Option<u64>,
    /// Page size (default 20)
    pub limit: Option<u64>,
}

impl From<ListQuery> for ListParams {
    fn from(query: ListQuery) -> Self {
        let defaults = ListParams::default();
        Self {
            q: query.q.unwrap_or_default(),
            page: query.page.unwrap_or(defaults.page),
            limit: query.limit.unwrap_or(defaults.limit),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CheckAccessQuery {
    /// Access module to test for (exact match)
    pub module: Option<String>,
}

// =============================================================================
// Roles
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    pub role_name: Option<String>,
    #[serde(default)]
    pub access_modules: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl From<CreateRoleRequest> for NewRole {
    fn from(request: CreateRoleRequest) -> Self {
        Self {
            role_name: request.role_name.unwrap_or_default(),
            access_modules: request.access_modules,
            active: request.active,
        }
    }
}

/// Partial role update. `accessModules` is merged into the existing set; it
/// never removes or replaces entries.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub role_name: Option<String>,
    pub active: Option<bool>,
    #[serde(default)]
    pub access_modules: Vec<String>,
}

impl From<UpdateRoleRequest> for RoleUpdate {
    fn from(request: UpdateRoleRequest) -> Self {
        Self {
            role_name: request.role_name,
            active: request.active,
            add_modules: request.access_modules,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AccessModuleRequest {
    pub module: Option<String>,
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Role id to assign
    pub role: Option<String>,
}

/// Signup fields after presence checks.
#[derive(Debug, Clone)]
pub struct ValidSignup {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

impl SignupRequest {
    /// `None` when firstName, email or password is missing or blank.
    pub fn validate(self) -> Option<ValidSignup> {
        Some(ValidSignup {
            first_name: non_blank(self.first_name)?,
            email: non_blank(self.email)?,
            password: self.password.filter(|p| !p.is_empty())?,
            last_name: self.last_name.unwrap_or_default(),
            role: non_blank(self.role),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Partial user update. Any `password` in the body is ignored.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// Role id, or `null` to unset the role
    #[serde(default, deserialize_with = "deserialize_nullable")]
    #[schema(value_type = Option<String>, nullable)]
    pub role: Option<Option<String>>,
    pub active: Option<bool>,
}

impl From<UpdateUserRequest> for UserUpdate {
    fn from(request: UpdateUserRequest) -> Self {
        Self {
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            role: request.role,
            active: request.active,
        }
    }
}

/// Equality filter for bulk update-same. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserFilterRequest {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// Role id, or `null` to match users without a role
    #[serde(default, deserialize_with = "deserialize_nullable")]
    #[schema(value_type = Option<String>, nullable)]
    pub role: Option<Option<String>>,
    pub active: Option<bool>,
}

impl From<UserFilterRequest> for UserFilter {
    fn from(request: UserFilterRequest) -> Self {
        Self {
            id: request.id,
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            role: request.role,
            active: request.active,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct BulkUpdateSameRequest {
    #[serde(default)]
    pub filter: UserFilterRequest,
    #[serde(default)]
    pub update: UpdateUserRequest,
}

/// Batch of per-user updates. `operations` is kept raw so a non-array value
/// and malformed elements can be reported precisely.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct BulkUpdateDifferentRequest {
    #[serde(default)]
    #[schema(value_type = Vec<BulkOperationRequest>)]
    pub operations: serde_json::Value,
}

/// One element of `operations`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BulkOperationRequest {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub update: UpdateUserRequest,
}
