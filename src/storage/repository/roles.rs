// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role repository.
//!
//! A role's `accessModules` is a set stored as an ordered list: every write
//! passes the list through [`normalize_modules`] so no observed state ever
//! holds duplicates or untrimmed entries.
//!
//! Deleting a role clears the reference on every user pointing at it in the
//! same write transaction that removes the role.

use chrono::{DateTime, Utc};
use redb::ReadableDatabase;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    index_owner, new_record_id, read_all, read_record, write_record, CredentialStore, StoreError,
    StoreResult, ROLES, ROLE_MEMBERS, ROLE_NAMES, USERS,
};
use super::users::StoredUser;
use super::ListParams;

/// Role record as stored and as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredRole {
    /// Unique role identifier (UUIDv7)
    #[serde(rename = "_id")]
    pub id: String,
    /// Unique role name
    pub role_name: String,
    /// Access modules granted by this role (trimmed, no duplicates)
    pub access_modules: Vec<String>,
    /// Whether the role is active
    pub active: bool,
    /// When the role was created
    pub created_at: DateTime<Utc>,
}

/// Input for [`RoleRepository::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub role_name: String,
    pub access_modules: Vec<String>,
    pub active: bool,
}

/// Partial update for [`RoleRepository::update`].
///
/// `role_name` and `active` replace the stored values; `add_modules` is merged
/// into the module set and never removes anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleUpdate {
    pub role_name: Option<String>,
    pub active: Option<bool>,
    pub add_modules: Vec<String>,
}

/// Trim every module, drop blanks and keep the first occurrence of each value.
///
/// Comparison is exact after trimming: `"Billing"` and `"billing"` are distinct.
pub fn normalize_modules<I, S>(modules: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for module in modules {
        let trimmed = module.as_ref().trim();
        if !trimmed.is_empty() && !normalized.iter().any(|m| m == trimmed) {
            normalized.push(trimmed.to_string());
        }
    }
    normalized
}

fn validate_role_name(role_name: &str) -> StoreResult<String> {
    let trimmed = role_name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Invalid("roleName is required".into()));
    }
    Ok(trimmed.to_string())
}

fn validate_module(module: Option<&str>) -> StoreResult<&str> {
    match module {
        Some(m) if !m.trim().is_empty() => Ok(m),
        _ => Err(StoreError::Invalid("module is required".into())),
    }
}

fn role_not_found() -> StoreError {
    StoreError::NotFound("Role not found".into())
}

fn duplicate_role_name(role_name: &str) -> StoreError {
    StoreError::Conflict(format!("Role name '{role_name}' already exists"))
}

/// Repository for role operations on the credential store.
pub struct RoleRepository<'a> {
    store: &'a CredentialStore,
}

impl<'a> RoleRepository<'a> {
    /// Create a new RoleRepository.
    pub fn new(store: &'a CredentialStore) -> Self {
        Self { store }
    }

    /// Create a role. Fails with `Conflict` if the name is taken.
    pub fn create(&self, new_role: NewRole) -> StoreResult<StoredRole> {
        let role = StoredRole {
            id: new_record_id(),
            role_name: validate_role_name(&new_role.role_name)?,
            access_modules: normalize_modules(&new_role.access_modules),
            active: new_role.active,
            created_at: Utc::now(),
        };

        let write_txn = self.store.db().begin_write()?;
        {
            let mut names = write_txn.open_table(ROLE_NAMES)?;
            if index_owner(&names, &role.role_name)?.is_some() {
                return Err(duplicate_role_name(&role.role_name));
            }
            names.insert(role.role_name.as_str(), role.id.as_str())?;

            let mut roles = write_txn.open_table(ROLES)?;
            write_record(&mut roles, &role.id, &role)?;
        }
        self.store.commit(write_txn)?;
        Ok(role)
    }

    /// Get a role by ID.
    pub fn get(&self, role_id: &str) -> StoreResult<StoredRole> {
        let read_txn = self.store.db().begin_read()?;
        let roles = read_txn.open_table(ROLES)?;
        read_record(&roles, role_id)?.ok_or_else(role_not_found)
    }

    /// List roles in insertion order, filtered by `roleName` substring.
    pub fn list(&self, params: &ListParams) -> StoreResult<Vec<StoredRole>> {
        let read_txn = self.store.db().begin_read()?;
        let roles = read_txn.open_table(ROLES)?;
        let all: Vec<StoredRole> = read_all(&roles)?;
        Ok(params.apply(all, |role| vec![role.role_name.as_str()]))
    }

    /// Apply a partial update.
    ///
    /// Fails with `Invalid` for a blank roleName, `NotFound` for an unknown id
    /// and `Conflict` when the new name belongs to another role.
    pub fn update(&self, role_id: &str, update: RoleUpdate) -> StoreResult<StoredRole> {
        let new_name = update
            .role_name
            .as_deref()
            .map(validate_role_name)
            .transpose()?;

        let write_txn = self.store.db().begin_write()?;
        let role = {
            let mut roles = write_txn.open_table(ROLES)?;
            let mut role: StoredRole = read_record(&roles, role_id)?.ok_or_else(role_not_found)?;

            if let Some(new_name) = new_name {
                if new_name != role.role_name {
                    let mut names = write_txn.open_table(ROLE_NAMES)?;
                    if index_owner(&names, &new_name)?.is_some() {
                        return Err(duplicate_role_name(&new_name));
                    }
                    names.remove(role.role_name.as_str())?;
                    names.insert(new_name.as_str(), role.id.as_str())?;
                    role.role_name = new_name;
                }
            }
            if let Some(active) = update.active {
                role.active = active;
            }
            if !update.add_modules.is_empty() {
                role.access_modules =
                    normalize_modules(role.access_modules.iter().chain(&update.add_modules));
            }

            write_record(&mut roles, &role.id, &role)?;
            role
        };
        self.store.commit(write_txn)?;
        Ok(role)
    }

    /// Delete a role, clearing it from every user that references it.
    ///
    /// Returns the number of users whose role was cleared.
    pub fn delete(&self, role_id: &str) -> StoreResult<usize> {
        let write_txn = self.store.db().begin_write()?;
        let cleared = {
            let mut roles = write_txn.open_table(ROLES)?;
            let role: StoredRole = read_record(&roles, role_id)?.ok_or_else(role_not_found)?;

            let mut members = write_txn.open_multimap_table(ROLE_MEMBERS)?;
            let mut member_ids = Vec::new();
            for member in members.remove_all(role_id)? {
                member_ids.push(member?.value().to_string());
            }

            let mut users = write_txn.open_table(USERS)?;
            let mut cleared = 0;
            for user_id in &member_ids {
                let Some(mut user) = read_record::<StoredUser, _>(&users, user_id)? else {
                    continue;
                };
                if user.role.as_deref() == Some(role_id) {
                    user.role = None;
                    write_record(&mut users, &user.id, &user)?;
                    cleared += 1;
                }
            }

            let mut names = write_txn.open_table(ROLE_NAMES)?;
            names.remove(role.role_name.as_str())?;
            roles.remove(role_id)?;
            cleared
        };
        self.store.commit(write_txn)?;
        Ok(cleared)
    }

    /// Add one module to the set. Already-present modules are a no-op.
    pub fn add_access_module(&self, role_id: &str, module: Option<&str>) -> StoreResult<StoredRole> {
        let module = validate_module(module)?;
        self.modify_modules(role_id, |modules| {
            if modules.iter().any(|m| m == module) {
                return false;
            }
            modules.push(module.to_string());
            *modules = normalize_modules(modules.iter());
            true
        })
    }

    /// Remove every exact occurrence of a module. Absent modules are a no-op.
    pub fn remove_access_module(
        &self,
        role_id: &str,
        module: Option<&str>,
    ) -> StoreResult<StoredRole> {
        let module = validate_module(module)?;
        self.modify_modules(role_id, |modules| {
            let before = modules.len();
            modules.retain(|m| m != module);
            modules.len() != before
        })
    }

    /// Read-modify-write of the module list; `change` reports whether it
    /// altered anything so untouched roles are not rewritten.
    fn modify_modules<F>(&self, role_id: &str, change: F) -> StoreResult<StoredRole>
    where
        F: FnOnce(&mut Vec<String>) -> bool,
    {
        let write_txn = self.store.db().begin_write()?;
        let role = {
            let mut roles = write_txn.open_table(ROLES)?;
            let mut role: StoredRole = read_record(&roles, role_id)?.ok_or_else(role_not_found)?;
            if change(&mut role.access_modules) {
                write_record(&mut roles, &role.id, &role)?;
            }
            role
        };
        self.store.commit(write_txn)?;
        Ok(role)
    }
}
