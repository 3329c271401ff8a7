// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User repository.
//!
//! ## Invariants
//!
//! - `email` is unique across users (enforced through the `user_emails` index
//!   inside the same write transaction as the record write)
//! - a user's `role`, when set, names an existing role
//! - the password hash never leaves this module except through
//!   [`UserRepository::find_by_email`], which exists for login only;
//!   every other read returns a [`UserView`]

use chrono::{DateTime, Utc};
use redb::{MultimapTable, ReadableDatabase, ReadableTable, Table, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::database::{
    index_owner, new_record_id, read_all, read_record, write_record, CredentialStore, StoreError,
    StoreResult, ROLES, ROLE_MEMBERS, USERS, USER_EMAILS,
};
use super::roles::StoredRole;
use super::ListParams;

/// User record as persisted. Never serialized into an API response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// bcrypt hash of the password
    pub password_hash: String,
    /// Referenced role id
    #[serde(default)]
    pub role: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Role fields joined into user responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub role_name: String,
    pub access_modules: Vec<String>,
}

impl From<StoredRole> for RoleSummary {
    fn from(role: StoredRole) -> Self {
        Self {
            id: role.id,
            role_name: role.role_name,
            access_modules: role.access_modules,
        }
    }
}

/// User as returned to API clients (never includes the password hash).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    /// Unique user identifier (UUIDv7)
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Resolved role, or null when none is assigned
    pub role: Option<RoleSummary>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl UserView {
    fn new(user: StoredUser, role: Option<RoleSummary>) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role,
            active: user.active,
            created_at: user.created_at,
        }
    }
}

/// Input for [`UserRepository::create`]. The password must already be hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Option<String>,
}

/// Field-set update applied by update, bulk update-same and update-different.
///
/// There is deliberately no password field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// `Some(None)` unsets the role, `Some(Some(id))` assigns one.
    pub role: Option<Option<String>>,
    pub active: Option<bool>,
}

/// Equality filter used by bulk update-same. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// `Some(None)` matches users without a role.
    pub role: Option<Option<String>>,
    pub active: Option<bool>,
}

impl UserFilter {
    fn matches(&self, user: &StoredUser) -> bool {
        fn eq<T: PartialEq>(want: &Option<T>, have: &T) -> bool {
            want.as_ref().is_none_or(|w| w == have)
        }

        eq(&self.id, &user.id)
            && eq(&self.first_name, &user.first_name)
            && eq(&self.last_name, &user.last_name)
            && eq(&self.email, &user.email)
            && eq(&self.role, &user.role)
            && eq(&self.active, &user.active)
    }
}

/// One entry of a bulk update-different batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkUpdate {
    /// Position of the operation in the client's batch
    pub index: usize,
    pub id: String,
    pub changes: UserUpdate,
}

/// Outcome of bulk update-same.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManyResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// A single failed operation inside a bulk update-different batch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct BulkFailure {
    pub index: usize,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub message: String,
}

/// Aggregated outcome of bulk update-different.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BulkWriteResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub failures: Vec<BulkFailure>,
}

fn user_not_found() -> StoreError {
    StoreError::NotFound("User not found".into())
}

fn required(value: &str, field: &str) -> StoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Invalid(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn resolve_role<R>(roles: &R, role_id: Option<&str>) -> StoreResult<Option<RoleSummary>>
where
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let Some(role_id) = role_id else {
        return Ok(None);
    };
    let role: Option<StoredRole> = read_record(roles, role_id)?;
    Ok(role.map(RoleSummary::from))
}

fn ensure_role_exists<R>(roles: &R, role_id: &str) -> StoreResult<()>
where
    R: ReadableTable<&'static str, &'static [u8]>,
{
    if roles.get(role_id)?.is_none() {
        return Err(StoreError::Invalid("Role not found".into()));
    }
    Ok(())
}

/// Tables a user write touches, opened once per write transaction.
struct UserTables<'txn> {
    users: Table<'txn, &'static str, &'static [u8]>,
    emails: Table<'txn, &'static str, &'static str>,
    roles: Table<'txn, &'static str, &'static [u8]>,
    members: MultimapTable<'txn, &'static str, &'static str>,
}

impl<'txn> UserTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> StoreResult<Self> {
        Ok(Self {
            users: txn.open_table(USERS)?,
            emails: txn.open_table(USER_EMAILS)?,
            roles: txn.open_table(ROLES)?,
            members: txn.open_multimap_table(ROLE_MEMBERS)?,
        })
    }

    fn load(&self, user_id: &str) -> StoreResult<Option<StoredUser>> {
        read_record(&self.users, user_id)
    }

    fn view(&self, user: StoredUser) -> StoreResult<UserView> {
        let role = resolve_role(&self.roles, user.role.as_deref())?;
        Ok(UserView::new(user, role))
    }

    /// Validate `changes` against `user` and the indexes, then apply them.
    ///
    /// Every check runs before the first write so a rejected change leaves
    /// the transaction untouched. Returns whether the record changed.
    fn apply(&mut self, user: &mut StoredUser, changes: &UserUpdate) -> StoreResult<bool> {
        let first_name = changes
            .first_name
            .as_deref()
            .map(|v| required(v, "firstName"))
            .transpose()?;
        let last_name = changes.last_name.as_deref().map(|v| v.trim().to_string());
        let email = changes
            .email
            .as_deref()
            .map(|v| required(v, "email"))
            .transpose()?;

        if let Some(email) = &email {
            if let Some(owner) = index_owner(&self.emails, email)? {
                if owner != user.id {
                    return Err(StoreError::Conflict("Email already exists".into()));
                }
            }
        }
        if let Some(Some(role_id)) = &changes.role {
            ensure_role_exists(&self.roles, role_id)?;
        }

        let mut updated = user.clone();
        if let Some(first_name) = first_name {
            updated.first_name = first_name;
        }
        if let Some(last_name) = last_name {
            updated.last_name = last_name;
        }
        if let Some(email) = email {
            updated.email = email;
        }
        if let Some(role) = &changes.role {
            updated.role = role.clone();
        }
        if let Some(active) = changes.active {
            updated.active = active;
        }

        if updated == *user {
            return Ok(false);
        }

        if updated.email != user.email {
            self.emails.remove(user.email.as_str())?;
            self.emails
                .insert(updated.email.as_str(), updated.id.as_str())?;
        }
        if updated.role != user.role {
            if let Some(old) = &user.role {
                self.members.remove(old.as_str(), user.id.as_str())?;
            }
            if let Some(new) = &updated.role {
                self.members.insert(new.as_str(), user.id.as_str())?;
            }
        }
        write_record(&mut self.users, &updated.id, &updated)?;
        *user = updated;
        Ok(true)
    }
}

/// Repository for user operations on the credential store.
pub struct UserRepository<'a> {
    store: &'a CredentialStore,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository.
    pub fn new(store: &'a CredentialStore) -> Self {
        Self { store }
    }

    /// Create a user. Fails with `Conflict` if the email is registered.
    ///
    /// The email check and the insert share one write transaction, so of two
    /// concurrent signups with the same email exactly one succeeds.
    pub fn create(&self, new_user: NewUser) -> StoreResult<UserView> {
        let user = StoredUser {
            id: new_record_id(),
            first_name: required(&new_user.first_name, "firstName")?,
            last_name: new_user.last_name.trim().to_string(),
            email: required(&new_user.email, "email")?,
            password_hash: new_user.password_hash,
            role: new_user.role,
            active: true,
            created_at: Utc::now(),
        };

        let write_txn = self.store.db().begin_write()?;
        let view = {
            let mut tables = UserTables::open(&write_txn)?;
            if index_owner(&tables.emails, &user.email)?.is_some() {
                return Err(StoreError::Conflict("Email already exists".into()));
            }
            if let Some(role_id) = &user.role {
                ensure_role_exists(&tables.roles, role_id)?;
                tables.members.insert(role_id.as_str(), user.id.as_str())?;
            }
            tables
                .emails
                .insert(user.email.as_str(), user.id.as_str())?;
            write_record(&mut tables.users, &user.id, &user)?;
            tables.view(user)?
        };
        self.store.commit(write_txn)?;
        Ok(view)
    }

    /// Look up the full record (including the hash) by exact email.
    pub fn find_by_email(&self, email: &str) -> StoreResult<Option<StoredUser>> {
        let read_txn = self.store.db().begin_read()?;
        let emails = read_txn.open_table(USER_EMAILS)?;
        let Some(user_id) = index_owner(&emails, email.trim())? else {
            return Ok(None);
        };
        let users = read_txn.open_table(USERS)?;
        read_record(&users, &user_id)
    }

    /// Get a user by ID with the role resolved.
    pub fn get(&self, user_id: &str) -> StoreResult<UserView> {
        let read_txn = self.store.db().begin_read()?;
        let users = read_txn.open_table(USERS)?;
        let roles = read_txn.open_table(ROLES)?;
        let user: StoredUser = read_record(&users, user_id)?.ok_or_else(user_not_found)?;
        let role = resolve_role(&roles, user.role.as_deref())?;
        Ok(UserView::new(user, role))
    }

    /// List users in insertion order, filtered on firstName, lastName or email.
    pub fn list(&self, params: &ListParams) -> StoreResult<Vec<UserView>> {
        let read_txn = self.store.db().begin_read()?;
        let users = read_txn.open_table(USERS)?;
        let roles = read_txn.open_table(ROLES)?;

        let all: Vec<StoredUser> = read_all(&users)?;
        let page = params.apply(all, |user| {
            vec![
                user.first_name.as_str(),
                user.last_name.as_str(),
                user.email.as_str(),
            ]
        });

        page.into_iter()
            .map(|user| {
                let role = resolve_role(&roles, user.role.as_deref())?;
                Ok(UserView::new(user, role))
            })
            .collect()
    }

    /// Apply a partial update to one user.
    pub fn update(&self, user_id: &str, changes: UserUpdate) -> StoreResult<UserView> {
        let write_txn = self.store.db().begin_write()?;
        let view = {
            let mut tables = UserTables::open(&write_txn)?;
            let mut user = tables.load(user_id)?.ok_or_else(user_not_found)?;
            tables.apply(&mut user, &changes)?;
            tables.view(user)?
        };
        self.store.commit(write_txn)?;
        Ok(view)
    }

    /// Delete a user. Nothing else is touched besides the user's index entries.
    pub fn delete(&self, user_id: &str) -> StoreResult<()> {
        let write_txn = self.store.db().begin_write()?;
        {
            let mut tables = UserTables::open(&write_txn)?;
            let user = tables.load(user_id)?.ok_or_else(user_not_found)?;
            tables.emails.remove(user.email.as_str())?;
            if let Some(role_id) = &user.role {
                tables.members.remove(role_id.as_str(), user.id.as_str())?;
            }
            tables.users.remove(user_id)?;
        }
        self.store.commit(write_txn)?;
        Ok(())
    }

    /// Whether the user's role grants `module` (exact match).
    ///
    /// A user without a role has no access; that is not an error.
    pub fn check_access(&self, user_id: &str, module: &str) -> StoreResult<bool> {
        let user = self.get(user_id)?;
        Ok(user
            .role
            .is_some_and(|role| role.access_modules.iter().any(|m| m == module)))
    }

    /// Apply one update to every user matching `filter`.
    ///
    /// Runs in a single transaction: a constraint violation on any matched
    /// user rolls back the whole operation.
    pub fn update_many(
        &self,
        filter: &UserFilter,
        changes: &UserUpdate,
    ) -> StoreResult<UpdateManyResult> {
        let write_txn = self.store.db().begin_write()?;
        let result = {
            let mut tables = UserTables::open(&write_txn)?;
            let all: Vec<StoredUser> = read_all(&tables.users)?;

            let mut result = UpdateManyResult::default();
            for mut user in all.into_iter().filter(|u| filter.matches(u)) {
                result.matched_count += 1;
                if tables.apply(&mut user, changes)? {
                    result.modified_count += 1;
                }
            }
            result
        };
        self.store.commit(write_txn)?;
        Ok(result)
    }

    /// Apply a batch of per-user updates.
    ///
    /// Operations are independent: an unknown id or a rejected change is
    /// recorded as a failure and the remaining operations still apply.
    /// `matched_count` counts only operations that found their user and
    /// passed validation; failed operations appear in `failures` alone.
    pub fn bulk_update(&self, operations: Vec<BulkUpdate>) -> StoreResult<BulkWriteResult> {
        let write_txn = self.store.db().begin_write()?;
        let result = {
            let mut tables = UserTables::open(&write_txn)?;
            let mut result = BulkWriteResult::default();

            for op in operations {
                let Some(mut user) = tables.load(&op.id)? else {
                    result.failures.push(BulkFailure {
                        index: op.index,
                        id: Some(op.id),
                        message: "User not found".into(),
                    });
                    continue;
                };

                match tables.apply(&mut user, &op.changes) {
                    Ok(modified) => {
                        result.matched_count += 1;
                        if modified {
                            result.modified_count += 1;
                        }
                    }
                    Err(StoreError::Conflict(message) | StoreError::Invalid(message)) => {
                        result.failures.push(BulkFailure {
                            index: op.index,
                            id: Some(op.id),
                            message,
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
            result
        };
        self.store.commit(write_txn)?;
        Ok(result)
    }
}
