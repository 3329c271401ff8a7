// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `roles`: role id → serialized StoredRole
//! - `role_names`: roleName → role id (uniqueness index)
//! - `users`: user id → serialized StoredUser
//! - `user_emails`: email → user id (uniqueness index)
//! - `role_members`: role id →→ user id (multimap, drives the delete cascade)
//!
//! redb admits a single writer at a time, so a uniqueness check followed by an
//! insert inside one write transaction is atomic with respect to every other
//! writer. Repositories rely on this for email and roleName uniqueness.
//!
//! Every write commits through [`CredentialStore::commit`], which refuses to
//! commit once the caller has abandoned the call (see [`StoreCall`]).

use std::{
    path::Path,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use redb::{
    Database, MultimapTableDefinition, ReadableDatabase, ReadableTable, Table, TableDefinition,
    WriteTransaction,
};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: role id → serialized StoredRole (JSON bytes).
pub(crate) const ROLES: TableDefinition<&str, &[u8]> = TableDefinition::new("roles");

/// Unique index: roleName → role id.
pub(crate) const ROLE_NAMES: TableDefinition<&str, &str> = TableDefinition::new("role_names");

/// Primary table: user id → serialized StoredUser (JSON bytes).
pub(crate) const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Unique index: email → user id.
pub(crate) const USER_EMAILS: TableDefinition<&str, &str> = TableDefinition::new("user_emails");

/// Reverse reference index: role id → ids of users referencing it.
pub(crate) const ROLE_MEMBERS: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("role_members");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Referenced record does not exist. Carries the client-facing message.
    #[error("{0}")]
    NotFound(String),

    /// A uniqueness constraint would be violated.
    #[error("{0}")]
    Conflict(String),

    /// A field-level constraint would be violated.
    #[error("{0}")]
    Invalid(String),

    /// The caller gave up on the call before it committed; nothing was written.
    #[error("store call abandoned before commit")]
    Abandoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Record Helpers
// =============================================================================

/// Load and deserialize a JSON record from a primary table.
pub(crate) fn read_record<T, R>(table: &R, id: &str) -> StoreResult<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

/// Deserialize every record of a primary table in key order.
pub(crate) fn read_all<T, R>(table: &R) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut records = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        records.push(serde_json::from_slice(value.value())?);
    }
    Ok(records)
}

/// Serialize and store a JSON record.
pub(crate) fn write_record<T: Serialize>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    id: &str,
    record: &T,
) -> StoreResult<()> {
    let json = serde_json::to_vec(record)?;
    table.insert(id, json.as_slice())?;
    Ok(())
}

/// Resolve a unique index entry to the owning record id.
pub(crate) fn index_owner<R>(index: &R, key: &str) -> StoreResult<Option<String>>
where
    R: ReadableTable<&'static str, &'static str>,
{
    Ok(index.get(key)?.map(|v| v.value().to_string()))
}

/// Time-ordered record id, so primary-table key order is insertion order.
pub(crate) fn new_record_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

// =============================================================================
// StoreCall
// =============================================================================

const CALL_OPEN: u8 = 0;
const CALL_COMMITTED: u8 = 1;
const CALL_ABANDONED: u8 = 2;

/// Shared outcome of one store call, settled once by whichever side gets
/// there first: the blocking closure committing, or the caller abandoning it.
#[derive(Debug, Clone, Default)]
pub struct StoreCall(Arc<AtomicU8>);

impl StoreCall {
    /// Claim the right to commit. Later commits in the same call also pass.
    /// Fails once the call was abandoned.
    fn begin_commit(&self) -> bool {
        match self.0.compare_exchange(
            CALL_OPEN,
            CALL_COMMITTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(state) => state == CALL_COMMITTED,
        }
    }

    /// Abandon the call so no further commit happens. Returns `false` when a
    /// commit already claimed it; the caller must then wait for the outcome.
    pub fn abandon(&self) -> bool {
        match self.0.compare_exchange(
            CALL_OPEN,
            CALL_ABANDONED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(state) => state == CALL_ABANDONED,
        }
    }
}

// =============================================================================
// CredentialStore
// =============================================================================

/// Embedded ACID store holding users and roles.
///
/// Constructed once at startup and shared behind an `Arc`. Per-call handles
/// from [`with_call`](Self::with_call) share the same database; the file
/// closes when the last handle is dropped.
pub struct CredentialStore {
    db: Arc<Database>,
    call: StoreCall,
}

impl CredentialStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ROLES)?;
            let _ = write_txn.open_table(ROLE_NAMES)?;
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_EMAILS)?;
            let _ = write_txn.open_multimap_table(ROLE_MEMBERS)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            call: StoreCall::default(),
        })
    }

    /// Handle over the same database whose commits are gated by `call`.
    pub fn with_call(&self, call: StoreCall) -> Self {
        Self {
            db: Arc::clone(&self.db),
            call,
        }
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    /// Commit a write transaction unless the call was abandoned, in which
    /// case the transaction is aborted and nothing becomes visible.
    pub(crate) fn commit(&self, write_txn: WriteTransaction) -> StoreResult<()> {
        if !self.call.begin_commit() {
            write_txn.abort()?;
            return Err(StoreError::Abandoned);
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Run a trivial read transaction; used by the readiness probe.
    pub fn ping(&self) -> StoreResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(ROLES)?;
        Ok(())
    }
}
