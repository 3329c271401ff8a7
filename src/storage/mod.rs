// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Credential Storage
//!
//! Users and roles live in a single redb file under `DATA_DIR`.
//!
//! ```text
//! {DATA_DIR}/
//!   credentials.redb
//! ```
//!
//! Repositories in [`repository`] own the entity rules (uniqueness,
//! normalization, the role delete cascade); [`database`] owns the file, the
//! table layout and the error type.

pub mod database;
pub mod repository;

pub use database::{CredentialStore, StoreCall, StoreError, StoreResult};
pub use repository::{
    ListParams, NewRole, NewUser, RoleRepository, RoleUpdate, StoredRole, UserFilter,
    UserRepository, UserUpdate, UserView,
};

/// File name of the store inside the data directory.
pub const STORE_FILE_NAME: &str = "credentials.redb";

#[cfg(test)]
pub(crate) mod testing {
    use super::{CredentialStore, STORE_FILE_NAME};

    /// Fresh store in a temporary directory. Keep the `TempDir` alive.
    pub(crate) fn temp_store() -> (CredentialStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(&dir.path().join(STORE_FILE_NAME)).unwrap();
        (store, dir)
    }
}
