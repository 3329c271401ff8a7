// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state injected into every handler.

use std::{sync::Arc, time::Duration};

use crate::{
    auth::{PasswordHasher, TokenIssuer},
    error::{ApiError, STORE_UNAVAILABLE_MESSAGE},
    storage::{CredentialStore, StoreCall, StoreResult},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CredentialStore>,
    pub tokens: Arc<TokenIssuer>,
    pub passwords: PasswordHasher,
    /// Upper bound on a single blocking store call.
    pub store_timeout: Duration,
}

impl AppState {
    pub fn new(
        store: Arc<CredentialStore>,
        tokens: TokenIssuer,
        passwords: PasswordHasher,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            tokens: Arc::new(tokens),
            passwords,
            store_timeout,
        }
    }

    /// Run a blocking closure against the store on the blocking pool.
    ///
    /// The outer error is set when the call timed out (503) or panicked (500);
    /// the closure's own result is returned untouched. On timeout the call is
    /// abandoned: any write it has not yet committed is aborted. If a commit
    /// already started, the call is awaited and its real outcome returned.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&CredentialStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let call = StoreCall::default();
        let store = self.store.with_call(call.clone());
        let mut task = tokio::task::spawn_blocking(move || f(&store));

        match tokio::time::timeout(self.store_timeout, &mut task).await {
            Ok(joined) => joined.map_err(ApiError::internal),
            Err(_) if call.abandon() => {
                tracing::warn!(timeout = ?self.store_timeout, "Store call timed out");
                Err(ApiError::unavailable(STORE_UNAVAILABLE_MESSAGE))
            }
            Err(_) => {
                tracing::debug!("Store call timed out mid-commit, awaiting outcome");
                task.await.map_err(ApiError::internal)
            }
        }
    }

    /// [`with_store`](Self::with_store) for closures returning a `StoreResult`,
    /// mapping store errors into the API taxonomy.
    pub async fn run_store<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&CredentialStore) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        Ok(self.with_store(f).await??)
    }

    /// Hash a password off the async executor.
    pub async fn hash_password(&self, plaintext: String) -> Result<String, ApiError> {
        let passwords = self.passwords.clone();
        tokio::task::spawn_blocking(move || passwords.hash(&plaintext))
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::internal)
    }

    /// Verify a login password off the async executor. `None` means the email
    /// is unknown; a decoy hash is checked so the cost matches a real miss.
    pub async fn verify_password(
        &self,
        plaintext: String,
        hash: Option<String>,
    ) -> Result<bool, ApiError> {
        let passwords = self.passwords.clone();
        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => passwords.verify(&plaintext, &hash),
            None => passwords.verify_absent(&plaintext),
        })
        .await
        .map_err(ApiError::internal)
    }
}
