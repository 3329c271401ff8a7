// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! bcrypt password hashing.
//!
//! Hashing is explicit: the signup handler calls [`PasswordHasher::hash`]
//! before building the record, and no other write path accepts a password,
//! so an unchanged password is never re-hashed.

use bcrypt::BcryptError;

/// Plaintext used to build the decoy hash for unknown-email logins.
const DECOY_PASSWORD: &str = "decoy-password-never-issued";

/// Salted one-way password hashing with a fixed work factor.
#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    /// Hash verified against when the login email is unknown, so both
    /// failure paths pay the same bcrypt cost.
    decoy_hash: String,
}

impl PasswordHasher {
    /// Build a hasher with the given bcrypt cost (4..=31).
    pub fn new(cost: u32) -> Result<Self, BcryptError> {
        let decoy_hash = bcrypt::hash(DECOY_PASSWORD, cost)?;
        Ok(Self { cost, decoy_hash })
    }

    /// Produce a salted bcrypt hash of `plaintext`.
    pub fn hash(&self, plaintext: &str) -> Result<String, BcryptError> {
        bcrypt::hash(plaintext, self.cost)
    }

    /// Check `plaintext` against a stored hash. A corrupt hash never matches.
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        match bcrypt::verify(plaintext, hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash could not be parsed");
                false
            }
        }
    }

    /// Burn one verification for a login whose email does not exist.
    /// Always returns `false`.
    pub fn verify_absent(&self, plaintext: &str) -> bool {
        let _ = bcrypt::verify(plaintext, &self.decoy_hash);
        false
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}
