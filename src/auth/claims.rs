// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};

use crate::storage::UserView;

/// Claims carried by tokens this service issues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject: the user id the token is bound to
    pub sub: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

/// Caller resolved by the access middleware: a live user with its role joined.
///
/// Inserted into request extensions and read back through the `Auth`
/// extractor.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: UserView,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}
