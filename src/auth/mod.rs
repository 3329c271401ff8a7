// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! ## Auth Flow
//!
//! 1. `POST /api/users/login` checks the password with bcrypt and issues an
//!    HS256 token whose `sub` is the user id
//! 2. Clients send `Authorization: Bearer <token>`
//! 3. The access middleware:
//!    - Verifies signature and expiry
//!    - Loads the user with its role joined (never the password hash)
//!    - Rejects with 401 if the user no longer exists
//!
//! There is no revocation; expiry is the only way a token stops working.
//! Access-module checks are a query (`check-access`), not a gate.

pub mod claims;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod password;
pub mod token;

pub use claims::{AuthenticatedUser, Claims};
pub use error::AuthError;
pub use extractor::Auth;
pub use middleware::require_auth;
pub use password::PasswordHasher;
pub use token::{IssuedToken, TokenIssuer};
