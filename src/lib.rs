// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User & Role Service - accounts, roles and access modules
//!
//! Signup and login with bcrypt-hashed passwords and HS256 bearer tokens,
//! role CRUD with set semantics for access modules, user CRUD, access checks
//! and bulk updates, all over an embedded redb store.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum) and OpenAPI document
//! - `auth` - Password hashing, token issuing, access middleware
//! - `config` - Environment configuration
//! - `storage` - Credential store (redb) and repositories

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;
