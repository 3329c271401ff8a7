// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access middleware.
//!
//! Applied with `route_layer` to every protected route. On success the
//! resolved caller is stored in request extensions as [`AuthenticatedUser`]
//! for the [`Auth`](super::Auth) extractor.
//!
//! ```rust,ignore
//! let protected = Router::new()
//!     .route("/", get(list_roles))
//!     .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));
//! ```

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{AuthError, AuthenticatedUser};
use crate::{
    error::ApiError,
    state::AppState,
    storage::{StoreError, UserRepository},
};

/// Extract the bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_str = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Resolve request headers to a live user with its role joined.
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthenticatedUser, ApiError> {
    let token = bearer_token(headers)?;
    let user_id = state.tokens.verify(token)?;

    let lookup = state
        .with_store(move |store| UserRepository::new(store).get(&user_id))
        .await?;

    match lookup {
        Ok(user) => Ok(AuthenticatedUser { user }),
        Err(StoreError::NotFound(_)) => Err(AuthError::UserNotFound.into()),
        Err(e) => Err(ApiError::internal(e)),
    }
}

/// Authentication middleware function.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, request.headers()).await {
        Ok(user) => {
            tracing::debug!(user_id = %user.user_id(), "Request authenticated");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::test_state;
    use crate::storage::NewUser;
    use axum::http::{HeaderValue, StatusCode};

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_parsing() {
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingAuthHeader)
        ));
        assert!(matches!(
            bearer_token(&headers_with("Basic abc")),
            Err(AuthError::InvalidAuthHeader)
        ));
        assert!(matches!(
            bearer_token(&headers_with("Bearer ")),
            Err(AuthError::InvalidAuthHeader)
        ));
        assert_eq!(bearer_token(&headers_with("Bearer abc.def")).unwrap(), "abc.def");
    }

    #[tokio::test]
    async fn resolves_live_user() {
        let (state, _dir) = test_state();
        let user = UserRepository::new(&state.store)
            .create(NewUser {
                first_name: "A".into(),
                last_name: String::new(),
                email: "a@x.com".into(),
                password_hash: "hash".into(),
                role: None,
            })
            .unwrap();
        let token = state.tokens.issue(&user.id).unwrap().token;

        let caller = authenticate(&state, &headers_with(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(caller.user_id(), user.id);
        assert!(caller.user.role.is_none());
    }

    #[tokio::test]
    async fn vanished_user_is_unauthorized() {
        let (state, _dir) = test_state();
        let token = state.tokens.issue("ghost").unwrap().token;

        let err = authenticate(&state, &headers_with(&format!("Bearer {token}")))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "User not found");
    }

    #[tokio::test]
    async fn bad_token_is_unauthorized() {
        let (state, _dir) = test_state();
        let err = authenticate(&state, &headers_with("Bearer nope"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "Token invalid");
    }
}
