// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::Request,
    http::HeaderName,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::require_auth,
    models::{
        AccessCheckResponse, AccessModuleRequest, BulkOperationRequest,
        BulkUpdateDifferentRequest, BulkUpdateSameRequest, CreateRoleRequest, LoginRequest,
        LoginResponse, LoginUser, MessageResponse, SignupRequest, UpdateRoleRequest,
        UpdateUserRequest, UserFilterRequest,
    },
    state::AppState,
    storage::{
        repository::{BulkFailure, BulkWriteResult, RoleSummary, UpdateManyResult},
        StoredRole, UserView,
    },
};

pub mod extract;
pub mod health;
pub mod roles;
pub mod users;

const REQUEST_ID_HEADER: &str = "x-request-id";

fn role_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(roles::list_roles).post(roles::create_role))
        .route(
            "/{id}",
            get(roles::get_role)
                .put(roles::update_role)
                .delete(roles::delete_role),
        )
        .route("/{id}/access/add", post(roles::add_access_module))
        .route("/{id}/access/remove", post(roles::remove_access_module))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

fn user_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/signup", post(users::signup))
        .route("/login", post(users::login));

    let protected = Router::new()
        .route("/", get(users::list_users))
        .route(
            "/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/{id}/check-access", get(users::check_access))
        .route("/bulk/update-same", post(users::bulk_update_same))
        .route("/bulk/update-different", post(users::bulk_update_different))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    public.merge(protected)
}

pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/", get(health::banner))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/api/roles", role_routes(&state))
        .nest("/api/users", user_routes(&state))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(middleware)
}

/// Registers the bearer scheme referenced by protected paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::banner,
        health::health,
        health::liveness,
        health::readiness,
        roles::create_role,
        roles::list_roles,
        roles::get_role,
        roles::update_role,
        roles::delete_role,
        roles::add_access_module,
        roles::remove_access_module,
        users::signup,
        users::login,
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        users::check_access,
        users::bulk_update_same,
        users::bulk_update_different
    ),
    components(
        schemas(
            StoredRole,
            UserView,
            RoleSummary,
            MessageResponse,
            LoginResponse,
            LoginUser,
            AccessCheckResponse,
            UpdateManyResult,
            BulkWriteResult,
            BulkFailure,
            CreateRoleRequest,
            UpdateRoleRequest,
            AccessModuleRequest,
            SignupRequest,
            LoginRequest,
            UpdateUserRequest,
            UserFilterRequest,
            BulkUpdateSameRequest,
            BulkUpdateDifferentRequest,
            BulkOperationRequest,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Roles", description = "Roles and access modules"),
        (name = "Users", description = "Signup, login, user management and bulk updates"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::test_state;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Sign up and log in; returns (user id, token).
    async fn register(app: &Router, first: &str, email: &str) -> (String, String) {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/users/signup",
            None,
            Some(json!({"firstName": first, "email": email, "password": "p1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let id = body["data"]["_id"].as_str().unwrap().to_string();

        let (status, body) = send(
            app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({"email": email, "password": "p1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (id, body["token"].as_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let (state, _dir) = test_state();
        let _ = router(state).into_make_service();
    }

    #[tokio::test]
    async fn banner_and_health_are_public() {
        let (state, _dir) = test_state();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(axum::http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], health::BANNER.as_bytes());

        let (status, body) = send(&app, Method::GET, "/health/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["store"], "ok");
    }

    #[tokio::test]
    async fn signup_login_and_wrong_password() {
        let (state, _dir) = test_state();
        let app = router(state);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users/signup",
            None,
            Some(json!({"firstName": "A", "email": "a@x.com", "password": "p1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["lastName"], "");
        assert_eq!(body["data"]["role"], Value::Null);
        assert!(body["data"].get("password").is_none());
        assert!(body["data"].get("passwordHash").is_none());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({"email": "a@x.com", "password": "p1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["token"].as_str().unwrap().is_empty());
        assert_eq!(body["user"]["email"], "a@x.com");
        assert_eq!(body["user"]["firstName"], "A");
        assert!(body["user"]["id"].is_string());

        let (wrong_status, wrong_body) = send(
            &app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({"email": "a@x.com", "password": "wrong"})),
        )
        .await;
        let (unknown_status, unknown_body) = send(
            &app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({"email": "nobody@x.com", "password": "p1"})),
        )
        .await;
        assert_eq!(wrong_status, StatusCode::BAD_REQUEST);
        assert_eq!(wrong_status, unknown_status);
        assert_eq!(wrong_body, unknown_body);
        assert_eq!(wrong_body["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn signup_and_login_validation() {
        let (state, _dir) = test_state();
        let app = router(state);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users/signup",
            None,
            Some(json!({"email": "a@x.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "firstName, email, password required");

        register(&app, "A", "a@x.com").await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users/signup",
            None,
            Some(json!({"firstName": "B", "email": "a@x.com", "password": "p2"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email already exists");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({"email": "a@x.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "email and password required");
    }

    #[tokio::test]
    async fn protected_routes_require_token() {
        let (state, _dir) = test_state();
        let app = router(state);

        let (status, body) = send(&app, Method::GET, "/api/roles", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"success": false, "message": "Not authorized"}));

        let (status, body) = send(&app, Method::GET, "/api/users", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Token invalid");
    }

    #[tokio::test]
    async fn deleted_caller_is_rejected() {
        let (state, _dir) = test_state();
        let app = router(state);
        let (id, token) = register(&app, "A", "a@x.com").await;

        let (status, _) = send(&app, Method::DELETE, &format!("/api/users/{id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::GET, "/api/users", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "User not found");
    }

    #[tokio::test]
    async fn role_lifecycle_with_module_normalization() {
        let (state, _dir) = test_state();
        let app = router(state);
        let (_, token) = register(&app, "A", "a@x.com").await;
        let token = Some(token.as_str());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/roles",
            token,
            Some(json!({"roleName": "admin", "accessModules": ["Billing ", " billing", "Users"]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["accessModules"], json!(["Billing", "billing", "Users"]));
        assert_eq!(body["data"]["active"], true);
        let role_id = body["data"]["_id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/roles",
            token,
            Some(json!({"roleName": "admin"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let add = format!("/api/roles/{role_id}/access/add");
        for _ in 0..2 {
            let (status, body) =
                send(&app, Method::POST, &add, token, Some(json!({"module": "Reports"}))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(
                body["data"]["accessModules"],
                json!(["Billing", "billing", "Users", "Reports"])
            );
        }

        let (status, body) = send(&app, Method::POST, &add, token, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "module is required");

        let remove = format!("/api/roles/{role_id}/access/remove");
        let (status, body) =
            send(&app, Method::POST, &remove, token, Some(json!({"module": "Nope"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["accessModules"].as_array().unwrap().len(), 4);

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/roles/{role_id}"),
            token,
            Some(json!({"roleName": "root", "accessModules": [" Users", "Audit"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["roleName"], "root");
        assert_eq!(
            body["data"]["accessModules"],
            json!(["Billing", "billing", "Users", "Reports", "Audit"])
        );

        let (status, body) = send(&app, Method::GET, "/api/roles?q=ROO", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (status, _) = send(&app, Method::GET, "/api/roles/missing", token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn check_access_and_role_delete_cascade() {
        let (state, _dir) = test_state();
        let app = router(state);
        let (caller_id, token) = register(&app, "A", "a@x.com").await;
        let token = Some(token.as_str());

        let check = format!("/api/users/{caller_id}/check-access?module=Billing");
        let (status, body) = send(&app, Method::GET, &check, token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "hasAccess": false}));

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/users/{caller_id}/check-access"),
            token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "module query param is required");

        let (_, body) = send(
            &app,
            Method::POST,
            "/api/roles",
            token,
            Some(json!({"roleName": "billing", "accessModules": ["Billing"]})),
        )
        .await;
        let role_id = body["data"]["_id"].as_str().unwrap().to_string();

        let (b_id, _) = register(&app, "B", "b@x.com").await;
        for id in [&caller_id, &b_id] {
            let (status, body) = send(
                &app,
                Method::PUT,
                &format!("/api/users/{id}"),
                token,
                Some(json!({"role": role_id, "password": "ignored"})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["data"]["role"]["roleName"], "billing");
        }

        let (_, body) = send(&app, Method::GET, &check, token, None).await;
        assert_eq!(body["hasAccess"], true);

        // The ignored password did not change the login.
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({"email": "b@x.com", "password": "p1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            send(&app, Method::DELETE, &format!("/api/roles/{role_id}"), token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Role deleted");

        let (_, body) = send(&app, Method::GET, "/api/users", token, None).await;
        assert_eq!(body["count"], 2);
        for user in body["data"].as_array().unwrap() {
            assert_eq!(user["role"], Value::Null);
        }

        let (_, body) = send(&app, Method::GET, &check, token, None).await;
        assert_eq!(body["hasAccess"], false);
    }

    #[tokio::test]
    async fn bulk_updates() {
        let (state, _dir) = test_state();
        let app = router(state);
        let (a_id, token) = register(&app, "A", "a@x.com").await;
        let (b_id, _) = register(&app, "B", "b@x.com").await;
        let token = Some(token.as_str());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users/bulk/update-same",
            token,
            Some(json!({"filter": {}, "update": {"lastName": "ABC"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], json!({"matchedCount": 2, "modifiedCount": 2}));

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/users/bulk/update-same",
            token,
            Some(json!({"filter": {"password": "x"}, "update": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users/bulk/update-different",
            token,
            Some(json!({"operations": [
                {"_id": a_id, "update": {"firstName": "X"}},
                {"_id": "missing", "update": {"firstName": "Y"}},
                {"update": {"firstName": "Z"}},
                {"_id": b_id, "update": {"firstName": "W"}}
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["matchedCount"], 2);
        assert_eq!(body["result"]["modifiedCount"], 2);
        let failures = body["result"]["failures"].as_array().unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0]["index"], 1);
        assert_eq!(failures[0]["_id"], "missing");
        assert_eq!(failures[1]["index"], 2);

        let (_, body) = send(&app, Method::GET, &format!("/api/users/{b_id}"), token, None).await;
        assert_eq!(body["data"]["firstName"], "W");
        assert_eq!(body["data"]["lastName"], "ABC");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users/bulk/update-different",
            token,
            Some(json!({"operations": {"_id": a_id}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "operations array required");
    }

    #[tokio::test]
    async fn malformed_json_uses_error_envelope() {
        let (state, _dir) = test_state();
        let app = router(state);

        let request = axum::http::Request::post("/api/users/signup")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }

    #[test]
    fn openapi_document_lists_bearer_scheme() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
        assert!(doc["paths"]["/api/users/{id}/check-access"].is_object());
    }
}
