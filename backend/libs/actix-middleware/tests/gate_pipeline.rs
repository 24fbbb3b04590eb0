//! Full gate chain over in-memory stores:
//! rate limiter → authentication gate → access policy → handler

use actix_middleware::rate_limit::DEFAULT_CATEGORY;
use actix_middleware::{
    AccessPolicy, AccessPolicyMiddleware, AuthGate, AuthenticatedPrincipal, CategoryPolicy,
    InMemoryCounterStore, InMemoryPrincipalStore, JwtAuthMiddleware, PolicyTable, Principal,
    RateLimitConfig, RateLimitMiddleware, RateLimiter,
};
use actix_web::{http::StatusCode, test, web, App, HttpResponse};
use chrono::{Duration, Utc};
use crypto_core::TokenCodec;
use serde_json::Map;
use std::sync::Arc;

const SECRET: &str = "pipeline-test-secret-0123456789-abcdef";

fn codec() -> Arc<TokenCodec> {
    Arc::new(TokenCodec::new(SECRET, Duration::hours(1)).unwrap())
}

fn token_for(subject: &str) -> String {
    codec().issue_default(subject, Map::new()).unwrap()
}

async fn me(principal: AuthenticatedPrincipal) -> HttpResponse {
    HttpResponse::Ok().json(principal.0)
}

async fn ok() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

macro_rules! gateway {
    ($auth_limit:expr) => {{
        let principals = InMemoryPrincipalStore::with_principals([
            Principal::new("alice", ["ROLE_USER"]),
            Principal::new("root", ["ROLE_USER", "ROLE_ADMIN"]),
        ]);
        let gate = AuthGate::new(codec(), Arc::new(principals));

        let table = PolicyTable::new(
            vec![CategoryPolicy::new("auth", ["/api/auth"], $auth_limit, 60)],
            CategoryPolicy::new(DEFAULT_CATEGORY, Vec::<String>::new(), 100, 60),
        )
        .unwrap();
        let limiter = Arc::new(RateLimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            table,
            RateLimitConfig::default(),
        ));

        test::init_service(
            App::new()
                .wrap(AccessPolicyMiddleware::new(Arc::new(AccessPolicy::builtin())))
                .wrap(JwtAuthMiddleware::new(gate))
                .wrap(RateLimitMiddleware::new(limiter))
                .route("/api/me", web::get().to(me))
                .route("/api/auth/login", web::post().to(ok))
                .route("/api/facts", web::get().to(ok))
                .route("/api/facts", web::post().to(ok))
                .route("/api/admin/users", web::get().to(ok)),
        )
        .await
    }};
}

#[actix_web::test]
async fn test_authenticated_request_reaches_handler() {
    let app = gateway!(10);

    let req = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(("Authorization", format!("Bearer {}", token_for("alice"))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-rate-limit-remaining"));

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["subject"], "alice");
}

#[actix_web::test]
async fn test_expired_token_gets_opaque_401() {
    let app = gateway!(10);

    let expired = codec()
        .issue_at("alice", Map::new(), Duration::minutes(5), Utc::now() - Duration::hours(1))
        .unwrap();
    let req = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(("Authorization", format!("Bearer {}", expired)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let expired_body: serde_json::Value = test::read_body_json(resp).await;

    let req = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(("Authorization", "Bearer garbage"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let malformed_body: serde_json::Value = test::read_body_json(resp).await;

    assert_eq!(expired_body["message"], malformed_body["message"]);
    assert_eq!(expired_body["error"], "Unauthorized");
    assert_eq!(expired_body["path"], "/api/me");
}

#[actix_web::test]
async fn test_anonymous_access_follows_route_policy() {
    let app = gateway!(10);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/facts").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/me").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(&app, test::TestRequest::post().uri("/api/facts").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_admin_routes_require_capability() {
    let app = gateway!(10);

    let req = test::TestRequest::get()
        .uri("/api/admin/users")
        .insert_header(("Authorization", format!("Bearer {}", token_for("alice"))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], 403);
    assert_eq!(body["error"], "Forbidden");

    let req = test::TestRequest::post()
        .uri("/api/facts")
        .insert_header(("Authorization", format!("Bearer {}", token_for("root"))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_rate_limit_runs_before_authentication() {
    let app = gateway!(10);

    for remaining in (0..10).rev() {
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .insert_header(("X-Forwarded-For", "203.0.113.5"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("x-rate-limit-remaining").unwrap(),
            remaining.to_string().as_str()
        );
    }

    // Even a bad credential is throttled, not authenticated
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .insert_header(("X-Forwarded-For", "203.0.113.5"))
        .insert_header(("Authorization", "Bearer garbage"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    let body: serde_json::Value = test::read_body_json(resp).await;
    let retry_after = body["retryAfterSeconds"].as_u64().unwrap();
    assert!(retry_after <= 60);
}
