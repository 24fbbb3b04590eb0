use actix_middleware::AuthenticatedPrincipal;
use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::health::{liveness_check, readiness_check, serve_metrics};

#[derive(Serialize)]
struct MeResponse {
    subject: String,
    capabilities: Vec<String>,
}

/// The principal the authentication gate attached to this request
pub async fn me(principal: AuthenticatedPrincipal) -> HttpResponse {
    let principal = principal.0;
    HttpResponse::Ok().json(MeResponse {
        subject: principal.subject,
        capabilities: principal.capabilities.into_iter().collect(),
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(liveness_check))
        .route("/health/ready", web::get().to(readiness_check))
        .route("/metrics", web::get().to(serve_metrics))
        .route("/api/me", web::get().to(me));
}
