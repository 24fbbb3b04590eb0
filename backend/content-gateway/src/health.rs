use actix_web::{web, HttpResponse};
use chrono::Utc;
use redis_utils::RedisPool;
use serde::Serialize;
use std::collections::HashMap;

pub struct HealthState {
    redis: RedisPool,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Unhealthy,
}

#[derive(Serialize)]
pub struct ComponentCheck {
    pub status: ComponentStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub status: ComponentStatus,
    pub checks: HashMap<String, ComponentCheck>,
    pub timestamp: String,
}

impl HealthState {
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let mut checks = HashMap::new();

        let redis_check = match self.redis.ping().await {
            Ok(latency) => ComponentCheck {
                status: ComponentStatus::Healthy,
                message: "Redis ping successful".to_string(),
                latency_ms: Some(latency.as_millis() as u64),
            },
            Err(e) => ComponentCheck {
                status: ComponentStatus::Unhealthy,
                message: format!("Redis ping failed: {}", e),
                latency_ms: None,
            },
        };
        let ready = redis_check.status == ComponentStatus::Healthy;
        checks.insert("redis".to_string(), redis_check);

        ReadinessResponse {
            ready,
            status: if ready {
                ComponentStatus::Healthy
            } else {
                ComponentStatus::Unhealthy
            },
            checks,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Liveness: the process is up and serving
pub async fn liveness_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "content-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness: the counter store answers
pub async fn readiness_check(state: web::Data<HealthState>) -> HttpResponse {
    let response = state.readiness().await;
    if response.ready {
        HttpResponse::Ok().json(response)
    } else {
        tracing::warn!("Readiness check failed");
        HttpResponse::ServiceUnavailable().json(response)
    }
}

pub async fn serve_metrics() -> HttpResponse {
    match actix_middleware::metrics::render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}
