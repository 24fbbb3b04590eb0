use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::{ready, Ready};
use prometheus::{Encoder, HistogramVec, IntCounterVec, TextEncoder};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::time::Instant;

/// Prometheus Metrics Middleware
pub struct MetricsMiddleware;

lazy_static::lazy_static! {
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "http_requests_total",
        "Total HTTP requests",
        &["method", "route", "status"]
    ).unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = prometheus::register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latency",
        &["method", "route", "status"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    pub static ref RATE_LIMIT_EXCEEDED_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "api_rate_limit_exceeded_total",
        "Requests rejected by the rate limiter",
        &["category"]
    ).unwrap();

    pub static ref RATE_LIMIT_STORE_ERRORS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "api_rate_limit_store_errors_total",
        "Rate limiter counter store failures by applied failure mode",
        &["mode"]
    ).unwrap();

    pub static ref AUTH_REJECTIONS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "api_auth_rejections_total",
        "Requests rejected by the authentication gate",
        &["reason"]
    ).unwrap();
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = MetricsMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let start = Instant::now();
        let method = req.method().to_string();

        Box::pin(async move {
            let res = service.call(req).await?;
            // Route pattern keeps label cardinality bounded (no raw ids)
            let route = res
                .request()
                .match_pattern()
                .unwrap_or_else(|| "unmatched".to_string());
            let status = res.status().as_u16().to_string();
            let duration = start.elapsed().as_secs_f64();

            HTTP_REQUESTS_TOTAL
                .with_label_values(&[&method, &route, &status])
                .inc();

            HTTP_REQUEST_DURATION_SECONDS
                .with_label_values(&[&method, &route, &status])
                .observe(duration);

            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test as actix_test, web, App, HttpResponse};

    #[actix_web::test]
    async fn test_requests_are_counted_by_route_pattern() {
        let app = actix_test::init_service(
            App::new()
                .wrap(MetricsMiddleware)
                .route("/api/facts/{id}", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let before = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/api/facts/{id}", "200"])
            .get();
        let req = actix_test::TestRequest::get().uri("/api/facts/17").to_request();
        actix_test::call_service(&app, req).await;

        let after = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/api/facts/{id}", "200"])
            .get();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_render_includes_rate_limit_counter() {
        RATE_LIMIT_EXCEEDED_TOTAL.with_label_values(&["auth"]).inc();
        let text = render().unwrap();
        assert!(text.contains("api_rate_limit_exceeded_total"));
    }
}
