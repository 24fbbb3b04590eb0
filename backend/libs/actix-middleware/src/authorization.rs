//! Route access policy
//!
//! Ordered rules map a path prefix (optionally restricted to some methods) to
//! what the caller must present. The first matching rule wins; routes nobody
//! listed require an authenticated principal.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::GateError;
use crate::metrics::AUTH_REJECTIONS_TOTAL;
use crate::principal::{AuthenticatedPrincipal, Principal};
use crate::rate_limit::policy::path_has_prefix;

pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Public,
    Authenticated,
    Capability(String),
}

#[derive(Debug, Clone)]
pub struct AccessRule {
    pub prefix: String,
    /// `None` matches every method
    pub methods: Option<Vec<Method>>,
    pub requirement: Requirement,
}

impl AccessRule {
    pub fn new(prefix: impl Into<String>, requirement: Requirement) -> Self {
        Self {
            prefix: prefix.into(),
            methods: None,
            requirement,
        }
    }

    pub fn for_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        let method_ok = self
            .methods
            .as_ref()
            .map_or(true, |methods| methods.contains(method));
        method_ok && path_has_prefix(path, &self.prefix)
    }
}

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    pub fn new(rules: Vec<AccessRule>) -> Self {
        Self { rules }
    }

    /// Access rules of the content API
    pub fn builtin() -> Self {
        let admin = || Requirement::Capability(ROLE_ADMIN.to_string());
        let writes = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

        let mut rules = vec![
            AccessRule::new("/api/auth", Requirement::Public),
            AccessRule::new("/api/categories", Requirement::Public),
            AccessRule::new("/health", Requirement::Public),
            AccessRule::new("/metrics", Requirement::Public),
            AccessRule::new("/api/admin", admin()),
            AccessRule::new("/api/fact-collector", admin()),
            AccessRule::new("/api/statistics-collector", admin()),
            AccessRule::new("/api/scraper", admin()),
            AccessRule::new("/api/ai", admin()),
        ];

        for content in ["/api/facts", "/api/statistics", "/api/news"] {
            rules.push(AccessRule::new(content, admin()).for_methods(writes.clone()));
            rules.push(AccessRule::new(content, Requirement::Public));
        }

        Self::new(rules)
    }

    pub fn requirement_for(&self, method: &Method, path: &str) -> &Requirement {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .map(|rule| &rule.requirement)
            .unwrap_or(&Requirement::Authenticated)
    }

    pub fn check(&self, method: &Method, path: &str, principal: Option<&Principal>) -> Result<(), GateError> {
        match (self.requirement_for(method, path), principal) {
            (Requirement::Public, _) => Ok(()),
            (_, None) => Err(GateError::AuthenticationRequired),
            (Requirement::Authenticated, Some(_)) => Ok(()),
            (Requirement::Capability(required), Some(principal)) => {
                if principal.has_capability(required) {
                    Ok(())
                } else {
                    Err(GateError::Forbidden {
                        required: required.clone(),
                    })
                }
            }
        }
    }
}

/// Enforces an [`AccessPolicy`] using the principal attached by the
/// authentication gate. Must be registered so that it runs after it.
pub struct AccessPolicyMiddleware {
    policy: Arc<AccessPolicy>,
}

impl AccessPolicyMiddleware {
    pub fn new(policy: Arc<AccessPolicy>) -> Self {
        Self { policy }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessPolicyMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AccessPolicyMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessPolicyMiddlewareService {
            service: Rc::new(service),
            policy: self.policy.clone(),
        }))
    }
}

pub struct AccessPolicyMiddlewareService<S> {
    service: Rc<S>,
    policy: Arc<AccessPolicy>,
}

impl<S, B> Service<ServiceRequest> for AccessPolicyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        let verdict = {
            let extensions = req.extensions();
            let principal = extensions.get::<AuthenticatedPrincipal>().map(|p| &p.0);
            self.policy.check(req.method(), req.path(), principal)
        };

        Box::pin(async move {
            match verdict {
                Ok(()) => {
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(e) => {
                    AUTH_REJECTIONS_TOTAL.with_label_values(&[e.reason()]).inc();
                    tracing::warn!(
                        method = %req.method(),
                        path = %req.path(),
                        reason = e.reason(),
                        "Access denied"
                    );
                    let response = e.to_response(req.path());
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}
