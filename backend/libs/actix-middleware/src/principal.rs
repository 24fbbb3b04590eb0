//! Principals and the store contract the authentication gate depends on

use actix_web::{dev::Payload, error::InternalError, FromRequest, HttpMessage, HttpRequest};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{ready, Ready};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::error::GateError;

/// Authorized identity and its capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub subject: String,
    pub capabilities: BTreeSet<String>,
    pub enabled: bool,
}

impl Principal {
    pub fn new<I, S>(subject: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject: subject.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PrincipalStoreError {
    #[error("principal backend error: {0}")]
    Backend(String),
}

/// Lookup of principals by credential subject
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// `Ok(None)` means the subject is unknown
    async fn find_by_subject(&self, subject: &str) -> Result<Option<Principal>, PrincipalStoreError>;
}

/// Process-local principal store for tests and single-node development
#[derive(Default)]
pub struct InMemoryPrincipalStore {
    principals: DashMap<String, Principal>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principals(principals: impl IntoIterator<Item = Principal>) -> Self {
        let store = Self::new();
        for principal in principals {
            store.insert(principal);
        }
        store
    }

    pub fn insert(&self, principal: Principal) {
        self.principals.insert(principal.subject.clone(), principal);
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<Principal>, PrincipalStoreError> {
        Ok(self.principals.get(subject).map(|entry| entry.value().clone()))
    }
}

/// Principal attached to the request by the authentication gate
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

impl FromRequest for AuthenticatedPrincipal {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthenticatedPrincipal>() {
            Some(principal) => ready(Ok(principal.clone())),
            None => {
                let err = GateError::AuthenticationRequired;
                let response = err.to_response(req.path());
                ready(Err(InternalError::from_response(err, response).into()))
            }
        }
    }
}
