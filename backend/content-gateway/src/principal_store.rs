//! Principal stores available to the gateway

use actix_middleware::{InMemoryPrincipalStore, Principal, PrincipalStore, PrincipalStoreError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::SeedPrincipal;

const ROLE_PREFIX: &str = "ROLE_";

/// Users table of the content application
#[derive(Clone)]
pub struct PgPrincipalStore {
    pool: PgPool,
}

impl PgPrincipalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<Principal>, PrincipalStoreError> {
        let row: Option<(String, String, bool)> =
            sqlx::query_as("SELECT username, role, enabled FROM users WHERE username = $1")
                .bind(subject)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PrincipalStoreError::Backend(e.to_string()))?;

        Ok(row.map(|(username, role, enabled)| principal_from_row(username, &role, enabled)))
    }
}

/// Role column value → capability name (`admin` → `ROLE_ADMIN`)
pub fn role_capability(role: &str) -> String {
    let role = role.trim().to_uppercase();
    if role.starts_with(ROLE_PREFIX) {
        role
    } else {
        format!("{}{}", ROLE_PREFIX, role)
    }
}

fn principal_from_row(username: String, role: &str, enabled: bool) -> Principal {
    let principal = Principal::new(username, [role_capability(role)]);
    if enabled {
        principal
    } else {
        principal.disabled()
    }
}

/// In-memory store populated from configured seed principals
pub fn seeded_store(seeds: &[SeedPrincipal]) -> InMemoryPrincipalStore {
    InMemoryPrincipalStore::with_principals(seeds.iter().map(|seed| {
        let principal = Principal::new(
            seed.username.clone(),
            seed.capabilities.iter().map(|c| role_capability(c)),
        );
        if seed.enabled {
            principal
        } else {
            principal.disabled()
        }
    }))
}
