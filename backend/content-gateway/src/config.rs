use actix_middleware::rate_limit::{
    builtin_rules, CategoryPolicy, FailureMode, PolicyError, PolicyTable, RateLimitConfig,
    DEFAULT_CATEGORY,
};
use anyhow::{anyhow, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use crypto_core::jwt::MIN_SECRET_LEN;
use serde::Deserialize;
use std::time::Duration;

const ENV_PREFIX: &str = "GATEWAY";
const CONFIG_FILE: &str = "config/gateway";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Without a URL principals come from `auth.seed_principals`
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_seconds: u64,
    pub principal_timeout_ms: u64,
    #[serde(default)]
    pub seed_principals: Vec<SeedPrincipal>,
}

/// Principal provisioned from configuration when no database is configured
#[derive(Debug, Clone, Deserialize)]
pub struct SeedPrincipal {
    pub username: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    pub store_timeout_ms: u64,
    pub failure_mode: FailureMode,
    pub default_limit: u32,
    pub default_window_seconds: u64,
    /// Empty means the built-in content API categories
    #[serde(default)]
    pub categories: Vec<CategorySettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategorySettings {
    pub name: String,
    pub prefixes: Vec<String>,
    pub limit: u32,
    pub window_seconds: u64,
}

impl Config {
    /// Defaults for every key except `auth.jwt_secret`
    pub fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("redis.connect_timeout_ms", 2000)?
            .set_default("auth.token_ttl_seconds", 86400)? // 24 hours
            .set_default("auth.principal_timeout_ms", 500)?
            .set_default("rate_limit.store_timeout_ms", 100)?
            .set_default("rate_limit.failure_mode", "fail_open")?
            .set_default("rate_limit.default_limit", 60)?
            .set_default("rate_limit.default_window_seconds", 60)
    }

    /// Load from `config/gateway.*` (optional), then `GATEWAY__SECTION__KEY`
    /// variables, then the conventional `REDIS_URL`, `DATABASE_URL` and
    /// `JWT_SECRET` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("auth.jwt_secret", std::env::var("JWT_SECRET").ok())?
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("HTTP port must be greater than 0"));
        }

        if self.server.workers == 0 {
            return Err(anyhow!("Worker count must be greater than 0"));
        }

        if self.redis.url.is_empty() {
            return Err(anyhow!("Redis URL is required"));
        }

        if matches!(self.database.url.as_deref(), Some(url) if url.trim().is_empty()) {
            return Err(anyhow!("Database URL must not be empty when set"));
        }

        if self.auth.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(anyhow!(
                "JWT secret must be at least {} bytes long",
                MIN_SECRET_LEN
            ));
        }

        if self.auth.token_ttl_seconds == 0 {
            return Err(anyhow!("Token TTL must be greater than 0"));
        }

        if self.rate_limit.store_timeout_ms == 0 || self.auth.principal_timeout_ms == 0 {
            return Err(anyhow!("Store timeouts must be greater than 0"));
        }

        if self
            .auth
            .seed_principals
            .iter()
            .any(|seed| seed.username.trim().is_empty())
        {
            return Err(anyhow!("Seed principals must have a username"));
        }

        self.policy_table()?;
        Ok(())
    }

    pub fn policy_table(&self) -> Result<PolicyTable, PolicyError> {
        let settings = &self.rate_limit;
        let rules = if settings.categories.is_empty() {
            builtin_rules()
        } else {
            settings
                .categories
                .iter()
                .map(|c| CategoryPolicy::new(c.name.clone(), c.prefixes.clone(), c.limit, c.window_seconds))
                .collect()
        };

        PolicyTable::new(
            rules,
            CategoryPolicy::new(
                DEFAULT_CATEGORY,
                Vec::<String>::new(),
                settings.default_limit,
                settings.default_window_seconds,
            ),
        )
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            store_timeout_ms: self.rate_limit.store_timeout_ms,
            failure_mode: self.rate_limit.failure_mode,
            ..RateLimitConfig::default()
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.auth.token_ttl_seconds as i64)
    }

    pub fn principal_timeout(&self) -> Duration {
        Duration::from_millis(self.auth.principal_timeout_ms)
    }

    pub fn redis_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.redis.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "config-test-secret-0123456789-abcdef";

    fn load(overrides: &[(&str, &str)]) -> Config {
        let mut builder = Config::builder().unwrap().set_override("auth.jwt_secret", SECRET).unwrap();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap().try_deserialize().unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.workers > 0);
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
        assert!(config.database.url.is_none());
        assert_eq!(config.auth.token_ttl_seconds, 86400);
        assert_eq!(config.rate_limit.store_timeout_ms, 100);
        assert_eq!(config.rate_limit.failure_mode, FailureMode::FailOpen);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_secret_fails_to_load() {
        let result: Result<Config, _> = Config::builder().unwrap().build().unwrap().try_deserialize();
        assert!(result.is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        let config = load(&[("auth.jwt_secret", "too-short")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fail_closed_mode() {
        let config = load(&[("rate_limit.failure_mode", "fail_closed")]);
        assert_eq!(config.rate_limit_config().failure_mode, FailureMode::FailClosed);
    }

    #[test]
    fn test_builtin_categories_when_none_configured() {
        let config = load(&[("rate_limit.default_limit", "75")]);
        let table = config.policy_table().unwrap();
        assert_eq!(table.classify("/api/auth/login").limit, 10);
        assert_eq!(table.classify("/api/other").limit, 75);
    }

    #[test]
    fn test_zero_default_limit_rejected() {
        let config = load(&[("rate_limit.default_limit", "0")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_categories() {
        let mut config = load(&[]);
        config.rate_limit.categories = vec![CategorySettings {
            name: "search".to_string(),
            prefixes: vec!["/api/search".to_string()],
            limit: 5,
            window_seconds: 10,
        }];

        let table = config.policy_table().unwrap();
        let search = table.classify("/api/search?q=x");
        assert_eq!(search.name, "search");
        assert_eq!(search.window, Duration::from_secs(10));
        // Built-ins are replaced, not extended
        assert_eq!(table.classify("/api/auth/login").name, DEFAULT_CATEGORY);

        config.rate_limit.categories[0].name = String::new();
        assert!(config.validate().is_err());
    }
}
