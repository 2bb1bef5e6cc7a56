use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Upper bound for a single storage call, in milliseconds.
    pub store_timeout_ms: u64,
    /// When set, only addresses in this domain may register.
    pub allowed_email_domain: Option<String>,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "stairtimer".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "stairtimer-users".into()),
            ttl_minutes: parse_or("JWT_TTL_MINUTES", 60 * 12),
        };
        Ok(Self {
            database_url,
            max_connections: parse_or("DB_MAX_CONNECTIONS", 10),
            store_timeout_ms: parse_or("STORE_TIMEOUT_MS", 5_000),
            allowed_email_domain: std::env::var("ALLOWED_EMAIL_DOMAIN")
                .ok()
                .map(|d| d.trim().trim_start_matches('@').to_lowercase())
                .filter(|d| !d.is_empty()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_or("APP_PORT", 8080),
            jwt,
        })
    }

    /// Fixed configuration for tests against the in-memory store.
    #[cfg(any(test, feature = "test-util"))]
    pub fn for_tests() -> Self {
        Self {
            database_url: "memory://".into(),
            max_connections: 1,
            store_timeout_ms: 1_000,
            allowed_email_domain: None,
            host: "127.0.0.1".into(),
            port: 0,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
        }
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_on_garbage() {
        std::env::set_var("STAIRTIMER_TEST_PARSE_OR", "not-a-number");
        assert_eq!(parse_or("STAIRTIMER_TEST_PARSE_OR", 42u64), 42);
        std::env::set_var("STAIRTIMER_TEST_PARSE_OR", " 7 ");
        assert_eq!(parse_or("STAIRTIMER_TEST_PARSE_OR", 42u64), 7);
        std::env::remove_var("STAIRTIMER_TEST_PARSE_OR");
        assert_eq!(parse_or("STAIRTIMER_TEST_PARSE_OR", 42u64), 42);
    }

    #[test]
    fn store_timeout_is_in_millis() {
        let cfg = AppConfig::for_tests();
        assert_eq!(cfg.store_timeout(), std::time::Duration::from_secs(1));
    }
}
