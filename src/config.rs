use anyhow::Context;

use crate::auth::password::{PasswordScheme, DEFAULT_BCRYPT_COST};

/// Tells whether the process runs in production. Read on every use.
pub trait RuntimeEnv: Send + Sync {
    fn is_production(&self) -> bool;
}

/// Reads an environment variable (default `APP_ENV`) each time it is asked.
#[derive(Debug, Clone)]
pub struct ProcessEnv {
    var: String,
}

impl ProcessEnv {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for ProcessEnv {
    fn default() -> Self {
        Self::new("APP_ENV")
    }
}

impl RuntimeEnv for ProcessEnv {
    fn is_production(&self) -> bool {
        std::env::var(&self.var)
            .map(|v| v == "production")
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub session_name: String,
    pub domain: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub password_scheme: PasswordScheme,
    pub cookie: CookieConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let bcrypt_cost = std::env::var("BCRYPT_COST")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_BCRYPT_COST);
        let password_scheme = PasswordScheme::parse(
            &std::env::var("PASSWORD_SCHEME").unwrap_or_else(|_| "bcrypt".into()),
            bcrypt_cost,
        )?;
        let cookie = CookieConfig {
            session_name: std::env::var("SESSION_COOKIE").unwrap_or_else(|_| "token".into()),
            domain: std::env::var("COOKIE_DOMAIN").ok().filter(|d| !d.is_empty()),
        };
        Ok(Self {
            database_url,
            password_scheme,
            cookie,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_env_reads_the_variable_each_time() {
        // unique name so parallel tests never share it
        let env = ProcessEnv::new("GATEKEEPER_TEST_ENV_FLIP");
        std::env::remove_var("GATEKEEPER_TEST_ENV_FLIP");
        assert!(!env.is_production());
        std::env::set_var("GATEKEEPER_TEST_ENV_FLIP", "production");
        assert!(env.is_production());
        std::env::set_var("GATEKEEPER_TEST_ENV_FLIP", "development");
        assert!(!env.is_production());
        std::env::remove_var("GATEKEEPER_TEST_ENV_FLIP");
    }
}
