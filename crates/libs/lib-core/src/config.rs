//! # Application Configuration
//!
//! Configuration loaded from environment variables, validated on startup so a
//! misconfigured deployment fails fast instead of at first use.

use lib_utils::envs::{get_env, get_env_or, get_env_parse_or};

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct Config {
    /// SQLite database connection URL
    pub database_url: String,

    /// Secret key for JWT token signing and verification
    ///
    /// **Must be at least 32 characters long** for security.
    pub jwt_secret: String,

    /// JWT token validity period in hours
    ///
    /// Valid range: 1-720 hours (1 hour to 30 days)
    pub jwt_expiration_hours: i64,

    /// Base URL of the Ollama model-serving API
    pub ollama_url: String,

    /// Request timeout for Ollama generate calls, in seconds
    ///
    /// The original service had no upstream timeout; expiry here takes the
    /// same fallback path as any other upstream failure.
    pub ollama_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let database_url = get_env_or("DATABASE_URL", "sqlite:data/chat.db");

        let jwt_secret = get_env("JWT_SECRET")
            .map_err(|_| "JWT_SECRET must be set in environment")?;

        let jwt_expiration_hours = get_env_parse_or("JWT_EXPIRATION_HOURS", 24)
            .map_err(|e| format!("JWT_EXPIRATION_HOURS must be a valid number: {}", e))?;

        let ollama_url = get_env_or("OLLAMA_API_URL", "http://localhost:11434");

        let ollama_timeout_secs = get_env_parse_or("OLLAMA_TIMEOUT_SECS", 120)
            .map_err(|e| format!("OLLAMA_TIMEOUT_SECS must be a valid number: {}", e))?;

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration_hours,
            ollama_url,
            ollama_timeout_secs,
        })
    }

    /// Validate configuration values against security and business rules.
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.len() < 32 {
            return Err("JWT_SECRET must be at least 32 characters long".to_string());
        }

        if self.jwt_expiration_hours < 1 || self.jwt_expiration_hours > 720 {
            return Err("JWT_EXPIRATION_HOURS must be between 1 and 720 (30 days)".to_string());
        }

        if !self.ollama_url.starts_with("http://") && !self.ollama_url.starts_with("https://") {
            return Err("OLLAMA_API_URL must be an http(s) URL".to_string());
        }

        if self.ollama_timeout_secs == 0 {
            return Err("OLLAMA_TIMEOUT_SECS must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret-key-must-be-at-least-32-characters!".to_string(),
            jwt_expiration_hours: 24,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_timeout_secs: 120,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let mut config = base_config();
        config.jwt_secret = "too-short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_http_ollama_url_rejected() {
        let mut config = base_config();
        config.ollama_url = "localhost:11434".to_string();
        assert!(config.validate().is_err());
    }
}
