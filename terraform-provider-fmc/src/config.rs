//! Provider configuration
//!
//! Values come from the `provider "fmc"` block first and fall back to
//! `FMC_*` environment variables, then to defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_URL: &str = "FMC_URL";
pub const ENV_USERNAME: &str = "FMC_USERNAME";
pub const ENV_PASSWORD: &str = "FMC_PASSWORD";
pub const ENV_TOKEN: &str = "FMC_TOKEN";
pub const ENV_DOMAIN: &str = "FMC_DOMAIN";
pub const ENV_INSECURE: &str = "FMC_INSECURE";
pub const ENV_RETRIES: &str = "FMC_RETRIES";
pub const ENV_REQS_PER_MINUTE: &str = "FMC_REQS_PER_MINUTE";

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_REQS_PER_MINUTE: u32 = 120;

/// Provider block as sent by Terraform
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub domain: Option<String>,
    pub insecure: Option<bool>,
    pub retries: Option<u32>,
    pub reqs_per_minute: Option<u32>,
}

/// How the client authenticates against FMC
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// On-prem FMC: basic auth exchanged for an access token
    Password { username: String, password: String },
    /// Cloud-delivered FMC: static API token
    Token(String),
}

/// Fully resolved client settings
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub url: String,
    pub credentials: Credentials,
    pub domain: Option<String>,
    pub insecure: bool,
    pub max_retries: u32,
    pub reqs_per_minute: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub timeout: Duration,
}

impl ClientSettings {
    /// Settings with library defaults; used directly by tests
    pub fn new(url: &str, credentials: Credentials) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            credentials,
            domain: None,
            insecure: false,
            max_retries: DEFAULT_RETRIES,
            reqs_per_minute: DEFAULT_REQS_PER_MINUTE,
            backoff_min: Duration::from_secs(2),
            backoff_max: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ProviderConfig {
    /// Resolve against the process environment
    pub fn resolve(&self) -> Result<ClientSettings, String> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` for environment fallbacks
    pub fn resolve_with<F>(&self, lookup: F) -> Result<ClientSettings, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |value: &Option<String>, key: &str| {
            value
                .clone()
                .or_else(|| lookup(key))
                .filter(|v| !v.is_empty())
        };

        let url = pick(&self.url, ENV_URL)
            .ok_or_else(|| format!("url is required (or set {})", ENV_URL))?;

        let credentials = match pick(&self.token, ENV_TOKEN) {
            Some(token) => Credentials::Token(token),
            None => {
                let username = pick(&self.username, ENV_USERNAME);
                let password = pick(&self.password, ENV_PASSWORD);
                match (username, password) {
                    (Some(username), Some(password)) => Credentials::Password { username, password },
                    _ => {
                        return Err(
                            "Either token or username/password must be provided".to_string()
                        )
                    }
                }
            }
        };

        let insecure = match self.insecure {
            Some(v) => v,
            None => match lookup(ENV_INSECURE) {
                Some(raw) => parse_bool(&raw)
                    .ok_or_else(|| format!("{} must be a boolean, got '{}'", ENV_INSECURE, raw))?,
                None => false,
            },
        };

        let max_retries = match self.retries {
            Some(v) => v,
            None => parse_env_u32(&lookup, ENV_RETRIES)?.unwrap_or(DEFAULT_RETRIES),
        };

        let reqs_per_minute = match self.reqs_per_minute {
            Some(v) => v,
            None => parse_env_u32(&lookup, ENV_REQS_PER_MINUTE)?.unwrap_or(DEFAULT_REQS_PER_MINUTE),
        };

        let mut settings = ClientSettings::new(&url, credentials);
        settings.domain = pick(&self.domain, ENV_DOMAIN);
        settings.insecure = insecure;
        settings.max_retries = max_retries;
        settings.reqs_per_minute = reqs_per_minute;
        Ok(settings)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_env_u32<F>(lookup: &F, key: &str) -> Result<Option<u32>, String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("{} must be a non-negative integer, got '{}'", key, raw)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_config_takes_precedence() {
        let config = ProviderConfig {
            url: Some("https://fmc.example.com/".to_string()),
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let settings = config
            .resolve_with(env(&[(ENV_URL, "https://other"), (ENV_RETRIES, "9")]))
            .unwrap();

        assert_eq!(settings.url, "https://fmc.example.com");
        assert_eq!(settings.max_retries, 9);
        assert_eq!(settings.reqs_per_minute, DEFAULT_REQS_PER_MINUTE);
        assert!(matches!(settings.credentials, Credentials::Password { .. }));
    }

    #[test]
    fn test_env_fallback_with_token() {
        let settings = ProviderConfig::default()
            .resolve_with(env(&[
                (ENV_URL, "https://cdfmc"),
                (ENV_TOKEN, "tok"),
                (ENV_INSECURE, "true"),
                (ENV_DOMAIN, "Global/Child"),
            ]))
            .unwrap();

        assert_eq!(settings.credentials, Credentials::Token("tok".to_string()));
        assert!(settings.insecure);
        assert_eq!(settings.domain.as_deref(), Some("Global/Child"));
    }

    #[test]
    fn test_missing_values() {
        let err = ProviderConfig::default().resolve_with(env(&[])).unwrap_err();
        assert!(err.contains("url is required"));

        let err = ProviderConfig::default()
            .resolve_with(env(&[(ENV_URL, "https://fmc"), (ENV_USERNAME, "admin")]))
            .unwrap_err();
        assert!(err.contains("username/password"));
    }

    #[test]
    fn test_invalid_env_numbers() {
        let err = ProviderConfig::default()
            .resolve_with(env(&[
                (ENV_URL, "https://fmc"),
                (ENV_TOKEN, "t"),
                (ENV_REQS_PER_MINUTE, "fast"),
            ]))
            .unwrap_err();
        assert!(err.contains(ENV_REQS_PER_MINUTE));
    }
}
