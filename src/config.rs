// ⚙️ Configuration - environment driven
//
// AUTHORITY_URL unset means local-only mode: every score is computed here
// and no reconciliation task is started.

use crate::error::{Result, TriageError};
use std::time::Duration;

pub const DEFAULT_AUTHORITY_TIMEOUT_SECS: u64 = 12;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, PartialEq)]
pub struct TriageConfig {
    /// Base URL of the external prioritization authority
    pub authority_url: Option<String>,
    /// Per-call timeout for the authority (1..=60 seconds)
    pub authority_timeout: Duration,
    /// Interval between full-queue refreshes from the authority
    pub refresh_interval: Duration,
    pub host: String,
    pub port: u16,
}

impl Default for TriageConfig {
    fn default() -> Self {
        TriageConfig {
            authority_url: None,
            authority_timeout: Duration::from_secs(DEFAULT_AUTHORITY_TIMEOUT_SECS),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl TriageConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup (used by tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = TriageConfig::default();

        let authority_url = lookup("AUTHORITY_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let timeout_secs = parse_or(&lookup, "AUTHORITY_TIMEOUT_SECS", DEFAULT_AUTHORITY_TIMEOUT_SECS)?
            .clamp(1, 60);

        let refresh_secs = parse_or(&lookup, "REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECS)?;
        if refresh_secs == 0 {
            return Err(TriageError::Config(
                "REFRESH_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;

        Ok(TriageConfig {
            authority_url,
            authority_timeout: Duration::from_secs(timeout_secs),
            refresh_interval: Duration::from_secs(refresh_secs),
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| TriageError::Config(format!("{} is not a valid number: {:?}", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_empty() {
        let config = TriageConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, TriageConfig::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_reads_authority_settings() {
        let config = TriageConfig::from_lookup(lookup_from(&[
            ("AUTHORITY_URL", "https://queue-assigner.example.com/"),
            ("AUTHORITY_TIMEOUT_SECS", "15"),
            ("REFRESH_INTERVAL_SECS", "60"),
            ("PORT", "8080"),
        ]))
        .unwrap();

        assert_eq!(
            config.authority_url.as_deref(),
            Some("https://queue-assigner.example.com")
        );
        assert_eq!(config.authority_timeout, Duration::from_secs(15));
        assert_eq!(config.refresh_interval, Duration::from_secs(60));
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_timeout_is_clamped() {
        let config =
            TriageConfig::from_lookup(lookup_from(&[("AUTHORITY_TIMEOUT_SECS", "600")])).unwrap();
        assert_eq!(config.authority_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_blank_authority_url_means_local_only() {
        let config = TriageConfig::from_lookup(lookup_from(&[("AUTHORITY_URL", "  ")])).unwrap();
        assert!(config.authority_url.is_none());
    }

    #[test]
    fn test_bad_numbers_are_config_errors() {
        let err = TriageConfig::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, TriageError::Config(_)));

        let err =
            TriageConfig::from_lookup(lookup_from(&[("REFRESH_INTERVAL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, TriageError::Config(_)));
    }
}
