use std::time::Duration;

use crate::errors::ConfigError;
use crate::progress::{DEFAULT_PROGRESS_TARGET, ProgressEstimator};

const ENDPOINT_ENV: &str = "DRAFTFLOW_ENDPOINT";
const API_TOKEN_ENV: &str = "DRAFTFLOW_API_TOKEN";
const CONNECT_TIMEOUT_ENV: &str = "DRAFTFLOW_CONNECT_TIMEOUT_SECS";
const IDLE_TIMEOUT_ENV: &str = "DRAFTFLOW_IDLE_TIMEOUT_SECS";
const PROGRESS_TARGET_ENV: &str = "DRAFTFLOW_PROGRESS_TARGET";

/// Connection settings for the producer endpoint.
#[derive(Clone, Debug)]
pub struct ProducerConfig {
    /// Full URL of the streaming generation endpoint.
    pub endpoint: String,
    /// Optional bearer token.
    pub api_token: Option<String>,
    /// Timeout for establishing the connection. The stream itself has no
    /// overall deadline; see [`SessionOptions::idle_timeout`].
    pub connect_timeout: Duration,
}

impl ProducerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Builds a config from `DRAFTFLOW_ENDPOINT`, `DRAFTFLOW_API_TOKEN` and
    /// `DRAFTFLOW_CONNECT_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let endpoint = lookup(ENDPOINT_ENV).unwrap_or_default();
        if endpoint.trim().is_empty() {
            return Err(ConfigError::Missing(ENDPOINT_ENV));
        }
        let mut config = Self::new(endpoint.trim());
        if let Some(token) = lookup(API_TOKEN_ENV)
            && !token.trim().is_empty()
        {
            config.api_token = Some(token.trim().to_string());
        }
        if let Some(secs) = parse_number::<u64>(CONNECT_TIMEOUT_ENV, &lookup)? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::Missing(ENDPOINT_ENV));
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: ENDPOINT_ENV,
                message: format!("expected an http(s) URL, got {endpoint:?}"),
            });
        }
        Ok(())
    }
}

/// Per-session behaviour knobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Fail the session when no bytes arrive for this long. `None` waits
    /// forever.
    pub idle_timeout: Option<Duration>,
    /// Assumed final document length used by the progress estimate.
    pub progress_target: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            progress_target: DEFAULT_PROGRESS_TARGET,
        }
    }
}

impl SessionOptions {
    /// Reads `DRAFTFLOW_IDLE_TIMEOUT_SECS` and `DRAFTFLOW_PROGRESS_TARGET`,
    /// falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        if let Some(secs) = parse_number::<u64>(IDLE_TIMEOUT_ENV, &lookup)? {
            options.idle_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(target) = parse_number::<usize>(PROGRESS_TARGET_ENV, &lookup)? {
            if target == 0 {
                return Err(ConfigError::Invalid {
                    key: PROGRESS_TARGET_ENV,
                    message: "must be greater than 0".into(),
                });
            }
            options.progress_target = target;
        }
        Ok(options)
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn progress_target(mut self, target: usize) -> Self {
        self.progress_target = target;
        self
    }

    pub(crate) fn estimator(&self) -> ProgressEstimator {
        ProgressEstimator::new(self.progress_target)
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Unset and blank values read as `None`.
fn parse_number<T>(
    key: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                message: e.to_string(),
            }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn session_options_read_timeout_and_target() {
        let options = SessionOptions::from_lookup(vars(&[
            (IDLE_TIMEOUT_ENV, " 45 "),
            (PROGRESS_TARGET_ENV, "1200"),
        ]))
        .expect("valid");
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(45)));
        assert_eq!(options.progress_target, 1200);

        let options = SessionOptions::from_lookup(vars(&[(IDLE_TIMEOUT_ENV, "")])).expect("blank");
        assert_eq!(options, SessionOptions::default());
    }

    #[test]
    fn zero_progress_target_is_rejected() {
        assert!(matches!(
            SessionOptions::from_lookup(vars(&[(PROGRESS_TARGET_ENV, "0")])),
            Err(ConfigError::Invalid {
                key: PROGRESS_TARGET_ENV,
                ..
            })
        ));
    }

    #[test]
    fn malformed_numbers_name_their_variable() {
        assert!(matches!(
            SessionOptions::from_lookup(vars(&[(IDLE_TIMEOUT_ENV, "soon")])),
            Err(ConfigError::Invalid {
                key: IDLE_TIMEOUT_ENV,
                ..
            })
        ));
        assert!(matches!(
            ProducerConfig::from_lookup(vars(&[
                (ENDPOINT_ENV, "http://localhost:3000/generate"),
                (CONNECT_TIMEOUT_ENV, "-1"),
            ])),
            Err(ConfigError::Invalid {
                key: CONNECT_TIMEOUT_ENV,
                ..
            })
        ));
    }

    #[test]
    fn producer_from_lookup_trims_and_requires_endpoint() {
        let config = ProducerConfig::from_lookup(vars(&[
            (ENDPOINT_ENV, " https://example.test/generate "),
            (API_TOKEN_ENV, "  "),
            (CONNECT_TIMEOUT_ENV, "2"),
        ]))
        .expect("valid");
        assert_eq!(config.endpoint, "https://example.test/generate");
        assert_eq!(config.api_token, None);
        assert_eq!(config.connect_timeout, Duration::from_secs(2));

        assert!(matches!(
            ProducerConfig::from_lookup(vars(&[])),
            Err(ConfigError::Missing(ENDPOINT_ENV))
        ));
    }

    #[test]
    fn session_defaults_have_no_timeout() {
        let options = SessionOptions::default();
        assert_eq!(options.idle_timeout, None);
        assert_eq!(options.progress_target, DEFAULT_PROGRESS_TARGET);
    }

    #[test]
    fn producer_requires_http_url() {
        assert!(ProducerConfig::new("https://example.test/api/generate").validate().is_ok());
        assert!(matches!(
            ProducerConfig::new("  ").validate(),
            Err(ConfigError::Missing(_))
        ));
        assert!(matches!(
            ProducerConfig::new("ftp://example.test").validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn builders_override_fields() {
        let config = ProducerConfig::new("http://localhost:3000/generate")
            .api_token("secret")
            .connect_timeout(Duration::from_secs(3));
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));

        let options = SessionOptions::default()
            .idle_timeout(Duration::from_secs(30))
            .progress_target(100);
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(options.estimator().estimate(50), 50);
    }
}
