//! Solver configuration
//!
//! Runtime knobs for the solve loop and the solving-service client. All
//! sensitive values come from the environment; nothing here is logged
//! beyond non-secret fields.

use crate::error::{ConfigError, Result};
use std::env;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Environment variable holding the solving-service API key
pub const ENV_API_KEY: &str = "CAPTCHA_PILOT_API_KEY";
/// Environment variable overriding the solving-service base URL
pub const ENV_API_URL: &str = "CAPTCHA_PILOT_API_URL";

/// Configuration for a solver instance
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Solving-service API key, sent as a request parameter
    pub api_key: String,
    /// Solving-service base URL (default: https://api.sadcaptcha.com)
    pub api_base_url: String,
    /// Attempt budget per solve call (default: 3)
    pub max_attempts: u32,
    /// Wall-clock budget per attempt in milliseconds (default: 60000)
    pub attempt_timeout_ms: u64,
    /// How long the initial scan polls for a challenge to appear, in
    /// milliseconds (default: 15000; 0 = single scan)
    pub detect_window_ms: u64,
    /// Poll interval during the initial scan in milliseconds (default: 500)
    pub detect_interval_ms: u64,
    /// Pause between actuation and verification in milliseconds
    /// (default: 5000)
    pub settle_delay_ms: u64,
    /// Proxy URL forwarded unmodified to the HTTP client (None = direct)
    pub proxy: Option<String>,
    /// Extra headers forwarded unmodified to the HTTP client
    pub headers: Vec<(String, String)>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://api.sadcaptcha.com".to_string(),
            max_attempts: 3,
            attempt_timeout_ms: 60_000,
            detect_window_ms: 15_000,
            detect_interval_ms: 500,
            settle_delay_ms: 5_000,
            proxy: None,
            headers: Vec::new(),
        }
    }
}

impl SolverConfig {
    /// Create a new config builder
    pub fn builder() -> SolverConfigBuilder {
        SolverConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// `CAPTCHA_PILOT_API_KEY` is required; `CAPTCHA_PILOT_API_URL`
    /// optionally overrides the service base URL. Everything else keeps
    /// its default and can be adjusted through the builder.
    pub fn from_env() -> Result<Self> {
        let api_key =
            env::var(ENV_API_KEY).map_err(|_| ConfigError::MissingEnv(ENV_API_KEY.to_string()))?;

        let mut config = Self {
            api_key,
            ..Default::default()
        };

        if let Ok(base_url) = env::var(ENV_API_URL) {
            config.api_base_url = base_url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check field consistency. Called by `from_env` and at orchestrator
    /// construction.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey.into());
        }
        if self.api_key.len() < 16 {
            warn!("API key is shorter than expected for this service");
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts.into());
        }
        Url::parse(&self.api_base_url).map_err(|e| ConfigError::InvalidUrl {
            field: "api_base_url",
            message: e.to_string(),
        })?;
        if let Some(ref proxy) = self.proxy {
            Url::parse(proxy).map_err(|e| ConfigError::InvalidUrl {
                field: "proxy",
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Attempt budget as a `Duration`
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Initial-scan window as a `Duration`
    pub fn detect_window(&self) -> Duration {
        Duration::from_millis(self.detect_window_ms)
    }

    /// Initial-scan poll interval as a `Duration`
    pub fn detect_interval(&self) -> Duration {
        Duration::from_millis(self.detect_interval_ms)
    }

    /// Post-actuation settle pause as a `Duration`
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Builder for SolverConfig
#[derive(Default)]
pub struct SolverConfigBuilder {
    config: SolverConfig,
}

impl SolverConfigBuilder {
    /// Set the API key
    pub fn api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.config.api_key = key.into();
        self
    }

    /// Set the service base URL
    pub fn api_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    /// Set the attempt budget
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Set the per-attempt timeout
    pub fn attempt_timeout_ms(mut self, ms: u64) -> Self {
        self.config.attempt_timeout_ms = ms;
        self
    }

    /// Set the initial-scan window (0 = single scan)
    pub fn detect_window_ms(mut self, ms: u64) -> Self {
        self.config.detect_window_ms = ms;
        self
    }

    /// Set the initial-scan poll interval
    pub fn detect_interval_ms(mut self, ms: u64) -> Self {
        self.config.detect_interval_ms = ms;
        self
    }

    /// Set the post-actuation settle delay
    pub fn settle_delay_ms(mut self, ms: u64) -> Self {
        self.config.settle_delay_ms = ms;
        self
    }

    /// Route service calls through a proxy
    pub fn proxy<S: Into<String>>(mut self, proxy: S) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    /// Add a header forwarded to every service call
    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.config.headers.push((name.into(), value.into()));
        self
    }

    /// Build the config
    pub fn build(self) -> SolverConfig {
        self.config
    }
}
