//! Pipeline configuration.
//!
//! Read once at startup from a TOML file (every field optional), adjusted
//! by a couple of environment variables, validated, then shared read-only.
//!
//! ```toml
//! bind_address = "0.0.0.0:8000"
//! requests_per_minute = 100
//! max_content_length = 10485760
//! slow_request_threshold_secs = 1.0
//! public_path_prefixes = ["/", "/docs", "/health"]
//! cors_origins = ["http://localhost:3000"]
//! allowed_hosts = ["api.example.com", "*.example.com"]
//! permissive = false
//!
//! [log]
//! level = "info"
//! format = "json"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ValidationError};
use crate::telemetry::LogConfig;

const STRICT_CSP: &str = "default-src 'self'; \
    script-src 'self' 'unsafe-inline' https://cdn.jsdelivr.net; \
    style-src 'self' 'unsafe-inline' https://cdn.jsdelivr.net; \
    img-src 'self' data: https://fastapi.tiangolo.com https://cdn.jsdelivr.net; \
    font-src 'self' https://cdn.jsdelivr.net; \
    connect-src 'self'; \
    frame-ancestors 'none'; \
    base-uri 'self'; \
    form-action 'self'";

// Same as strict plus 'unsafe-eval', which interactive API docs need.
const PERMISSIVE_CSP: &str = "default-src 'self'; \
    script-src 'self' 'unsafe-inline' 'unsafe-eval' https://cdn.jsdelivr.net; \
    style-src 'self' 'unsafe-inline' https://cdn.jsdelivr.net; \
    img-src 'self' data: https://fastapi.tiangolo.com https://cdn.jsdelivr.net; \
    font-src 'self' https://cdn.jsdelivr.net; \
    connect-src 'self'; \
    frame-ancestors 'none'; \
    base-uri 'self'; \
    form-action 'self'";

/// Root configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Address the demo server binds to.
    pub bind_address: String,

    /// Admitted requests per client per trailing minute.
    pub requests_per_minute: u32,

    /// Largest declared `content-length` accepted, in bytes.
    pub max_content_length: u64,

    /// Requests slower than this are logged at warn level. Never rejected.
    pub slow_request_threshold_secs: f64,

    /// Paths starting with one of these skip the credential-presence check.
    /// The entry `"/"` matches the root path only.
    pub public_path_prefixes: Vec<String>,

    /// Browser origins allowed to make credentialed cross-origin requests.
    /// `"*"` allows any origin.
    pub cors_origins: Vec<String>,

    /// Accepted `host` header values, without port. `"*"` accepts any host;
    /// `"*.example.com"` accepts every subdomain of `example.com`.
    pub allowed_hosts: Vec<String>,

    /// Development mode: permissive CSP, fault messages in 500 bodies.
    pub permissive: bool,

    pub log: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_owned(),
            requests_per_minute: 100,
            max_content_length: 10 * 1024 * 1024,
            slow_request_threshold_secs: 1.0,
            public_path_prefixes: ["/", "/docs", "/redoc", "/openapi.json", "/static", "/templates", "/health"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            cors_origins: [
                "http://localhost",
                "http://localhost:3000",
                "http://localhost:8000",
                "http://127.0.0.1:8000",
                "http://127.0.0.1:3000",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            allowed_hosts: vec!["*".to_owned()],
            permissive: false,
            log: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates TOML text. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from the process environment:
    ///
    /// - `DEBUG=true` turns on permissive mode.
    /// - `RATE_LIMIT_REQUESTS_PER_MINUTE=<n>` replaces the rate limit.
    ///
    /// Call [`validate`](Self::validate) afterwards; a malformed number is
    /// reported there as a zero limit.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(debug) = var("DEBUG") {
            self.permissive = debug.eq_ignore_ascii_case("true");
        }
        if let Some(rpm) = var("RATE_LIMIT_REQUESTS_PER_MINUTE") {
            self.requests_per_minute = rpm.trim().parse().unwrap_or(0);
        }
        self
    }

    /// Checks value ranges. Reports every problem, not just the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.requests_per_minute == 0 {
            errors.push(ValidationError {
                field: "requests_per_minute",
                reason: "must be a positive integer".to_owned(),
            });
        }
        if self.max_content_length == 0 {
            errors.push(ValidationError {
                field: "max_content_length",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if !self.slow_request_threshold_secs.is_finite() || self.slow_request_threshold_secs < 0.0 {
            errors.push(ValidationError {
                field: "slow_request_threshold_secs",
                reason: format!("must be a non-negative number, got {}", self.slow_request_threshold_secs),
            });
        }
        for prefix in &self.public_path_prefixes {
            if !prefix.starts_with('/') {
                errors.push(ValidationError {
                    field: "public_path_prefixes",
                    reason: format!("`{prefix}` must start with `/`"),
                });
            }
        }

        for origin in &self.cors_origins {
            if origin != "*" && !origin.contains("://") {
                errors.push(ValidationError {
                    field: "cors_origins",
                    reason: format!("`{origin}` must be `*` or a scheme://host[:port] origin"),
                });
            }
        }
        if self.allowed_hosts.is_empty() {
            errors.push(ValidationError {
                field: "allowed_hosts",
                reason: "must list at least one host; use `*` to accept any".to_owned(),
            });
        }
        for host in &self.allowed_hosts {
            let wildcard = host.strip_prefix("*.").unwrap_or(host);
            if host != "*" && (wildcard.is_empty() || wildcard.contains('*')) {
                errors.push(ValidationError {
                    field: "allowed_hosts",
                    reason: format!("`{host}` may only use `*` alone or as a leading `*.`"),
                });
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(ConfigError::Invalid(errors)) }
    }

    /// The content-security-policy for the configured mode.
    pub fn content_security_policy(&self) -> &'static str {
        if self.permissive { PERMISSIVE_CSP } else { STRICT_CSP }
    }

    /// The fixed response header set, CSP included.
    pub fn security_headers(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("x-content-type-options", "nosniff"),
            ("x-frame-options", "DENY"),
            ("x-xss-protection", "1; mode=block"),
            ("strict-transport-security", "max-age=31536000; includeSubDomains"),
            ("referrer-policy", "strict-origin-when-cross-origin"),
            ("content-security-policy", self.content_security_policy()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.requests_per_minute, 100);
        assert_eq!(cfg.max_content_length, 10_485_760);
        assert!(!cfg.permissive);
        assert_eq!(cfg.allowed_hosts, ["*"]);
        assert_eq!(cfg.cors_origins.len(), 5);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = PipelineConfig::from_toml_str("requests_per_minute = 3\npermissive = true").unwrap();
        assert_eq!(cfg.requests_per_minute, 3);
        assert!(cfg.permissive);
        assert_eq!(cfg.slow_request_threshold_secs, 1.0);
    }

    #[test]
    fn validation_collects_every_error() {
        let err = PipelineConfig::from_toml_str(
            "requests_per_minute = 0\nslow_request_threshold_secs = -1.0\npublic_path_prefixes = [\"docs\"]",
        )
        .unwrap_err();

        match err {
            ConfigError::Invalid(errors) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
                assert_eq!(fields, ["requests_per_minute", "slow_request_threshold_secs", "public_path_prefixes"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn host_and_origin_patterns_are_checked() {
        let ok = PipelineConfig::from_toml_str(
            "allowed_hosts = [\"api.example.com\", \"*.example.com\"]\ncors_origins = [\"*\"]",
        );
        assert!(ok.is_ok());

        let err = PipelineConfig::from_toml_str(
            "allowed_hosts = [\"api.*.com\", \"*.\"]\ncors_origins = [\"localhost:3000\"]",
        )
        .unwrap_err();
        match err {
            ConfigError::Invalid(errors) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
                assert_eq!(fields, ["cors_origins", "allowed_hosts", "allowed_hosts"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let empty = PipelineConfig { allowed_hosts: Vec::new(), ..PipelineConfig::default() };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn negative_rate_limit_does_not_parse() {
        let err = PipelineConfig::from_toml_str("requests_per_minute = -5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = PipelineConfig::default().with_overrides(|key| match key {
            "DEBUG" => Some("True".to_owned()),
            "RATE_LIMIT_REQUESTS_PER_MINUTE" => Some(" 7 ".to_owned()),
            _ => None,
        });
        assert!(cfg.permissive);
        assert_eq!(cfg.requests_per_minute, 7);

        let cfg = PipelineConfig::default()
            .with_overrides(|key| (key == "RATE_LIMIT_REQUESTS_PER_MINUTE").then(|| "lots".to_owned()));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn csp_follows_mode() {
        let strict = PipelineConfig::default();
        let permissive = PipelineConfig { permissive: true, ..PipelineConfig::default() };

        assert!(!strict.content_security_policy().contains("unsafe-eval"));
        assert!(permissive.content_security_policy().contains("unsafe-eval"));
        assert_eq!(strict.security_headers().len(), 6);
    }
}
