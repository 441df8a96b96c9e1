//! Configuration loading and validation for the trust-gate service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any variable is missing or invalid.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated service configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP collector endpoint. Spans are exported only when set.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Endpoint override for the AWS clients.
    #[serde(default)]
    pub aws_endpoint_url: Option<String>,

    /// How often (seconds) to re-resolve the data key. Disabled when unset.
    #[serde(default)]
    pub key_refresh_interval_secs: Option<u64>,

    /// Base64 data key supplied directly.
    #[serde(default)]
    pub token_key: Option<String>,

    /// Key id recorded with every secret. Required with `TOKEN_KEY`; defaults
    /// to the secret id for the envelope source.
    #[serde(default)]
    pub token_key_id: Option<String>,

    /// Secrets Manager id of the wrapped data key.
    #[serde(default)]
    pub token_key_secret_id: Option<String>,

    /// KMS key that unwraps the data key.
    #[serde(default)]
    pub token_key_kms_key_id: Option<String>,
}

/// Where the data key comes from, as configured.
#[derive(Clone, PartialEq, Eq)]
pub enum KeySourceConfig {
    /// `TOKEN_KEY` + `TOKEN_KEY_ID`.
    Explicit { key_b64: String, key_id: String },
    /// `TOKEN_KEY_SECRET_ID` + `TOKEN_KEY_KMS_KEY_ID`.
    Envelope {
        secret_id: String,
        kms_key_id: String,
        key_id: String,
    },
}

impl std::fmt::Debug for KeySourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySourceConfig::Explicit { key_id, .. } => f
                .debug_struct("Explicit")
                .field("key_id", key_id)
                .finish_non_exhaustive(),
            KeySourceConfig::Envelope {
                secret_id,
                kms_key_id,
                key_id,
            } => f
                .debug_struct("Envelope")
                .field("secret_id", secret_id)
                .field("kms_key_id", kms_key_id)
                .field("key_id", key_id)
                .finish(),
        }
    }
}

fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the key source is
    /// not configured exactly once.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            anyhow::bail!("LISTEN_PORT must be > 0");
        }
        if self.key_refresh_interval_secs == Some(0) {
            anyhow::bail!("KEY_REFRESH_INTERVAL_SECS must be > 0");
        }
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            ensure_non_empty(endpoint, "OTEL_EXPORTER_OTLP_ENDPOINT")?;
        }
        self.key_source().map(|_| ())
    }

    /// The configured key source.
    ///
    /// # Errors
    ///
    /// Returns an error unless exactly one of the explicit and envelope paths
    /// is fully configured.
    pub fn key_source(&self) -> Result<KeySourceConfig> {
        let explicit = present(&self.token_key);
        let secret_id = present(&self.token_key_secret_id);
        let kms_key_id = present(&self.token_key_kms_key_id);
        let key_id = present(&self.token_key_id);

        match (explicit, secret_id, kms_key_id) {
            (Some(key_b64), None, None) => {
                let key_id = key_id.context("TOKEN_KEY_ID is required with TOKEN_KEY")?;
                Ok(KeySourceConfig::Explicit {
                    key_b64: key_b64.to_owned(),
                    key_id: key_id.to_owned(),
                })
            }
            (None, Some(secret_id), Some(kms_key_id)) => Ok(KeySourceConfig::Envelope {
                secret_id: secret_id.to_owned(),
                kms_key_id: kms_key_id.to_owned(),
                key_id: key_id.unwrap_or(secret_id).to_owned(),
            }),
            (None, Some(_), None) => {
                anyhow::bail!("TOKEN_KEY_KMS_KEY_ID is required with TOKEN_KEY_SECRET_ID")
            }
            (None, None, Some(_)) => {
                anyhow::bail!("TOKEN_KEY_SECRET_ID is required with TOKEN_KEY_KMS_KEY_ID")
            }
            (None, None, None) => anyhow::bail!(
                "no data key configured: set TOKEN_KEY or TOKEN_KEY_SECRET_ID + TOKEN_KEY_KMS_KEY_ID"
            ),
            (Some(_), _, _) => anyhow::bail!(
                "TOKEN_KEY and TOKEN_KEY_SECRET_ID/TOKEN_KEY_KMS_KEY_ID are mutually exclusive"
            ),
        }
    }

    /// Background key refresh interval, if enabled.
    pub fn key_refresh_interval(&self) -> Option<Duration> {
        self.key_refresh_interval_secs.map(Duration::from_secs)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("listen_port", &self.listen_port)
            .field("log_level", &self.log_level)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("aws_endpoint_url", &self.aws_endpoint_url)
            .field("key_refresh_interval_secs", &self.key_refresh_interval_secs)
            .field("token_key", &self.token_key.as_ref().map(|_| "[REDACTED]"))
            .field("token_key_id", &self.token_key_id)
            .field("token_key_secret_id", &self.token_key_secret_id)
            .field("token_key_kms_key_id", &self.token_key_kms_key_id)
            .finish()
    }
}

/// Blank values count as unset.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} must not be empty when set");
    }
    Ok(())
}
