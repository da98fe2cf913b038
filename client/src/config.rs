//! YAML configuration for the `encwars` operator binary.

use commonware_codec::DecodeExt;
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    Signer,
};
use commonware_utils::{from_hex_formatted, hex};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::Level;
use url::Url;

pub const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

#[derive(Clone, PartialEq, Eq)]
pub struct HexBytes(Vec<u8>);

impl HexBytes {
    pub fn from_hex_formatted(value: &str) -> Option<Self> {
        from_hex_formatted(value).map(Self)
    }
}

impl AsRef<[u8]> for HexBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for HexBytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex(self.as_ref()))
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        let bytes = from_hex_formatted(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a hex string"))?;
        Ok(Self(bytes))
    }
}

#[derive(Deserialize, Serialize)]
pub struct Config {
    pub private_key: HexBytes,
    pub ledger_url: String,
    /// Oracle base URL (defaults to `ledger_url`).
    #[serde(default)]
    pub oracle_url: Option<String>,
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} is invalid: {value}")]
    InvalidDecode {
        field: &'static str,
        value: String,
        #[source]
        source: commonware_codec::Error,
    },
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: usize },
    #[error("{field} must be a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("{field} URL scheme must be http or https: {value}")]
    InvalidUrlScheme { field: &'static str, value: String },
}

pub struct ValidatedConfig {
    pub signer: PrivateKey,
    pub public_key: PublicKey,
    pub ledger_url: String,
    pub oracle_url: String,
    pub oracle_timeout: Duration,
    pub max_attempts: usize,
    pub log_level: Level,
}

fn default_oracle_timeout_ms() -> u64 {
    DEFAULT_ORACLE_TIMEOUT_MS
}

fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn redact_value(field: &'static str, value: String) -> String {
    match field {
        "private_key" => "<redacted>".to_string(),
        _ => value,
    }
}

fn decode_bytes<T: DecodeExt<()>>(field: &'static str, value: &HexBytes) -> Result<T, ConfigError> {
    T::decode(value.as_ref()).map_err(|source| ConfigError::InvalidDecode {
        field,
        value: redact_value(field, hex(value.as_ref())),
        source,
    })
}

fn ensure_nonzero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

fn validate_http_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => {}
        _ => {
            return Err(ConfigError::InvalidUrlScheme {
                field,
                value: value.to_string(),
            })
        }
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

struct RedactedConfig<'a>(&'a Config);

impl fmt::Debug for RedactedConfig<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cfg = self.0;
        f.debug_struct("Config")
            .field("private_key", &"<redacted>")
            .field("ledger_url", &cfg.ledger_url)
            .field("oracle_url", &cfg.oracle_url)
            .field("oracle_timeout_ms", &cfg.oracle_timeout_ms)
            .field("max_attempts", &cfg.max_attempts)
            .field("log_level", &cfg.log_level)
            .finish()
    }
}

impl fmt::Debug for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedConfig")
            .field("signer", &"<redacted>")
            .field("public_key", &self.public_key)
            .field("ledger_url", &self.ledger_url)
            .field("oracle_url", &self.oracle_url)
            .field("oracle_timeout", &self.oracle_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    pub fn redacted_debug(&self) -> impl fmt::Debug + '_ {
        RedactedConfig(self)
    }

    pub fn parse_signer(&self) -> Result<PrivateKey, ConfigError> {
        decode_bytes("private_key", &self.private_key)
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let signer = self.parse_signer()?;
        validate_http_url("ledger_url", &self.ledger_url)?;
        let oracle_url = self
            .oracle_url
            .unwrap_or_else(|| self.ledger_url.clone());
        validate_http_url("oracle_url", &oracle_url)?;
        ensure_nonzero("max_attempts", self.max_attempts)?;
        if self.oracle_timeout_ms == 0 {
            return Err(ConfigError::InvalidNonZero {
                field: "oracle_timeout_ms",
                value: 0,
            });
        }
        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;

        Ok(ValidatedConfig {
            public_key: signer.public_key(),
            signer,
            ledger_url: self.ledger_url,
            oracle_url,
            oracle_timeout: Duration::from_millis(self.oracle_timeout_ms),
            max_attempts: self.max_attempts,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::Encode;
    use encwars_execution::mocks::create_account_keypair;

    fn config_yaml(private_key: &str, extra: &str) -> String {
        format!("private_key: \"{private_key}\"\nledger_url: \"http://127.0.0.1:8080\"\n{extra}")
    }

    fn private_key_hex(seed: u64) -> String {
        let (private, _) = create_account_keypair(seed);
        hex(&private.encode())
    }

    #[test]
    fn test_defaults_apply() {
        let config: Config = serde_yaml::from_str(&config_yaml(&private_key_hex(1), "")).unwrap();
        let validated = config.validate().unwrap();
        assert_eq!(validated.public_key, create_account_keypair(1).1);
        assert_eq!(validated.oracle_url, "http://127.0.0.1:8080");
        assert_eq!(
            validated.oracle_timeout,
            Duration::from_millis(DEFAULT_ORACLE_TIMEOUT_MS)
        );
        assert_eq!(validated.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(validated.log_level, Level::INFO);
    }

    #[test]
    fn test_explicit_fields() {
        let yaml = config_yaml(
            &private_key_hex(2),
            "oracle_url: \"https://oracle.local\"\noracle_timeout_ms: 250\nmax_attempts: 5\nlog_level: debug\n",
        );
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        let validated = config.validate().unwrap();
        assert_eq!(validated.oracle_url, "https://oracle.local");
        assert_eq!(validated.oracle_timeout, Duration::from_millis(250));
        assert_eq!(validated.max_attempts, 5);
        assert_eq!(validated.log_level, Level::DEBUG);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config: Config = serde_yaml::from_str(&config_yaml("deadbeef", "")).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDecode {
                field: "private_key",
                ..
            }
        ));
        assert!(!err.to_string().contains("deadbeef"));

        let config: Config =
            serde_yaml::from_str(&config_yaml(&private_key_hex(1), "max_attempts: 0\n")).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNonZero {
                field: "max_attempts",
                ..
            })
        ));

        let config: Config = serde_yaml::from_str(&config_yaml(
            &private_key_hex(1),
            "oracle_url: \"ftp://oracle.local\"\n",
        ))
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrlScheme {
                field: "oracle_url",
                ..
            })
        ));

        let config: Config =
            serde_yaml::from_str(&config_yaml(&private_key_hex(1), "log_level: loud\n")).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel { .. })
        ));
    }

    #[test]
    fn test_redacted_debug_does_not_leak_secrets() {
        let key = private_key_hex(1);
        let config: Config = serde_yaml::from_str(&config_yaml(&key, "")).unwrap();
        let debug = format!("{:?}", config.redacted_debug());
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&key));
    }

    #[test]
    fn test_validated_debug_does_not_leak_signer() {
        let key = private_key_hex(3);
        let config: Config = serde_yaml::from_str(&config_yaml(&key, "")).unwrap();
        let validated = config.validate().unwrap();
        let debug = format!("{validated:?}");
        assert!(debug.contains("signer: \"<redacted>\""));
        assert!(!debug.contains(&key));
    }

    #[test]
    fn test_non_hex_private_key_fails_to_parse() {
        let result = serde_yaml::from_str::<Config>(&config_yaml("not-hex", ""));
        assert!(result.is_err());
    }
}
