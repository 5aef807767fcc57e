//! Site and provisioner configuration.
//!
//! Values are loaded once by the binary and passed explicitly into the
//! components that need them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{normalize_domain, parse_domain_list};

pub const DEFAULT_INDEX_DOCUMENT: &str = "index.html";
pub const DEFAULT_ERROR_DOCUMENT: &str = "error.html";

pub const DEFAULT_RECORD_TTL_SECS: u32 = 60;
pub const DEFAULT_OPTIONS_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_OPTIONS_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_VALIDATION_TIMEOUT_SECS: u64 = 45 * 60;
pub const DEFAULT_VALIDATION_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

pub const VALIDATION_TIMEOUT_ENV: &str = "STATICSITE_VALIDATION_TIMEOUT_SECS";
pub const POLL_INTERVAL_ENV: &str = "STATICSITE_POLL_INTERVAL_SECS";
pub const HTTP_TIMEOUT_ENV: &str = "STATICSITE_HTTP_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn canonical_domain(raw: &str) -> String {
    normalize_domain(raw).unwrap_or_else(|_| raw.trim().to_string())
}

/// Settings for one static website stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    /// Directory whose contents are synced into the bucket.
    pub dir_path: PathBuf,
    /// Hosted zone that serves every site domain.
    pub dns_zone_id: String,
    pub domain_name: String,
    /// Comma-separated alternate domain names.
    #[serde(default)]
    pub alt_domain_names: Option<String>,
    #[serde(default = "default_index_document")]
    pub index_document: String,
    #[serde(default = "default_error_document")]
    pub error_document: String,
}

fn default_index_document() -> String {
    DEFAULT_INDEX_DOCUMENT.to_string()
}

fn default_error_document() -> String {
    DEFAULT_ERROR_DOCUMENT.to_string()
}

impl SiteConfig {
    pub fn new(
        dir_path: impl Into<PathBuf>,
        dns_zone_id: impl Into<String>,
        domain_name: impl Into<String>,
    ) -> Self {
        Self {
            dir_path: dir_path.into(),
            dns_zone_id: dns_zone_id.into(),
            domain_name: domain_name.into(),
            alt_domain_names: None,
            index_document: default_index_document(),
            error_document: default_error_document(),
        }
    }

    pub fn with_alt_domain_names(mut self, raw: impl Into<String>) -> Self {
        self.alt_domain_names = Some(raw.into());
        self
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SiteConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing("dirPath"));
        }
        if self.dns_zone_id.trim().is_empty() {
            return Err(ConfigError::Missing("dnsZoneId"));
        }
        if self.domain_name.trim().is_empty() {
            return Err(ConfigError::Missing("domainName"));
        }
        normalize_domain(&self.domain_name).map_err(|err| ConfigError::Invalid {
            key: "domainName",
            reason: err.to_string(),
        })?;
        for alt in self.alt_domains() {
            normalize_domain(&alt).map_err(|err| ConfigError::Invalid {
                key: "altDomainNames",
                reason: err.to_string(),
            })?;
        }
        for (key, document) in [
            ("indexDocument", &self.index_document),
            ("errorDocument", &self.error_document),
        ] {
            let name = document.trim();
            if name.is_empty() || name.starts_with('/') {
                return Err(ConfigError::Invalid {
                    key,
                    reason: format!("expected a bare object name, got {document:?}"),
                });
            }
        }
        Ok(())
    }

    pub fn alt_domains(&self) -> Vec<String> {
        self.alt_domain_names
            .as_deref()
            .map(parse_domain_list)
            .unwrap_or_default()
    }

    /// Normalised primary domain; falls back to the trimmed input when it
    /// does not normalise (`validate` reports that case).
    pub fn primary_domain(&self) -> String {
        canonical_domain(&self.domain_name)
    }

    /// Every hostname the site answers on, normalised and deduplicated,
    /// primary first.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = Vec::new();
        let alternates = self.alt_domains().into_iter().map(|alt| canonical_domain(&alt));
        for alias in std::iter::once(self.primary_domain()).chain(alternates) {
            if !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }
        aliases
    }
}

/// Timing and record settings for certificate provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionerSettings {
    pub record_ttl: u32,
    pub options_timeout: Duration,
    pub options_interval: Duration,
    pub validation_timeout: Duration,
    pub validation_interval: Duration,
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self {
            record_ttl: DEFAULT_RECORD_TTL_SECS,
            options_timeout: Duration::from_secs(DEFAULT_OPTIONS_TIMEOUT_SECS),
            options_interval: Duration::from_secs(DEFAULT_OPTIONS_INTERVAL_SECS),
            validation_timeout: Duration::from_secs(DEFAULT_VALIDATION_TIMEOUT_SECS),
            validation_interval: Duration::from_secs(DEFAULT_VALIDATION_INTERVAL_SECS),
        }
    }
}

impl ProvisionerSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup, falling back to defaults
    /// for missing, unparsable or zero values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let poll_interval = parse_secs(&lookup, POLL_INTERVAL_ENV);
        Self {
            validation_timeout: parse_secs(&lookup, VALIDATION_TIMEOUT_ENV)
                .unwrap_or(defaults.validation_timeout),
            validation_interval: poll_interval.unwrap_or(defaults.validation_interval),
            options_interval: poll_interval.unwrap_or(defaults.options_interval),
            ..defaults
        }
    }
}

/// Timeout for DNS-over-HTTPS requests.
pub fn http_timeout(lookup: impl Fn(&str) -> Option<String>) -> Duration {
    lookup_secs(&lookup, HTTP_TIMEOUT_ENV, DEFAULT_HTTP_TIMEOUT_SECS)
}

fn lookup_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Duration {
    parse_secs(lookup, key).unwrap_or(Duration::from_secs(default))
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            warn!("[config] invalid {key} value {raw:?}; using default");
            None
        }
        Ok(secs) => Some(Duration::from_secs(secs)),
    }
}
