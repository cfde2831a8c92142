//! Configuration file parser for ~/.config/editorial/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
//!
//! Credentials can also come from the environment (`EDITORIAL_URL`,
//! `EDITORIAL_ANON_KEY`, `EDITORIAL_ACCESS_TOKEN`); env vars take precedence
//! over config file values.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks `anon_key` and `access_token` to prevent secret
/// leakage in logs, error messages, and debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the publishing backend (e.g. "https://example.supabase.co").
    pub service_url: Option<String>,

    /// Anonymous public key sent with every request.
    /// Env var EDITORIAL_ANON_KEY takes precedence over config file.
    pub anon_key: Option<String>,

    /// Optional session access token; when absent the anonymous key doubles
    /// as the bearer credential.
    /// Env var EDITORIAL_ACCESS_TOKEN takes precedence over config file.
    pub access_token: Option<String>,

    /// Use the join-capable query path (server-embedded category and profile
    /// relations) instead of separate fetches. Requires backend support.
    pub relationship_queries: bool,

    /// How long a cached page window is served before a refetch is forced.
    pub page_cache_ttl_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: None,
            anon_key: None,
            access_token: None,
            relationship_queries: false,
            page_cache_ttl_seconds: 60,
        }
    }
}

/// Mask credentials in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("service_url", &self.service_url)
            .field("anon_key", &self.anon_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("relationship_queries", &self.relationship_queries)
            .field("page_cache_ttl_seconds", &self.page_cache_ttl_seconds)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to prevent memory exhaustion from a
        // maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {} // Size is within limits, proceed
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "service_url",
                "anon_key",
                "access_token",
                "relationship_queries",
                "page_cache_ttl_seconds",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Environment variables win over file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("EDITORIAL_URL") {
            if !url.is_empty() {
                self.service_url = Some(url);
            }
        }
        if let Ok(key) = std::env::var("EDITORIAL_ANON_KEY") {
            if !key.is_empty() {
                self.anon_key = Some(key);
            }
        }
        if let Ok(token) = std::env::var("EDITORIAL_ACCESS_TOKEN") {
            if !token.is_empty() {
                self.access_token = Some(token);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
