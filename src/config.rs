//! Configuration types for Chameleon

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use hyper::Uri;
use serde::{Deserialize, Serialize};

use crate::{ChameleonError, Result};

/// Operating mode, fixed for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Forward to the backend and persist every response
    Record,
    /// Serve persisted responses only, never contacting the backend
    Replay,
    /// Forward to the backend without persisting anything
    Passthrough,
}

impl FromStr for Mode {
    type Err = ChameleonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" => Ok(Self::Record),
            "replay" => Ok(Self::Replay),
            "passthrough" => Ok(Self::Passthrough),
            _ => Err(ChameleonError::ConfigError(format!(
                "invalid MODE: {s} (must be record, replay, or passthrough)"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Record => "record",
            Self::Replay => "replay",
            Self::Passthrough => "passthrough",
        })
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Operating mode
    #[serde(default = "default_mode")]
    pub mode: Mode,
    /// Backend origin every forwarded request goes to
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Port the proxy listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Directory holding one record file per fingerprint
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_mode() -> Mode {
    Mode::Record
}

fn default_backend_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_listen_port() -> u16 {
    3000
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./recordings")
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Maximum request size in bytes
    pub max_request_size: usize,
    /// Maximum response size captured for storage, in bytes
    pub max_response_size: usize,
    /// Maximum headers per request
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 4096,
            max_request_size: 16 * 1024 * 1024,   // 16 MB
            max_response_size: 256 * 1024 * 1024, // 256 MB
            max_headers: 128,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            backend_url: default_backend_url(),
            listen_port: default_listen_port(),
            storage_dir: default_storage_dir(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Command-line overrides, applied after file and environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--port`
    pub port: Option<u16>,
    /// `--backend`, scheme optional
    pub backend: Option<String>,
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChameleonError::ConfigError(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| ChameleonError::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Apply `MODE`, `BACKEND_URL`, `PORT` and `STORAGE_PATH` from a variable lookup
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(mode) = var("MODE") {
            self.mode = mode.parse()?;
        }

        if let Some(backend) = var("BACKEND_URL") {
            self.backend_url = backend;
        }

        if let Some(port) = var("PORT") {
            self.listen_port = port
                .parse()
                .map_err(|_| ChameleonError::ConfigError(format!("invalid PORT: {port}")))?;
        }

        if let Some(storage) = var("STORAGE_PATH") {
            self.storage_dir = PathBuf::from(storage);
        }

        Ok(())
    }

    /// Apply command-line overrides
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(port) = overrides.port {
            self.listen_port = port;
        }

        if let Some(backend) = overrides.backend.as_deref() {
            let backend = normalize_backend_url(backend);
            if !backend.is_empty() {
                self.backend_url = backend;
            }
        }
    }

    /// Build the effective configuration: defaults, then file, then
    /// process environment, then command-line overrides
    ///
    /// # Errors
    ///
    /// Returns error if any source is invalid or the result fails validation
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Parsed backend origin
    ///
    /// # Errors
    ///
    /// Returns error if the backend URL is not an absolute `http://` URI
    pub fn backend_uri(&self) -> Result<Uri> {
        let uri: Uri = self.backend_url.parse().map_err(|e| {
            ChameleonError::ConfigError(format!("invalid backend URL {}: {e}", self.backend_url))
        })?;

        match uri.scheme_str() {
            Some("http") => {}
            Some("https") => {
                return Err(ChameleonError::ConfigError(format!(
                    "https backends are not supported: {}",
                    self.backend_url
                )))
            }
            _ => {
                return Err(ChameleonError::ConfigError(format!(
                    "backend URL must start with http://: {}",
                    self.backend_url
                )))
            }
        }

        if uri.authority().is_none() {
            return Err(ChameleonError::ConfigError(format!(
                "backend URL has no host: {}",
                self.backend_url
            )));
        }

        Ok(uri)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.backend_url.is_empty() {
            return Err(ChameleonError::ConfigError(
                "BACKEND_URL cannot be empty".to_string(),
            ));
        }
        self.backend_uri()?;

        if self.listen_port == 0 {
            return Err(ChameleonError::ConfigError(
                "invalid PORT: 0 (must be between 1 and 65535)".to_string(),
            ));
        }

        if self.storage_dir.as_os_str().is_empty() {
            return Err(ChameleonError::ConfigError(
                "STORAGE_PATH cannot be empty".to_string(),
            ));
        }

        let limits = &self.limits;
        for (name, value) in [
            ("max_connections", limits.max_connections),
            ("max_request_size", limits.max_request_size),
            ("max_response_size", limits.max_response_size),
            ("max_headers", limits.max_headers),
        ] {
            if value == 0 {
                return Err(ChameleonError::ConfigError(format!("{name} must be > 0")));
            }
        }

        Ok(())
    }
}

/// Prefix `http://` when the backend has no scheme
pub fn normalize_backend_url(backend: &str) -> String {
    let backend = backend.trim();
    if backend.is_empty() || backend.starts_with("http://") || backend.starts_with("https://") {
        return backend.to_string();
    }

    format!("http://{backend}")
}
