//! Connection settings.
//!
//! A profile is a small TOML file:
//!
//! ```toml
//! url = "https://fleet.example.com"
//! api_token = "..."
//! request_timeout_secs = 300
//! ```
//!
//! The CLI loads the profile first, then lets environment variables and flags
//! override individual fields.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::Credentials;
use crate::client::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, HttpSettings};
use crate::error::{FleetError, Result};

/// Everything needed to connect to one Fleet server.
#[derive(Clone, Deserialize)]
pub struct FleetConfig {
    /// Server base address, e.g. `https://fleet.example.com`.
    pub url: String,
    /// API token; preferred over email/password when both are set.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Login email for password authentication.
    #[serde(default)]
    pub email: Option<String>,
    /// Login password for password authentication.
    #[serde(default)]
    pub password: Option<String>,
    /// Overall request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

impl fmt::Debug for FleetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FleetConfig")
            .field("url", &self.url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

impl FleetConfig {
    /// Settings for `url` with default timeouts and no credentials.
    pub fn new(url: impl Into<String>) -> Self {
        FleetConfig {
            url: url.into(),
            api_token: None,
            email: None,
            password: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            accept_invalid_certs: false,
        }
    }

    /// Sets the API token.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Sets email/password credentials.
    pub fn with_password(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self.password = Some(password.into());
        self
    }

    /// Parses a TOML profile.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| FleetError::Config(format!("invalid profile: {e}")))
    }

    /// Reads and parses a TOML profile file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FleetError::Config(format!("cannot read profile {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Picks the credentials to use. An API token wins over email/password.
    pub fn credentials(&self) -> Result<Credentials> {
        if let Some(token) = self.api_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(Credentials::ApiToken(token.to_string()));
        }
        match (&self.email, &self.password) {
            (Some(email), Some(password)) => Ok(Credentials::Password {
                email: email.clone(),
                password: password.clone(),
            }),
            _ => Err(FleetError::Config(
                "no credentials configured: set an API token or both email and password"
                    .to_string(),
            )),
        }
    }

    /// Transport settings derived from the timeouts and TLS flag.
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }
}
