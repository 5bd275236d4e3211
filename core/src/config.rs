//! Connection settings for a SuiteCRM instance.
//!
//! The client never reads configuration on its own; hosts resolve a `Config`
//! once (from the environment, or by deserializing whatever format they keep
//! settings in) and hand it to `SessionClient`.

use std::fmt;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_APPLICATION_NAME: &str = "SuiteRS";

#[derive(Clone, Deserialize)]
pub struct Config {
    /// Full URL of the REST entry point, e.g. `https://crm.example.org/service/v4_1/rest.php`.
    pub url: String,
    pub username: String,
    /// Plaintext; hashed before it goes on the wire.
    pub password: String,
    #[serde(default = "default_application_name")]
    pub application_name: String,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_application_name() -> String {
    DEFAULT_APPLICATION_NAME.to_string()
}

fn default_verify_tls() -> bool {
    true
}

impl Config {
    pub fn new(url: &str, username: &str, password: &str) -> Self {
        Self {
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            application_name: default_application_name(),
            verify_tls: true,
        }
    }

    pub fn with_application_name(mut self, name: &str) -> Self {
        self.application_name = name.to_string();
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Read `SUITECRM_URL`, `SUITECRM_USERNAME`, `SUITECRM_PASSWORD`,
    /// `SUITECRM_APPLICATION_NAME` and `SUITECRM_VERIFY_TLS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let verify_tls = match lookup("SUITECRM_VERIFY_TLS") {
            None => true,
            Some(value) => parse_flag(&value).ok_or(ConfigError::Invalid {
                name: "SUITECRM_VERIFY_TLS",
                value,
            })?,
        };

        Ok(Self {
            url: required("SUITECRM_URL")?,
            username: required("SUITECRM_USERNAME")?,
            password: required("SUITECRM_PASSWORD")?,
            application_name: lookup("SUITECRM_APPLICATION_NAME")
                .unwrap_or_else(default_application_name),
            verify_tls,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("application_name", &self.application_name)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}
