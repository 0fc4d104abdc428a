//! Configuration loading: a TOML file read from a path given on the command
//! line, deserialized with `serde` + `toml`. There's no secret material to
//! provision at startup, so this is just the read-and-parse half of a config
//! bootstrap, with no interactive first-run wizard.

use std::path::Path;

use gqiam_identity::JwtOptions;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("auth.mode is {mode:?} but auth.{expected} was not provided")]
    MissingAuthOptions { mode: String, expected: &'static str },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
    pub source_url: Url,
    pub manager_url: Url,
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache_options: CacheOptions,
    #[serde(default)]
    pub cors_options: CorsOptions,
}

fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    "/graphql".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Jwt,
    Header,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    pub mode: AuthMode,
    #[serde(default)]
    pub jwt_options: Option<JwtOptions>,
    #[serde(default)]
    pub header_options: Option<HeaderOptions>,
}

impl AuthConfig {
    pub fn into_identity_config(self) -> Result<gqiam_identity::IdentityConfig, ConfigError> {
        match self.mode {
            AuthMode::Header => {
                let options = self.header_options.ok_or(ConfigError::MissingAuthOptions {
                    mode: "header".to_string(),
                    expected: "headerOptions",
                })?;
                Ok(gqiam_identity::IdentityConfig::Header { header_name: options.name })
            }
            AuthMode::Jwt => {
                let options = self.jwt_options.ok_or(ConfigError::MissingAuthOptions {
                    mode: "jwt".to_string(),
                    expected: "jwtOptions",
                })?;
                Ok(gqiam_identity::IdentityConfig::Jwt(Box::new(options)))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderOptions {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOptions {
    #[serde(default = "default_expiration_minutes")]
    pub expiration: u64,
    #[serde(default = "default_purge_minutes")]
    pub purge: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { expiration: default_expiration_minutes(), purge: default_purge_minutes() }
    }
}

fn default_expiration_minutes() -> u64 {
    5
}

fn default_purge_minutes() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsOptions {
    #[serde(default)]
    pub allow_origins: Vec<String>,
    #[serde(default)]
    pub allow_methods: Vec<String>,
    #[serde(default)]
    pub allow_headers: Vec<String>,
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}
