mod error;
pub use error::ConfigError;

pub mod env_utils;

use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const API_KEY: &str = "api-key";
const API_TOKEN: &str = "api-token";
const API_SECRET: &str = "api-secret";

/// Configuration handed to a plugin or to one of its sources.
///
/// A config targets a plugin and, optionally, a single source of that
/// plugin. Besides the well-known credential parameters it carries
/// arbitrary typed key-value pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    plugin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(default)]
    params: BTreeMap<String, Value>,
}

impl ProviderConfig {
    /// Creates a config targeting `plugin`.
    pub fn new(plugin: impl Into<String>) -> Self {
        Self { plugin: plugin.into(), source: None, params: BTreeMap::new() }
    }

    /// Narrows the config to a single source of the plugin, builder style.
    pub fn for_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Loads credentials for `plugin` from the environment.
    ///
    /// Reads `MEDLEY_<PLUGIN>_API_KEY`, `_API_TOKEN` and `_API_SECRET`
    /// (plugin id uppercased, dashes mapped to underscores). Parameters that
    /// are not set are simply absent from the config.
    pub fn from_env(plugin: &str) -> Self {
        let prefix = format!("MEDLEY_{}", plugin.to_uppercase().replace('-', "_"));
        let mut config = Self::new(plugin);
        if let Some(key) = env_utils::load_string_opt(&format!("{prefix}_API_KEY")) {
            config.set_api_key(key);
        }
        if let Some(token) = env_utils::load_string_opt(&format!("{prefix}_API_TOKEN")) {
            config.set_api_token(token);
        }
        if let Some(secret) = env_utils::load_string_opt(&format!("{prefix}_API_SECRET")) {
            config.set_api_secret(secret);
        }
        config
    }

    /// The plugin this config targets.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// The source this config targets, if narrowed to one.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Sets an arbitrary parameter.
    pub fn set(&mut self, param: impl Into<String>, value: impl Into<Value>) {
        self.params.insert(param.into(), value.into());
    }

    /// Sets an arbitrary parameter, builder style.
    pub fn with(mut self, param: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(param, value);
        self
    }

    /// The raw value of `param`.
    pub fn get(&self, param: &str) -> Option<&Value> {
        self.params.get(param)
    }

    /// The string value of `param`.
    pub fn get_string(&self, param: &str) -> Option<&str> {
        self.get(param).and_then(Value::as_str)
    }

    /// The integer value of `param`.
    pub fn get_int(&self, param: &str) -> Option<i64> {
        self.get(param).and_then(Value::as_int)
    }

    /// The float value of `param`.
    pub fn get_float(&self, param: &str) -> Option<f64> {
        self.get(param).and_then(Value::as_float)
    }

    /// The boolean value of `param`.
    pub fn get_boolean(&self, param: &str) -> Option<bool> {
        self.get(param).and_then(Value::as_bool)
    }

    /// The API key, if set.
    pub fn api_key(&self) -> Option<&str> {
        self.get_string(API_KEY)
    }

    /// Sets the API key.
    pub fn set_api_key(&mut self, key: impl Into<String>) {
        self.set(API_KEY, key.into());
    }

    /// The API token, if set.
    pub fn api_token(&self) -> Option<&str> {
        self.get_string(API_TOKEN)
    }

    /// Sets the API token.
    pub fn set_api_token(&mut self, token: impl Into<String>) {
        self.set(API_TOKEN, token.into());
    }

    /// The API secret, if set.
    pub fn api_secret(&self) -> Option<&str> {
        self.get_string(API_SECRET)
    }

    /// Sets the API secret.
    pub fn set_api_secret(&mut self, secret: impl Into<String>) {
        self.set(API_SECRET, secret.into());
    }
}
