use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::Duration;
use crate::types::{Config, LogFormat};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn load_config() -> Result<Config> {
    load_config_with_env(&SystemEnvironment)
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config> {
    let enable_web_ui = bool_var(env, "ENABLE_WEB_UI", false);
    let web_ui_port = port_var(env, "WEB_UI_PORT", 8080)?;

    let enable_auth = bool_var(env, "ENABLE_AUTH", true);
    let auth_username = env.get_var("AUTH_USERNAME").unwrap_or_else(|| "admin".to_string());
    let auth_password = env.get_var("AUTH_PASSWORD").unwrap_or_default();

    let enable_prometheus = bool_var(env, "ENABLE_PROMETHEUS", false);
    let prometheus_port = port_var(env, "PROMETHEUS_PORT", 9090)?;

    let log_level = env.get_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
    let log_format = match env.get_var("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Text,
    };

    let kubeconfig = env.get_var("KUBECONFIG").filter(|v| !v.trim().is_empty());

    let timeout_secs: u64 = env.get_var("DEFAULT_TIMEOUT")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    let standalone_mode = bool_var(env, "STANDALONE_MODE", false);

    Ok(Config {
        enable_web_ui,
        web_ui_port,
        enable_auth,
        auth_username,
        auth_password,
        enable_prometheus,
        prometheus_port,
        log_level,
        log_format,
        kubeconfig,
        default_timeout: Duration::from_secs(timeout_secs),
        standalone_mode,
    })
}

fn bool_var<E: EnvironmentProvider>(env: &E, key: &str, default: bool) -> bool {
    env.get_var(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}

fn port_var<E: EnvironmentProvider>(env: &E, key: &str, default: u16) -> Result<u16> {
    match env.get_var(key) {
        Some(v) => v.trim().parse().with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}
