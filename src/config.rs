//! TOML configuration.
//!
//! ```toml
//! default_connection = "local"
//!
//! [connections.local]
//! url = "http://localhost:8108"
//! api_key_env = "TYPESENSE_API_KEY"
//! connection_timeout_secs = 10
//!
//! [settings]
//! default_page_size = 25
//! search_debounce_ms = 500
//! cancel_superseded = true
//! ```
//!
//! API keys are never stored in the file; each connection names the
//! environment variable that holds its key.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Connection used when `--connection` is not given.
    #[serde(default)]
    pub default_connection: Option<String>,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "TYPESENSE_API_KEY".to_string()
}
fn default_connection_timeout_secs() -> u64 {
    10
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .with_context(|| format!("API key variable {} is not set", self.api_key_env))
    }
}

/// Operator settings injected into the search session.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
    /// Abort the task of a request as soon as a newer one is dispatched.
    #[serde(default = "default_cancel_superseded")]
    pub cancel_superseded: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            search_debounce_ms: default_search_debounce_ms(),
            cancel_superseded: default_cancel_superseded(),
        }
    }
}

fn default_page_size() -> u32 {
    25
}
fn default_search_debounce_ms() -> u64 {
    500
}
fn default_cancel_superseded() -> bool {
    true
}

impl Settings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

impl Config {
    /// The connection named `name`, or the default connection. A config
    /// with exactly one connection needs no default.
    pub fn connection(&self, name: Option<&str>) -> Result<(&str, &ConnectionConfig)> {
        let name = match name.or(self.default_connection.as_deref()) {
            Some(name) => name,
            None if self.connections.len() == 1 => self
                .connections
                .keys()
                .next()
                .map(String::as_str)
                .unwrap_or_default(),
            None => anyhow::bail!(
                "No connection selected: pass --connection or set default_connection"
            ),
        };
        let (key, conn) = self
            .connections
            .get_key_value(name)
            .with_context(|| format!("Unknown connection: '{}'", name))?;
        Ok((key.as_str(), conn))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.connections.is_empty() {
        anyhow::bail!("At least one [connections.<name>] table is required");
    }

    if let Some(default) = &config.default_connection {
        if !config.connections.contains_key(default) {
            anyhow::bail!("default_connection '{}' is not a configured connection", default);
        }
    }

    for (name, conn) in &config.connections {
        let url = conn.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!(
                "connections.{}.url must start with http:// or https://",
                name
            );
        }
        if conn.connection_timeout_secs == 0 {
            anyhow::bail!("connections.{}.connection_timeout_secs must be > 0", name);
        }
    }

    if config.settings.default_page_size == 0 {
        anyhow::bail!("settings.default_page_size must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn settings_default_when_omitted() {
        let file = write_config(
            r#"
[connections.local]
url = "http://localhost:8108"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.settings, Settings::default());
        assert_eq!(config.settings.default_page_size, 25);
        assert_eq!(config.settings.search_debounce_ms, 500);
        let (name, conn) = config.connection(None).unwrap();
        assert_eq!(name, "local");
        assert_eq!(conn.connection_timeout_secs, 10);
        assert_eq!(conn.api_key_env, "TYPESENSE_API_KEY");
    }

    #[test]
    fn explicit_settings_and_default_connection() {
        let file = write_config(
            r#"
default_connection = "prod"

[connections.local]
url = "http://localhost:8108"

[connections.prod]
url = "https://search.example.com"
api_key_env = "PROD_KEY"
connection_timeout_secs = 3

[settings]
default_page_size = 50
search_debounce_ms = 0
cancel_superseded = false
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.settings.default_page_size, 50);
        assert_eq!(config.settings.debounce(), Duration::ZERO);
        assert!(!config.settings.cancel_superseded);
        let (name, conn) = config.connection(None).unwrap();
        assert_eq!(name, "prod");
        assert_eq!(conn.timeout(), Duration::from_secs(3));
        assert_eq!(config.connection(Some("local")).unwrap().0, "local");
        assert!(config.connection(Some("staging")).is_err());
    }

    #[test]
    fn rejects_invalid_values() {
        let zero_page = write_config(
            r#"
[connections.local]
url = "http://localhost:8108"
[settings]
default_page_size = 0
"#,
        );
        assert!(load_config(zero_page.path()).is_err());

        let bad_url = write_config(
            r#"
[connections.local]
url = "localhost:8108"
"#,
        );
        assert!(load_config(bad_url.path()).is_err());

        let bad_default = write_config(
            r#"
default_connection = "missing"
[connections.local]
url = "http://localhost:8108"
"#,
        );
        assert!(load_config(bad_default.path()).is_err());

        let negative_debounce = write_config(
            r#"
[connections.local]
url = "http://localhost:8108"
[settings]
search_debounce_ms = -1
"#,
        );
        assert!(load_config(negative_debounce.path()).is_err());
    }

    #[test]
    fn ambiguous_connection_needs_default() {
        let file = write_config(
            r#"
[connections.a]
url = "http://a:8108"
[connections.b]
url = "http://b:8108"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert!(config.connection(None).is_err());
        assert_eq!(config.connection(Some("b")).unwrap().0, "b");
    }
}
