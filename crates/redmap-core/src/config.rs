//! Handle configuration.
//!
//! A [`MapConfig`] is built from defaults, optionally a JSON document, and
//! finally `REDMAP_*` environment variables:
//!
//! ```json
//! { "host": "10.0.0.7", "port": 6380, "shared_name": "sessions", "scan_count": 100 }
//! ```
//!
//! Every field in the document is optional.

use std::path::Path;

use facet::Facet;

use crate::MapError;

/// Default prefix of the companion registry key of a shared map.
pub const DEFAULT_REGISTRY_PREFIX: &str = "clients-";

/// Default `COUNT` hint passed to each cursor scan.
pub const DEFAULT_SCAN_COUNT: usize = 10;

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// Configuration for constructing map handles and stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapConfig {
    /// Host of the remote store.
    pub host: String,
    /// Port of the remote store.
    pub port: u16,
    /// Name of the shared map; `None` means a private, randomly named map.
    pub shared_name: Option<String>,
    /// `COUNT` hint for cursor scans.
    pub scan_count: usize,
    /// Prefix of the companion registry key (`prefix + map key`).
    pub registry_prefix: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            shared_name: None,
            scan_count: DEFAULT_SCAN_COUNT,
            registry_prefix: DEFAULT_REGISTRY_PREFIX.to_string(),
        }
    }
}

/// On-disk shape of the configuration. Missing fields keep their defaults.
#[derive(Debug, Facet)]
struct ConfigFile {
    #[facet(default)]
    host: Option<String>,
    #[facet(default)]
    port: Option<u16>,
    #[facet(default)]
    shared_name: Option<String>,
    /// Same range as `REDMAP_SCAN_COUNT`.
    #[facet(default)]
    scan_count: Option<u32>,
    #[facet(default)]
    registry_prefix: Option<String>,
}

impl MapConfig {
    /// Configuration for a shared map with the given name.
    pub fn shared(name: impl Into<String>) -> Self {
        Self {
            shared_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Parse a JSON document on top of the defaults.
    pub fn from_json(json: &str) -> Result<Self, MapError> {
        let file: ConfigFile =
            facet_json::from_str(json).map_err(|e| MapError::Config(e.to_string()))?;

        let mut config = Self::default();
        if let Some(host) = file.host {
            config.host = host;
        }
        if let Some(port) = file.port {
            config.port = port;
        }
        if let Some(name) = file.shared_name {
            config.shared_name = Some(name);
        }
        if let Some(count) = file.scan_count {
            config.scan_count = count as usize;
        }
        if let Some(prefix) = file.registry_prefix {
            config.registry_prefix = prefix;
        }
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| MapError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Apply `REDMAP_HOST`, `REDMAP_PORT`, `REDMAP_SHARED_NAME` and
    /// `REDMAP_SCAN_COUNT` from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, MapError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, MapError> {
        if let Some(host) = lookup("REDMAP_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("REDMAP_PORT") {
            self.port = port
                .parse()
                .map_err(|_| MapError::Config(format!("REDMAP_PORT: not a port: {}", port)))?;
        }
        if let Some(name) = lookup("REDMAP_SHARED_NAME") {
            self.shared_name = (!name.is_empty()).then_some(name);
        }
        if let Some(count) = lookup("REDMAP_SCAN_COUNT") {
            let parsed: u32 = count.parse().map_err(|_| {
                MapError::Config(format!("REDMAP_SCAN_COUNT: not a 32-bit count: {}", count))
            })?;
            self.scan_count = parsed as usize;
        }
        self.validate()?;
        Ok(self)
    }

    /// Key of the companion registry for the given map key.
    pub fn registry_key(&self, map_key: &str) -> String {
        format!("{}{}", self.registry_prefix, map_key)
    }

    /// `redis://host:port/` connection URL.
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }

    fn validate(&self) -> Result<(), MapError> {
        if self.scan_count == 0 {
            return Err(MapError::Config("scan_count must be at least 1".into()));
        }
        if self.registry_prefix.is_empty() {
            return Err(MapError::Config("registry_prefix cannot be empty".into()));
        }
        if self.shared_name.as_deref() == Some("") {
            return Err(MapError::Config("shared_name cannot be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = MapConfig::from_json(r#"{ "port": 6380, "shared_name": "sessions" }"#)
            .expect("valid config");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6380);
        assert_eq!(config.shared_name.as_deref(), Some("sessions"));
        assert_eq!(config.scan_count, DEFAULT_SCAN_COUNT);
        assert_eq!(config.registry_key("sessions"), "clients-sessions");
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = MapConfig::from_json("{ port: ").unwrap_err();
        assert!(matches!(err, MapError::Config(_)));
    }

    #[test]
    fn zero_scan_count_is_rejected() {
        let err = MapConfig::from_json(r#"{ "scan_count": 0 }"#).unwrap_err();
        assert!(matches!(err, MapError::Config(_)));
    }

    #[test]
    fn overrides_replace_fields() {
        let vars: HashMap<&str, &str> = [
            ("REDMAP_HOST", "cache.internal"),
            ("REDMAP_PORT", "7000"),
            ("REDMAP_SHARED_NAME", "jobs"),
        ]
        .into_iter()
        .collect();

        let config = MapConfig::default()
            .with_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .expect("valid overrides");

        assert_eq!(config.url(), "redis://cache.internal:7000/");
        assert_eq!(config.shared_name.as_deref(), Some("jobs"));
    }

    #[test]
    fn bad_port_override_is_rejected() {
        let err = MapConfig::default()
            .with_overrides(|name| (name == "REDMAP_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, MapError::Config(_)));
    }

    #[test]
    fn scan_count_has_the_same_range_in_file_and_env() {
        let from_file = MapConfig::from_json(r#"{ "scan_count": 4294967295 }"#).unwrap();
        let from_env = MapConfig::default()
            .with_overrides(|name| (name == "REDMAP_SCAN_COUNT").then(|| "4294967295".to_string()))
            .unwrap();
        assert_eq!(from_file.scan_count, from_env.scan_count);

        let err = MapConfig::default()
            .with_overrides(|name| (name == "REDMAP_SCAN_COUNT").then(|| "4294967296".to_string()))
            .unwrap_err();
        assert!(matches!(err, MapError::Config(_)));
    }
}
