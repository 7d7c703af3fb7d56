use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use gate_auth::GateConfig;
use gate_directory::DirectoryConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Environment variables with this prefix override file settings,
/// e.g. `BARBERBOOK__SERVER__BIND_ADDR=0.0.0.0:8080`.
pub const ENV_PREFIX: &str = "BARBERBOOK__";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Log every gate decision through `LoggingMetrics`
    #[serde(default)]
    pub gate_metrics: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            gate_metrics: false,
        }
    }
}

fn default_level() -> String {
    "info".to_owned()
}

impl AppConfig {
    /// Layered sources: defaults -> YAML (if provided) -> env (`BARBERBOOK__*`)
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// # Errors
    ///
    /// Returns an error if a source cannot be read or a value has the wrong shape.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(&Self::figment(path))
    }

    /// # Errors
    ///
    /// Returns an error if the merged sources do not form a valid `AppConfig`.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        figment.extract().context("invalid configuration")
    }

    pub fn apply_cli_overrides(&mut self, port: Option<u16>) {
        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
        }
    }

    /// Effective configuration as pretty JSON (also valid YAML); secrets are omitted
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to render configuration")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use gate_auth::ProtectionKind;

    fn from_yaml(yaml: &str) -> Result<AppConfig> {
        let figment =
            Figment::from(Serialized::defaults(AppConfig::default())).merge(Yaml::string(yaml));
        AppConfig::from_figment(&figment)
    }

    #[test]
    fn defaults_without_sources() {
        let config = from_yaml("{}").unwrap();
        assert_eq!(config.server.bind_addr, default_bind_addr());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.gate, GateConfig::default());
        assert_eq!(config.directory.access_cookie, "sb-access-token");
    }

    #[test]
    fn yaml_replaces_rule_list() {
        let config = from_yaml(
            r"
gate:
  lookup_retries: 0
  rules:
    - pattern: /admin
      match: prefix
      protection: role_gated
      roles: [admin]
      redirect_to: /unauthorized
directory:
  url: https://db.example
  api_key: service-key
",
        )
        .unwrap();

        assert_eq!(config.gate.lookup_retries, 0);
        assert_eq!(config.gate.rules.len(), 1);
        assert_eq!(config.gate.rules[0].protection, ProtectionKind::RoleGated);
        assert_eq!(config.directory.url, "https://db.example");
    }

    #[test]
    fn port_override_keeps_host() {
        let mut config = AppConfig::default();
        config.apply_cli_overrides(Some(9090));
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9090");

        config.apply_cli_overrides(None);
        assert_eq!(config.server.bind_addr.port(), 9090);
    }

    #[test]
    fn printed_config_hides_api_key() {
        let config = from_yaml("directory:\n  api_key: super-secret\n").unwrap();
        let rendered = config.to_pretty().unwrap();
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("sb-refresh-token"));
    }

    #[test]
    fn malformed_value_is_rejected() {
        assert!(from_yaml("server:\n  bind_addr: not-an-address\n").is_err());
    }
}
