use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Root configuration structure, deserialized from `.license-source/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub advisor: AdvisorConfig,
}

/// Connection settings for Microsoft Graph.
///
/// `tenant_id`, `client_id` and `client_secret` can also come from
/// `LICENSE_SOURCE_TENANT_ID`, `LICENSE_SOURCE_CLIENT_ID` and
/// `LICENSE_SOURCE_CLIENT_SECRET`; the environment wins over the file.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_login_endpoint")]
    pub login_endpoint: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_endpoint() -> String {
    "https://graph.microsoft.com".to_string()
}

fn default_login_endpoint() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_api_version() -> String {
    "v1.0".to_string()
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            tenant_id: None,
            client_id: None,
            client_secret: None,
            endpoint: default_endpoint(),
            login_endpoint: default_login_endpoint(),
            api_version: default_api_version(),
        }
    }
}

/// Where run logs and the cumulative skip file are written.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Relative paths are resolved against `log_dir`.
    #[serde(default = "default_skip_file")]
    pub skip_file: PathBuf,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_skip_file() -> PathBuf {
    PathBuf::from("LicenseSkips.csv")
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            log_dir: default_log_dir(),
            skip_file: default_skip_file(),
        }
    }
}

impl AuditConfig {
    pub fn skip_path(&self) -> PathBuf {
        if self.skip_file.is_absolute() {
            self.skip_file.clone()
        } else {
            self.log_dir.join(&self.skip_file)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorConfig {
    /// Plans whose loss is never acceptable. Matched exactly, case-sensitive.
    #[serde(default = "default_critical_services")]
    pub critical_services: BTreeSet<String>,
}

/// Core mail, collaboration and meeting plans.
pub const DEFAULT_CRITICAL_SERVICES: &[&str] = &[
    "EXCHANGE_S_ENTERPRISE",
    "EXCHANGE_S_STANDARD",
    "EXCHANGE_S_DESKLESS",
    "SHAREPOINTENTERPRISE",
    "SHAREPOINTSTANDARD",
    "SHAREPOINTDESKLESS",
    "SHAREPOINTWAC",
    "TEAMS1",
    "MCOSTANDARD",
    "MCOEV",
    "MCOMEETADV",
    "OFFICESUBSCRIPTION",
];

fn default_critical_services() -> BTreeSet<String> {
    DEFAULT_CRITICAL_SERVICES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        AdvisorConfig {
            critical_services: default_critical_services(),
        }
    }
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`: path passed via `--config`
/// 2. `./.license-source/config.toml`
/// 3. `~/.config/license-source/config.toml`
/// 4. Built-in [`Config::default`]
///
/// Credentials from the environment are applied on top of whichever was found.
pub fn load_config(config_override: Option<&Path>) -> Result<Config> {
    let mut config = read_config(config_override)?;
    apply_env(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn read_config(config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return parse_file(path);
    }

    let local_config = Path::new(".license-source").join("config.toml");
    if local_config.exists() {
        return parse_file(&local_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home
            .join(".config")
            .join("license-source")
            .join("config.toml");
        if home_config.exists() {
            return parse_file(&home_config);
        }
    }

    Ok(Config::default())
}

fn parse_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config {}", path.display()))
}

fn apply_env(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("LICENSE_SOURCE_TENANT_ID") {
        config.graph.tenant_id = Some(v);
    }
    if let Some(v) = var("LICENSE_SOURCE_CLIENT_ID") {
        config.graph.client_id = Some(v);
    }
    if let Some(v) = var("LICENSE_SOURCE_CLIENT_SECRET") {
        config.graph.client_secret = Some(v);
    }
}
