//! Configuration management for dnspod-ddns.

use crate::error::{DdnsError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name looked up next to the executable and in the working directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Main configuration structure.
///
/// Field aliases accept the PascalCase keys used by older config files
/// (`DnspodEmail`, `DnspodPasswd`, `DomainNames`, `TargetDomain`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Account email (or environment variable name if prefixed with $).
    #[serde(alias = "DnspodEmail")]
    pub login_email: String,

    /// Account password (or environment variable name if prefixed with $).
    #[serde(alias = "DnspodPasswd")]
    pub login_password: String,

    /// Fully-qualified names to keep updated, e.g. "home.example.com".
    #[serde(default, alias = "DomainNames")]
    pub domain_names: Vec<String>,

    /// Single-domain form of `domain_names`.
    #[serde(default, alias = "TargetDomain", skip_serializing_if = "Option::is_none")]
    pub target_domain: Option<String>,

    /// Check interval in seconds (default: 30).
    #[serde(default = "default_interval")]
    pub check_interval_secs: u64,

    /// How reconciliation cycles are scheduled.
    #[serde(default)]
    pub schedule: Schedule,

    /// IP detection services, tried in order.
    #[serde(default = "default_ip_services")]
    pub ip_services: Vec<String>,

    /// Base URL of the DNSPod API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Record line sent with create/update calls.
    #[serde(default = "default_record_line")]
    pub record_line: String,

    /// Create the A/AAAA record when the provider reports none exists.
    #[serde(default = "default_true")]
    pub create_missing_records: bool,

    /// Outbound HTTP settings.
    #[serde(default)]
    pub http: HttpConfig,
}

/// Scheduling mode for reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// One timer; each tick walks every domain in order.
    #[default]
    Shared,
    /// One independent task and timer per domain.
    PerDomain,
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Extra attempts after a transport failure (0 = never retry).
    #[serde(default)]
    pub max_retries: u32,

    /// Delay between retry attempts in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_interval() -> u64 {
    30
}

fn default_ip_services() -> Vec<String> {
    vec![
        "http://agideo.com/ip".to_string(),
        "https://api.ipify.org".to_string(),
    ]
}

fn default_api_base_url() -> String {
    "https://dnsapi.cn".to_string()
}

fn default_record_line() -> String {
    "默认".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    10
}

fn default_retry_delay() -> u64 {
    2
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: 0,
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            login_email: String::new(),
            login_password: String::new(),
            domain_names: Vec::new(),
            target_domain: None,
            check_interval_secs: default_interval(),
            schedule: Schedule::default(),
            ip_services: default_ip_services(),
            api_base_url: default_api_base_url(),
            record_line: default_record_line(),
            create_missing_records: true,
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Candidate config locations, most specific first.
    pub fn candidate_paths() -> Vec<PathBuf> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_FILE_NAME)));

        [
            exe_dir,
            Some(PathBuf::from(CONFIG_FILE_NAME)),
            dirs::config_dir().map(|p| p.join("dnspod-ddns").join(CONFIG_FILE_NAME)),
            Some(PathBuf::from("/etc/dnspod-ddns").join(CONFIG_FILE_NAME)),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Get the default config file path: the first candidate that exists.
    pub fn default_path() -> PathBuf {
        Self::candidate_paths()
            .into_iter()
            .find(|p| p.exists())
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Load configuration from a specific path.
    ///
    /// A missing or unparseable file is an error; there is no usable default
    /// without credentials.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DdnsError::Config(format!(
                "{} not found",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            DdnsError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let config: Config = if is_toml(path) {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                DdnsError::Config(format!("failed to parse {}: {}", path.display(), e))
            })?
        };

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Generate example configuration.
    pub fn example() -> Self {
        Self {
            login_email: "you@example.com".to_string(),
            login_password: "$DNSPOD_PASSWORD".to_string(),
            domain_names: vec!["home.example.com".to_string()],
            ..Self::default()
        }
    }

    /// Every configured domain, `domain_names` first, without duplicates.
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = Vec::with_capacity(self.domain_names.len() + 1);
        let extra = self.target_domain.iter();

        for name in self.domain_names.iter().chain(extra) {
            let name = name.trim();
            if !name.is_empty() && !domains.iter().any(|d| d == name) {
                domains.push(name.to_string());
            }
        }
        domains
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Check that the configuration can drive a reconciliation loop.
    pub fn validate(&self) -> Result<()> {
        if self.login_email.trim().is_empty() {
            return Err(DdnsError::Config("login_email is empty".to_string()));
        }
        if self.login_password.trim().is_empty() {
            return Err(DdnsError::Config("login_password is empty".to_string()));
        }

        let domains = self.domains();
        if domains.is_empty() {
            return Err(DdnsError::Config("no domain names configured".to_string()));
        }
        // a single label cannot sit under any zone
        if let Some(bad) = domains.iter().find(|d| !d.contains('.')) {
            return Err(DdnsError::Config(format!(
                "{} is not a fully-qualified name",
                bad
            )));
        }

        if self.check_interval_secs == 0 {
            return Err(DdnsError::Config(
                "check_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.ip_services.is_empty() {
            return Err(DdnsError::Config("no ip_services configured".to_string()));
        }
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}
