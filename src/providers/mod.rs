//! DNS provider implementations.

mod dnspod;

pub use dnspod::{name_matches, DnspodProvider};

use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;

/// A zone in the provider account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainInfo {
    /// Provider-assigned domain identifier.
    pub id: String,
    /// Zone name, e.g. "example.com".
    pub name: String,
}

impl DomainInfo {
    /// Host label of `domain_name` inside this zone.
    ///
    /// `a.b.example.com` in `example.com` is `a.b`; the zone apex is `@`.
    /// Names that do not end in the zone fall back to their first label.
    pub fn host_label<'a>(&self, domain_name: &'a str) -> &'a str {
        if domain_name == self.name {
            return "@";
        }

        domain_name
            .strip_suffix(self.name.as_str())
            .and_then(|host| host.strip_suffix('.'))
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| domain_name.split('.').next().unwrap_or(domain_name))
    }
}

/// Address record type matching an IP family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Aaaa,
}

impl RecordType {
    pub fn for_ip(ip: &IpAddr) -> Self {
        if ip.is_ipv4() {
            RecordType::A
        } else {
            RecordType::Aaaa
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

/// A DNS record as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    /// Provider-assigned record identifier.
    pub id: String,
    /// Record name (host label) as stored by the provider.
    pub name: String,
    /// Currently published value.
    pub value: String,
}

impl RecordInfo {
    /// The published value as an address, if it is one.
    pub fn ip(&self) -> Option<IpAddr> {
        self.value.trim().parse().ok()
    }
}

/// Outcome of looking up a record under a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLookup {
    Found(RecordInfo),
    /// The provider has no record matching the configured name.
    Missing,
}

/// Everything needed to address an update at one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTarget {
    pub domain_name: String,
    pub domain_id: String,
    /// Host label within the zone.
    pub sub_domain: String,
    pub record_id: String,
}

/// Result of a DNS update operation.
#[derive(Debug, Clone)]
pub struct UpdateResult {
    /// Provider name.
    pub provider: String,
    /// Domain/record that was updated.
    pub domain: String,
    /// Whether the update was successful.
    pub success: bool,
    /// New IP address.
    pub ip: Option<IpAddr>,
    /// Error message if failed.
    pub error: Option<String>,
}

impl UpdateResult {
    pub fn succeeded(provider: &str, domain: &str, ip: IpAddr) -> Self {
        Self {
            provider: provider.to_string(),
            domain: domain.to_string(),
            success: true,
            ip: Some(ip),
            error: None,
        }
    }

    pub fn failed(provider: &str, domain: &str, error: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            domain: domain.to_string(),
            success: false,
            ip: None,
            error: Some(error.into()),
        }
    }
}

/// Trait for DNS providers that need record discovery before an update.
///
/// Discovery runs domain name → zone → record ID; only then can
/// [`DnsProvider::push_update`] address the record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &'static str;

    /// Find the zone containing `domain_name`.
    async fn resolve_domain_id(&self, domain_name: &str) -> Result<Option<DomainInfo>>;

    /// Find the `record_type` record for `domain_name` under `domain`.
    async fn resolve_record(
        &self,
        domain: &DomainInfo,
        domain_name: &str,
        record_type: RecordType,
    ) -> Result<RecordLookup>;

    /// Create an address record for `domain_name` pointing at `ip`.
    async fn create_record(
        &self,
        domain: &DomainInfo,
        domain_name: &str,
        ip: IpAddr,
    ) -> Result<RecordInfo>;

    /// Point an existing record at `ip`.
    ///
    /// A provider-side rejection is `Ok` with `success == false`; `Err` means
    /// the call itself failed (transport or unreadable response).
    async fn push_update(&self, target: &RecordTarget, ip: IpAddr) -> Result<UpdateResult>;

    /// Validate provider credentials.
    async fn validate(&self) -> Result<()>;
}

/// Create the provider described by the configuration.
pub fn create_provider(config: &Config) -> Result<Arc<dyn DnsProvider>> {
    Ok(Arc::new(DnspodProvider::from_config(config)?))
}

/// Resolve environment variable references (values starting with $).
fn resolve_env(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| {
            tracing::warn!("Environment variable {} not set", var_name);
            value.to_string()
        })
    } else {
        value.to_string()
    }
}
