//! DNSPod provider.
//!
//! Every call is a form-encoded POST carrying the account credentials; the
//! API keeps no session. Responses wrap a `status` object whose `code` is
//! `"1"` on success.

use super::{
    resolve_env, DnsProvider, DomainInfo, RecordInfo, RecordLookup, RecordTarget, RecordType,
    UpdateResult,
};
use crate::config::Config;
use crate::error::{DdnsError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::net::IpAddr;
use std::time::Duration;

const STATUS_OK: &str = "1";
const STATUS_NO_DOMAINS: &str = "9";
const STATUS_NO_RECORDS: &str = "10";

/// DNSPod provider.
pub struct DnspodProvider {
    client: reqwest::Client,
    login_email: String,
    login_password: String,
    record_line: String,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(deserialize_with = "string_or_number")]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: Status,
}

#[derive(Debug, Deserialize)]
struct DomainListResponse {
    status: Status,
    #[serde(default)]
    domains: Vec<Domain>,
}

#[derive(Debug, Deserialize)]
struct Domain {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecordListResponse {
    status: Status,
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
    #[serde(default, rename = "type")]
    record_type: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct RecordCreateResponse {
    status: Status,
    record: Option<CreatedRecord>,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
}

/// IDs come back as JSON strings from some endpoints and numbers from others.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

impl Status {
    fn ensure_ok(self) -> Result<()> {
        if self.code == STATUS_OK {
            Ok(())
        } else {
            Err(DdnsError::Api {
                code: self.code,
                message: self.message,
            })
        }
    }
}

/// Loose containment match between a configured FQDN and a provider-side name.
///
/// `home.example.com` matches a zone named `example.com` and a record named
/// `home`, but this also lets unrelated names that happen to be substrings
/// match. Empty names never match.
pub fn name_matches(domain_name: &str, candidate: &str) -> bool {
    !candidate.is_empty() && domain_name.contains(candidate)
}

impl DnspodProvider {
    /// Create a new DNSPod provider.
    pub fn new(
        login_email: String,
        login_password: String,
        record_line: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "dnspod-ddns/{} ({})",
                env!("CARGO_PKG_VERSION"),
                login_email
            ))
            .build()?;

        Ok(Self {
            client,
            login_email,
            login_password,
            record_line,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 0,
            retry_delay: Duration::ZERO,
        })
    }

    /// Create from configuration, resolving `$VAR` credentials.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            resolve_env(&config.login_email),
            resolve_env(&config.login_password),
            config.record_line.clone(),
            config.api_base_url.clone(),
            config.http.timeout(),
        )?
        .with_retries(config.http.max_retries, config.http.retry_delay()))
    }

    /// Retry transport failures up to `max_retries` extra times.
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// POST an API action, retrying only transport failures.
    async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        params: Vec<(&'static str, String)>,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, action);

        let mut form = vec![
            ("login_email", self.login_email.clone()),
            ("login_password", self.login_password.clone()),
            ("format", "json".to_string()),
        ];
        form.extend(params);

        let mut attempt = 0;
        loop {
            match self.post_form(&url, &form).await {
                Err(e) if e.is_transport() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "{} failed ({}), retry {}/{}",
                        action,
                        e,
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                result => return result,
            }
        }
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&'static str, String)],
    ) -> Result<T> {
        let response = self.client.post(url).form(form).send().await?;
        let status = response.status();

        if status.is_server_error() {
            return Err(DdnsError::Network(format!("HTTP {} from {}", status, url)));
        }
        if !status.is_success() {
            return Err(DdnsError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| DdnsError::Parse(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl DnsProvider for DnspodProvider {
    fn name(&self) -> &'static str {
        "dnspod"
    }

    async fn resolve_domain_id(&self, domain_name: &str) -> Result<Option<DomainInfo>> {
        let response: DomainListResponse = self.call("Domain.List", Vec::new()).await?;

        if response.status.code == STATUS_NO_DOMAINS {
            return Ok(None);
        }
        response.status.ensure_ok()?;

        Ok(response
            .domains
            .into_iter()
            .find(|d| name_matches(domain_name, &d.name))
            .map(|d| DomainInfo {
                id: d.id,
                name: d.name,
            }))
    }

    async fn resolve_record(
        &self,
        domain: &DomainInfo,
        domain_name: &str,
        record_type: RecordType,
    ) -> Result<RecordLookup> {
        let host = domain.host_label(domain_name);

        let response: RecordListResponse = self
            .call(
                "Record.List",
                vec![
                    ("domain_id", domain.id.clone()),
                    ("sub_domain", host.to_string()),
                    ("record_type", record_type.as_str().to_string()),
                ],
            )
            .await?;

        if response.status.code == STATUS_NO_RECORDS {
            return Ok(RecordLookup::Missing);
        }
        response.status.ensure_ok()?;

        // TXT/MX/CNAME records share the host label; only the address record may match.
        Ok(response
            .records
            .into_iter()
            .filter(|r| r.record_type.eq_ignore_ascii_case(record_type.as_str()))
            .find(|r| r.name == host || name_matches(domain_name, &r.name))
            .map(|r| {
                RecordLookup::Found(RecordInfo {
                    id: r.id,
                    name: r.name,
                    value: r.value,
                })
            })
            .unwrap_or(RecordLookup::Missing))
    }

    async fn create_record(
        &self,
        domain: &DomainInfo,
        domain_name: &str,
        ip: IpAddr,
    ) -> Result<RecordInfo> {
        let host = domain.host_label(domain_name);

        let response: RecordCreateResponse = self
            .call(
                "Record.Create",
                vec![
                    ("domain_id", domain.id.clone()),
                    ("sub_domain", host.to_string()),
                    ("record_type", RecordType::for_ip(&ip).as_str().to_string()),
                    ("record_line", self.record_line.clone()),
                    ("value", ip.to_string()),
                    ("mx", "10".to_string()),
                ],
            )
            .await?;
        response.status.ensure_ok()?;

        let record = response.record.ok_or_else(|| {
            DdnsError::Parse(format!("Record.Create for {} returned no record", domain_name))
        })?;

        Ok(RecordInfo {
            id: record.id,
            name: host.to_string(),
            value: ip.to_string(),
        })
    }

    async fn push_update(&self, target: &RecordTarget, ip: IpAddr) -> Result<UpdateResult> {
        let response: StatusResponse = self
            .call(
                "Record.Ddns",
                vec![
                    ("domain_id", target.domain_id.clone()),
                    ("record_id", target.record_id.clone()),
                    ("sub_domain", target.sub_domain.clone()),
                    ("record_line", self.record_line.clone()),
                    ("value", ip.to_string()),
                ],
            )
            .await?;

        match response.status.ensure_ok() {
            Ok(()) => Ok(UpdateResult::succeeded(self.name(), &target.domain_name, ip)),
            Err(e) => Ok(UpdateResult::failed(
                self.name(),
                &target.domain_name,
                e.to_string(),
            )),
        }
    }

    async fn validate(&self) -> Result<()> {
        if self.login_email.is_empty() || self.login_password.is_empty() {
            return Err(DdnsError::Config("credentials are empty".to_string()));
        }

        // An empty account still proves the credentials work.
        let response: StatusResponse = self.call("Domain.List", Vec::new()).await?;
        if response.status.code == STATUS_NO_DOMAINS {
            return Ok(());
        }
        response.status.ensure_ok()
    }
}
