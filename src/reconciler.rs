//! Reconciliation loop.
//!
//! Each cycle compares the current public IP with the address the provider
//! publishes for every configured name, and pushes an update on mismatch.
//! Per domain and per tick the steps are:
//!
//! ```text
//! RESOLVE_DOMAIN -> RESOLVE_RECORD -> COMPARE -> (UPDATE | SKIP)
//! ```
//!
//! Failures never escape a cycle: they become a [`CycleOutcome`] and a log
//! line, and the next tick starts over from `RESOLVE_DOMAIN`.

use crate::config::{Config, Schedule};
use crate::detector::IpSource;
use crate::error::Result;
use crate::providers::{DnsProvider, DomainInfo, RecordLookup, RecordTarget, RecordType};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// What the reconciler knows about one configured name.
///
/// IDs are rediscovered every cycle. `last_ip` survives between cycles but
/// only feeds log lines; the provider's record is always re-read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainState {
    pub name: String,
    pub domain_id: Option<String>,
    pub record_id: Option<String>,
    pub last_ip: Option<IpAddr>,
}

impl DomainState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain_id: None,
            record_id: None,
            last_ip: None,
        }
    }
}

/// Why a domain was left alone this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The public IP could not be determined.
    IpUnavailable,
    /// No provider zone matches the name.
    DomainNotFound,
    /// No record matches and creation is disabled.
    RecordNotFound,
    /// A provider lookup (or record creation) failed.
    Lookup(String),
}

/// Result of reconciling one domain for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Record already points at the current IP.
    Unchanged { ip: IpAddr },
    /// Record was updated.
    Updated { from: Option<IpAddr>, to: IpAddr },
    /// Record did not exist and was created.
    Created { ip: IpAddr },
    /// The update call failed or the provider rejected it.
    UpdateFailed { reason: String },
    Skipped(SkipReason),
}

impl CycleOutcome {
    /// Whether an update call reached the provider.
    pub fn attempted_update(&self) -> bool {
        matches!(
            self,
            CycleOutcome::Updated { .. } | CycleOutcome::UpdateFailed { .. }
        )
    }
}

/// Per-domain line of a cycle summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub domain: String,
    pub outcome: CycleOutcome,
    /// When the cycle that produced this report started.
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

/// Drives reconciliation cycles for every configured domain.
pub struct Reconciler {
    config: Arc<Config>,
    ip_source: Arc<dyn IpSource>,
    provider: Arc<dyn DnsProvider>,
}

impl Reconciler {
    pub fn new(
        config: Arc<Config>,
        ip_source: Arc<dyn IpSource>,
        provider: Arc<dyn DnsProvider>,
    ) -> Self {
        Self {
            config,
            ip_source,
            provider,
        }
    }

    /// Fresh state for every configured domain.
    pub fn initial_states(&self) -> Vec<DomainState> {
        self.config.domains().into_iter().map(DomainState::new).collect()
    }

    /// Reconcile a single domain against an already-resolved public IP.
    ///
    /// With `force`, the update is pushed even when the record already
    /// matches.
    pub async fn reconcile_domain(
        &self,
        state: &mut DomainState,
        current_ip: IpAddr,
        force: bool,
    ) -> CycleOutcome {
        state.domain_id = None;
        state.record_id = None;

        let domain = match self.provider.resolve_domain_id(&state.name).await {
            Ok(Some(domain)) => domain,
            Ok(None) => {
                warn!("failed to get domain id for {}, skipping", state.name);
                return CycleOutcome::Skipped(SkipReason::DomainNotFound);
            }
            Err(e) => {
                warn!("cannot get domain id for {}: {}", state.name, e);
                return CycleOutcome::Skipped(SkipReason::Lookup(e.to_string()));
            }
        };
        state.domain_id = Some(domain.id.clone());

        let record_type = RecordType::for_ip(&current_ip);
        let record = match self
            .provider
            .resolve_record(&domain, &state.name, record_type)
            .await
        {
            Ok(RecordLookup::Found(record)) => record,
            Ok(RecordLookup::Missing) if self.config.create_missing_records => {
                return self.create_record(state, &domain, current_ip).await;
            }
            Ok(RecordLookup::Missing) => {
                warn!(
                    "no {} record found for {}, skipping",
                    record_type.as_str(),
                    state.name
                );
                return CycleOutcome::Skipped(SkipReason::RecordNotFound);
            }
            Err(e) => {
                warn!("cannot get record for {}: {}", state.name, e);
                return CycleOutcome::Skipped(SkipReason::Lookup(e.to_string()));
            }
        };
        state.record_id = Some(record.id.clone());

        let record_ip = record.ip();
        if record_ip == Some(current_ip) && !force {
            info!("no need to update {} ({})", state.name, current_ip);
            state.last_ip = Some(current_ip);
            return CycleOutcome::Unchanged { ip: current_ip };
        }

        info!(
            "start update {} {} to {}",
            state.name, record.value, current_ip
        );
        if let Some(last) = state.last_ip {
            debug!("{} was last seen at {}", state.name, last);
        }

        let target = RecordTarget {
            domain_name: state.name.clone(),
            sub_domain: domain.host_label(&state.name).to_string(),
            domain_id: domain.id,
            record_id: record.id,
        };

        match self.provider.push_update(&target, current_ip).await {
            Ok(result) if result.success => {
                info!("success to update {} ip to {}", state.name, current_ip);
                state.last_ip = Some(current_ip);
                CycleOutcome::Updated {
                    from: record_ip,
                    to: current_ip,
                }
            }
            Ok(result) => {
                let reason = result.error.unwrap_or_else(|| "unknown error".to_string());
                warn!(
                    "failed to update {} ip to {}: {}",
                    state.name, current_ip, reason
                );
                CycleOutcome::UpdateFailed { reason }
            }
            Err(e) => {
                warn!(
                    "failed to update {} ip to {}: {}",
                    state.name, current_ip, e
                );
                CycleOutcome::UpdateFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn create_record(
        &self,
        state: &mut DomainState,
        domain: &DomainInfo,
        current_ip: IpAddr,
    ) -> CycleOutcome {
        match self
            .provider
            .create_record(domain, &state.name, current_ip)
            .await
        {
            Ok(record) => {
                info!("success to create record {} {}", state.name, current_ip);
                state.record_id = Some(record.id);
                state.last_ip = Some(current_ip);
                CycleOutcome::Created { ip: current_ip }
            }
            Err(e) => {
                warn!("cannot create record {}: {}", state.name, e);
                CycleOutcome::Skipped(SkipReason::Lookup(e.to_string()))
            }
        }
    }

    /// Run one cycle over `states`.
    ///
    /// The public IP is resolved once; if that fails no provider call is
    /// made and every domain reports [`SkipReason::IpUnavailable`].
    pub async fn run_cycle(&self, states: &mut [DomainState], force: bool) -> Vec<CycleReport> {
        let checked_at = chrono::Utc::now();
        let current_ip = match self.ip_source.current_ip().await {
            Ok(ip) => ip,
            Err(e) => {
                warn!("cannot get current ip, skipping this cycle: {}", e);
                return states
                    .iter()
                    .map(|s| CycleReport {
                        domain: s.name.clone(),
                        outcome: CycleOutcome::Skipped(SkipReason::IpUnavailable),
                        checked_at,
                    })
                    .collect();
            }
        };

        let mut reports = Vec::with_capacity(states.len());
        for state in states.iter_mut() {
            let outcome = self.reconcile_domain(state, current_ip, force).await;
            reports.push(CycleReport {
                domain: state.name.clone(),
                outcome,
                checked_at,
            });
        }
        reports
    }

    /// Run a single cycle over every configured domain.
    pub async fn run_once(&self, force: bool) -> Vec<CycleReport> {
        let mut states = self.initial_states();
        self.run_cycle(&mut states, force).await
    }

    /// Run until `shutdown` flips to `true`, using the configured schedule.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "starting ddns for {} domain(s), interval {}s, {:?} schedule",
            self.config.domains().len(),
            self.config.check_interval_secs,
            self.config.schedule
        );

        match self.config.schedule {
            Schedule::Shared => self.run_shared(shutdown).await,
            Schedule::PerDomain => self.run_per_domain(shutdown).await,
        }

        info!("ddns quit");
        Ok(())
    }

    async fn run_shared(&self, mut shutdown: watch::Receiver<bool>) {
        let mut states = self.initial_states();
        self.tick_loop(&mut states, &mut shutdown).await;
    }

    async fn run_per_domain(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();

        for state in self.initial_states() {
            let this = Arc::clone(&self);
            let mut shutdown = shutdown.clone();
            tasks.spawn(async move {
                let mut states = [state];
                this.tick_loop(&mut states, &mut shutdown).await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("domain task ended abnormally: {}", e);
            }
        }
    }

    async fn tick_loop(&self, states: &mut [DomainState], shutdown: &mut watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle(states, false).await;
                }
                _ = shutdown_requested(shutdown) => break,
            }
        }
    }
}

/// Resolves once shutdown is signalled; never, if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let sender_gone = shutdown.wait_for(|stop| *stop).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::MockIpSource;
    use crate::error::DdnsError;
    use crate::providers::{MockDnsProvider, RecordInfo, UpdateResult};
    use std::time::Duration;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn config(domains: &[&str], create_missing: bool) -> Arc<Config> {
        Arc::new(Config {
            login_email: "me@example.com".to_string(),
            login_password: "secret".to_string(),
            domain_names: domains.iter().map(|d| d.to_string()).collect(),
            create_missing_records: create_missing,
            ..Config::default()
        })
    }

    fn ip_source(addr: &'static str) -> MockIpSource {
        let mut source = MockIpSource::new();
        source.expect_current_ip().returning(move || Ok(ip(addr)));
        source
    }

    fn zone() -> DomainInfo {
        DomainInfo {
            id: "200".to_string(),
            name: "example.com".to_string(),
        }
    }

    fn record(value: &str) -> RecordInfo {
        RecordInfo {
            id: "7".to_string(),
            name: "home".to_string(),
            value: value.to_string(),
        }
    }

    fn reconciler(
        config: Arc<Config>,
        source: MockIpSource,
        provider: MockDnsProvider,
    ) -> Reconciler {
        Reconciler::new(config, Arc::new(source), Arc::new(provider))
    }

    #[tokio::test]
    async fn test_equal_ip_issues_no_update() {
        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .times(1)
            .returning(|_| Ok(Some(zone())));
        provider
            .expect_resolve_record()
            .times(1)
            .returning(|_, _, _| Ok(RecordLookup::Found(record("1.2.3.4"))));
        provider.expect_push_update().times(0);

        let r = reconciler(config(&["home.example.com"], true), ip_source("1.2.3.4"), provider);
        let reports = r.run_once(false).await;

        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].outcome,
            CycleOutcome::Unchanged { ip: ip("1.2.3.4") }
        );
    }

    #[tokio::test]
    async fn test_changed_ip_issues_exactly_one_update() {
        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .returning(|_| Ok(Some(zone())));
        provider
            .expect_resolve_record()
            .withf(|_, name: &str, record_type: &RecordType| {
                name == "home.example.com" && *record_type == RecordType::A
            })
            .returning(|_, _, _| Ok(RecordLookup::Found(record("1.2.3.4"))));
        provider
            .expect_push_update()
            .withf(|target: &RecordTarget, new_ip: &IpAddr| {
                target.domain_id == "200"
                    && target.record_id == "7"
                    && target.sub_domain == "home"
                    && target.domain_name == "home.example.com"
                    && *new_ip == "5.6.7.8".parse::<IpAddr>().unwrap()
            })
            .times(1)
            .returning(|t, new_ip| Ok(UpdateResult::succeeded("mock", &t.domain_name, new_ip)));

        let r = reconciler(config(&["home.example.com"], true), ip_source("5.6.7.8"), provider);
        let mut states = r.initial_states();
        let reports = r.run_cycle(&mut states, false).await;

        assert_eq!(
            reports[0].outcome,
            CycleOutcome::Updated {
                from: Some(ip("1.2.3.4")),
                to: ip("5.6.7.8"),
            }
        );
        assert_eq!(states[0].domain_id.as_deref(), Some("200"));
        assert_eq!(states[0].record_id.as_deref(), Some("7"));
        assert_eq!(states[0].last_ip, Some(ip("5.6.7.8")));
    }

    #[tokio::test]
    async fn test_ip_lookup_failure_skips_whole_cycle() {
        let mut source = MockIpSource::new();
        source
            .expect_current_ip()
            .times(1)
            .returning(|| Err(DdnsError::IpDetection("offline".to_string())));
        // No expectations: any provider call would panic.
        let provider = MockDnsProvider::new();

        let r = reconciler(
            config(&["home.example.com", "nas.example.com"], true),
            source,
            provider,
        );
        let reports = r.run_once(false).await;

        assert_eq!(reports.len(), 2);
        assert!(reports
            .iter()
            .all(|rep| rep.outcome == CycleOutcome::Skipped(SkipReason::IpUnavailable)));
        assert!(!reports.iter().any(|rep| rep.outcome.attempted_update()));
    }

    #[tokio::test]
    async fn test_missing_domain_skips_only_that_domain() {
        let mut provider = MockDnsProvider::new();
        provider.expect_resolve_domain_id().times(2).returning(|name| {
            if name.ends_with("example.org") {
                Ok(None)
            } else {
                Ok(Some(zone()))
            }
        });
        provider
            .expect_resolve_record()
            .times(1)
            .returning(|_, _, _| Ok(RecordLookup::Found(record("1.2.3.4"))));
        provider
            .expect_push_update()
            .times(1)
            .returning(|t, new_ip| Ok(UpdateResult::succeeded("mock", &t.domain_name, new_ip)));

        let r = reconciler(
            config(&["gone.example.org", "home.example.com"], true),
            ip_source("5.6.7.8"),
            provider,
        );
        let reports = r.run_once(false).await;

        assert_eq!(
            reports[0].outcome,
            CycleOutcome::Skipped(SkipReason::DomainNotFound)
        );
        assert!(matches!(reports[1].outcome, CycleOutcome::Updated { .. }));
    }

    #[tokio::test]
    async fn test_lookup_error_does_not_stop_other_domains() {
        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .returning(|_| Ok(Some(zone())));
        provider.expect_resolve_record().times(2).returning(|_, name, _| {
            if name.starts_with("broken") {
                Err(DdnsError::Network("connection reset".to_string()))
            } else {
                Ok(RecordLookup::Found(record("5.6.7.8")))
            }
        });

        let r = reconciler(
            config(&["broken.example.com", "home.example.com"], true),
            ip_source("5.6.7.8"),
            provider,
        );
        let reports = r.run_once(false).await;

        assert!(matches!(
            reports[0].outcome,
            CycleOutcome::Skipped(SkipReason::Lookup(_))
        ));
        assert_eq!(
            reports[1].outcome,
            CycleOutcome::Unchanged { ip: ip("5.6.7.8") }
        );
    }

    #[tokio::test]
    async fn test_missing_record_is_created_when_enabled() {
        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .returning(|_| Ok(Some(zone())));
        provider
            .expect_resolve_record()
            .returning(|_, _, _| Ok(RecordLookup::Missing));
        provider
            .expect_create_record()
            .times(1)
            .returning(|_, _, new_ip| {
                Ok(RecordInfo {
                    id: "99".to_string(),
                    name: "home".to_string(),
                    value: new_ip.to_string(),
                })
            });
        provider.expect_push_update().times(0);

        let r = reconciler(config(&["home.example.com"], true), ip_source("5.6.7.8"), provider);
        let mut states = r.initial_states();
        let reports = r.run_cycle(&mut states, false).await;

        assert_eq!(reports[0].outcome, CycleOutcome::Created { ip: ip("5.6.7.8") });
        assert_eq!(states[0].record_id.as_deref(), Some("99"));
    }

    #[tokio::test]
    async fn test_missing_record_is_skipped_when_creation_disabled() {
        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .returning(|_| Ok(Some(zone())));
        provider
            .expect_resolve_record()
            .returning(|_, _, _| Ok(RecordLookup::Missing));
        provider.expect_create_record().times(0);
        provider.expect_push_update().times(0);

        let r = reconciler(config(&["home.example.com"], false), ip_source("5.6.7.8"), provider);
        let reports = r.run_once(false).await;

        assert_eq!(
            reports[0].outcome,
            CycleOutcome::Skipped(SkipReason::RecordNotFound)
        );
    }

    #[tokio::test]
    async fn test_every_cycle_requeries_provider() {
        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .times(2)
            .returning(|_| Ok(Some(zone())));
        provider
            .expect_resolve_record()
            .times(2)
            .returning(|_, _, _| Ok(RecordLookup::Found(record("1.2.3.4"))));
        // The provider accepts the call but the record never changes;
        // the next cycle must notice and try again.
        provider
            .expect_push_update()
            .times(2)
            .returning(|t, new_ip| Ok(UpdateResult::succeeded("mock", &t.domain_name, new_ip)));

        let r = reconciler(config(&["home.example.com"], true), ip_source("5.6.7.8"), provider);
        let mut states = r.initial_states();

        for _ in 0..2 {
            let reports = r.run_cycle(&mut states, false).await;
            assert!(reports[0].outcome.attempted_update());
        }
    }

    #[tokio::test]
    async fn test_rejected_update_is_reported() {
        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .returning(|_| Ok(Some(zone())));
        provider
            .expect_resolve_record()
            .returning(|_, _, _| Ok(RecordLookup::Found(record("1.2.3.4"))));
        provider
            .expect_push_update()
            .times(1)
            .returning(|t, _| Ok(UpdateResult::failed("mock", &t.domain_name, "Record id invalid")));

        let r = reconciler(config(&["home.example.com"], true), ip_source("5.6.7.8"), provider);
        let mut states = r.initial_states();
        let reports = r.run_cycle(&mut states, false).await;

        assert_eq!(
            reports[0].outcome,
            CycleOutcome::UpdateFailed {
                reason: "Record id invalid".to_string()
            }
        );
        assert_eq!(states[0].last_ip, None);
    }

    #[tokio::test]
    async fn test_force_pushes_even_when_equal() {
        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .returning(|_| Ok(Some(zone())));
        provider
            .expect_resolve_record()
            .returning(|_, _, _| Ok(RecordLookup::Found(record("1.2.3.4"))));
        provider
            .expect_push_update()
            .times(1)
            .returning(|t, new_ip| Ok(UpdateResult::succeeded("mock", &t.domain_name, new_ip)));

        let r = reconciler(config(&["home.example.com"], true), ip_source("1.2.3.4"), provider);
        let reports = r.run_once(true).await;

        assert!(matches!(reports[0].outcome, CycleOutcome::Updated { .. }));
    }

    #[tokio::test]
    async fn test_nested_host_label_is_sent_on_update() {
        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .returning(|_| Ok(Some(zone())));
        provider
            .expect_resolve_record()
            .returning(|_, _, _| Ok(RecordLookup::Found(record("1.2.3.4"))));
        provider
            .expect_push_update()
            .withf(|target: &RecordTarget, _: &IpAddr| target.sub_domain == "a.b")
            .times(1)
            .returning(|t, new_ip| Ok(UpdateResult::succeeded("mock", &t.domain_name, new_ip)));

        let r = reconciler(config(&["a.b.example.com"], true), ip_source("5.6.7.8"), provider);
        let reports = r.run_once(false).await;

        assert!(matches!(reports[0].outcome, CycleOutcome::Updated { .. }));
    }

    #[tokio::test]
    async fn test_ipv6_looks_up_aaaa_record() {
        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .returning(|_| Ok(Some(zone())));
        provider
            .expect_resolve_record()
            .withf(|_, _, record_type: &RecordType| *record_type == RecordType::Aaaa)
            .times(1)
            .returning(|_, _, _| Ok(RecordLookup::Found(record("2001:db8::1"))));
        provider.expect_push_update().times(0);

        let r = reconciler(config(&["home.example.com"], true), ip_source("2001:db8::1"), provider);
        let reports = r.run_once(false).await;

        assert_eq!(
            reports[0].outcome,
            CycleOutcome::Unchanged { ip: ip("2001:db8::1") }
        );
    }

    #[tokio::test]
    async fn test_reports_share_cycle_timestamp() {
        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .returning(|_| Ok(Some(zone())));
        provider
            .expect_resolve_record()
            .returning(|_, _, _| Ok(RecordLookup::Found(record("1.2.3.4"))));

        let before = chrono::Utc::now();
        let r = reconciler(
            config(&["home.example.com", "nas.example.com"], true),
            ip_source("1.2.3.4"),
            provider,
        );
        let reports = r.run_once(false).await;

        assert_eq!(reports[0].checked_at, reports[1].checked_at);
        assert!(reports[0].checked_at >= before);
    }

    #[tokio::test]
    async fn test_shared_schedule_resolves_ip_once_per_tick() {
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();

        let mut source = MockIpSource::new();
        source
            .expect_current_ip()
            .times(1)
            .returning(|| Ok("1.2.3.4".parse().unwrap()));

        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .times(2)
            .returning(|_| Ok(Some(zone())));
        provider
            .expect_resolve_record()
            .times(2)
            .returning(move |_, name, _| {
                let _ = seen_tx.send(name.to_string());
                Ok(RecordLookup::Found(record("1.2.3.4")))
            });
        provider.expect_push_update().times(0);

        let mut cfg = (*config(&["home.example.com", "nas.example.com"], true)).clone();
        cfg.schedule = Schedule::Shared;
        cfg.check_interval_secs = 3600;

        let r = Arc::new(reconciler(Arc::new(cfg), source, provider));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&r).run(shutdown_rx));

        // One tick walks both domains in configured order.
        let mut seen = Vec::new();
        for _ in 0..2 {
            let name = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(name);
        }
        assert_eq!(seen, vec!["home.example.com", "nas.example.com"]);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_per_domain_tasks_stop_on_shutdown() {
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();

        let mut source = MockIpSource::new();
        source.expect_current_ip().times(2).returning(move || {
            let _ = seen_tx.send(());
            Ok("1.2.3.4".parse().unwrap())
        });

        let mut provider = MockDnsProvider::new();
        provider
            .expect_resolve_domain_id()
            .times(2)
            .returning(|_| Ok(Some(zone())));
        provider
            .expect_resolve_record()
            .times(2)
            .returning(|_, _, _| Ok(RecordLookup::Found(record("1.2.3.4"))));

        let mut cfg = (*config(&["home.example.com", "nas.example.com"], true)).clone();
        cfg.schedule = Schedule::PerDomain;
        cfg.check_interval_secs = 3600;

        let r = Arc::new(reconciler(Arc::new(cfg), source, provider));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&r).run(shutdown_rx));

        // First tick fires immediately for each domain task.
        for _ in 0..2 {
            tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
                .await
                .unwrap();
        }

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
