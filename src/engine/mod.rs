//! The verification engine: pre-checks, probe sequencing and persistence.
//!
//! `verify` runs the pre-checks (cache, persisted files, syntax, black/white
//! lists), derives the provider, walks the provider's probe order until a
//! probe is definitive, merges the remaining signals into a verdict and
//! persists the result. All shared state lives behind this handle so tests
//! can run independent engines concurrently.

mod error;

pub use error::EngineError;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::address::EmailAddress;
use crate::cache::ResultCache;
use crate::dns::MxResolver;
use crate::limiter::RateLimiter;
use crate::probe::browser::{
    self, BrowserProbe, BrowserProbeOptions, ScreenshotPolicy,
};
use crate::probe::microsoft::{ApiProbeOptions, MicrosoftApiProbe};
use crate::probe::smtp::{SmtpProbe, SmtpProbeOptions};
use crate::probe::Probe;
use crate::settings::{Config, Settings};
use crate::store::{HistoryEntry, HistoryLog, ResultStore};
use crate::strategy::{self, ProbeKind, Provider, tables};
use crate::types::{Method, ProbeOutcome, Verdict, VerificationResult};

pub const REASON_INVALID_FORMAT: &str = "Invalid email format";
pub const REASON_BLACKLISTED: &str = "Domain is blacklisted";
pub const REASON_WHITELISTED: &str = "Domain in whitelist";
pub const REASON_NO_MAIL_SERVERS: &str = crate::probe::smtp::REASON_NO_MAIL_SERVERS;

/// Policy switches covering the deliberately configurable judgment calls.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Promote a Microsoft browser probe that saw no rejection to VALID.
    pub microsoft_accept_on_no_rejection: bool,
}

/// The probes the strategy sequences. Workers in isolated mode build their
/// own set; shared mode reuses the engine's.
pub struct ProbeSet {
    pub smtp: SmtpProbe,
    pub api: MicrosoftApiProbe,
    pub browser: BrowserProbe,
}

pub struct Engine {
    settings: Arc<Settings>,
    resolver: Arc<MxResolver>,
    limiter: Arc<RateLimiter>,
    cache: ResultCache,
    cache_file: Option<PathBuf>,
    store: ResultStore,
    history: HistoryLog,
    probes: RwLock<Arc<ProbeSet>>,
    policy: RwLock<Policy>,
}

impl Engine {
    /// Build an engine with the system DNS resolver.
    pub fn new(settings: Arc<Settings>) -> Result<Self, EngineError> {
        let resolver = MxResolver::system()?;
        Self::with_resolver(settings, resolver)
    }

    /// Build an engine around an explicit resolver (tests use a stub).
    pub fn with_resolver(
        settings: Arc<Settings>,
        resolver: MxResolver,
    ) -> Result<Self, EngineError> {
        let config = settings.config();
        let resolver = Arc::new(resolver);
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        ));

        let cache = ResultCache::new(config.max_cache_size);
        let cache_file = config.cache_file.as_ref().map(PathBuf::from);
        if let Some(path) = &cache_file {
            cache.load(path)?;
        }

        let store = ResultStore::open(&config.data_dir)?;
        let history = HistoryLog::open(&config.history_dir)?;
        let probes = build_probe_set(&config, &settings, &resolver, &limiter);
        let policy = Policy {
            microsoft_accept_on_no_rejection: config.microsoft_accept_on_no_rejection,
        };

        Ok(Self {
            settings,
            resolver,
            limiter,
            cache,
            cache_file,
            store,
            history,
            probes: RwLock::new(Arc::new(probes)),
            policy: RwLock::new(policy),
        })
    }

    /// Re-read the settings file and rebuild the probe set and policy.
    pub fn reload_settings(&self) -> Result<(), EngineError> {
        self.settings.reload()?;
        let config = self.settings.config();
        *self.probes.write() = Arc::new(build_probe_set(
            &config,
            &self.settings,
            &self.resolver,
            &self.limiter,
        ));
        self.policy.write().microsoft_accept_on_no_rejection =
            config.microsoft_accept_on_no_rejection;
        info!(target: "engine", "settings reloaded");
        Ok(())
    }

    /// A fresh probe set from the current settings, for isolated workers.
    pub fn isolated_probe_set(&self) -> ProbeSet {
        build_probe_set(
            &self.settings.config(),
            &self.settings,
            &self.resolver,
            &self.limiter,
        )
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Verify one address with the engine's shared probe set.
    pub fn verify(&self, address: &str, method: Method) -> Result<VerificationResult, EngineError> {
        let probes = self.probes.read().clone();
        self.verify_with(&probes, address, method)
    }

    /// Verify one address with an explicit probe set.
    pub fn verify_with(
        &self,
        probes: &ProbeSet,
        address: &str,
        method: Method,
    ) -> Result<VerificationResult, EngineError> {
        let address = address.trim();
        self.history.record(address, "Verification started");

        // Pre-check: in-memory cache.
        if let Some(hit) = self.cache.get(address) {
            debug!(target: "engine", address, "cache hit");
            return Ok(hit);
        }

        // Pre-check: already persisted in a category file.
        if let Some(verdict) = self.store.lookup(address) {
            self.history.record(
                address,
                format!("Email found in {verdict} list - using cached result"),
            );
            let result = VerificationResult::new(
                address,
                verdict,
                format!("Email found in {verdict} list"),
                "cached",
                "cached",
            );
            self.history.commit(address, verdict)?;
            return Ok(result);
        }

        // Pre-check: syntax.
        let parsed = match EmailAddress::parse(address) {
            Ok(parsed) => parsed,
            Err(_) => {
                self.history.record(address, REASON_INVALID_FORMAT);
                let result = VerificationResult::new(
                    address,
                    Verdict::Invalid,
                    REASON_INVALID_FORMAT,
                    "unknown",
                    method.as_str(),
                );
                return self.finalize(result);
            }
        };
        let domain = parsed.domain().to_string();

        // Pre-check: black/white lists.
        if self.settings.blacklisted_domains().contains(&domain) {
            self.history.record(address, REASON_BLACKLISTED);
            let result = VerificationResult::new(
                address,
                Verdict::Invalid,
                REASON_BLACKLISTED,
                domain,
                method.as_str(),
            );
            return self.finalize(result);
        }
        if self.settings.whitelisted_domains().contains(&domain) {
            self.history.record(address, REASON_WHITELISTED);
            let result = VerificationResult::new(
                address,
                Verdict::Valid,
                REASON_WHITELISTED,
                domain,
                method.as_str(),
            );
            return self.finalize(result);
        }

        // MX records decide whether the domain can receive mail at all.
        let mx_hosts = self.resolver.mx(&domain);
        if mx_hosts.is_empty() {
            self.history.record(address, REASON_NO_MAIL_SERVERS);
            let result = VerificationResult::new(
                address,
                Verdict::Invalid,
                REASON_NO_MAIL_SERVERS,
                "unknown",
                method.as_str(),
            );
            return self.finalize(result);
        }

        let provider = strategy::identify(&domain, &mx_hosts);
        self.history
            .record(address, format!("Provider identified: {provider}"));

        let (verdict, reason, probe_name, evidence) =
            self.run_probes(probes, &parsed, &provider, method);

        let mut result = VerificationResult::new(
            address,
            verdict,
            reason,
            provider.label(),
            probe_name,
        );
        for (index, item) in evidence.iter().enumerate() {
            result = result.with_detail(format!("evidence_{index}"), item);
        }
        self.finalize(result)
    }

    /// Walk the probe order, returning on the first definitive outcome and
    /// folding the rest into a risky/custom verdict.
    fn run_probes(
        &self,
        probes: &ProbeSet,
        address: &EmailAddress,
        provider: &Provider,
        method: Method,
    ) -> (Verdict, String, &'static str, Vec<String>) {
        let order: &[ProbeKind] = match method {
            Method::Auto => strategy::probe_order(provider),
            Method::Login => &[ProbeKind::Browser, ProbeKind::Smtp],
            Method::Smtp => &[ProbeKind::Smtp],
        };

        let mut fallback: Option<(ProbeOutcome, &'static str)> = None;
        let mut last_error: Option<String> = None;

        for kind in order {
            let (outcome, name) = match kind {
                ProbeKind::Api => {
                    if !provider.is_microsoft() || !probes.api.enabled() {
                        continue;
                    }
                    (self.api_step(probes, address, provider), "api")
                }
                ProbeKind::Browser => {
                    if provider.is_microsoft() {
                        (self.microsoft_browser_step(probes, address), "browser")
                    } else {
                        (probes.browser.check(address, provider), "browser")
                    }
                }
                ProbeKind::Smtp => (probes.smtp.check(address, provider), "smtp"),
            };

            self.history.record(
                address.as_str(),
                format!("{name} probe: {}", outcome.reason()),
            );

            match outcome {
                ProbeOutcome::DefinitiveValid { reason, evidence } => {
                    return (Verdict::Valid, reason, name, evidence);
                }
                ProbeOutcome::DefinitiveInvalid { reason, evidence } => {
                    return (Verdict::Invalid, reason, name, evidence);
                }
                undecided @ (ProbeOutcome::Ambiguous { .. } | ProbeOutcome::Custom { .. }) => {
                    fallback = Some((undecided, name));
                }
                ProbeOutcome::Error { reason } => {
                    last_error = Some(reason);
                }
            }
        }

        match fallback {
            Some((ProbeOutcome::Custom { reason, evidence }, name)) => {
                (Verdict::Custom, reason, name, evidence)
            }
            Some((ProbeOutcome::Ambiguous { reason, evidence }, name)) => {
                (Verdict::Risky, reason, name, evidence)
            }
            _ => {
                let reason = last_error
                    .map(|reason| format!("Email verification failed: {reason}"))
                    .unwrap_or_else(|| "No probe produced a signal".to_string());
                (Verdict::Risky, reason, "none", Vec::new())
            }
        }
    }

    /// Microsoft API step with the API-level catch-all pre-check.
    fn api_step(
        &self,
        probes: &ProbeSet,
        address: &EmailAddress,
        provider: &Provider,
    ) -> ProbeOutcome {
        if probes.api.is_api_catch_all(address) {
            self.history.record(
                address.as_str(),
                "Microsoft API catch-all domain detected - switching to browser",
            );
            return ProbeOutcome::ambiguous("Microsoft API catch-all domain");
        }
        probes.api.check(address, provider)
    }

    /// Microsoft browser step: walk the browser list, retry ambiguous/custom
    /// outcomes against `login.live.com`, and apply the acceptance policy.
    fn microsoft_browser_step(&self, probes: &ProbeSet, address: &EmailAddress) -> ProbeOutcome {
        let browsers = probes.browser.browsers().to_vec();
        let mut last = ProbeOutcome::error("no browser configured");

        for (index, browser_name) in browsers.iter().enumerate() {
            let outcome = probes.browser.check_once(
                address,
                &Provider::Microsoft,
                tables::MICROSOFT_LOGIN_URL,
                browser_name,
            );
            if outcome.is_definitive() {
                return outcome;
            }

            let retry_worthwhile = matches!(
                &outcome,
                ProbeOutcome::Ambiguous { .. } | ProbeOutcome::Custom { .. }
            );
            if !retry_worthwhile {
                last = outcome;
                continue;
            }

            self.history
                .record(address.as_str(), "Retrying against login.live.com");
            let next_browser = &browsers[(index + 1) % browsers.len()];
            let direct = probes.browser.check_once(
                address,
                &Provider::Microsoft,
                tables::MICROSOFT_FALLBACK_LOGIN_URL,
                next_browser,
            );
            if direct.is_definitive() {
                return direct;
            }

            if let ProbeOutcome::Ambiguous { reason, .. } = &direct {
                if reason == browser::REASON_NO_PROMPT
                    && self.policy.read().microsoft_accept_on_no_rejection
                {
                    self.history.record(
                        address.as_str(),
                        "Login verification: valid email - no rejection or error",
                    );
                    return ProbeOutcome::valid(browser::REASON_ACCEPTED_NO_REJECTION);
                }
            }
            last = direct;
        }
        last
    }

    /// Cache, persist and close out the history for a fresh result.
    fn finalize(&self, result: VerificationResult) -> Result<VerificationResult, EngineError> {
        self.history.record(
            &result.address,
            format!(
                "Verification result: {} ({})",
                result.verdict.as_str().to_uppercase(),
                result.reason
            ),
        );
        self.cache.insert(result.clone());
        self.store.append(&result)?;
        self.history.commit(&result.address, result.verdict)?;
        Ok(result)
    }

    /// Record a result produced outside the per-address pipeline (the bulk
    /// bounce probe): cached, persisted and history-committed the same way.
    pub fn record_result(&self, result: VerificationResult) -> Result<(), EngineError> {
        self.finalize(result).map(|_| ())
    }

    /// Persist the in-memory cache when a cache file is configured.
    pub fn persist_cache(&self) -> Result<(), EngineError> {
        if let Some(path) = &self.cache_file {
            self.cache.save(path)?;
        }
        Ok(())
    }

    pub fn results_summary(&self) -> BTreeMap<Verdict, usize> {
        self.store.summary()
    }

    pub fn history_for_address(&self, address: &str) -> Result<Vec<HistoryEntry>, EngineError> {
        Ok(self.history.for_address(address)?)
    }

    pub fn history_for_category(
        &self,
        verdict: Verdict,
    ) -> Result<BTreeMap<String, Vec<HistoryEntry>>, EngineError> {
        Ok(self.history.for_category(verdict)?)
    }
}

fn build_probe_set(
    config: &Config,
    settings: &Settings,
    resolver: &Arc<MxResolver>,
    limiter: &Arc<RateLimiter>,
) -> ProbeSet {
    let smtp = SmtpProbe::new(
        resolver.clone(),
        limiter.clone(),
        SmtpProbeOptions {
            mail_from: config.mail_from.clone(),
            helo_domain: config.helo_domain.clone(),
            timeout: Duration::from_secs(config.smtp_timeout_secs),
            catch_all_detection: config.catch_all_detection,
            strict_rcpt_refusal: config.strict_rcpt_refusal,
            ..SmtpProbeOptions::default()
        },
    );

    let api = MicrosoftApiProbe::new(
        limiter.clone(),
        ApiProbeOptions {
            enabled: config.microsoft_api,
            proxies: settings.proxies(),
            ..ApiProbeOptions::default()
        },
    );

    let browser = BrowserProbe::new(
        limiter.clone(),
        BrowserProbeOptions {
            webdriver_url: config.webdriver_url.clone(),
            browsers: settings.browsers(),
            headless: config.browser_headless,
            user_agent_rotation: config.user_agent_rotation,
            proxies: settings.proxies(),
            wait: Duration::from_secs(config.browser_wait_secs),
            screenshots: ScreenshotPolicy {
                mode: config.screenshot_mode,
                dir: PathBuf::from(&config.screenshot_dir),
                retention: config.screenshot_retention,
            },
        },
    );

    ProbeSet { smtp, api, browser }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DnsError, LookupMx, MxRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: Arc<AtomicUsize>,
        records: Vec<MxRecord>,
    }

    impl LookupMx for CountingResolver {
        fn lookup_mx(&self, _domain: &str) -> Result<Vec<MxRecord>, DnsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }
    }

    fn engine_with(
        dir: &std::path::Path,
        records: Vec<MxRecord>,
    ) -> (Engine, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = Config {
            data_dir: dir.join("data").to_string_lossy().into_owned(),
            history_dir: dir.join("history").to_string_lossy().into_owned(),
            batches_dir: dir.join("batches").to_string_lossy().into_owned(),
            ..Config::default()
        };
        let settings = Arc::new(Settings::from_config(config));
        let resolver = MxResolver::with_lookup(CountingResolver {
            calls: calls.clone(),
            records,
        });
        let engine = Engine::with_resolver(settings, resolver).expect("engine");
        (engine, calls)
    }

    #[test]
    fn invalid_format_is_terminal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, calls) = engine_with(dir.path(), Vec::new());
        let result = engine.verify("foo@bar", Method::Auto).expect("verify");
        assert_eq!(result.verdict, Verdict::Invalid);
        assert_eq!(result.reason, REASON_INVALID_FORMAT);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no DNS for bad syntax");
    }

    #[test]
    fn missing_mx_is_invalid_with_stable_reason() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, _) = engine_with(dir.path(), Vec::new());
        let result = engine
            .verify("user@nodomain.invalid", Method::Auto)
            .expect("verify");
        assert_eq!(result.verdict, Verdict::Invalid);
        assert_eq!(result.reason, REASON_NO_MAIL_SERVERS);
    }

    #[test]
    fn second_verify_hits_the_cache_without_probing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, calls) = engine_with(dir.path(), Vec::new());

        let first = engine.verify("user@example.com", Method::Auto).expect("verify");
        let after_first = calls.load(Ordering::SeqCst);
        let second = engine.verify("user@example.com", Method::Auto).expect("verify");

        assert_eq!(first.verdict, second.verdict);
        assert_eq!(calls.load(Ordering::SeqCst), after_first, "cache short-circuits");
    }

    #[test]
    fn persistence_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, _) = engine_with(dir.path(), Vec::new());

        for _ in 0..3 {
            engine.verify("user@example.com", Method::Auto).expect("verify");
        }
        let summary = engine.results_summary();
        let total: usize = summary.values().sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn blacklist_beats_probe_evidence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).expect("mkdir");
        std::fs::write(data_dir.join("D-blacklist.csv"), "spam.example\n").expect("write");

        let (engine, _) = engine_with(dir.path(), vec![MxRecord::new(10, "mx.spam.example")]);
        let result = engine.verify("ceo@spam.example", Method::Auto).expect("verify");
        assert_eq!(result.verdict, Verdict::Invalid);
        assert_eq!(result.reason, REASON_BLACKLISTED);
    }

    #[test]
    fn whitelist_yields_valid_without_probing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).expect("mkdir");
        std::fs::write(data_dir.join("D-WhiteList.csv"), "friend.example\n").expect("write");

        let (engine, _) = engine_with(dir.path(), Vec::new());
        let result = engine
            .verify("anyone@friend.example", Method::Auto)
            .expect("verify");
        assert_eq!(result.verdict, Verdict::Valid);
        assert_eq!(result.reason, REASON_WHITELISTED);
    }

    #[test]
    fn history_is_committed_with_the_verdict() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (engine, _) = engine_with(dir.path(), Vec::new());
        engine.verify("user@example.com", Method::Auto).expect("verify");

        let entries = engine
            .history_for_address("user@example.com")
            .expect("history");
        assert!(entries.iter().any(|e| e.event == "Verification started"));
        assert!(entries.iter().any(|e| e.event.contains("Verification result")));
    }

    #[test]
    fn persisted_result_short_circuits_future_engines() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let (engine, _) = engine_with(dir.path(), Vec::new());
            engine.verify("user@example.com", Method::Auto).expect("verify");
        }
        // A fresh engine (empty cache) still finds the persisted verdict.
        let (engine, calls) = engine_with(dir.path(), Vec::new());
        let result = engine.verify("user@example.com", Method::Auto).expect("verify");
        assert_eq!(result.provider, "cached");
        assert_eq!(result.method, "cached");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
