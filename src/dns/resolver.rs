use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};
use trust_dns_resolver::Resolver;
use trust_dns_resolver::error::ResolveErrorKind;

use super::DnsError;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

/// Seam over the underlying DNS client so tests can substitute a stub.
pub trait LookupMx: Send + Sync {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError>;
}

/// System-configured resolver with a bounded lookup timeout.
pub struct SystemResolver {
    resolver: Resolver,
}

impl SystemResolver {
    pub fn new() -> Result<Self, DnsError> {
        let (config, mut opts) = trust_dns_resolver::system_conf::read_system_conf()
            .map_err(|source| DnsError::ResolverInit { source })?;
        opts.timeout = LOOKUP_TIMEOUT;
        let resolver =
            Resolver::new(config, opts).map_err(|source| DnsError::ResolverInit { source })?;
        Ok(Self { resolver })
    }
}

impl LookupMx for SystemResolver {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        match self.resolver.mx_lookup(domain) {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|mx| MxRecord::new(mx.preference(), normalize_exchange(mx.exchange().to_utf8())))
                .collect()),
            Err(err) => match err.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(Vec::new()),
                _ => Err(DnsError::Lookup { source: err }),
            },
        }
    }
}

/// Caching MX resolver. The cache has no TTL; it lives as long as the engine.
pub struct MxResolver {
    inner: Box<dyn LookupMx>,
    cache: Mutex<HashMap<String, Vec<String>>>,
}

impl MxResolver {
    pub fn system() -> Result<Self, DnsError> {
        Ok(Self::with_lookup(SystemResolver::new()?))
    }

    pub fn with_lookup(lookup: impl LookupMx + 'static) -> Self {
        Self {
            inner: Box::new(lookup),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// MX hosts for `domain`, ascending preference. An empty list means the
    /// domain has no mail servers (or the lookup failed, which callers treat
    /// the same way).
    pub fn mx(&self, domain: &str) -> Vec<String> {
        if let Some(hit) = self.cache.lock().get(domain) {
            return hit.clone();
        }

        let hosts = match self.inner.lookup_mx(domain) {
            Ok(mut records) => {
                records.sort();
                records.dedup();
                records.into_iter().map(|r| r.exchange).collect::<Vec<_>>()
            }
            Err(err) => {
                warn!(target: "dns", %domain, %err, "MX lookup failed");
                Vec::new()
            }
        };

        debug!(target: "dns", %domain, count = hosts.len(), "MX lookup");
        self.cache.lock().insert(domain.to_string(), hosts.clone());
        hosts
    }

    /// Number of memoized domains, used by tests and diagnostics.
    pub fn cached_domains(&self) -> usize {
        self.cache.lock().len()
    }
}

pub(crate) fn normalize_exchange(exchange: String) -> String {
    exchange.trim_end_matches('.').to_ascii_lowercase()
}
