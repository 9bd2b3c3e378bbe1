//! Trust-on-first-use memorization validator

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zeroize::Zeroizing;

use netsec_common::LoggingTransformer;

use super::{ChainValidator, ValidatorKind};
use crate::chain::CertificateChain;
use crate::domain_rule::DomainMatchRule;
use crate::error::{Result, TrustDecision, TrustError};
use crate::store::{HostKeyedStoreCache, MemorizingStore, DEFAULT_CACHE_SIZE};

/// Settings for a [`MemorizingValidator`]
#[derive(Clone)]
pub struct MemorizationOptions {
    working_dir: PathBuf,
    password: Arc<Zeroizing<String>>,
    trust_on_first_use: bool,
    cache_size: usize,
    domain_rule: Option<DomainMatchRule>,
}

impl std::fmt::Debug for MemorizationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorizationOptions")
            .field("working_dir", &self.working_dir)
            .field("password", &"<redacted>")
            .field("trust_on_first_use", &self.trust_on_first_use)
            .field("cache_size", &self.cache_size)
            .field("domain_rule", &self.domain_rule)
            .finish()
    }
}

impl MemorizationOptions {
    /// Keystores live in `working_dir`, encrypted with `password`
    ///
    /// Trust-on-first-use is on and the store cache holds
    /// [`DEFAULT_CACHE_SIZE`] hosts.
    pub fn new(working_dir: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            password: Arc::new(Zeroizing::new(password.into())),
            trust_on_first_use: true,
            cache_size: DEFAULT_CACHE_SIZE,
            domain_rule: None,
        }
    }

    /// Reject unknown hosts with `NotMemorized` instead of learning them
    pub fn no_tofu(self) -> Self {
        self.trust_on_first_use(false)
    }

    /// Enable or disable trust-on-first-use
    pub fn trust_on_first_use(self, enabled: bool) -> Self {
        Self {
            trust_on_first_use: enabled,
            ..self
        }
    }

    /// Number of hosts whose stores stay in memory
    pub fn cache_size(self, cache_size: usize) -> Self {
        Self { cache_size, ..self }
    }

    /// Only memorize for hosts matching `rule`
    pub fn for_domains(self, rule: DomainMatchRule) -> Self {
        Self {
            domain_rule: Some(rule),
            ..self
        }
    }

    /// Directory holding the keystore files
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Whether unknown hosts are learned automatically
    pub fn is_trust_on_first_use(&self) -> bool {
        self.trust_on_first_use
    }
}

/// Validator remembering the certificates each host has presented
///
/// Memorization does not apply to hosts outside the configured domain rule:
/// a group skips it for those hosts so its other validators decide alone,
/// and a direct check rejects them. Host names are matched case-insensitively.
#[derive(Debug)]
pub struct MemorizingValidator {
    cache: HostKeyedStoreCache,
    trust_on_first_use: bool,
    domain_rule: Option<DomainMatchRule>,
}

impl MemorizingValidator {
    /// Create the validator, creating the working directory if needed
    pub fn new(options: MemorizationOptions) -> Result<Self> {
        fs::create_dir_all(&options.working_dir).map_err(|e| {
            TrustError::storage(
                &options.working_dir,
                format!("cannot create working directory: {e}"),
            )
        })?;

        let cache = HostKeyedStoreCache::new(
            options.working_dir,
            options.password,
            options.cache_size,
        )?;

        Ok(Self {
            cache,
            trust_on_first_use: options.trust_on_first_use,
            domain_rule: options.domain_rule,
        })
    }

    /// Whether `host` falls under the domain rule
    pub fn covers(&self, host: &str) -> bool {
        self.domain_rule
            .as_ref()
            .map_or(true, |rule| rule.matches(&normalize(host)))
    }

    /// Trust `chain` for `host` permanently
    pub fn memorize(&self, chain: &CertificateChain, host: &str) -> Result<()> {
        self.store(host)?.memorize(chain)
    }

    /// Trust `chain` for `host` for the rest of this process
    ///
    /// The approval is also lost if the host's store is evicted from the cache.
    pub fn memorize_for_now(&self, chain: &CertificateChain, host: &str) -> Result<()> {
        self.store(host)?.memorize_for_now(chain)
    }

    /// Permanently approve the chain carried by a memorization rejection
    pub fn memorize_rejection(&self, rejection: &TrustError) -> Result<()> {
        let (chain, host) = rejected_chain(rejection)?;
        self.memorize(chain, host)
    }

    /// Approve the chain carried by a memorization rejection for this process
    pub fn memorize_rejection_for_now(&self, rejection: &TrustError) -> Result<()> {
        let (chain, host) = rejected_chain(rejection)?;
        self.memorize_for_now(chain, host)
    }

    /// Forget what was memorized for `host`
    pub fn clear(&self, host: &str, clear_persistent: bool) -> Result<()> {
        self.store(host)?.clear(clear_persistent)
    }

    /// Forget what was memorized for every host
    pub fn clear_all(&self, clear_persistent: bool) -> Result<()> {
        self.cache.clear_all(clear_persistent)
    }

    /// The per-host store cache
    pub fn cache(&self) -> &HostKeyedStoreCache {
        &self.cache
    }

    /// Whether unknown hosts are learned automatically
    pub fn is_trust_on_first_use(&self) -> bool {
        self.trust_on_first_use
    }

    fn store(&self, host: &str) -> Result<Arc<MemorizingStore>> {
        self.cache.get_or_create(&normalize(host))
    }
}

impl ChainValidator for MemorizingValidator {
    fn check_server_trusted(
        &self,
        chain: &CertificateChain,
        auth_type: &str,
        host: Option<&str>,
    ) -> TrustDecision {
        let host = host.ok_or_else(|| {
            TrustError::not_trusted("memorization requires the hostname of the connection")
        })?;

        if !self.covers(host) {
            return Err(TrustError::not_trusted(format!(
                "memorization does not apply to {host}"
            )));
        }

        let store = self.store(host)?;
        let result = store.check_server_trusted(chain, auth_type, self.trust_on_first_use);
        if let Some(leaf) = chain.leaf() {
            LoggingTransformer::log_decision("memorizing", Some(host), leaf.as_ref(), result.is_ok());
        }
        result
    }

    fn check_client_trusted(&self, _chain: &CertificateChain, _auth_type: &str) -> Result<()> {
        Err(TrustError::not_trusted(
            "memorization does not validate client certificates",
        ))
    }

    /// Without a hostname the check applies and rejects
    fn applies_to(&self, host: Option<&str>) -> bool {
        host.map_or(true, |host| self.covers(host))
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Memorizing
    }
}

fn normalize(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn rejected_chain(rejection: &TrustError) -> Result<(&CertificateChain, &str)> {
    match (rejection.chain(), rejection.host()) {
        (Some(chain), Some(host)) => Ok((chain, host)),
        _ => Err(TrustError::Configuration(format!(
            "not a memorization rejection: {rejection}"
        ))),
    }
}
