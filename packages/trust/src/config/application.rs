//! Resolved configuration for an application

use std::sync::Arc;

use rustls::pki_types::CertificateDer;

use super::{normalize, ConfigSource, DomainPattern, NetworkSecurityConfig, TrustAnchors};
use crate::chain::CertificateChain;
use crate::composite::{CompositeTrustEngine, MatchMode};
use crate::error::{Result, TrustDecision};
use crate::validator::{ChainValidator, PinnedValidator, SystemDefaultValidator, ValidatorKind};

/// Default and per-domain configuration loaded from a [`ConfigSource`]
#[derive(Debug, Clone)]
pub struct ApplicationConfig {
    default: NetworkSecurityConfig,
    domains: Vec<(DomainPattern, NetworkSecurityConfig)>,
}

impl ApplicationConfig {
    /// Load everything `source` provides
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        Ok(Self {
            default: source.default_config()?,
            domains: source.per_domain_configs()?,
        })
    }

    /// The configuration for hosts without a domain entry
    pub fn default_config(&self) -> &NetworkSecurityConfig {
        &self.default
    }

    /// The configuration governing `host`
    ///
    /// An exact domain match wins; otherwise the longest matching domain
    /// that includes subdomains; otherwise the default.
    pub fn config_for(&self, host: &str) -> &NetworkSecurityConfig {
        self.domain_index(host)
            .and_then(|index| self.domains.get(index))
            .map_or(&self.default, |(_, config)| config)
    }

    /// Whether cleartext traffic is allowed by default
    pub fn is_cleartext_traffic_permitted(&self) -> bool {
        self.default.cleartext_permitted
    }

    /// Whether cleartext traffic to `host` is allowed
    pub fn is_cleartext_traffic_permitted_for(&self, host: &str) -> bool {
        self.config_for(host).cleartext_permitted
    }

    /// Build the validator enforcing this configuration
    pub fn validator(&self) -> Result<ConfigValidator> {
        let mut system = None;

        let default = anchors_engine(&self.default, &mut system)?;
        let domains = self
            .domains
            .iter()
            .map(|(pattern, config)| Ok((pattern.clone(), anchors_engine(config, &mut system)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(ConfigValidator {
            config: Arc::new(self.clone()),
            default,
            domains,
        })
    }

    fn domain_index(&self, host: &str) -> Option<usize> {
        let host = normalize(host);

        if let Some(index) = self
            .domains
            .iter()
            .position(|(pattern, _)| pattern.matches_exactly(&host))
        {
            return Some(index);
        }

        self.domains
            .iter()
            .enumerate()
            .filter(|(_, (pattern, _))| pattern.include_subdomains() && pattern.matches(&host))
            .max_by_key(|(_, (pattern, _))| pattern.domain().len())
            .map(|(index, _)| index)
    }
}

/// Validator applying the trust anchors configured for each host
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    config: Arc<ApplicationConfig>,
    default: CompositeTrustEngine,
    domains: Vec<(DomainPattern, CompositeTrustEngine)>,
}

impl ConfigValidator {
    /// The configuration being enforced
    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    fn engine_for(&self, host: Option<&str>) -> &CompositeTrustEngine {
        host.and_then(|host| self.config.domain_index(host))
            .and_then(|index| self.domains.get(index))
            .map_or(&self.default, |(_, engine)| engine)
    }
}

impl ChainValidator for ConfigValidator {
    fn check_server_trusted(
        &self,
        chain: &CertificateChain,
        auth_type: &str,
        host: Option<&str>,
    ) -> TrustDecision {
        self.engine_for(host).validate(chain, auth_type, host)
    }

    fn check_client_trusted(&self, chain: &CertificateChain, auth_type: &str) -> Result<()> {
        self.default.validate_client(chain, auth_type)
    }

    fn is_user_added_certificate(&self, cert: &CertificateDer<'_>) -> bool {
        self.default.is_user_added_certificate(cert)
            || self
                .domains
                .iter()
                .any(|(_, engine)| engine.is_user_added_certificate(cert))
    }

    fn accepted_issuers(&self) -> Vec<CertificateDer<'static>> {
        self.default.accepted_issuers()
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Config
    }
}

/// Any-of engine over the anchors of one configuration
fn anchors_engine(
    config: &NetworkSecurityConfig,
    system: &mut Option<SystemDefaultValidator>,
) -> Result<CompositeTrustEngine> {
    let mut engine = CompositeTrustEngine::new(MatchMode::Any);

    for anchors in &config.trust_anchors {
        match anchors {
            TrustAnchors::System => {
                let validator = system.get_or_insert_with(SystemDefaultValidator::from_platform);
                engine.add(validator.clone());
            }
            TrustAnchors::Pinned(certs) => engine.add(PinnedValidator::new(certs.clone())?),
        }
    }

    Ok(engine)
}
