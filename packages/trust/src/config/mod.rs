//! Network security configuration
//!
//! A [`ConfigSource`] supplies a base configuration plus per-domain
//! overrides. [`ApplicationConfig`] resolves a hostname to the configuration
//! that governs it and turns the whole document into a [`ConfigValidator`].

pub mod application;
pub mod json;

use rustls::pki_types::CertificateDer;

use crate::error::Result;

pub use application::{ApplicationConfig, ConfigValidator};
pub use json::JsonConfigSource;

/// Where trusted certificates come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustAnchors {
    /// The platform trust roots
    System,
    /// Explicitly configured certificates or CAs
    Pinned(Vec<CertificateDer<'static>>),
}

/// Trust settings for the default configuration or one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSecurityConfig {
    /// Anchors accepted for matching hosts; any one of them is enough
    pub trust_anchors: Vec<TrustAnchors>,
    /// Whether plain-text HTTP is allowed
    pub cleartext_permitted: bool,
}

impl Default for NetworkSecurityConfig {
    fn default() -> Self {
        Self {
            trust_anchors: vec![TrustAnchors::System],
            cleartext_permitted: false,
        }
    }
}

/// Domain a per-domain configuration applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPattern {
    domain: String,
    include_subdomains: bool,
}

impl DomainPattern {
    /// Match `domain`, and its subdomains if `include_subdomains`
    pub fn new(domain: &str, include_subdomains: bool) -> Self {
        Self {
            domain: normalize(domain),
            include_subdomains,
        }
    }

    /// The domain, lowercased
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Whether subdomains match as well
    pub fn include_subdomains(&self) -> bool {
        self.include_subdomains
    }

    /// True when `host` is the domain itself
    pub fn matches_exactly(&self, host: &str) -> bool {
        normalize(host) == self.domain
    }

    /// True when `host` is the domain or, if enabled, one of its subdomains
    pub fn matches(&self, host: &str) -> bool {
        let host = normalize(host);
        host == self.domain
            || (self.include_subdomains
                && host
                    .strip_suffix(self.domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')))
    }
}

/// Supplier of network security configuration
pub trait ConfigSource: Send + Sync {
    /// Configuration for hosts without a domain-specific entry
    fn default_config(&self) -> Result<NetworkSecurityConfig>;

    /// Domain-specific configurations
    fn per_domain_configs(&self) -> Result<Vec<(DomainPattern, NetworkSecurityConfig)>>;
}

pub(crate) fn normalize(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}
