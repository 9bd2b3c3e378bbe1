//! JSON network security configuration documents
//!
//! ```json
//! {
//!   "base-config": { "cleartext-traffic-permitted": false, "trust-anchors": ["system"] },
//!   "domain-config": [
//!     {
//!       "domains": [{ "name": "example.com", "include-subdomains": true }],
//!       "trust-anchors": [{ "pem": "-----BEGIN CERTIFICATE-----..." }]
//!     }
//!   ]
//! }
//! ```
//!
//! Domain entries inherit every setting they leave out from `base-config`.

use std::path::Path;

use serde::Deserialize;

use super::{ConfigSource, DomainPattern, NetworkSecurityConfig, TrustAnchors};
use crate::error::{Result, TrustError};
use crate::validator::pinned::parse_pem_certificates;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigDocument {
    #[serde(default)]
    base_config: RawConfig,
    #[serde(default)]
    domain_config: Vec<RawDomainConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    cleartext_traffic_permitted: Option<bool>,
    trust_anchors: Option<Vec<RawAnchor>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawDomainConfig {
    domains: Vec<RawDomain>,
    #[serde(flatten)]
    config: RawConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawDomain {
    name: String,
    #[serde(default)]
    include_subdomains: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAnchor {
    Named(String),
    Pem { pem: String },
}

/// [`ConfigSource`] backed by a JSON document
#[derive(Debug, Clone)]
pub struct JsonConfigSource {
    default: NetworkSecurityConfig,
    domains: Vec<(DomainPattern, NetworkSecurityConfig)>,
}

impl JsonConfigSource {
    /// Parse a JSON document
    pub fn parse(json: &str) -> Result<Self> {
        let document: ConfigDocument = serde_json::from_str(json)
            .map_err(|e| TrustError::Configuration(format!("invalid network config: {e}")))?;

        let base = NetworkSecurityConfig::default();
        let default = resolve(&document.base_config, &base)?;

        let mut domains = Vec::new();
        for entry in &document.domain_config {
            if entry.domains.is_empty() {
                return Err(TrustError::Configuration(
                    "domain-config entry lists no domains".to_string(),
                ));
            }

            let config = resolve(&entry.config, &default)?;
            for domain in &entry.domains {
                if domain.name.trim().is_empty() {
                    return Err(TrustError::Configuration(
                        "domain-config entry has an empty domain name".to_string(),
                    ));
                }
                domains.push((
                    DomainPattern::new(&domain.name, domain.include_subdomains),
                    config.clone(),
                ));
            }
        }

        Ok(Self { default, domains })
    }

    /// Read and parse a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            TrustError::Configuration(format!("cannot read network config {path:?}: {e}"))
        })?;
        Self::parse(&json)
    }
}

impl ConfigSource for JsonConfigSource {
    fn default_config(&self) -> Result<NetworkSecurityConfig> {
        Ok(self.default.clone())
    }

    fn per_domain_configs(&self) -> Result<Vec<(DomainPattern, NetworkSecurityConfig)>> {
        Ok(self.domains.clone())
    }
}

fn resolve(raw: &RawConfig, inherited: &NetworkSecurityConfig) -> Result<NetworkSecurityConfig> {
    let trust_anchors = match &raw.trust_anchors {
        Some(anchors) => anchors.iter().map(parse_anchor).collect::<Result<Vec<_>>>()?,
        None => inherited.trust_anchors.clone(),
    };

    Ok(NetworkSecurityConfig {
        trust_anchors,
        cleartext_permitted: raw
            .cleartext_traffic_permitted
            .unwrap_or(inherited.cleartext_permitted),
    })
}

fn parse_anchor(raw: &RawAnchor) -> Result<TrustAnchors> {
    match raw {
        RawAnchor::Named(name) if name == "system" => Ok(TrustAnchors::System),
        RawAnchor::Named(name) if name == "user" => Err(TrustError::Configuration(
            "user-installed trust anchors are not supported".to_string(),
        )),
        RawAnchor::Named(name) => Err(TrustError::Configuration(format!(
            "unknown trust anchor source {name:?}"
        ))),
        RawAnchor::Pem { pem } => parse_pem_certificates(pem).map(TrustAnchors::Pinned),
    }
}
