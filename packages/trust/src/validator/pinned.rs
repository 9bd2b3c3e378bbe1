//! Pinned certificates and private CAs

use rustls::pki_types::CertificateDer;

use netsec_common::LoggingTransformer;

use super::{ChainValidator, ValidatorKind};
use crate::chain::CertificateChain;
use crate::error::{Result, TrustDecision, TrustError};
use crate::store::CertificateStore;

/// Trusts chains whose leaf is pinned, or that anchor in a pinned CA
#[derive(Debug, Clone)]
pub struct PinnedValidator {
    store: CertificateStore,
}

impl PinnedValidator {
    /// Pin `certs`
    pub fn new<I>(certs: I) -> Result<Self>
    where
        I: IntoIterator<Item = CertificateDer<'static>>,
    {
        let store = CertificateStore::from_certificates(certs);
        if store.is_empty() {
            return Err(TrustError::Configuration(
                "pinned validator needs at least one certificate".to_string(),
            ));
        }
        Ok(Self { store })
    }

    /// Pin every certificate in a PEM bundle
    pub fn from_pem(pem: &str) -> Result<Self> {
        Self::new(parse_pem_certificates(pem)?)
    }

    /// The pinned certificates
    pub fn store(&self) -> &CertificateStore {
        &self.store
    }
}

impl ChainValidator for PinnedValidator {
    fn check_server_trusted(
        &self,
        chain: &CertificateChain,
        _auth_type: &str,
        host: Option<&str>,
    ) -> TrustDecision {
        let result = self.store.validates(chain, host);
        if let Some(leaf) = chain.leaf() {
            LoggingTransformer::log_decision("pinned", host, leaf.as_ref(), result.is_ok());
        }
        result.map(|()| chain.clone())
    }

    fn check_client_trusted(&self, chain: &CertificateChain, _auth_type: &str) -> Result<()> {
        self.store.validates(chain, None)
    }

    fn is_user_added_certificate(&self, cert: &CertificateDer<'_>) -> bool {
        self.store.contains(cert)
    }

    fn accepted_issuers(&self) -> Vec<CertificateDer<'static>> {
        self.store.certificates()
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Pinned
    }
}

/// Parse every `CERTIFICATE` block of a PEM document
pub(crate) fn parse_pem_certificates(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| TrustError::Configuration(format!("invalid PEM certificate: {e}")))?;

    if certs.is_empty() {
        return Err(TrustError::Configuration(
            "no certificates found in PEM input".to_string(),
        ));
    }
    Ok(certs)
}
