//! Platform trust roots

use std::sync::Arc;

use rustls::pki_types::UnixTime;
use rustls::RootCertStore;

use netsec_common::LoggingTransformer;

use super::webpki::{verify_against_roots, verify_client_against_roots};
use super::{ChainValidator, ValidatorKind};
use crate::chain::CertificateChain;
use crate::error::{Result, TrustDecision};

/// Trusts chains that anchor in the platform's root certificates
#[derive(Debug, Clone)]
pub struct SystemDefaultValidator {
    roots: Arc<RootCertStore>,
}

impl SystemDefaultValidator {
    /// Load the operating system's trust roots
    ///
    /// Falls back to the bundled Mozilla roots when the platform store cannot
    /// be read or yields nothing usable.
    pub fn from_platform() -> Self {
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            tracing::warn!("Failed to load native certificate: {error}");
        }

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        if ignored > 0 {
            tracing::debug!("Ignored {ignored} unparseable platform certificates");
        }

        if added == 0 {
            tracing::warn!("No usable platform trust roots, using bundled webpki roots");
            return Self::webpki_roots();
        }

        tracing::debug!("Loaded {added} platform trust roots");
        Self {
            roots: Arc::new(roots),
        }
    }

    /// Use the bundled Mozilla root program certificates
    pub fn webpki_roots() -> Self {
        Self {
            roots: Arc::new(RootCertStore::from_iter(
                webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
            )),
        }
    }

    /// Use an explicit root store
    pub fn with_roots(roots: RootCertStore) -> Self {
        Self {
            roots: Arc::new(roots),
        }
    }

    /// Number of trust anchors loaded
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// The root store, for building a plain rustls verifier
    pub fn root_store(&self) -> Arc<RootCertStore> {
        Arc::clone(&self.roots)
    }
}

impl ChainValidator for SystemDefaultValidator {
    fn check_server_trusted(
        &self,
        chain: &CertificateChain,
        _auth_type: &str,
        host: Option<&str>,
    ) -> TrustDecision {
        let result = verify_against_roots(&self.roots, chain, host, UnixTime::now());
        if let Some(leaf) = chain.leaf() {
            LoggingTransformer::log_decision("system", host, leaf.as_ref(), result.is_ok());
        }
        result.map(|()| chain.clone())
    }

    fn check_client_trusted(&self, chain: &CertificateChain, _auth_type: &str) -> Result<()> {
        verify_client_against_roots(Arc::clone(&self.roots), chain, UnixTime::now())
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::SystemDefault
    }
}
