//! In-memory set of trusted certificates

use std::collections::BTreeMap;

use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::RootCertStore;

use netsec_common::sha256_fingerprint;

use crate::chain::CertificateChain;
use crate::error::{Result, TrustError};
use crate::validator::webpki::verify_against_roots;

/// Trusted certificates indexed by SHA-256 fingerprint
///
/// A chain is trusted when its leaf is stored verbatim, or when it builds a
/// path to a stored certificate used as a trust anchor.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    certs: BTreeMap<String, CertificateDer<'static>>,
    anchors: RootCertStore,
}

impl Default for CertificateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            certs: BTreeMap::new(),
            anchors: RootCertStore::empty(),
        }
    }

    /// Create a store holding `certs`
    pub fn from_certificates<I>(certs: I) -> Self
    where
        I: IntoIterator<Item = CertificateDer<'static>>,
    {
        let mut store = Self::new();
        for cert in certs {
            store.insert(cert);
        }
        store
    }

    /// Add a certificate; returns false if it was already present
    pub fn insert(&mut self, cert: CertificateDer<'static>) -> bool {
        let alias = sha256_fingerprint(cert.as_ref());
        if self.certs.contains_key(&alias) {
            return false;
        }

        // Certificates webpki cannot use as anchors still match verbatim
        let _ = self.anchors.add_parsable_certificates([cert.clone()]);
        self.certs.insert(alias, cert);
        true
    }

    /// Add every certificate of `chain`
    pub fn insert_chain(&mut self, chain: &CertificateChain) {
        for cert in chain {
            self.insert(cert.clone());
        }
    }

    /// Whether `cert` is stored verbatim
    pub fn contains(&self, cert: &CertificateDer<'_>) -> bool {
        self.certs.contains_key(&sha256_fingerprint(cert.as_ref()))
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Number of stored certificates
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Stored certificates in fingerprint order
    pub fn certificates(&self) -> Vec<CertificateDer<'static>> {
        self.certs.values().cloned().collect()
    }

    /// Remove every certificate
    pub fn clear(&mut self) {
        self.certs.clear();
        self.anchors = RootCertStore::empty();
    }

    /// Check `chain` against the stored certificates
    ///
    /// The hostname is only checked when the chain is anchored rather than
    /// matched verbatim.
    pub fn validates(&self, chain: &CertificateChain, host: Option<&str>) -> Result<()> {
        let leaf = chain
            .leaf()
            .ok_or_else(|| TrustError::not_trusted("empty certificate chain"))?;

        if self.is_empty() {
            return Err(TrustError::not_trusted("no certificates stored"));
        }

        if self.contains(leaf) {
            return Ok(());
        }

        if self.anchors.is_empty() {
            return Err(TrustError::not_trusted(
                "leaf certificate is not among the stored certificates",
            ));
        }

        verify_against_roots(&self.anchors, chain, host, UnixTime::now())
    }
}
