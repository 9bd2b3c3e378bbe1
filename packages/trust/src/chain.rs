//! Certificate chains as presented during a TLS handshake
//!
//! A chain is ordered leaf-first. It is immutable once received; validators
//! borrow it for the duration of a check and only clone it into rejections
//! that must carry it back to the caller.

use rustls::pki_types::CertificateDer;

use netsec_common::sha256_fingerprint;

/// Ordered, leaf-first sequence of DER certificates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateChain {
    certs: Vec<CertificateDer<'static>>,
}

impl CertificateChain {
    /// Create a chain from certificates ordered leaf-first
    pub fn new(certs: Vec<CertificateDer<'static>>) -> Self {
        Self { certs }
    }

    /// Build a chain from the pieces rustls hands to a verifier
    pub fn from_handshake(
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
    ) -> Self {
        let mut certs = Vec::with_capacity(intermediates.len() + 1);
        certs.push(end_entity.clone().into_owned());
        certs.extend(intermediates.iter().map(|cert| cert.clone().into_owned()));
        Self { certs }
    }

    /// The server (end-entity) certificate
    pub fn leaf(&self) -> Option<&CertificateDer<'static>> {
        self.certs.first()
    }

    /// Everything after the leaf
    pub fn intermediates(&self) -> &[CertificateDer<'static>] {
        self.certs.get(1..).unwrap_or(&[])
    }

    /// All certificates, leaf-first
    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certs
    }

    /// Number of certificates in the chain
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// True when the chain holds no certificates
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Iterate certificates leaf-first
    pub fn iter(&self) -> std::slice::Iter<'_, CertificateDer<'static>> {
        self.certs.iter()
    }

    /// SHA-256 fingerprints, leaf-first
    pub fn fingerprints(&self) -> Vec<String> {
        self.certs
            .iter()
            .map(|cert| sha256_fingerprint(cert.as_ref()))
            .collect()
    }

    /// Subject distinguished names, leaf-first
    ///
    /// Certificates that fail to parse are reported as `<unparseable>`.
    pub fn subjects(&self) -> Vec<String> {
        self.certs
            .iter()
            .map(|cert| match x509_parser::parse_x509_certificate(cert.as_ref()) {
                Ok((_, parsed)) => parsed.subject().to_string(),
                Err(_) => "<unparseable>".to_string(),
            })
            .collect()
    }
}

impl From<Vec<CertificateDer<'static>>> for CertificateChain {
    fn from(certs: Vec<CertificateDer<'static>>) -> Self {
        Self::new(certs)
    }
}

impl<'a> IntoIterator for &'a CertificateChain {
    type Item = &'a CertificateDer<'static>;
    type IntoIter = std::slice::Iter<'a, CertificateDer<'static>>;

    fn into_iter(self) -> Self::IntoIter {
        self.certs.iter()
    }
}
