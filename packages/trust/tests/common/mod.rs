//! Shared helpers for the trust integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use netsec_trust::{
    CertChainObserver, CertificateChain, ChainValidator, MemorizationOptions, Result,
    TrustDecision, TrustError,
};
use rcgen::{BasicConstraints, CertificateParams, IsCa, Issuer, KeyPair};
use rustls::pki_types::CertificateDer;

/// Self-signed certificate for `host`
pub fn self_signed(host: &str) -> CertificateDer<'static> {
    let certified = rcgen::generate_simple_self_signed(vec![host.to_string()])
        .expect("self-signed certificate generation failed");
    certified.cert.der().clone()
}

/// Single-certificate chain with a fresh self-signed leaf for `host`
pub fn self_signed_chain(host: &str) -> CertificateChain {
    CertificateChain::new(vec![self_signed(host)])
}

/// A private CA that can issue leaf certificates
pub struct TestAuthority {
    pub cert: CertificateDer<'static>,
    pub pem: String,
    issuer: Issuer<'static, KeyPair>,
}

impl TestAuthority {
    pub fn new() -> Self {
        let key = KeyPair::generate().expect("CA key generation failed");
        let mut params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).expect("CA self-signing failed");

        Self {
            pem: cert.pem(),
            cert: cert.der().clone(),
            issuer: Issuer::new(params, key),
        }
    }

    /// Chain of a leaf for `host` followed by this CA
    pub fn issue(&self, host: &str) -> CertificateChain {
        let key = KeyPair::generate().expect("leaf key generation failed");
        let params = CertificateParams::new(vec![host.to_string()]).expect("leaf params");
        let leaf = params
            .signed_by(&key, &self.issuer)
            .expect("leaf signing failed");

        CertificateChain::new(vec![leaf.der().clone(), self.cert.clone()])
    }
}

/// Validator with a fixed answer that counts how often it is asked
#[derive(Debug)]
pub struct CountingValidator {
    label: &'static str,
    accept: bool,
    calls: AtomicUsize,
}

impl CountingValidator {
    pub fn accepting(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            accept: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn rejecting(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            accept: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChainValidator for CountingValidator {
    fn check_server_trusted(
        &self,
        chain: &CertificateChain,
        _auth_type: &str,
        _host: Option<&str>,
    ) -> TrustDecision {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.accept {
            Ok(chain.clone())
        } else {
            Err(TrustError::NotTrusted(self.label.to_string()))
        }
    }

    fn check_client_trusted(&self, _chain: &CertificateChain, _auth_type: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.accept {
            Ok(())
        } else {
            Err(TrustError::NotTrusted(self.label.to_string()))
        }
    }
}

/// Memorization options in a temporary directory
pub fn memo_options(dir: &tempfile::TempDir) -> MemorizationOptions {
    MemorizationOptions::new(dir.path().join("memo"), "correct horse battery staple")
}

/// Label carried by a `NotTrusted` rejection
pub fn rejection_label(err: &TrustError) -> &str {
    match err {
        TrustError::NotTrusted(label) => label,
        other => panic!("expected NotTrusted, got {other:?}"),
    }
}

/// Box a closure as a chain observer
pub fn observer<F>(f: F) -> Arc<dyn CertChainObserver>
where
    F: Fn(&CertificateChain, Option<&str>) + Send + Sync + 'static,
{
    Arc::new(f)
}
