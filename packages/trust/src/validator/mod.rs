//! Certificate chain validators
//!
//! Every trust source implements [`ChainValidator`] directly, hostname
//! parameter included, so the composite never probes for capabilities:
//! - `system`: platform trust roots
//! - `deny`: rejects everything
//! - `pinned`: a fixed set of trusted certificates or private CAs
//! - `memorizing`: per-host trust-on-first-use stores
//! - `observer`: diagnostic chain callbacks

pub mod deny;
pub mod memorizing;
pub mod observer;
pub mod pinned;
pub mod system;

use std::fmt;

use rustls::pki_types::CertificateDer;

use crate::chain::CertificateChain;
use crate::error::{Result, TrustDecision};

pub use deny::DenyAllValidator;
pub use memorizing::{MemorizationOptions, MemorizingValidator};
pub use observer::{CertChainObserver, LoggingChainObserver};
pub use pinned::PinnedValidator;
pub use system::SystemDefaultValidator;

/// Which variant a validator is; used by the builder to enforce attachment rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidatorKind {
    /// Platform trust roots
    SystemDefault,
    /// Rejects every chain
    DenyAll,
    /// Fixed set of pinned certificates
    Pinned,
    /// Per-host memorization
    Memorizing,
    /// Driven by a network security configuration
    Config,
    /// AND/OR group of other validators
    Composite,
    /// Anything defined outside this crate
    Custom,
}

/// A single trust-decision source
///
/// Implementations must be safe to call from concurrent handshakes.
pub trait ChainValidator: Send + Sync + fmt::Debug {
    /// Decide whether a server chain is trusted for `host`
    ///
    /// Returns the trusted chain, which a validator may narrow to the part it
    /// actually anchored.
    fn check_server_trusted(
        &self,
        chain: &CertificateChain,
        auth_type: &str,
        host: Option<&str>,
    ) -> TrustDecision;

    /// Decide whether a client chain is trusted
    fn check_client_trusted(&self, chain: &CertificateChain, auth_type: &str) -> Result<()>;

    /// Whether `cert` was added by the user or application rather than the platform
    fn is_user_added_certificate(&self, _cert: &CertificateDer<'_>) -> bool {
        false
    }

    /// Issuer certificates this validator accepts, when it can enumerate them
    fn accepted_issuers(&self) -> Vec<CertificateDer<'static>> {
        Vec::new()
    }

    /// Whether this validator has an opinion about chains for `host`
    ///
    /// Groups skip validators that do not apply; a skipped validator neither
    /// accepts nor rejects.
    fn applies_to(&self, _host: Option<&str>) -> bool {
        true
    }

    /// Whether this validator is, or contains, a validator of `kind`
    fn contains_kind(&self, kind: ValidatorKind) -> bool {
        self.kind() == kind
    }

    /// The validator variant
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Custom
    }
}

/// Chain-building against a root store through rustls/webpki
pub(crate) mod webpki {
    use std::sync::Arc;

    use rustls::client::{verify_server_cert_signed_by_trust_anchor, verify_server_name};
    use rustls::crypto::{ring, CryptoProvider};
    use rustls::pki_types::{ServerName, UnixTime};
    use rustls::server::danger::ClientCertVerifier;
    use rustls::server::{ParsedCertificate, WebPkiClientVerifier};
    use rustls::RootCertStore;

    use crate::chain::CertificateChain;
    use crate::error::{Result, TrustError};

    /// Verify that `chain` anchors in `roots` and, if given, matches `host`
    pub(crate) fn verify_against_roots(
        roots: &RootCertStore,
        chain: &CertificateChain,
        host: Option<&str>,
        now: UnixTime,
    ) -> Result<()> {
        let leaf = chain
            .leaf()
            .ok_or_else(|| TrustError::not_trusted("empty certificate chain"))?;
        let parsed = ParsedCertificate::try_from(leaf)
            .map_err(|e| TrustError::not_trusted(format!("unparseable leaf certificate: {e}")))?;

        verify_server_cert_signed_by_trust_anchor(
            &parsed,
            roots,
            chain.intermediates(),
            now,
            ring::default_provider().signature_verification_algorithms.all,
        )
        .map_err(|e| TrustError::not_trusted(e.to_string()))?;

        if let Some(host) = host {
            let name = ServerName::try_from(host)
                .map_err(|e| TrustError::not_trusted(format!("invalid hostname {host}: {e}")))?;
            verify_server_name(&parsed, &name)
                .map_err(|e| TrustError::not_trusted(e.to_string()))?;
        }

        Ok(())
    }

    /// Verify a client chain against `roots` with client-auth key usage
    pub(crate) fn verify_client_against_roots(
        roots: Arc<RootCertStore>,
        chain: &CertificateChain,
        now: UnixTime,
    ) -> Result<()> {
        let leaf = chain
            .leaf()
            .ok_or_else(|| TrustError::not_trusted("empty certificate chain"))?;
        let provider: Arc<CryptoProvider> = Arc::new(ring::default_provider());

        let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider)
            .build()
            .map_err(|e| TrustError::not_trusted(format!("no usable client trust anchors: {e}")))?;

        verifier
            .verify_client_cert(leaf, chain.intermediates(), now)
            .map(|_| ())
            .map_err(|e| TrustError::not_trusted(e.to_string()))
    }
}
