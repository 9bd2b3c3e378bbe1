//! Diagnostic chain observers
//!
//! Observers see every chain a composite examines, before any validator
//! runs. They never influence the decision.

use crate::chain::CertificateChain;

/// Callback handed every certificate chain before it is validated
pub trait CertChainObserver: Send + Sync {
    /// Called with the chain and the domain it was presented for, if known
    fn on_chain(&self, chain: &CertificateChain, domain: Option<&str>);
}

impl<F> CertChainObserver for F
where
    F: Fn(&CertificateChain, Option<&str>) + Send + Sync,
{
    fn on_chain(&self, chain: &CertificateChain, domain: Option<&str>) {
        self(chain, domain);
    }
}

/// Logs the subjects and fingerprints of each chain at `info` level
///
/// Useful for finding out which CA to pin for a server.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingChainObserver;

impl CertChainObserver for LoggingChainObserver {
    fn on_chain(&self, chain: &CertificateChain, domain: Option<&str>) {
        let domain = domain.unwrap_or("<unknown>");

        for (depth, (subject, fingerprint)) in chain
            .subjects()
            .into_iter()
            .zip(chain.fingerprints())
            .enumerate()
        {
            tracing::info!("Chain for {domain} [{depth}]: {subject} (sha256: {fingerprint})");
        }
    }
}
