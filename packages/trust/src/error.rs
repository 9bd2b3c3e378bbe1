//! Trust decision errors
//!
//! Rejections (`NotTrusted`, `NotMemorized`, `MemorizationMismatch`) are kept
//! apart from operational failures (`Storage`, `Io`, `Configuration`) so a call
//! site can tell "show a security warning" from "show an I/O error".

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::chain::CertificateChain;

/// Errors and rejections produced by trust validation
#[derive(Debug, Error)]
pub enum TrustError {
    /// A validator flatly rejected the chain
    #[error("Certificate chain not trusted: {0}")]
    NotTrusted(String),

    /// Memorization has no entry for this host and trust-on-first-use is off
    #[error("Certificate for {host} not found in memorization store")]
    NotMemorized {
        /// The rejected chain, so the caller can approve it
        chain: CertificateChain,
        /// Host the chain was presented for
        host: String,
    },

    /// The host has memorized certificates but the presented chain differs
    #[error("Certificate for {host} does not match the memorized certificate: {cause}")]
    MemorizationMismatch {
        /// The rejected chain, so the caller can approve it
        chain: CertificateChain,
        /// Host the chain was presented for
        host: String,
        /// Why the memorized stores rejected the chain
        #[source]
        cause: Box<TrustError>,
    },

    /// Invalid builder usage, domain rule or configuration document
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Reading or writing a persistent keystore failed
    #[error("Keystore storage failed for {path:?}: {reason}")]
    Storage {
        /// Keystore file involved
        path: PathBuf,
        /// Failure details
        reason: String,
    },

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A cleartext request was attempted for a host that forbids it
    #[error("Cleartext traffic not permitted: {0}")]
    CleartextNotPermitted(String),

    /// The TLS handshake failed; the trust rejection, if any, is inside `source`
    #[error("TLS handshake with {host} failed: {source}")]
    Handshake {
        /// Host being connected to
        host: String,
        /// Error reported by the TLS stream
        #[source]
        source: std::io::Error,
    },

    /// Internal error occurred
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrustError {
    /// True for trust rejections, as opposed to operational failures
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotTrusted(_) | Self::NotMemorized { .. } | Self::MemorizationMismatch { .. }
        )
    }

    /// True when the rejection came from memorization and could be approved
    pub fn is_memorization(&self) -> bool {
        matches!(
            self.rejection(),
            Some(Self::NotMemorized { .. } | Self::MemorizationMismatch { .. })
        )
    }

    /// The trust rejection behind this error
    ///
    /// Rejections return themselves. A `Handshake` error is searched for the
    /// rejection the engine raised inside the TLS stack.
    pub fn rejection(&self) -> Option<&TrustError> {
        match self {
            Self::Handshake { source, .. } => source
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<rustls::Error>())
                .and_then(Self::from_rustls),
            other if other.is_rejection() => Some(other),
            _ => None,
        }
    }

    /// Chain carried by a memorization rejection
    pub fn chain(&self) -> Option<&CertificateChain> {
        match self.rejection()? {
            Self::NotMemorized { chain, .. } | Self::MemorizationMismatch { chain, .. } => {
                Some(chain)
            }
            _ => None,
        }
    }

    /// Host carried by a memorization rejection
    pub fn host(&self) -> Option<&str> {
        match self.rejection()? {
            Self::NotMemorized { host, .. } | Self::MemorizationMismatch { host, .. } => {
                Some(host)
            }
            _ => None,
        }
    }

    /// Recover a `TrustError` raised through a rustls verifier
    pub fn from_rustls(err: &rustls::Error) -> Option<&TrustError> {
        match err {
            rustls::Error::InvalidCertificate(rustls::CertificateError::Other(other)) => {
                other.0.downcast_ref::<TrustError>()
            }
            _ => None,
        }
    }

    pub(crate) fn not_trusted(reason: impl Into<String>) -> Self {
        Self::NotTrusted(reason.into())
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        Self::Internal(format!("Failed to acquire {what} lock"))
    }
}

impl From<TrustError> for rustls::Error {
    fn from(err: TrustError) -> Self {
        rustls::Error::InvalidCertificate(rustls::CertificateError::Other(rustls::OtherError(
            Arc::new(err),
        )))
    }
}

/// Result type for trust operations
pub type Result<T> = std::result::Result<T, TrustError>;

/// Outcome of a validation: the trusted (possibly narrowed) chain, or the rejection
pub type TrustDecision = Result<CertificateChain>;
