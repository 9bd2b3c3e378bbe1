//! Server certificate verifier backed by a trust engine

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};

use crate::chain::CertificateChain;
use crate::composite::CompositeTrustEngine;
use crate::error::TrustError;

/// Authentication type reported to validators for rustls handshakes
pub const HANDSHAKE_AUTH_TYPE: &str = "GENERIC";

/// Delegates rustls' chain validation to a [`CompositeTrustEngine`]
///
/// The hostname comes from the `ServerName` of the connection, so every
/// handshake carries its own context. Rejections are wrapped in
/// `rustls::Error`; use [`TrustError::from_rustls`] to get them back.
#[derive(Debug)]
pub struct TrustEngineVerifier {
    engine: Arc<CompositeTrustEngine>,
    provider: Arc<CryptoProvider>,
}

impl TrustEngineVerifier {
    /// Verify with `engine` and the ring provider's signature algorithms
    pub fn new(engine: Arc<CompositeTrustEngine>) -> Self {
        Self {
            engine,
            provider: Arc::new(ring::default_provider()),
        }
    }

    /// The engine making the decisions
    pub fn engine(&self) -> &Arc<CompositeTrustEngine> {
        &self.engine
    }
}

impl ServerCertVerifier for TrustEngineVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let host = match server_name {
            ServerName::DnsName(name) => name.as_ref().to_string(),
            ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).to_string(),
            _ => {
                return Err(TrustError::not_trusted(format!(
                    "unsupported server name {server_name:?}"
                ))
                .into())
            }
        };

        let chain = CertificateChain::from_handshake(end_entity, intermediates);
        match self.engine.validate(&chain, HANDSHAKE_AUTH_TYPE, Some(&host)) {
            Ok(_) => {
                tracing::debug!("Trust engine accepted certificate for {host}");
                Ok(ServerCertVerified::assertion())
            }
            Err(rejection) => {
                tracing::warn!("Trust engine rejected certificate for {host}: {rejection}");
                Err(rejection.into())
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
