//! TLS connections verified by a trust engine

use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::crypto::ring;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::builder::TrustEngineBuilder;
use crate::composite::CompositeTrustEngine;
use crate::config::ApplicationConfig;
use crate::error::{Result, TrustError};
use crate::tls::verifier::TrustEngineVerifier;
use crate::validator::SystemDefaultValidator;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens TLS connections whose certificates are judged by a trust engine
///
/// An engine without validators is never installed; the platform's default
/// verification is used instead.
#[derive(Debug, Clone)]
pub struct TrustedConnector {
    client_config: Arc<ClientConfig>,
    app_config: Option<ApplicationConfig>,
    connect_timeout: Duration,
}

impl TrustedConnector {
    /// Connector verifying with `engine`
    pub fn new(engine: Arc<CompositeTrustEngine>) -> Result<Self> {
        Ok(Self {
            client_config: Arc::new(client_config(engine)?),
            app_config: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Connector for the engine and cleartext policy of `builder`
    pub fn from_builder(builder: &TrustEngineBuilder) -> Result<Self> {
        let mut connector = Self::new(builder.build())?;
        connector.app_config = builder.application_config().cloned();
        Ok(connector)
    }

    /// Limit how long establishing the TCP connection may take
    pub fn connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }

    /// The rustls configuration, for use with other TLS clients
    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.client_config)
    }

    /// Fail with `CleartextNotPermitted` if plain HTTP to `host` is forbidden
    pub fn check_cleartext(&self, host: &str) -> Result<()> {
        match &self.app_config {
            Some(config) if !config.is_cleartext_traffic_permitted_for(host) => {
                Err(TrustError::CleartextNotPermitted(host.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Connect to `host:port` and complete the TLS handshake
    ///
    /// A rejected certificate surfaces as [`TrustError::Handshake`];
    /// [`TrustError::rejection`] recovers the engine's decision.
    pub async fn connect(&self, host: &str, port: u16) -> Result<TlsStream<TcpStream>> {
        tracing::debug!("Connecting to {host}:{port}");

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| TrustError::Configuration(format!("invalid hostname {host:?}: {e}")))?;

        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connection to {host}:{port} timed out"),
                )
            })??;

        let stream = TlsConnector::from(Arc::clone(&self.client_config))
            .connect(server_name, tcp)
            .await
            .map_err(|source| TrustError::Handshake {
                host: host.to_string(),
                source,
            })?;

        tracing::info!("TLS connection established to {host}:{port}");
        Ok(stream)
    }
}

fn client_config(engine: Arc<CompositeTrustEngine>) -> Result<ClientConfig> {
    let builder = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| TrustError::Configuration(format!("unusable TLS provider: {e}")))?;

    if engine.is_empty() {
        tracing::debug!("Trust engine is empty, using platform verification");
        let roots = SystemDefaultValidator::from_platform().root_store();
        return Ok(builder.with_root_certificates(roots).with_no_client_auth());
    }

    Ok(builder
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(TrustEngineVerifier::new(engine)))
        .with_no_client_auth())
}
