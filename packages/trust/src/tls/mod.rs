//! rustls integration
//!
//! - `verifier`: runs the trust engine inside the rustls handshake
//! - `connector`: opens TLS connections through the engine

pub mod connector;
pub mod verifier;

pub use connector::TrustedConnector;
pub use verifier::TrustEngineVerifier;
